// Copyright 2024 The Rsvn Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The repository -> working copy arm.

use std::cell::RefCell;

use rsvn_lib::client::Notification;
use rsvn_lib::client::NotifyAction;
use rsvn_lib::copy::CopySource;
use rsvn_lib::copy::copy;
use rsvn_lib::error::ErrorCode;
use rsvn_lib::ra::NodeKind;
use rsvn_lib::revision::Revnum;
use rsvn_lib::wc::Entry;
use rsvn_lib::wc::Schedule;

use crate::common::REPO_URL;
use crate::common::TestEnv;

fn url(rel: &str) -> String {
    format!("{REPO_URL}/{rel}")
}

/// A repository with a file and a directory, and a versioned working-copy
/// root from the same repository.
fn env_with_checkout_root() -> TestEnv {
    let env = TestEnv::new();
    env.repos.edit(|tree| {
        tree.put_file("trunk/a.txt", b"alpha");
        tree.put_file("trunk/sub/f.txt", b"fff");
    });
    let root = env.wc.root().to_path_buf();
    env.wc.init_versioned_dir(
        &root,
        &url("wc"),
        Revnum(1),
        env.repos.uuid().as_deref(),
    );
    env
}

#[test]
fn test_file_copy_installs_history_and_notifies() {
    let env = env_with_checkout_root();
    let mut ctx = env.context();
    let notifications: RefCell<Vec<Notification>> = RefCell::new(Vec::new());
    let notify = |notification: &Notification| {
        notifications.borrow_mut().push(notification.clone());
    };
    ctx.notify = Some(&notify);

    let dst = env.wc.root().join("b.txt");
    let sources = [CopySource::from_target(url("trunk/a.txt"))];
    let mut commit_info = None;
    copy(&sources, dst.to_str().unwrap(), false, &ctx, &mut commit_info).unwrap();

    // No commit on this arm.
    assert!(commit_info.is_none());
    assert_eq!(std::fs::read(&dst).unwrap(), b"alpha");

    let entry = env.wc.entry_of(&dst).unwrap();
    assert_eq!(entry.schedule, Schedule::Add);
    assert_eq!(entry.copyfrom_url.as_deref(), Some(url("trunk/a.txt").as_str()));
    assert_eq!(entry.copyfrom_rev, Some(Revnum(1)));

    // History metadata was extended on the new node.
    assert_eq!(
        env.wc.mergeinfo_of(&dst).unwrap().to_string(),
        "/trunk/a.txt:1"
    );

    // The add notification is synthesized by the arm itself.
    let seen = notifications.borrow();
    assert!(
        seen.iter().any(|notification| {
            notification.action == NotifyAction::Add
                && notification.kind == NodeKind::File
                && notification.path.ends_with("b.txt")
        }),
        "missing add notification: {seen:?}"
    );
    assert!(env.wc.locked_paths().is_empty());
}

#[test]
fn test_directory_copy_checks_out_and_schedules_the_add() {
    let env = env_with_checkout_root();
    let ctx = env.context();

    let dst = env.wc.root().join("subcopy");
    let sources = [CopySource::from_target(url("trunk/sub"))];
    let mut commit_info = None;
    copy(&sources, dst.to_str().unwrap(), false, &ctx, &mut commit_info).unwrap();

    assert_eq!(std::fs::read(dst.join("f.txt")).unwrap(), b"fff");

    // Checked out at head, then scheduled for addition with the concrete
    // checked-out revision as the copy-from.
    let entry = env.wc.entry_of(&dst).unwrap();
    assert_eq!(entry.schedule, Schedule::Add);
    assert_eq!(entry.copyfrom_url.as_deref(), Some(url("trunk/sub").as_str()));
    assert_eq!(entry.copyfrom_rev, Some(Revnum(1)));
    assert_eq!(
        env.wc.mergeinfo_of(&dst).unwrap().to_string(),
        "/trunk/sub:1"
    );
    assert!(env.wc.locked_paths().is_empty());
}

#[test]
fn test_foreign_repository_directory_copy_is_rejected() {
    let env = TestEnv::new();
    env.repos.edit(|tree| {
        tree.put_file("trunk/sub/f.txt", b"fff");
    });
    let root = env.wc.root().to_path_buf();
    // The destination working copy belongs to some other repository.
    env.wc.init_versioned_dir(
        &root,
        "svn://elsewhere.example.com/other",
        Revnum(1),
        Some("99999999-9999-9999-9999-999999999999"),
    );
    let ctx = env.context();

    let dst = env.wc.root().join("subcopy");
    let sources = [CopySource::from_target(url("trunk/sub"))];
    let mut commit_info = None;
    let err = copy(&sources, dst.to_str().unwrap(), false, &ctx, &mut commit_info).unwrap_err();

    assert_eq!(err.code(), ErrorCode::UnsupportedFeature);
    assert!(err.message().contains("foreign repository"));
    // The destination was not turned into a scheduled copy.
    let entry = env.wc.entry_of(&dst);
    assert!(entry.is_none_or(|entry| entry.schedule == Schedule::Normal));
    assert!(env.wc.mergeinfo_of(&dst).is_none());
    assert!(env.wc.locked_paths().is_empty());
}

#[test]
fn test_logically_obstructed_destination_is_rejected() {
    let env = env_with_checkout_root();
    let dst = env.wc.root().join("b.txt");
    // An entry without a working file, not scheduled for deletion.
    env.wc.set_entry(
        &dst,
        Entry {
            url: Some(url("wc/b.txt")),
            revision: Revnum(1),
            kind: NodeKind::File,
            schedule: Schedule::Normal,
            uuid: env.repos.uuid(),
            copyfrom_url: None,
            copyfrom_rev: None,
        },
    );
    let ctx = env.context();

    let sources = [CopySource::from_target(url("trunk/a.txt"))];
    let mut commit_info = None;
    let err = copy(&sources, dst.to_str().unwrap(), false, &ctx, &mut commit_info).unwrap_err();
    assert_eq!(err.code(), ErrorCode::WcObstructedUpdate);
    assert!(err.message().contains("exists (though the working file is missing)"));
    assert!(!dst.exists());
}

#[test]
fn test_existing_destination_retries_as_child() {
    let env = env_with_checkout_root();
    let ctx = env.context();

    // The destination is the working-copy root itself; with as-child the
    // source lands inside it.
    let sources = [CopySource::from_target(url("trunk/a.txt"))];
    let mut commit_info = None;
    copy(
        &sources,
        env.wc.root().to_str().unwrap(),
        true,
        &ctx,
        &mut commit_info,
    )
    .unwrap();

    let dst = env.wc.root().join("a.txt");
    assert_eq!(std::fs::read(&dst).unwrap(), b"alpha");
    assert_eq!(env.wc.entry_of(&dst).unwrap().schedule, Schedule::Add);
}

#[test]
fn test_missing_source_is_reported_from_peg_resolution() {
    let env = env_with_checkout_root();
    let ctx = env.context();

    let dst = env.wc.root().join("b.txt");
    let sources = [CopySource::from_target(url("trunk/nope"))];
    let mut commit_info = None;
    let err = copy(&sources, dst.to_str().unwrap(), false, &ctx, &mut commit_info).unwrap_err();
    assert_eq!(err.code(), ErrorCode::FsNotFound);
    assert!(!dst.exists());
}
