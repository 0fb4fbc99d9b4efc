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

//! The working copy -> repository arm: harvested commits and the
//! three-phase error reconciliation.

use std::path::PathBuf;

use pretty_assertions::assert_eq;
use rsvn_lib::copy::CopySource;
use rsvn_lib::copy::copy;
use rsvn_lib::error::ClientResult;
use rsvn_lib::error::ErrorCode;
use rsvn_lib::ra::NodeKind;
use rsvn_lib::revision::Revnum;

use crate::common::REPO_URL;
use crate::common::TestEnv;

fn url(rel: &str) -> String {
    format!("{REPO_URL}/{rel}")
}

/// A repository with `trunk/a.txt@1` and a working copy holding it.
fn env_with_versioned_file() -> (TestEnv, PathBuf) {
    let env = TestEnv::new();
    env.repos.edit(|tree| {
        tree.put_file("trunk/a.txt", b"alpha");
    });
    let src = env.wc.root().join("a.txt");
    env.wc.init_versioned_file(
        &src,
        &url("trunk/a.txt"),
        Revnum(1),
        env.repos.uuid().as_deref(),
        b"alpha",
    );
    (env, src)
}

fn leftover_tempfiles(env: &TestEnv) -> Vec<PathBuf> {
    std::fs::read_dir(env.wc.root())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(".rsvn-commit."))
        })
        .collect()
}

#[test]
fn test_copy_commits_the_working_file_with_history_metadata() {
    let (env, src) = env_with_versioned_file();
    let ctx = env.context();

    let sources = [CopySource::from_target(src.to_str().unwrap())];
    let mut commit_info = None;
    copy(&sources, &url("trunk/b.txt"), false, &ctx, &mut commit_info).unwrap();

    let committed = commit_info.expect("the commit info survives");
    assert_eq!(committed.revision, Revnum(2));
    assert_eq!(env.repos.node_kind("trunk/b.txt", Revnum(2)), NodeKind::File);
    assert_eq!(
        env.repos.file_content("trunk/b.txt", Revnum(2)).unwrap(),
        b"alpha"
    );
    // Outgoing property changes carried the combined history metadata.
    assert_eq!(
        env.repos
            .node_prop("trunk/b.txt", Revnum(2), "svn:mergeinfo")
            .as_deref(),
        Some("/trunk/a.txt:1")
    );
    // The harvest tempfiles are gone and the lock is released.
    assert!(leftover_tempfiles(&env).is_empty());
    assert!(env.wc.locked_paths().is_empty());
}

#[test]
fn test_local_history_metadata_joins_the_outgoing_property() {
    let (env, src) = env_with_versioned_file();
    let mut local = rsvn_lib::mergeinfo::Mergeinfo::new();
    local.record(
        "/branches/feature",
        rsvn_lib::mergeinfo::RevRange::new(Revnum(1), Revnum(1)),
    );
    {
        // Seed the working copy's recorded history for the source.
        let ctx = env.context();
        let adm = ctx
            .wc
            .adm_open(env.wc.root(), false, rsvn_lib::wc::LockDepth::Empty, None)
            .unwrap();
        ctx.wc.record_mergeinfo(&src, &local, adm.as_ref()).unwrap();
        adm.close().unwrap();
    }
    let ctx = env.context();

    let sources = [CopySource::from_target(src.to_str().unwrap())];
    let mut commit_info = None;
    copy(&sources, &url("trunk/b.txt"), false, &ctx, &mut commit_info).unwrap();

    assert_eq!(
        env.repos
            .node_prop("trunk/b.txt", Revnum(2), "svn:mergeinfo")
            .as_deref(),
        Some("/branches/feature:1\n/trunk/a.txt:1")
    );
}

#[test]
fn test_existing_destination_fails_before_the_commit() {
    let (env, src) = env_with_versioned_file();
    let ctx = env.context();

    let sources = [CopySource::from_target(src.to_str().unwrap())];
    let mut commit_info = None;
    let err = copy(&sources, &url("trunk/a.txt"), false, &ctx, &mut commit_info).unwrap_err();

    // A pre-flight rejection is not wrapped in commit-phase headers.
    assert_eq!(err.code(), ErrorCode::FsAlreadyExists);
    assert!(err.message().ends_with("already exists"));
    assert!(commit_info.is_none());
    assert_eq!(env.repos.head(), Revnum(1));
    assert!(env.wc.locked_paths().is_empty());
}

#[test]
fn test_unlock_failure_after_a_successful_commit() {
    let (env, src) = env_with_versioned_file();
    env.wc.set_fail_unlock("injected unlock failure");
    let ctx = env.context();

    let sources = [CopySource::from_target(src.to_str().unwrap())];
    let mut commit_info = None;
    let err = copy(&sources, &url("trunk/b.txt"), false, &ctx, &mut commit_info).unwrap_err();

    let messages: Vec<_> = err.chain().map(|e| e.message().to_owned()).collect();
    assert_eq!(
        messages,
        vec![
            "Commit succeeded, but other errors follow:",
            "Error unlocking locked dirs (details follow):",
            "injected unlock failure",
        ]
    );
    // The commit itself went through, and the caller can see it.
    assert_eq!(commit_info.expect("commit info is populated").revision, Revnum(2));
    assert_eq!(env.repos.node_kind("trunk/b.txt", Revnum(2)), NodeKind::File);
    assert!(leftover_tempfiles(&env).is_empty());
}

#[test]
fn test_commit_failure_still_runs_the_cleanup_phases() {
    let (env, src) = env_with_versioned_file();
    env.repos.fail_next_commit("injected commit failure");
    let ctx = env.context();

    let sources = [CopySource::from_target(src.to_str().unwrap())];
    let mut commit_info = None;
    let err = copy(&sources, &url("trunk/b.txt"), false, &ctx, &mut commit_info).unwrap_err();

    let messages: Vec<_> = err.chain().map(|e| e.message().to_owned()).collect();
    assert_eq!(
        messages,
        vec!["Commit failed (details follow):", "injected commit failure"]
    );
    assert!(commit_info.is_none());
    assert_eq!(env.repos.head(), Revnum(1));
    // Tempfiles staged for the failed commit were still removed, and the
    // lock is gone.
    assert!(leftover_tempfiles(&env).is_empty());
    assert!(env.wc.locked_paths().is_empty());
}

#[test]
fn test_commit_and_unlock_failures_chain_in_order() {
    let (env, src) = env_with_versioned_file();
    env.repos.fail_next_commit("injected commit failure");
    env.wc.set_fail_unlock("injected unlock failure");
    let ctx = env.context();

    let sources = [CopySource::from_target(src.to_str().unwrap())];
    let mut commit_info = None;
    let err = copy(&sources, &url("trunk/b.txt"), false, &ctx, &mut commit_info).unwrap_err();

    let messages: Vec<_> = err.chain().map(|e| e.message().to_owned()).collect();
    assert_eq!(
        messages,
        vec![
            "Commit failed (details follow):",
            "injected commit failure",
            "Error unlocking locked dirs (details follow):",
            "injected unlock failure",
        ]
    );
}

#[test]
fn test_declined_log_message_aborts_quietly() {
    let (env, src) = env_with_versioned_file();
    let mut ctx = env.context();
    let log_msg =
        |_items: &[rsvn_lib::commit::CommitItem]| -> ClientResult<Option<String>> { Ok(None) };
    ctx.log_msg = Some(&log_msg);

    let sources = [CopySource::from_target(src.to_str().unwrap())];
    let mut commit_info = None;
    copy(&sources, &url("trunk/b.txt"), false, &ctx, &mut commit_info).unwrap();

    assert!(commit_info.is_none());
    assert_eq!(env.repos.head(), Revnum(1));
    assert!(env.wc.locked_paths().is_empty());
}
