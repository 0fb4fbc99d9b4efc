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

//! Pair-builder argument checks: everything that must be rejected before
//! any transport arm runs.

use rsvn_lib::copy::CopySource;
use rsvn_lib::copy::copy;
use rsvn_lib::copy::move_path;
use rsvn_lib::copy::move_single;
use rsvn_lib::error::ErrorCode;
use rsvn_lib::ra::NodeKind;
use rsvn_lib::revision::Revision;
use rsvn_lib::revision::Revnum;
use rsvn_lib::wc::Entry;
use rsvn_lib::wc::Schedule;
use test_case::test_case;

use crate::common::REPO_URL;
use crate::common::TestEnv;

#[test]
fn test_multiple_sources_require_as_child() {
    let env = TestEnv::new();
    let ctx = env.context();
    let sources = [
        CopySource::from_target(format!("{REPO_URL}/a")),
        CopySource::from_target(format!("{REPO_URL}/b")),
    ];
    let mut commit_info = None;
    let err = copy(&sources, &format!("{REPO_URL}/dir"), false, &ctx, &mut commit_info)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::MultipleSourcesDisallowed);

    let err = move_path(&["a", "b"], "dir", false, false, &ctx, &mut commit_info).unwrap_err();
    assert_eq!(err.code(), ErrorCode::MultipleSourcesDisallowed);
}

#[test_case(Revision::Base)]
#[test_case(Revision::Committed)]
#[test_case(Revision::Previous)]
fn test_url_peg_requiring_working_copy_is_rejected(peg: Revision) {
    let env = TestEnv::new();
    let ctx = env.context();
    let sources = [CopySource::new(
        format!("{REPO_URL}/a"),
        peg,
        Revision::Unspecified,
    )];
    let mut commit_info = None;
    let err = copy(&sources, &format!("{REPO_URL}/b"), false, &ctx, &mut commit_info)
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ClientBadRevision);
    assert_eq!(
        err.message(),
        "Revision type requires a working copy path, not a URL"
    );
}

#[test]
fn test_mixed_sides_in_sources_are_rejected() {
    let env = TestEnv::new();
    let ctx = env.context();
    let sources = [
        CopySource::from_target("local/path"),
        CopySource::from_target(format!("{REPO_URL}/a")),
    ];
    let mut commit_info = None;
    let err = copy(&sources, "dst", true, &ctx, &mut commit_info).unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnsupportedFeature);
    assert_eq!(
        err.message(),
        "Cannot mix repository and working copy sources"
    );
}

#[test]
fn test_copy_into_own_child_is_rejected_before_self_move_check() {
    let env = TestEnv::new();
    let ctx = env.context();
    let mut commit_info = None;
    let err = move_path(&["a"], "a/b", false, false, &ctx, &mut commit_info).unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnsupportedFeature);
    assert_eq!(
        err.message(),
        "Cannot copy path 'a' into its own child 'a/b'"
    );
}

#[test]
fn test_move_into_itself_is_rejected() {
    let env = TestEnv::new();
    let ctx = env.context();
    let mut commit_info = None;
    let err = move_path(&["a"], "a", false, false, &ctx, &mut commit_info).unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnsupportedFeature);
    assert_eq!(err.message(), "Cannot move path 'a' into itself");
}

#[test]
fn test_cross_side_moves_are_rejected() {
    let env = TestEnv::new();
    let ctx = env.context();
    let mut commit_info = None;
    let err = move_path(
        &["local/path"],
        &format!("{REPO_URL}/dst"),
        false,
        false,
        &ctx,
        &mut commit_info,
    )
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnsupportedFeature);
    assert_eq!(
        err.message(),
        "Moves between the working copy and the repository are not supported"
    );
}

#[test]
fn test_move_single_rejects_pinned_revisions() {
    let env = TestEnv::new();
    let ctx = env.context();
    let mut commit_info = None;
    let err = move_single(
        "a",
        Revision::Number(Revnum(3)),
        "b",
        false,
        &ctx,
        &mut commit_info,
    )
    .unwrap_err();
    assert_eq!(err.code(), ErrorCode::UnsupportedFeature);
    assert_eq!(
        err.message(),
        "Cannot specify revisions (except HEAD) with move operations"
    );
}

#[test]
fn test_pinned_local_copy_needs_a_recorded_url() {
    let env = TestEnv::new();
    let ctx = env.context();
    let src = env.wc.root().join("a.txt");
    std::fs::write(&src, b"alpha").unwrap();
    env.wc.set_entry(
        &src,
        Entry {
            url: None,
            revision: Revnum(1),
            kind: NodeKind::File,
            schedule: Schedule::Normal,
            uuid: None,
            copyfrom_url: None,
            copyfrom_rev: None,
        },
    );

    let sources = [CopySource::new(
        src.to_str().unwrap(),
        Revision::Unspecified,
        Revision::Number(Revnum(1)),
    )];
    let dst = env.wc.root().join("b.txt");
    let mut commit_info = None;
    let err = copy(&sources, dst.to_str().unwrap(), false, &ctx, &mut commit_info).unwrap_err();
    assert_eq!(err.code(), ErrorCode::EntryMissingUrl);
    assert!(err.message().contains("does not seem to have a URL"));
}

#[test]
fn test_pinned_local_copy_is_promoted_to_a_repository_copy() {
    let env = TestEnv::new();
    env.repos.edit(|tree| {
        tree.put_file("trunk/a.txt", b"alpha");
    });
    let ctx = env.context();

    let src = env.wc.root().join("a.txt");
    env.wc.init_versioned_file(
        &src,
        &format!("{REPO_URL}/trunk/a.txt"),
        Revnum(1),
        env.repos.uuid().as_deref(),
        b"alpha",
    );

    // Pinning the operative revision turns this into a repository-side
    // copy of the recorded URL.
    let sources = [CopySource::new(
        src.to_str().unwrap(),
        Revision::Unspecified,
        Revision::Number(Revnum(1)),
    )];
    let mut commit_info = None;
    copy(
        &sources,
        &format!("{REPO_URL}/trunk/b.txt"),
        false,
        &ctx,
        &mut commit_info,
    )
    .unwrap();

    let committed = commit_info.expect("repository-side copy must commit");
    assert_eq!(committed.revision, Revnum(2));
    assert_eq!(
        env.repos.node_kind("trunk/b.txt", Revnum(2)),
        NodeKind::File
    );
}
