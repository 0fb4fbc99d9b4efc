// Copyright 2023 The Rsvn Authors
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

#![expect(missing_docs)]

use std::collections::HashMap;
use std::fmt::Debug;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use crate::client::CancelFn;
use crate::client::NotifyFn;
use crate::commit::CommitItem;
use crate::commit::HarvestRequest;
use crate::delta::CommitEditor;
use crate::delta::CommitInfo;
use crate::error::ClientResult;
use crate::mergeinfo::Mergeinfo;
use crate::ra::NodeKind;
use crate::revision::Revnum;

/// What a working-copy entry is scheduled for at the next commit.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Schedule {
    Normal,
    Add,
    Delete,
    Replace,
}

/// Administrative data recorded for one versioned node.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Entry {
    /// Repository URL this node was checked out from, if recorded.
    pub url: Option<String>,
    /// Base revision of the node.
    pub revision: Revnum,
    pub kind: NodeKind,
    pub schedule: Schedule,
    /// UUID of the repository this node belongs to, if recorded.
    pub uuid: Option<String>,
    /// Copy history, for nodes scheduled for addition with history.
    pub copyfrom_url: Option<String>,
    pub copyfrom_rev: Option<Revnum>,
}

/// How far below the opened directory an administrative lock extends.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LockDepth {
    /// Only the opened directory itself.
    Empty,
    /// The whole subtree.
    Infinity,
}

/// One held administrative lock (or lock set) in a working copy.
///
/// Dropping an access releases its locks; [`AdmAccess::close`] does the same
/// but reports failures that a drop would have to swallow.
pub trait AdmAccess: Debug {
    fn path(&self) -> &Path;

    /// Returns the already-locked access for `path` from this lock set.
    fn retrieve(&self, path: &Path) -> ClientResult<Box<dyn AdmAccess>>;

    fn close(&self) -> ClientResult<()>;
}

/// The working-copy administrative library, as consumed by the client core.
///
/// The core only orchestrates; scheduling, on-disk formats and conflict
/// handling live behind this seam.
pub trait Wc: Debug {
    /// The on-disk kind of `path`, following the working copy's view of
    /// what exists.
    fn check_path(&self, path: &Path) -> ClientResult<NodeKind>;

    /// Locks the directory at `path` to `depth` and returns the access.
    fn adm_open(
        &self,
        path: &Path,
        write_lock: bool,
        depth: LockDepth,
        cancel: CancelFn<'_>,
    ) -> ClientResult<Box<dyn AdmAccess>>;

    /// Like [`Wc::adm_open`], but probes: a file path locks its parent.
    fn adm_probe_open(
        &self,
        path: &Path,
        write_lock: bool,
        depth: LockDepth,
        cancel: CancelFn<'_>,
    ) -> ClientResult<Box<dyn AdmAccess>>;

    /// Copies the versioned node at `src` to `dst_basename` inside the
    /// locked directory `dst_parent`, scheduling the copy for addition with
    /// history.
    fn copy(
        &self,
        src: &Path,
        dst_parent: &dyn AdmAccess,
        dst_basename: &str,
        cancel: CancelFn<'_>,
        notify: NotifyFn<'_>,
    ) -> ClientResult<()>;

    /// Schedules `path` for deletion.
    fn delete(
        &self,
        path: &Path,
        adm: &dyn AdmAccess,
        cancel: CancelFn<'_>,
        notify: NotifyFn<'_>,
    ) -> ClientResult<()>;

    /// Schedules `path` for addition, with copy history when `copyfrom` is
    /// given.
    fn add(
        &self,
        path: &Path,
        adm: &dyn AdmAccess,
        copyfrom: Option<(&str, Revnum)>,
        cancel: CancelFn<'_>,
        notify: NotifyFn<'_>,
    ) -> ClientResult<()>;

    /// Installs a file fetched from the repository: moves the text at
    /// `text_path` into place at `dst`, records `props`, and schedules the
    /// addition with history when `copyfrom` is given. Does not notify.
    fn add_repos_file(
        &self,
        dst: &Path,
        adm: &dyn AdmAccess,
        text_path: &Path,
        props: &HashMap<String, String>,
        copyfrom: Option<(&str, Revnum)>,
    ) -> ClientResult<()>;

    /// The administrative entry for `path`, or `None` if unversioned.
    fn entry(&self, path: &Path, adm: &dyn AdmAccess, show_hidden: bool)
    -> ClientResult<Option<Entry>>;

    /// The history metadata recorded on `path` in the working copy.
    fn parse_mergeinfo(&self, path: &Path, adm: &dyn AdmAccess) -> ClientResult<Mergeinfo>;

    /// Replaces the history metadata recorded on `path`.
    fn record_mergeinfo(
        &self,
        path: &Path,
        mergeinfo: &Mergeinfo,
        adm: &dyn AdmAccess,
    ) -> ClientResult<()>;

    /// Harvests the commit items for copying each request's source into the
    /// repository, one item per request, in request order.
    fn copy_committables(
        &self,
        requests: &[HarvestRequest],
        adm: &dyn AdmAccess,
        cancel: CancelFn<'_>,
    ) -> ClientResult<Vec<CommitItem>>;

    /// Drives `editor` with the condensed `items`, streaming file texts from
    /// the working copy. Tempfiles created on the way are appended to
    /// `tempfiles` whether or not the commit succeeds; the caller removes
    /// them.
    fn do_commit(
        &self,
        base_url: &str,
        items: &[CommitItem],
        adm: &dyn AdmAccess,
        editor: &mut dyn CommitEditor,
        notify: NotifyFn<'_>,
        tempfiles: &mut Vec<PathBuf>,
    ) -> ClientResult<CommitInfo>;
}

/// Waits out the filesystem's timestamp granularity.
///
/// Change detection compares working-file mtimes against recorded ones; a
/// file rewritten within the granularity window would look unmodified. Must
/// run after any operation that wrote working files, on success and on error.
pub fn sleep_for_timestamps() {
    std::thread::sleep(Duration::from_millis(20));
}
