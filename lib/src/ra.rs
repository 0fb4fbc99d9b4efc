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
use std::io::Write;

use chrono::DateTime;
use chrono::Utc;

use crate::delta::CommitEditor;
use crate::error::ClientError;
use crate::error::ClientResult;
use crate::error::ErrorCode;
use crate::mergeinfo::Mergeinfo;
use crate::revision::Revision;
use crate::revision::Revnum;

/// What kind of node a path addresses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NodeKind {
    /// The path does not exist.
    None,
    File,
    Dir,
}

/// One open session against a repository, rooted at a session URL.
///
/// Paths passed to session operations are relative to the session root; an
/// empty path addresses the root itself. Sessions are single-owner and may be
/// re-rooted with [`RaSession::reparent`].
pub trait RaSession: Debug {
    /// The URL this session is currently rooted at.
    fn session_url(&self) -> &str;

    /// Moves the session root to `url`, which must lie within the same
    /// repository.
    fn reparent(&mut self, url: &str) -> ClientResult<()>;

    /// The node kind of `rel_path` at `revision` (`None` means head).
    fn check_path(&self, rel_path: &str, revision: Option<Revnum>) -> ClientResult<NodeKind>;

    /// Streams the contents of the file at `rel_path` into `out`, returning
    /// the revision actually fetched and the node's properties.
    fn get_file(
        &self,
        rel_path: &str,
        revision: Option<Revnum>,
        out: &mut dyn Write,
    ) -> ClientResult<(Revnum, HashMap<String, String>)>;

    fn get_latest_revnum(&self) -> ClientResult<Revnum>;

    /// The revision in effect at `date` (the youngest revision no younger
    /// than it).
    fn get_dated_revision(&self, date: DateTime<Utc>) -> ClientResult<Revnum>;

    /// The repository UUID; fails with [`ErrorCode::RaNoReposUuid`] when the
    /// server does not report one.
    fn get_uuid(&self) -> ClientResult<String>;

    fn get_repos_root(&self) -> ClientResult<String>;

    /// Opens a commit transaction with the given revision properties. No
    /// lock tokens are used by this client core.
    fn get_commit_editor<'a>(
        &'a self,
        revprops: HashMap<String, String>,
    ) -> ClientResult<Box<dyn CommitEditor + 'a>>;

    /// The oldest revision at which the node line currently at `rel_path`
    /// has existed, or `None` if the node has no history there.
    fn oldest_rev_at_path(&self, rel_path: &str, revision: Revnum)
    -> ClientResult<Option<Revnum>>;

    /// The node's explicit history-metadata property at `revision`, if set.
    fn get_mergeinfo(&self, rel_path: &str, revision: Revnum) -> ClientResult<Option<Mergeinfo>>;

    /// Translates `url` pegged at `peg` to its location at the operative
    /// revision, returning the URL there and the concrete revision number.
    fn locations(&self, url: &str, peg: Revision, op: Revision) -> ClientResult<(String, Revnum)>;
}

/// Opens repository-access sessions.
pub trait RaConnect: Debug {
    /// Opens a session rooted at `url`. Fails with
    /// [`ErrorCode::RaIllegalUrl`] when no repository answers to the URL.
    fn open(&self, url: &str) -> ClientResult<Box<dyn RaSession>>;
}

/// Resolves a revision specifier against a session, without a working copy.
///
/// Working-copy-relative specifiers cannot be resolved here and are rejected
/// with [`ErrorCode::ClientBadRevision`].
pub fn resolve_revnum(session: &dyn RaSession, revision: Revision) -> ClientResult<Revnum> {
    match revision {
        Revision::Number(revnum) => Ok(revnum),
        Revision::Head | Revision::Unspecified => session.get_latest_revnum(),
        Revision::Date(date) => session.get_dated_revision(date),
        Revision::Base | Revision::Committed | Revision::Previous | Revision::Working => {
            Err(ClientError::new(
                ErrorCode::ClientBadRevision,
                "Revision type requires a working copy path, not a URL",
            ))
        }
    }
}
