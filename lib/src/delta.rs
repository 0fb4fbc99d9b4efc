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

#![expect(missing_docs)]

//! The commit editor interface and the path-based editor driver.
//!
//! A [`CommitEditor`] receives one tree transformation as a sequence of
//! operations addressed by session-relative paths. [`path_driver`] relieves
//! callers of the directory bookkeeping: given the set of addressed paths it
//! computes the minimal open/close sequence and invokes a callback at each
//! path, in depth-first path order.

use chrono::DateTime;
use chrono::Utc;

use crate::error::ClientResult;
use crate::paths;
use crate::revision::Revnum;

/// The result of a completed commit.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommitInfo {
    /// The revision the commit created.
    pub revision: Revnum,
    /// Server-side timestamp of the new revision.
    pub date: Option<DateTime<Utc>>,
    /// Authenticated author of the new revision.
    pub author: Option<String>,
}

/// One open commit transaction against a repository.
///
/// Paths are relative to the session the editor was obtained from. Directory
/// operations nest: `open_root` must come first, every `add_directory`/
/// `open_directory` must eventually be paired with `close_directory`, and
/// `close_edit` or `abort_edit` ends the transaction.
pub trait CommitEditor {
    fn open_root(&mut self, base_revision: Option<Revnum>) -> ClientResult<()>;

    fn delete_entry(&mut self, path: &str, revision: Option<Revnum>) -> ClientResult<()>;

    /// Adds a directory, optionally copied from `(url, revision)`. The
    /// directory stays open until `close_directory`.
    fn add_directory(&mut self, path: &str, copyfrom: Option<(&str, Revnum)>) -> ClientResult<()>;

    fn open_directory(&mut self, path: &str) -> ClientResult<()>;

    fn close_directory(&mut self) -> ClientResult<()>;

    /// Adds a file, optionally copied from `(url, revision)`. The file stays
    /// open until `close_file`.
    fn add_file(&mut self, path: &str, copyfrom: Option<(&str, Revnum)>) -> ClientResult<()>;

    fn close_file(&mut self, path: &str) -> ClientResult<()>;

    /// Replaces the full text of the currently open file.
    fn apply_text(&mut self, path: &str, contents: &[u8]) -> ClientResult<()>;

    fn change_file_prop(&mut self, path: &str, name: &str, value: Option<&str>)
    -> ClientResult<()>;

    fn change_dir_prop(&mut self, path: &str, name: &str, value: Option<&str>)
    -> ClientResult<()>;

    fn close_edit(&mut self) -> ClientResult<CommitInfo>;

    fn abort_edit(&mut self) -> ClientResult<()>;
}

/// What the path-driver callback left behind at a path.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CallbackOutcome {
    /// Nothing remains open; the driver need not close anything here.
    Done,
    /// The callback added a directory at the path and left it open; the
    /// driver closes it when leaving the subtree.
    OpenedDirectory,
}

/// Drives `editor` across `paths` in depth-first path order.
///
/// The driver opens the root at `base_revision`, opens and closes the
/// intermediate directories so that each path's parent is open when the
/// callback runs, and closes everything that remains open at the end. The
/// callback performs the actual operation at each path. The edit itself is
/// neither closed nor aborted here; that is the caller's decision.
pub fn path_driver(
    editor: &mut dyn CommitEditor,
    base_revision: Option<Revnum>,
    paths: &[String],
    callback: &mut dyn FnMut(&mut dyn CommitEditor, &str) -> ClientResult<CallbackOutcome>,
) -> ClientResult<()> {
    let mut ordered: Vec<&str> = paths.iter().map(String::as_str).collect();
    ordered.sort_by(|a, b| a.split('/').cmp(b.split('/')));

    editor.open_root(base_revision)?;
    let mut open_dirs: Vec<String> = vec![String::new()];
    for path in ordered {
        debug_assert!(!path.is_empty(), "the editor cannot address the root");
        let parent = paths::dirname(path);

        // Close until the top of the stack encloses the parent.
        while {
            let top = open_dirs.last().expect("root stays open");
            !(top.is_empty() || top == parent || paths::is_child(top, parent).is_some())
        } {
            editor.close_directory()?;
            open_dirs.pop();
        }

        // Open the directories between the stack top and the parent.
        let top = open_dirs.last().expect("root stays open").clone();
        let missing = if top.is_empty() {
            parent
        } else if top == parent {
            ""
        } else {
            paths::is_child(&top, parent).unwrap_or("")
        };
        let mut current = top;
        for component in missing.split('/').filter(|c| !c.is_empty()) {
            current = paths::join(&current, component);
            editor.open_directory(&current)?;
            open_dirs.push(current.clone());
        }

        if callback(editor, path)? == CallbackOutcome::OpenedDirectory {
            open_dirs.push(path.to_owned());
        }
    }
    for _ in 0..open_dirs.len() {
        editor.close_directory()?;
    }
    Ok(())
}
