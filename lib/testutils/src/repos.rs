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

//! An in-memory repository with a repository-access session, usable in
//! place of a real transport.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::io::Write;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use chrono::DateTime;
use chrono::Utc;
use rsvn_lib::delta::CommitEditor;
use rsvn_lib::delta::CommitInfo;
use rsvn_lib::error::ClientError;
use rsvn_lib::error::ClientResult;
use rsvn_lib::error::ErrorCode;
use rsvn_lib::mergeinfo::Mergeinfo;
use rsvn_lib::mergeinfo::PROP_MERGEINFO;
use rsvn_lib::paths;
use rsvn_lib::ra::NodeKind;
use rsvn_lib::ra::RaConnect;
use rsvn_lib::ra::RaSession;
use rsvn_lib::revision::Revision;
use rsvn_lib::revision::Revnum;

const DEFAULT_UUID: &str = "00000000-0000-0000-0000-000000000001";
const DEFAULT_AUTHOR: &str = "testuser";

#[derive(Clone, Debug)]
struct Node {
    kind: NodeKind,
    props: HashMap<String, String>,
    content: Vec<u8>,
    /// Revision where this node line began (creation or copy).
    created: Revnum,
}

impl Node {
    fn dir(created: Revnum) -> Self {
        Self {
            kind: NodeKind::Dir,
            props: HashMap::new(),
            content: Vec::new(),
            created,
        }
    }

    fn file(created: Revnum, content: Vec<u8>) -> Self {
        Self {
            kind: NodeKind::File,
            props: HashMap::new(),
            content,
            created,
        }
    }
}

/// One revision's tree: root-relative path (`""` is the root) to node.
#[derive(Clone, Debug, Default)]
struct Tree {
    nodes: BTreeMap<String, Node>,
}

impl Tree {
    fn subtree_keys(&self, path: &str) -> Vec<String> {
        self.nodes
            .keys()
            .filter(|key| {
                key.as_str() == path || (path.is_empty() && !key.is_empty())
                    || paths::is_child(path, key).is_some()
            })
            .cloned()
            .collect()
    }

    fn remove_subtree(&mut self, path: &str) {
        for key in self.subtree_keys(path) {
            self.nodes.remove(&key);
        }
    }
}

#[derive(Debug)]
struct RevisionRecord {
    tree: Tree,
    props: HashMap<String, String>,
    date: DateTime<Utc>,
    author: Option<String>,
}

#[derive(Debug)]
struct ReposData {
    root_url: String,
    uuid: Option<String>,
    revisions: Vec<RevisionRecord>,
    fail_next_commit: Option<String>,
    commit_ops: BTreeMap<u64, Vec<EditOp>>,
}

/// An in-memory versioned tree addressable by URL.
///
/// Revision 0 is an empty root directory. New revisions come from
/// [`TestRepos::edit`] (test setup) or from a driven commit editor.
#[derive(Clone, Debug)]
pub struct TestRepos {
    data: Arc<Mutex<ReposData>>,
}

impl TestRepos {
    pub fn new(root_url: &str) -> Self {
        let mut tree = Tree::default();
        tree.nodes.insert(String::new(), Node::dir(Revnum(0)));
        let data = ReposData {
            root_url: root_url.to_owned(),
            uuid: Some(DEFAULT_UUID.to_owned()),
            revisions: vec![RevisionRecord {
                tree,
                props: HashMap::new(),
                date: Utc::now(),
                author: None,
            }],
            fail_next_commit: None,
            commit_ops: BTreeMap::new(),
        };
        Self {
            data: Arc::new(Mutex::new(data)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ReposData> {
        self.data.lock().unwrap()
    }

    pub fn root_url(&self) -> String {
        self.lock().root_url.clone()
    }

    pub fn uuid(&self) -> Option<String> {
        self.lock().uuid.clone()
    }

    pub fn set_uuid(&self, uuid: Option<&str>) {
        self.lock().uuid = uuid.map(str::to_owned);
    }

    pub fn head(&self) -> Revnum {
        Revnum(self.lock().revisions.len() as u64 - 1)
    }

    /// Makes the next driven commit fail with `message` when the edit is
    /// closed.
    pub fn fail_next_commit(&self, message: &str) {
        self.lock().fail_next_commit = Some(message.to_owned());
    }

    /// Creates a new revision by direct tree manipulation.
    pub fn edit(&self, f: impl FnOnce(&mut TreeEditor<'_>)) -> Revnum {
        let mut data = self.lock();
        let new_rev = Revnum(data.revisions.len() as u64);
        let mut tree = data.revisions.last().unwrap().tree.clone();
        {
            let mut editor = TreeEditor {
                tree: &mut tree,
                rev: new_rev,
            };
            f(&mut editor);
        }
        data.revisions.push(RevisionRecord {
            tree,
            props: HashMap::new(),
            date: Utc::now(),
            author: Some(DEFAULT_AUTHOR.to_owned()),
        });
        new_rev
    }

    fn record(&self, rev: Revnum) -> ClientResult<usize> {
        let data = self.lock();
        let index = rev.number() as usize;
        if index >= data.revisions.len() {
            return Err(ClientError::new(
                ErrorCode::FsNotFound,
                format!("No such revision {rev}"),
            ));
        }
        Ok(index)
    }

    pub fn node_kind(&self, path: &str, rev: Revnum) -> NodeKind {
        let data = self.lock();
        data.revisions[rev.number() as usize]
            .tree
            .nodes
            .get(path)
            .map_or(NodeKind::None, |node| node.kind)
    }

    pub fn node_prop(&self, path: &str, rev: Revnum, name: &str) -> Option<String> {
        let data = self.lock();
        data.revisions[rev.number() as usize]
            .tree
            .nodes
            .get(path)?
            .props
            .get(name)
            .cloned()
    }

    pub fn file_content(&self, path: &str, rev: Revnum) -> Option<Vec<u8>> {
        let data = self.lock();
        let node = data.revisions[rev.number() as usize].tree.nodes.get(path)?;
        (node.kind == NodeKind::File).then(|| node.content.clone())
    }

    pub fn revision_props(&self, rev: Revnum) -> HashMap<String, String> {
        self.lock().revisions[rev.number() as usize].props.clone()
    }

    /// The proper descendants of `path` at `rev`, as root-relative paths.
    pub fn subtree_of(&self, path: &str, rev: Revnum) -> Vec<String> {
        let data = self.lock();
        data.revisions[rev.number() as usize]
            .tree
            .nodes
            .keys()
            .filter(|key| paths::is_child(path, key).is_some())
            .cloned()
            .collect()
    }

    /// The editor operations a driven commit consisted of.
    pub fn ops_for_rev(&self, rev: Revnum) -> Vec<EditOp> {
        self.lock()
            .commit_ops
            .get(&rev.number())
            .cloned()
            .unwrap_or_default()
    }

    /// Resolves a revision specifier the way a server would, without a
    /// working copy.
    pub fn resolve_revision(&self, revision: Revision) -> ClientResult<Revnum> {
        match revision {
            Revision::Number(revnum) => Ok(revnum),
            Revision::Head | Revision::Unspecified => Ok(self.head()),
            Revision::Date(date) => {
                let data = self.lock();
                let rev = data
                    .revisions
                    .iter()
                    .enumerate()
                    .filter(|(_, record)| record.date <= date)
                    .map(|(index, _)| index as u64)
                    .next_back()
                    .unwrap_or(0);
                Ok(Revnum(rev))
            }
            _ => Err(ClientError::new(
                ErrorCode::ClientBadRevision,
                "Revision type requires a working copy path, not a URL",
            )),
        }
    }

    /// Root-relative path of `url`, or an error when the URL leaves the
    /// repository.
    fn rel_of_url(&self, url: &str) -> ClientResult<String> {
        let root_url = self.root_url();
        if url == root_url {
            return Ok(String::new());
        }
        paths::is_child(&root_url, url)
            .map(str::to_owned)
            .ok_or_else(|| {
                ClientError::new(
                    ErrorCode::RaIllegalUrl,
                    format!("Illegal repository URL '{url}'"),
                )
            })
    }
}

/// Mutable view of the next revision's tree during [`TestRepos::edit`].
pub struct TreeEditor<'a> {
    tree: &'a mut Tree,
    rev: Revnum,
}

impl TreeEditor<'_> {
    fn ensure_parents(&mut self, path: &str) {
        let parent = paths::dirname(path);
        if parent.is_empty() || self.tree.nodes.contains_key(parent) {
            return;
        }
        self.ensure_parents(parent);
        self.tree.nodes.insert(parent.to_owned(), Node::dir(self.rev));
    }

    pub fn put_dir(&mut self, path: &str) {
        self.ensure_parents(path);
        if !self.tree.nodes.contains_key(path) {
            self.tree.nodes.insert(path.to_owned(), Node::dir(self.rev));
        }
    }

    pub fn put_file(&mut self, path: &str, content: &[u8]) {
        self.ensure_parents(path);
        match self.tree.nodes.get_mut(path) {
            Some(node) => node.content = content.to_vec(),
            None => {
                self.tree
                    .nodes
                    .insert(path.to_owned(), Node::file(self.rev, content.to_vec()));
            }
        }
    }

    pub fn set_prop(&mut self, path: &str, name: &str, value: &str) {
        let node = self
            .tree
            .nodes
            .get_mut(path)
            .expect("set_prop target must exist");
        node.props.insert(name.to_owned(), value.to_owned());
    }

    pub fn delete(&mut self, path: &str) {
        self.tree.remove_subtree(path);
    }
}

/// A session over a [`TestRepos`].
#[derive(Debug)]
pub struct TestRaSession {
    repos: TestRepos,
    url: String,
}

impl TestRaSession {
    /// Root-relative path of the session root.
    fn base_path(&self) -> ClientResult<String> {
        self.repos.rel_of_url(&self.url)
    }

    fn full_path(&self, rel_path: &str) -> ClientResult<String> {
        Ok(paths::join(&self.base_path()?, rel_path))
    }

    fn resolve(&self, revision: Option<Revnum>) -> Revnum {
        revision.unwrap_or_else(|| self.repos.head())
    }
}

impl RaSession for TestRaSession {
    fn session_url(&self) -> &str {
        &self.url
    }

    fn reparent(&mut self, url: &str) -> ClientResult<()> {
        self.repos.rel_of_url(url)?;
        self.url = url.to_owned();
        Ok(())
    }

    fn check_path(&self, rel_path: &str, revision: Option<Revnum>) -> ClientResult<NodeKind> {
        let rev = self.resolve(revision);
        self.repos.record(rev)?;
        Ok(self.repos.node_kind(&self.full_path(rel_path)?, rev))
    }

    fn get_file(
        &self,
        rel_path: &str,
        revision: Option<Revnum>,
        out: &mut dyn Write,
    ) -> ClientResult<(Revnum, HashMap<String, String>)> {
        let rev = self.resolve(revision);
        self.repos.record(rev)?;
        let path = self.full_path(rel_path)?;
        let data = self.repos.lock();
        let node = data.revisions[rev.number() as usize]
            .tree
            .nodes
            .get(&path)
            .filter(|node| node.kind == NodeKind::File)
            .ok_or_else(|| {
                ClientError::new(
                    ErrorCode::FsNotFound,
                    format!("File not found: revision {rev}, path '{path}'"),
                )
            })?;
        out.write_all(&node.content).map_err(|err| {
            ClientError::new(ErrorCode::Io, format!("Can't write file contents: {err}"))
        })?;
        Ok((rev, node.props.clone()))
    }

    fn get_latest_revnum(&self) -> ClientResult<Revnum> {
        Ok(self.repos.head())
    }

    fn get_dated_revision(&self, date: DateTime<Utc>) -> ClientResult<Revnum> {
        self.repos.resolve_revision(Revision::Date(date))
    }

    fn get_uuid(&self) -> ClientResult<String> {
        self.repos.uuid().ok_or_else(|| {
            ClientError::new(ErrorCode::RaNoReposUuid, "Repository has no UUID")
        })
    }

    fn get_repos_root(&self) -> ClientResult<String> {
        Ok(self.repos.root_url())
    }

    fn get_commit_editor<'a>(
        &'a self,
        revprops: HashMap<String, String>,
    ) -> ClientResult<Box<dyn CommitEditor + 'a>> {
        Ok(Box::new(TestEditor {
            repos: self.repos.clone(),
            base_path: self.base_path()?,
            revprops,
            ops: Vec::new(),
            open_depth: 0,
            finished: false,
        }))
    }

    fn oldest_rev_at_path(
        &self,
        rel_path: &str,
        revision: Revnum,
    ) -> ClientResult<Option<Revnum>> {
        self.repos.record(revision)?;
        let path = self.full_path(rel_path)?;
        let data = self.repos.lock();
        Ok(data.revisions[revision.number() as usize]
            .tree
            .nodes
            .get(&path)
            .map(|node| node.created))
    }

    fn get_mergeinfo(&self, rel_path: &str, revision: Revnum) -> ClientResult<Option<Mergeinfo>> {
        match self.repos.node_prop(&self.full_path(rel_path)?, revision, PROP_MERGEINFO) {
            Some(text) => Ok(Some(Mergeinfo::parse(&text)?)),
            None => Ok(None),
        }
    }

    fn locations(
        &self,
        url: &str,
        peg: Revision,
        op: Revision,
    ) -> ClientResult<(String, Revnum)> {
        let path = self.repos.rel_of_url(url)?;
        let peg_rev = self.repos.resolve_revision(peg)?;
        let op_rev = self.repos.resolve_revision(op)?;
        self.repos.record(peg_rev)?;
        self.repos.record(op_rev)?;
        if self.repos.node_kind(&path, peg_rev) == NodeKind::None {
            return Err(ClientError::new(
                ErrorCode::FsNotFound,
                format!("Unable to find repository location for '{url}' in revision {peg_rev}"),
            ));
        }
        // This repository model has no renames, so the location is stable
        // as long as the node exists at both revisions.
        if self.repos.node_kind(&path, op_rev) == NodeKind::None {
            return Err(ClientError::new(
                ErrorCode::FsNotFound,
                format!("The location for '{url}' for revision {op_rev} does not exist"),
            ));
        }
        Ok((url.to_owned(), op_rev))
    }
}

impl RaConnect for TestRepos {
    fn open(&self, url: &str) -> ClientResult<Box<dyn RaSession>> {
        self.rel_of_url(url)?;
        Ok(Box::new(TestRaSession {
            repos: self.clone(),
            url: url.to_owned(),
        }))
    }
}

/// One recorded commit-editor operation. Paths are session-relative, as
/// driven.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EditOp {
    OpenRoot(Option<Revnum>),
    DeleteEntry {
        path: String,
        revision: Option<Revnum>,
    },
    AddDir {
        path: String,
        copyfrom: Option<(String, Revnum)>,
    },
    OpenDir(String),
    CloseDir,
    AddFile {
        path: String,
        copyfrom: Option<(String, Revnum)>,
    },
    CloseFile(String),
    ApplyText {
        path: String,
        content: Vec<u8>,
    },
    ChangeFileProp {
        path: String,
        name: String,
        value: Option<String>,
    },
    ChangeDirProp {
        path: String,
        name: String,
        value: Option<String>,
    },
}

/// Records editor calls, then applies them to the repository on
/// `close_edit`.
struct TestEditor {
    repos: TestRepos,
    /// Root-relative path of the session the editor was opened from.
    base_path: String,
    revprops: HashMap<String, String>,
    ops: Vec<EditOp>,
    open_depth: i64,
    finished: bool,
}

impl TestEditor {
    fn check_open(&self) -> ClientResult<()> {
        if self.finished {
            return Err(ClientError::new(
                ErrorCode::Base,
                "The edit has already been closed or aborted",
            ));
        }
        if self.ops.is_empty() {
            return Err(ClientError::new(
                ErrorCode::Base,
                "The edit root has not been opened",
            ));
        }
        Ok(())
    }

    fn apply(&self) -> ClientResult<CommitInfo> {
        let mut data = self.repos.lock();
        if let Some(message) = data.fail_next_commit.take() {
            return Err(ClientError::new(ErrorCode::Io, message));
        }

        let new_rev = Revnum(data.revisions.len() as u64);
        let mut tree = data.revisions.last().unwrap().tree.clone();
        for op in &self.ops {
            match op {
                EditOp::OpenRoot(_) | EditOp::OpenDir(_) | EditOp::CloseDir
                | EditOp::CloseFile(_) => {}
                EditOp::DeleteEntry { path, .. } => {
                    tree.remove_subtree(&paths::join(&self.base_path, path));
                }
                EditOp::AddDir { path, copyfrom } => {
                    let full = paths::join(&self.base_path, path);
                    match copyfrom {
                        Some((url, rev)) => {
                            copy_subtree(&data, &mut tree, url, *rev, &full, new_rev)?;
                        }
                        None => {
                            tree.nodes.insert(full, Node::dir(new_rev));
                        }
                    }
                }
                EditOp::AddFile { path, copyfrom } => {
                    let full = paths::join(&self.base_path, path);
                    match copyfrom {
                        Some((url, rev)) => {
                            copy_subtree(&data, &mut tree, url, *rev, &full, new_rev)?;
                        }
                        None => {
                            tree.nodes.insert(full, Node::file(new_rev, Vec::new()));
                        }
                    }
                }
                EditOp::ApplyText { path, content } => {
                    let full = paths::join(&self.base_path, path);
                    if let Some(node) = tree.nodes.get_mut(&full) {
                        node.content = content.clone();
                    }
                }
                EditOp::ChangeFileProp { path, name, value }
                | EditOp::ChangeDirProp { path, name, value } => {
                    let full = paths::join(&self.base_path, path);
                    if let Some(node) = tree.nodes.get_mut(&full) {
                        match value {
                            Some(value) => {
                                node.props.insert(name.clone(), value.clone());
                            }
                            None => {
                                node.props.remove(name);
                            }
                        }
                    }
                }
            }
        }

        let date = Utc::now();
        data.revisions.push(RevisionRecord {
            tree,
            props: self.revprops.clone(),
            date,
            author: Some(DEFAULT_AUTHOR.to_owned()),
        });
        data.commit_ops.insert(new_rev.number(), self.ops.clone());
        Ok(CommitInfo {
            revision: new_rev,
            date: Some(date),
            author: Some(DEFAULT_AUTHOR.to_owned()),
        })
    }
}

/// Copies the subtree at `src_url@src_rev` to `dst_path` in `tree`, starting
/// a new node line at `new_rev`.
fn copy_subtree(
    data: &ReposData,
    tree: &mut Tree,
    src_url: &str,
    src_rev: Revnum,
    dst_path: &str,
    new_rev: Revnum,
) -> ClientResult<()> {
    let src_path = if src_url == data.root_url {
        String::new()
    } else {
        paths::is_child(&data.root_url, src_url)
            .map(str::to_owned)
            .ok_or_else(|| {
                ClientError::new(
                    ErrorCode::RaIllegalUrl,
                    format!("Illegal copy-from URL '{src_url}'"),
                )
            })?
    };
    let index = src_rev.number() as usize;
    if index >= data.revisions.len() {
        return Err(ClientError::new(
            ErrorCode::FsNotFound,
            format!("No such revision {src_rev}"),
        ));
    }
    let src_tree = &data.revisions[index].tree;
    let mut copied = false;
    for key in src_tree.subtree_keys(&src_path) {
        let rebased = if key == src_path {
            dst_path.to_owned()
        } else {
            let rel = paths::is_child(&src_path, &key).expect("subtree key");
            paths::join(dst_path, rel)
        };
        let mut node = src_tree.nodes[&key].clone();
        node.created = new_rev;
        tree.nodes.insert(rebased, node);
        copied = true;
    }
    if !copied {
        return Err(ClientError::new(
            ErrorCode::FsNotFound,
            format!("Path '{src_path}' does not exist in revision {src_rev}"),
        ));
    }
    Ok(())
}

impl CommitEditor for TestEditor {
    fn open_root(&mut self, base_revision: Option<Revnum>) -> ClientResult<()> {
        if !self.ops.is_empty() {
            return Err(ClientError::new(
                ErrorCode::Base,
                "The edit root has already been opened",
            ));
        }
        self.ops.push(EditOp::OpenRoot(base_revision));
        self.open_depth = 1;
        Ok(())
    }

    fn delete_entry(&mut self, path: &str, revision: Option<Revnum>) -> ClientResult<()> {
        self.check_open()?;
        self.ops.push(EditOp::DeleteEntry {
            path: path.to_owned(),
            revision,
        });
        Ok(())
    }

    fn add_directory(&mut self, path: &str, copyfrom: Option<(&str, Revnum)>) -> ClientResult<()> {
        self.check_open()?;
        self.ops.push(EditOp::AddDir {
            path: path.to_owned(),
            copyfrom: copyfrom.map(|(url, rev)| (url.to_owned(), rev)),
        });
        self.open_depth += 1;
        Ok(())
    }

    fn open_directory(&mut self, path: &str) -> ClientResult<()> {
        self.check_open()?;
        self.ops.push(EditOp::OpenDir(path.to_owned()));
        self.open_depth += 1;
        Ok(())
    }

    fn close_directory(&mut self) -> ClientResult<()> {
        self.check_open()?;
        if self.open_depth == 0 {
            return Err(ClientError::new(
                ErrorCode::Base,
                "close_directory without an open directory",
            ));
        }
        self.ops.push(EditOp::CloseDir);
        self.open_depth -= 1;
        Ok(())
    }

    fn add_file(&mut self, path: &str, copyfrom: Option<(&str, Revnum)>) -> ClientResult<()> {
        self.check_open()?;
        self.ops.push(EditOp::AddFile {
            path: path.to_owned(),
            copyfrom: copyfrom.map(|(url, rev)| (url.to_owned(), rev)),
        });
        Ok(())
    }

    fn close_file(&mut self, path: &str) -> ClientResult<()> {
        self.check_open()?;
        self.ops.push(EditOp::CloseFile(path.to_owned()));
        Ok(())
    }

    fn apply_text(&mut self, path: &str, contents: &[u8]) -> ClientResult<()> {
        self.check_open()?;
        self.ops.push(EditOp::ApplyText {
            path: path.to_owned(),
            content: contents.to_vec(),
        });
        Ok(())
    }

    fn change_file_prop(
        &mut self,
        path: &str,
        name: &str,
        value: Option<&str>,
    ) -> ClientResult<()> {
        self.check_open()?;
        self.ops.push(EditOp::ChangeFileProp {
            path: path.to_owned(),
            name: name.to_owned(),
            value: value.map(str::to_owned),
        });
        Ok(())
    }

    fn change_dir_prop(
        &mut self,
        path: &str,
        name: &str,
        value: Option<&str>,
    ) -> ClientResult<()> {
        self.check_open()?;
        self.ops.push(EditOp::ChangeDirProp {
            path: path.to_owned(),
            name: name.to_owned(),
            value: value.map(str::to_owned),
        });
        Ok(())
    }

    fn close_edit(&mut self) -> ClientResult<CommitInfo> {
        self.check_open()?;
        if self.open_depth != 0 {
            return Err(ClientError::new(
                ErrorCode::Base,
                format!("close_edit with {} directories still open", self.open_depth),
            ));
        }
        self.finished = true;
        self.apply()
    }

    fn abort_edit(&mut self) -> ClientResult<()> {
        self.finished = true;
        Ok(())
    }
}
