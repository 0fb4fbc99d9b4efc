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

//! A working-copy fake over a real temporary directory.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fs;
use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use rsvn_lib::client::CancelFn;
use rsvn_lib::client::Checkout;
use rsvn_lib::client::Notification;
use rsvn_lib::client::NotifyAction;
use rsvn_lib::client::NotifyFn;
use rsvn_lib::commit::CommitItem;
use rsvn_lib::commit::CommitItemState;
use rsvn_lib::commit::HarvestRequest;
use rsvn_lib::delta::CallbackOutcome;
use rsvn_lib::delta::CommitEditor;
use rsvn_lib::delta::CommitInfo;
use rsvn_lib::delta::path_driver;
use rsvn_lib::error::ClientError;
use rsvn_lib::error::ClientResult;
use rsvn_lib::error::ErrorCode;
use rsvn_lib::mergeinfo::Mergeinfo;
use rsvn_lib::mergeinfo::PROP_MERGEINFO;
use rsvn_lib::paths;
use rsvn_lib::ra::NodeKind;
use rsvn_lib::revision::Revision;
use rsvn_lib::revision::Revnum;
use rsvn_lib::wc::AdmAccess;
use rsvn_lib::wc::Entry;
use rsvn_lib::wc::LockDepth;
use rsvn_lib::wc::Schedule;
use rsvn_lib::wc::Wc;
use tempfile::TempDir;

use crate::repos::TestRepos;

fn io_error(context: &str, err: std::io::Error) -> ClientError {
    ClientError::new(ErrorCode::Io, format!("{context}: {err}"))
}

fn key_of(path: &Path) -> String {
    paths::path_to_string(path).expect("test paths are UTF-8")
}

#[derive(Debug, Default)]
struct WcState {
    /// Absolute path (internal string form) to entry.
    entries: BTreeMap<String, Entry>,
    /// Recorded history-metadata properties.
    mergeinfo: BTreeMap<String, Mergeinfo>,
    /// Currently held directory locks.
    locks: Vec<String>,
    fail_unlock: Option<String>,
}

/// A fake working copy: real files in a temporary directory, entries in
/// memory.
#[derive(Clone, Debug)]
pub struct TestWc {
    root: PathBuf,
    _temp: Arc<TempDir>,
    state: Arc<Mutex<WcState>>,
}

impl TestWc {
    pub fn new() -> Self {
        let temp = crate::new_temp_dir();
        Self {
            root: temp.path().to_path_buf(),
            _temp: Arc::new(temp),
            state: Arc::new(Mutex::new(WcState::default())),
        }
    }

    fn lock(&self) -> MutexGuard<'_, WcState> {
        self.state.lock().unwrap()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a versioned directory on disk and in the entries.
    pub fn init_versioned_dir(
        &self,
        path: &Path,
        url: &str,
        revision: Revnum,
        uuid: Option<&str>,
    ) {
        fs::create_dir_all(path).unwrap();
        self.lock().entries.insert(
            key_of(path),
            Entry {
                url: Some(url.to_owned()),
                revision,
                kind: NodeKind::Dir,
                schedule: Schedule::Normal,
                uuid: uuid.map(str::to_owned),
                copyfrom_url: None,
                copyfrom_rev: None,
            },
        );
    }

    /// Creates a versioned file on disk and in the entries.
    pub fn init_versioned_file(
        &self,
        path: &Path,
        url: &str,
        revision: Revnum,
        uuid: Option<&str>,
        content: &[u8],
    ) {
        fs::write(path, content).unwrap();
        self.lock().entries.insert(
            key_of(path),
            Entry {
                url: Some(url.to_owned()),
                revision,
                kind: NodeKind::File,
                schedule: Schedule::Normal,
                uuid: uuid.map(str::to_owned),
                copyfrom_url: None,
                copyfrom_rev: None,
            },
        );
    }

    pub fn set_entry(&self, path: &Path, entry: Entry) {
        self.lock().entries.insert(key_of(path), entry);
    }

    pub fn entry_of(&self, path: &Path) -> Option<Entry> {
        self.lock().entries.get(&key_of(path)).cloned()
    }

    pub fn mergeinfo_of(&self, path: &Path) -> Option<Mergeinfo> {
        self.lock().mergeinfo.get(&key_of(path)).cloned()
    }

    /// Makes every subsequent lock release fail with `message`.
    pub fn set_fail_unlock(&self, message: &str) {
        self.lock().fail_unlock = Some(message.to_owned());
    }

    pub fn locked_paths(&self) -> Vec<String> {
        self.lock().locks.clone()
    }

    fn check_cancel(cancel: CancelFn<'_>) -> ClientResult<()> {
        match cancel {
            Some(cancel) => cancel(),
            None => Ok(()),
        }
    }

    fn notify(notify: NotifyFn<'_>, notification: Notification) {
        if let Some(notify) = notify {
            notify(&notification);
        }
    }
}

impl Default for TestWc {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug)]
struct TestAdmAccess {
    wc: TestWc,
    path: PathBuf,
    key: String,
    /// Retrieved from an enclosing lock set; carries no lock of its own.
    alias: bool,
    closed: Mutex<bool>,
}

impl TestAdmAccess {
    fn release(&self) -> ClientResult<()> {
        let mut closed = self.closed.lock().unwrap();
        if *closed || self.alias {
            *closed = true;
            return Ok(());
        }
        *closed = true;
        let mut state = self.wc.lock();
        if let Some(position) = state.locks.iter().position(|lock| *lock == self.key) {
            state.locks.remove(position);
        }
        if let Some(message) = state.fail_unlock.clone() {
            return Err(ClientError::new(ErrorCode::Io, message));
        }
        Ok(())
    }
}

impl AdmAccess for TestAdmAccess {
    fn path(&self) -> &Path {
        &self.path
    }

    fn retrieve(&self, path: &Path) -> ClientResult<Box<dyn AdmAccess>> {
        Ok(Box::new(TestAdmAccess {
            wc: self.wc.clone(),
            path: path.to_path_buf(),
            key: key_of(path),
            alias: true,
            closed: Mutex::new(false),
        }))
    }

    fn close(&self) -> ClientResult<()> {
        self.release()
    }
}

impl Drop for TestAdmAccess {
    fn drop(&mut self) {
        // Errors are reported through close(); a plain drop just releases.
        self.release().ok();
    }
}

fn copy_on_disk(src: &Path, dst: &Path) -> ClientResult<()> {
    let metadata =
        fs::symlink_metadata(src).map_err(|err| io_error("Can't stat copy source", err))?;
    if metadata.is_dir() {
        fs::create_dir_all(dst).map_err(|err| io_error("Can't create directory", err))?;
        for dir_entry in fs::read_dir(src).map_err(|err| io_error("Can't read directory", err))? {
            let dir_entry = dir_entry.map_err(|err| io_error("Can't read directory", err))?;
            copy_on_disk(&dir_entry.path(), &dst.join(dir_entry.file_name()))?;
        }
    } else {
        fs::copy(src, dst).map_err(|err| io_error("Can't copy file", err))?;
    }
    Ok(())
}

impl Wc for TestWc {
    fn check_path(&self, path: &Path) -> ClientResult<NodeKind> {
        use std::io::ErrorKind;
        match fs::symlink_metadata(path) {
            Ok(metadata) if metadata.is_dir() => Ok(NodeKind::Dir),
            Ok(_) => Ok(NodeKind::File),
            // A lookup below a file reports NotADirectory; for kind
            // probing both simply mean "nothing there".
            Err(err) if matches!(err.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                Ok(NodeKind::None)
            }
            Err(err) => Err(io_error("Can't check path", err)),
        }
    }

    fn adm_open(
        &self,
        path: &Path,
        _write_lock: bool,
        _depth: LockDepth,
        cancel: CancelFn<'_>,
    ) -> ClientResult<Box<dyn AdmAccess>> {
        Self::check_cancel(cancel)?;
        let key = key_of(path);
        self.lock().locks.push(key.clone());
        Ok(Box::new(TestAdmAccess {
            wc: self.clone(),
            path: path.to_path_buf(),
            key,
            alias: false,
            closed: Mutex::new(false),
        }))
    }

    fn adm_probe_open(
        &self,
        path: &Path,
        write_lock: bool,
        depth: LockDepth,
        cancel: CancelFn<'_>,
    ) -> ClientResult<Box<dyn AdmAccess>> {
        let target = if self.check_path(path)? == NodeKind::Dir {
            path.to_path_buf()
        } else {
            path.parent().map_or_else(|| path.to_path_buf(), Path::to_path_buf)
        };
        self.adm_open(&target, write_lock, depth, cancel)
    }

    fn copy(
        &self,
        src: &Path,
        dst_parent: &dyn AdmAccess,
        dst_basename: &str,
        cancel: CancelFn<'_>,
        notify: NotifyFn<'_>,
    ) -> ClientResult<()> {
        Self::check_cancel(cancel)?;
        let dst = dst_parent.path().join(dst_basename);
        copy_on_disk(src, &dst)?;

        let src_key = key_of(src);
        let dst_key = key_of(&dst);
        let mut state = self.lock();
        let src_entry = state.entries.get(&src_key).cloned().ok_or_else(|| {
            ClientError::new(
                ErrorCode::EntryNotFound,
                format!("'{}' is not under version control", src.display()),
            )
        })?;

        // Children of the copied tree come along as-is; the copy root is
        // scheduled for addition with history.
        let child_entries: Vec<(String, Entry)> = state
            .entries
            .iter()
            .filter(|(key, _)| **key == src_key || paths::is_child(&src_key, key).is_some())
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect();
        for (key, entry) in child_entries {
            let rebased = if key == src_key {
                dst_key.clone()
            } else {
                let rel = paths::is_child(&src_key, &key).expect("subtree key");
                paths::join(&dst_key, rel)
            };
            state.entries.insert(rebased, entry);
        }
        let dst_entry = state.entries.get_mut(&dst_key).expect("just inserted");
        dst_entry.schedule = Schedule::Add;
        dst_entry.copyfrom_url = src_entry.url.clone();
        dst_entry.copyfrom_rev = Some(src_entry.revision);
        drop(state);

        Self::notify(
            notify,
            Notification::new(key_of(&dst), NotifyAction::Copy).with_kind(src_entry.kind),
        );
        Ok(())
    }

    fn delete(
        &self,
        path: &Path,
        _adm: &dyn AdmAccess,
        cancel: CancelFn<'_>,
        notify: NotifyFn<'_>,
    ) -> ClientResult<()> {
        Self::check_cancel(cancel)?;
        let key = key_of(path);
        let mut state = self.lock();
        let keys: Vec<String> = state
            .entries
            .keys()
            .filter(|candidate| **candidate == key || paths::is_child(&key, candidate).is_some())
            .cloned()
            .collect();
        if keys.is_empty() {
            return Err(ClientError::new(
                ErrorCode::EntryNotFound,
                format!("'{}' is not under version control", path.display()),
            ));
        }
        let mut kind = NodeKind::None;
        for candidate in keys {
            let entry = state.entries.get_mut(&candidate).expect("listed key");
            if candidate == key {
                kind = entry.kind;
            }
            entry.schedule = Schedule::Delete;
        }
        drop(state);

        // Working files go away right at scheduling time; directories stay
        // around until the commit.
        if kind == NodeKind::File {
            fs::remove_file(path).map_err(|err| io_error("Can't remove file", err))?;
        }

        Self::notify(
            notify,
            Notification::new(key, NotifyAction::Delete).with_kind(kind),
        );
        Ok(())
    }

    fn add(
        &self,
        path: &Path,
        _adm: &dyn AdmAccess,
        copyfrom: Option<(&str, Revnum)>,
        cancel: CancelFn<'_>,
        notify: NotifyFn<'_>,
    ) -> ClientResult<()> {
        Self::check_cancel(cancel)?;
        let kind = self.check_path(path)?;
        if kind == NodeKind::None {
            return Err(ClientError::new(
                ErrorCode::NodeUnknownKind,
                format!("'{}' not found", path.display()),
            ));
        }
        let key = key_of(path);
        let mut state = self.lock();
        let entry = state.entries.entry(key.clone()).or_insert(Entry {
            url: None,
            revision: Revnum(0),
            kind,
            schedule: Schedule::Add,
            uuid: None,
            copyfrom_url: None,
            copyfrom_rev: None,
        });
        entry.schedule = Schedule::Add;
        entry.copyfrom_url = copyfrom.map(|(url, _)| url.to_owned());
        entry.copyfrom_rev = copyfrom.map(|(_, rev)| rev);
        drop(state);

        Self::notify(
            notify,
            Notification::new(key, NotifyAction::Add).with_kind(kind),
        );
        Ok(())
    }

    fn add_repos_file(
        &self,
        dst: &Path,
        _adm: &dyn AdmAccess,
        text_path: &Path,
        props: &HashMap<String, String>,
        copyfrom: Option<(&str, Revnum)>,
    ) -> ClientResult<()> {
        fs::copy(text_path, dst).map_err(|err| io_error("Can't install file", err))?;
        let key = key_of(dst);
        let mut state = self.lock();
        state.entries.insert(
            key.clone(),
            Entry {
                url: None,
                revision: copyfrom.map_or(Revnum(0), |(_, rev)| rev),
                kind: NodeKind::File,
                schedule: Schedule::Add,
                uuid: None,
                copyfrom_url: copyfrom.map(|(url, _)| url.to_owned()),
                copyfrom_rev: copyfrom.map(|(_, rev)| rev),
            },
        );
        if let Some(text) = props.get(PROP_MERGEINFO) {
            state.mergeinfo.insert(key, Mergeinfo::parse(text)?);
        }
        Ok(())
    }

    fn entry(
        &self,
        path: &Path,
        _adm: &dyn AdmAccess,
        _show_hidden: bool,
    ) -> ClientResult<Option<Entry>> {
        Ok(self.entry_of(path))
    }

    fn parse_mergeinfo(&self, path: &Path, _adm: &dyn AdmAccess) -> ClientResult<Mergeinfo> {
        Ok(self.mergeinfo_of(path).unwrap_or_default())
    }

    fn record_mergeinfo(
        &self,
        path: &Path,
        mergeinfo: &Mergeinfo,
        _adm: &dyn AdmAccess,
    ) -> ClientResult<()> {
        self.lock()
            .mergeinfo
            .insert(key_of(path), mergeinfo.clone());
        Ok(())
    }

    fn copy_committables(
        &self,
        requests: &[HarvestRequest],
        _adm: &dyn AdmAccess,
        cancel: CancelFn<'_>,
    ) -> ClientResult<Vec<CommitItem>> {
        let mut items = Vec::with_capacity(requests.len());
        for request in requests {
            Self::check_cancel(cancel)?;
            let path = paths::to_os_path(&request.src_path);
            let entry = self.entry_of(&path).ok_or_else(|| {
                ClientError::new(
                    ErrorCode::EntryNotFound,
                    format!("'{}' is not under version control", request.src_path),
                )
            })?;
            let url = entry.url.clone().ok_or_else(|| {
                ClientError::new(
                    ErrorCode::EntryMissingUrl,
                    format!(
                        "'{}' does not seem to have a URL associated with it",
                        request.src_path
                    ),
                )
            })?;
            let mut item = CommitItem::new(request.dst_url.clone(), CommitItemState::Add);
            item.kind = entry.kind;
            item.copyfrom = Some((url, entry.revision));
            item.path = Some(path);
            items.push(item);
        }
        Ok(items)
    }

    fn do_commit(
        &self,
        base_url: &str,
        items: &[CommitItem],
        _adm: &dyn AdmAccess,
        editor: &mut dyn CommitEditor,
        notify: NotifyFn<'_>,
        tempfiles: &mut Vec<PathBuf>,
    ) -> ClientResult<CommitInfo> {
        // Stage file texts the way the real commit machinery does: one
        // tempfile per file item, kept around until post-commit cleanup.
        let mut texts: HashMap<String, Vec<u8>> = HashMap::new();
        let mut drive_paths = Vec::with_capacity(items.len());
        let mut by_path: HashMap<String, &CommitItem> = HashMap::new();
        for item in items {
            let rel = paths::is_child(base_url, &item.url)
                .ok_or_else(|| {
                    ClientError::new(
                        ErrorCode::Base,
                        format!("Commit item '{}' is not below '{base_url}'", item.url),
                    )
                })?
                .to_owned();
            if item.kind == NodeKind::File
                && let Some(path) = &item.path
            {
                let content =
                    fs::read(path).map_err(|err| io_error("Can't read working file", err))?;
                let (mut file, temp_path) = tempfile::Builder::new()
                    .prefix(".rsvn-commit.")
                    .suffix(".tmp")
                    .tempfile_in(&self.root)
                    .map_err(|err| io_error("Can't create tempfile", err))?
                    .keep()
                    .map_err(|err| io_error("Can't keep tempfile", err.error))?;
                file.write_all(&content)
                    .map_err(|err| io_error("Can't write tempfile", err))?;
                tempfiles.push(temp_path);
                texts.insert(rel.clone(), content);
            }
            by_path.insert(rel.clone(), item);
            drive_paths.push(rel);
        }

        let result = path_driver(editor, None, &drive_paths, &mut |editor, path| {
            let item = by_path[path];
            let copyfrom = item
                .copyfrom
                .as_ref()
                .map(|(url, rev)| (url.as_str(), *rev));
            match item.state {
                CommitItemState::Add => {
                    if item.kind == NodeKind::File {
                        editor.add_file(path, copyfrom)?;
                        if let Some(content) = texts.get(path) {
                            editor.apply_text(path, content)?;
                        }
                        for (name, value) in &item.outgoing_prop_changes {
                            editor.change_file_prop(path, name, Some(value))?;
                        }
                        editor.close_file(path)?;
                        Self::notify(
                            notify,
                            Notification::new(item.url.clone(), NotifyAction::CommitAdded)
                                .with_kind(item.kind),
                        );
                        Ok(CallbackOutcome::Done)
                    } else {
                        editor.add_directory(path, copyfrom)?;
                        for (name, value) in &item.outgoing_prop_changes {
                            editor.change_dir_prop(path, name, Some(value))?;
                        }
                        Self::notify(
                            notify,
                            Notification::new(item.url.clone(), NotifyAction::CommitAdded)
                                .with_kind(item.kind),
                        );
                        Ok(CallbackOutcome::OpenedDirectory)
                    }
                }
                CommitItemState::Delete => {
                    editor.delete_entry(path, None)?;
                    Self::notify(
                        notify,
                        Notification::new(item.url.clone(), NotifyAction::CommitDeleted)
                            .with_kind(item.kind),
                    );
                    Ok(CallbackOutcome::Done)
                }
            }
        });

        match result.and_then(|()| editor.close_edit()) {
            Ok(info) => Ok(info),
            Err(err) => {
                editor.abort_edit().ok();
                Err(err)
            }
        }
    }
}

/// Recursive checkout against a [`TestRepos`], registering entries in a
/// [`TestWc`].
#[derive(Debug)]
pub struct TestCheckout {
    repos: TestRepos,
    wc: TestWc,
}

impl TestCheckout {
    pub fn new(repos: &TestRepos, wc: &TestWc) -> Self {
        Self {
            repos: repos.clone(),
            wc: wc.clone(),
        }
    }
}

impl Checkout for TestCheckout {
    fn checkout(
        &self,
        url: &str,
        dst: &Path,
        _peg: Revision,
        op: Revision,
        cancel: CancelFn<'_>,
        _notify: NotifyFn<'_>,
    ) -> ClientResult<Revnum> {
        TestWc::check_cancel(cancel)?;
        let rev = self.repos.resolve_revision(op)?;
        let root_url = self.repos.root_url();
        let rel = if url == root_url {
            String::new()
        } else {
            paths::is_child(&root_url, url)
                .map(str::to_owned)
                .ok_or_else(|| {
                    ClientError::new(
                        ErrorCode::RaIllegalUrl,
                        format!("Illegal repository URL '{url}'"),
                    )
                })?
        };
        if self.repos.node_kind(&rel, rev) != NodeKind::Dir {
            return Err(ClientError::new(
                ErrorCode::FsNotFound,
                format!("URL '{url}' doesn't exist"),
            ));
        }

        let uuid = self.repos.uuid();
        self.wc
            .init_versioned_dir(dst, url, rev, uuid.as_deref());
        for child in self.repos.subtree_of(&rel, rev) {
            let child_rel = paths::is_child(&rel, &child).expect("subtree child");
            let child_url = paths::join(url, child_rel);
            let child_dst = dst.join(paths::to_os_path(child_rel));
            match self.repos.node_kind(&child, rev) {
                NodeKind::Dir => {
                    self.wc
                        .init_versioned_dir(&child_dst, &child_url, rev, uuid.as_deref());
                }
                NodeKind::File => {
                    let content = self.repos.file_content(&child, rev).unwrap_or_default();
                    self.wc.init_versioned_file(
                        &child_dst,
                        &child_url,
                        rev,
                        uuid.as_deref(),
                        &content,
                    );
                }
                NodeKind::None => {}
            }
        }
        Ok(rev)
    }
}
