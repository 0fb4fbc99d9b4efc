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

//! Copy and move dispatch.
//!
//! One user-facing operation covers every combination of working-copy and
//! repository endpoints. The pair builder normalizes the heterogeneous
//! source list into [`CopyPair`]s and selects one of four transport arms:
//!
//! * working copy -> working copy: schedule copies (and deletes, for moves)
//!   under working-copy administrative locks;
//! * working copy -> repository: harvest commit items, annotate them with
//!   combined history metadata, and drive a commit;
//! * repository -> working copy: check out or fetch, then schedule additions
//!   with history;
//! * repository -> repository: drive a path-based commit editor directly.
//!
//! Only the first and third arms leave [`CommitInfo`] unset; the commit
//! arms populate it even when later cleanup phases fail.

use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use either::Either;
use indexmap::IndexMap;
use itertools::Itertools as _;
use tracing::instrument;

use crate::client::ClientContext;
use crate::client::Notification;
use crate::client::NotifyAction;
use crate::commit;
use crate::commit::CommitItem;
use crate::commit::CommitItemState;
use crate::commit::HarvestRequest;
use crate::delta::CallbackOutcome;
use crate::delta::CommitInfo;
use crate::delta::path_driver;
use crate::error::ClientError;
use crate::error::ClientResult;
use crate::error::ErrorCode;
use crate::mergeinfo::Mergeinfo;
use crate::mergeinfo::PROP_MERGEINFO;
use crate::mergeinfo::RevRange;
use crate::paths;
use crate::ra;
use crate::ra::NodeKind;
use crate::ra::RaSession;
use crate::revision::Revision;
use crate::revision::Revnum;
use crate::revision::resolve_revisions;
use crate::wc;
use crate::wc::AdmAccess;
use crate::wc::LockDepth;
use crate::wc::Schedule;

/// One user-supplied copy or move source.
///
/// Sources are either repository URLs or working-copy paths; the two sides
/// never mix within one request.
#[derive(Clone, Debug)]
pub enum CopySource {
    /// A repository URL with its peg and operative revisions.
    Url {
        url: String,
        peg: Revision,
        op: Revision,
    },
    /// A working-copy path with its peg and operative revisions.
    Local {
        path: String,
        peg: Revision,
        op: Revision,
    },
}

impl CopySource {
    /// Classifies `target` as URL or local path and attaches revisions.
    pub fn new(target: impl Into<String>, peg: Revision, op: Revision) -> Self {
        let target = target.into();
        if paths::is_url(&target) {
            Self::Url {
                url: target,
                peg,
                op,
            }
        } else {
            Self::Local {
                path: target,
                peg,
                op,
            }
        }
    }

    /// A source with both revisions unspecified.
    pub fn from_target(target: impl Into<String>) -> Self {
        Self::new(target, Revision::Unspecified, Revision::Unspecified)
    }

    pub fn target(&self) -> &str {
        match self {
            Self::Url { url, .. } => url,
            Self::Local { path, .. } => path,
        }
    }

    pub fn is_url(&self) -> bool {
        matches!(self, Self::Url { .. })
    }

    pub fn peg(&self) -> Revision {
        match self {
            Self::Url { peg, .. } | Self::Local { peg, .. } => *peg,
        }
    }

    pub fn op(&self) -> Revision {
        match self {
            Self::Url { op, .. } | Self::Local { op, .. } => *op,
        }
    }
}

/// One normalized source/destination pair.
///
/// Built by the pair builder, filled in by the chosen arm, read-only after.
#[derive(Clone, Debug)]
struct CopyPair {
    /// The source; rewritten by peg-revision resolution and URL promotion.
    src: String,
    /// The source as given, before peg-revision resolution.
    src_original: String,
    /// Absolute form of `src`, for local sources.
    src_abs: String,
    src_peg_revision: Revision,
    src_op_revision: Revision,
    /// Concrete source revision; unset until the arm resolves it.
    src_revnum: Option<Revnum>,
    src_kind: NodeKind,
    /// `src` relative to the session root (or repository root in the
    /// working-copy -> repository arm).
    src_rel: String,
    dst: String,
    dst_parent: String,
    base_name: String,
    /// `dst` relative to the session root.
    dst_rel: String,
}

impl CopyPair {
    fn new(source: &CopySource, dst: String) -> Self {
        let (peg, op) = resolve_revisions(source.peg(), source.op(), source.is_url());
        Self {
            src: source.target().to_owned(),
            src_original: source.target().to_owned(),
            src_abs: String::new(),
            src_peg_revision: peg,
            src_op_revision: op,
            src_revnum: None,
            src_kind: NodeKind::None,
            src_rel: String::new(),
            dst,
            dst_parent: String::new(),
            base_name: String::new(),
            dst_rel: String::new(),
        }
    }
}

/// Longest common ancestors over a pair list.
struct Ancestors {
    /// Common ancestor of all sources.
    src: String,
    /// Common ancestor of all destinations. The destinations all share one
    /// directory by construction, so for multiple pairs this is the first
    /// destination's parent; for a single pair it is the destination itself.
    dst: String,
    /// Common ancestor of `src` and `dst`.
    common: String,
}

fn get_copy_pair_ancestors(pairs: &[CopyPair]) -> Ancestors {
    let src = pairs[1..].iter().fold(pairs[0].src.clone(), |acc, pair| {
        paths::longest_common_ancestor(&acc, &pair.src).to_owned()
    });
    let dst = if pairs.len() == 1 {
        pairs[0].dst.clone()
    } else {
        paths::dirname(&pairs[0].dst).to_owned()
    };
    let common = paths::longest_common_ancestor(&src, &dst).to_owned();
    Ancestors { src, dst, common }
}

/// `url` as a repository-root-relative path in catalog form (leading `/`,
/// URI-decoded).
fn path_relative_to_root(url: &str, repos_root: &str) -> ClientResult<String> {
    if url == repos_root {
        return Ok("/".to_owned());
    }
    match paths::is_child(repos_root, url) {
        Some(rel) => Ok(format!("/{}", paths::uri_decode(rel))),
        None => Err(ClientError::new(
            ErrorCode::RaIllegalUrl,
            format!("URL '{url}' is not a child of repository root URL '{repos_root}'"),
        )),
    }
}

/// Computes the full history metadata a copy destination inherits from its
/// source: the implied history (every revision the node has existed since it
/// last appeared) merged with the source's explicit history property.
///
/// `src_root_path` is the catalog key (repository-root-relative);
/// `src_rel` addresses the same node relative to `session`.
fn calculate_target_mergeinfo(
    session: &dyn RaSession,
    src_root_path: &str,
    src_rel: &str,
    src_revnum: Revnum,
) -> ClientResult<Mergeinfo> {
    let mut mergeinfo = Mergeinfo::new();
    if let Some(oldest) = session.oldest_rev_at_path(src_rel, src_revnum)? {
        mergeinfo.record(src_root_path, RevRange::new(oldest, src_revnum));
    }
    if let Some(explicit) = session.get_mergeinfo(src_rel, src_revnum)? {
        mergeinfo.merge(&explicit);
    }
    Ok(mergeinfo)
}

/// Extends the history metadata recorded on the working-copy node at
/// `target` with `mergeinfo`.
fn extend_wc_mergeinfo(
    target: &Path,
    mergeinfo: &Mergeinfo,
    adm: &dyn AdmAccess,
    ctx: &ClientContext<'_>,
) -> ClientResult<()> {
    let mut wc_mergeinfo = ctx.wc.parse_mergeinfo(target, adm)?;
    wc_mergeinfo.merge(mergeinfo);
    ctx.wc.record_mergeinfo(target, &wc_mergeinfo, adm)
}

/// Copies each pair's source to its destination under one shared lock on the
/// common destination directory.
fn do_wc_to_wc_copies(pairs: &[CopyPair], ctx: &ClientContext<'_>) -> ClientResult<()> {
    let mut dst_parent = get_copy_pair_ancestors(pairs).dst;
    if pairs.len() == 1 {
        dst_parent = paths::dirname(&dst_parent).to_owned();
    }

    // All copies land in the same directory, so one lock serves them all.
    let adm = ctx
        .wc
        .adm_open(&paths::to_os_path(&dst_parent), true, LockDepth::Empty, ctx.cancel)?;

    let mut result = Ok(());
    for pair in pairs {
        result = ctx.check_cancelled().and_then(|()| {
            ctx.wc.copy(
                &paths::to_os_path(&pair.src),
                adm.as_ref(),
                &pair.base_name,
                ctx.cancel,
                ctx.notify,
            )
        });
        if result.is_err() {
            break;
        }
    }

    wc::sleep_for_timestamps();
    match result {
        Ok(()) => adm.close(),
        Err(err) => {
            if let Err(unlock_err) = adm.close() {
                tracing::warn!(%unlock_err, "could not release the destination lock");
            }
            Err(err)
        }
    }
}

/// Moves one pair: copy into the destination directory, then delete the
/// source, under the source-parent lock (and a destination lock when the
/// parents differ).
fn do_wc_to_wc_move(pair: &CopyPair, ctx: &ClientContext<'_>) -> ClientResult<()> {
    let src_parent = paths::dirname(&pair.src).to_owned();
    let depth = if pair.src_kind == NodeKind::Dir {
        LockDepth::Infinity
    } else {
        LockDepth::Empty
    };
    let src_access =
        ctx.wc
            .adm_open(&paths::to_os_path(&src_parent), true, depth, ctx.cancel)?;

    let result = (|| {
        // Avoid opening the same directory twice when source and
        // destination overlap.
        let dst_access: Either<&dyn AdmAccess, Box<dyn AdmAccess>> = if src_parent
            == pair.dst_parent
        {
            Either::Left(src_access.as_ref())
        } else {
            let src_parent_abs = paths::get_absolute(&src_parent)?;
            let dst_parent_abs = paths::get_absolute(&pair.dst_parent)?;
            if pair.src_kind == NodeKind::Dir
                && paths::is_child(&src_parent_abs, &dst_parent_abs).is_some()
            {
                Either::Right(src_access.retrieve(&paths::to_os_path(&pair.dst_parent))?)
            } else {
                Either::Right(ctx.wc.adm_open(
                    &paths::to_os_path(&pair.dst_parent),
                    true,
                    LockDepth::Empty,
                    ctx.cancel,
                )?)
            }
        };
        let dst_ref: &dyn AdmAccess = match &dst_access {
            Either::Left(access) => *access,
            Either::Right(access) => access.as_ref(),
        };

        ctx.wc.copy(
            &paths::to_os_path(&pair.src),
            dst_ref,
            &pair.base_name,
            ctx.cancel,
            ctx.notify,
        )?;
        ctx.wc.delete(
            &paths::to_os_path(&pair.src),
            src_access.as_ref(),
            ctx.cancel,
            ctx.notify,
        )?;

        if let Either::Right(access) = dst_access {
            access.close()?;
        }
        Ok(())
    })();

    let close_result = src_access.close();
    result.and(close_result)
}

fn do_wc_to_wc_moves(pairs: &[CopyPair], ctx: &ClientContext<'_>) -> ClientResult<()> {
    let mut result = Ok(());
    for pair in pairs {
        result = ctx
            .check_cancelled()
            .and_then(|()| do_wc_to_wc_move(pair, ctx));
        if result.is_err() {
            break;
        }
    }
    wc::sleep_for_timestamps();
    result
}

#[instrument(skip_all)]
fn wc_to_wc_copy(
    pairs: &mut [CopyPair],
    is_move: bool,
    ctx: &ClientContext<'_>,
) -> ClientResult<()> {
    // Check that all the sources exist and none of the destinations do.
    for pair in pairs.iter_mut() {
        pair.src_kind = ctx.wc.check_path(&paths::to_os_path(&pair.src))?;
        if pair.src_kind == NodeKind::None {
            return Err(ClientError::new(
                ErrorCode::NodeUnknownKind,
                format!("Path '{}' does not exist", paths::local_style(&pair.src)),
            ));
        }

        let dst_kind = ctx.wc.check_path(&paths::to_os_path(&pair.dst))?;
        if dst_kind != NodeKind::None {
            return Err(ClientError::new(
                ErrorCode::EntryExists,
                format!("Path '{}' already exists", paths::local_style(&pair.dst)),
            ));
        }

        let (dst_parent, base_name) = paths::split(&pair.dst);
        pair.dst_parent = dst_parent.to_owned();
        pair.base_name = base_name.to_owned();

        let dst_parent_kind = ctx.wc.check_path(&paths::to_os_path(&pair.dst_parent))?;
        if dst_parent_kind != NodeKind::Dir {
            return Err(ClientError::new(
                ErrorCode::WcNotDirectory,
                format!(
                    "Path '{}' is not a directory",
                    paths::local_style(&pair.dst_parent)
                ),
            ));
        }
    }

    if is_move {
        do_wc_to_wc_moves(pairs, ctx)
    } else {
        do_wc_to_wc_copies(pairs, ctx)
    }
}

/// Per-pair state for the repository -> repository editor drive.
#[derive(Debug)]
struct PathInfo {
    src_url: String,
    /// Source path relative to the session root.
    src_path: String,
    /// Destination path relative to the session root.
    dst_path: String,
    src_kind: NodeKind,
    src_revnum: Revnum,
    /// Source equals destination, or destination encloses source: restore a
    /// deleted path instead of delete-and-add.
    resurrection: bool,
    /// Serialized history metadata to attach to the destination.
    mergeinfo: Option<String>,
}

/// What the editor drive does at one path.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Action {
    Add,
    Delete,
    Noop,
}

fn plan_action(resurrection: bool, is_move: bool, is_source_path: bool) -> Action {
    if resurrection {
        // Source and destination are the same path; the driver addresses it
        // once. Moving a path onto itself needs no edit at all.
        if is_move { Action::Noop } else { Action::Add }
    } else if is_move && is_source_path {
        Action::Delete
    } else {
        Action::Add
    }
}

#[instrument(skip_all)]
fn repos_to_repos_copy(
    pairs: &mut [CopyPair],
    is_move: bool,
    ctx: &ClientContext<'_>,
    commit_info: &mut Option<CommitInfo>,
) -> ClientResult<()> {
    // The session must sit at the longest path common to all sources and
    // destinations so every path is addressable, including move sources.
    let mut top_url = get_copy_pair_ancestors(pairs).common;
    let mut resurrections = vec![false; pairs.len()];

    // Resurrection, first form: copying a deleted path back onto itself. If
    // that path is also the common ancestor, the session must sit at least
    // one directory above it.
    for (pair, resurrection) in pairs.iter().zip_eq(&mut resurrections) {
        if pair.src == pair.dst {
            *resurrection = true;
            if pair.src == top_url {
                top_url = paths::dirname(&top_url).to_owned();
                tracing::debug!(%top_url, "resurrection source equals the session root; moving up");
            }
        }
    }

    let mut session = match ctx.ra.open(&top_url) {
        Ok(session) => session,
        Err(err) if err.code() == ErrorCode::RaIllegalUrl && top_url.is_empty() => {
            // No shared prefix at all: different repositories. Comparing
            // UUIDs would be authoritative, but two URLs for one repository
            // share a prefix in practice, so the textual check suffices
            // without extra round trips.
            let first = &pairs[0];
            return Err(ClientError::new(
                ErrorCode::UnsupportedFeature,
                format!(
                    "Source and dest appear not to be in the same repository (src: '{}'; dst: '{}')",
                    first.src, first.dst
                ),
            ));
        }
        Err(err) => return Err(err),
    };

    let repos_root = session.get_repos_root()?;

    // Resurrection, second form: the destination is a proper ancestor of
    // the source (restoring a parent from below). The session again has to
    // move up one directory to address both.
    for (pair, resurrection) in pairs.iter().zip_eq(&mut resurrections) {
        if pair.dst != repos_root && paths::is_child(&pair.dst, &pair.src).is_some() {
            *resurrection = true;
            top_url = paths::dirname(&top_url).to_owned();
            session.reparent(&top_url)?;
        }
    }

    // Destinations must be absent as of the youngest revision.
    let youngest = session.get_latest_revnum()?;

    let mut infos: Vec<PathInfo> = Vec::with_capacity(pairs.len());
    for (pair, resurrection) in pairs.iter_mut().zip_eq(&resurrections) {
        ctx.check_cancelled()?;

        let src_revnum = ra::resolve_revnum(session.as_ref(), pair.src_op_revision)?;
        pair.src_revnum = Some(src_revnum);

        // Trace the object back from its peg to the operative revision.
        let (located, _) =
            session.locations(&pair.src, pair.src_peg_revision, pair.src_op_revision)?;
        pair.src = located;

        pair.src_rel = paths::is_child(&top_url, &pair.src)
            .map(paths::uri_decode)
            .unwrap_or_default();
        pair.dst_rel = paths::is_child(&top_url, &pair.dst)
            .map(paths::uri_decode)
            .unwrap_or_default();

        if paths::is_empty(&pair.src_rel) && is_move {
            return Err(ClientError::new(
                ErrorCode::UnsupportedFeature,
                format!("Cannot move URL '{}' into itself", pair.src),
            ));
        }

        let src_kind = session.check_path(&pair.src_rel, Some(src_revnum))?;
        if src_kind == NodeKind::None {
            return Err(ClientError::new(
                ErrorCode::FsNotFound,
                format!(
                    "Path '{}' does not exist in revision {src_revnum}",
                    pair.src
                ),
            ));
        }

        let dst_kind = session.check_path(&pair.dst_rel, Some(youngest))?;
        if dst_kind != NodeKind::None {
            return Err(ClientError::new(
                ErrorCode::FsAlreadyExists,
                format!("Path '{}' already exists", pair.dst_rel),
            ));
        }

        infos.push(PathInfo {
            src_url: pair.src.clone(),
            src_path: pair.src_rel.clone(),
            dst_path: pair.dst_rel.clone(),
            src_kind,
            src_revnum,
            resurrection: *resurrection,
            mergeinfo: None,
        });
    }

    let message = match ctx.log_msg {
        Some(log_msg) => {
            let mut items: Vec<CommitItem> = Vec::with_capacity(2 * infos.len());
            for info in &infos {
                let mut item =
                    CommitItem::new(paths::join(&top_url, &info.dst_path), CommitItemState::Add);
                item.kind = info.src_kind;
                items.push(item);
                if is_move && !info.resurrection {
                    let mut item = CommitItem::new(
                        paths::join(&top_url, &info.src_path),
                        CommitItemState::Delete,
                    );
                    item.kind = info.src_kind;
                    items.push(item);
                }
            }
            match log_msg(&items)? {
                Some(message) => message,
                None => {
                    tracing::debug!("log message callback declined; aborting quietly");
                    return Ok(());
                }
            }
        }
        None => String::new(),
    };

    // Paths for the editor drive, and which pair each addressed path
    // belongs to.
    let mut drive_paths: Vec<String> = Vec::with_capacity(2 * infos.len());
    let mut actions: IndexMap<String, usize> = IndexMap::new();
    for (index, info) in infos.iter_mut().enumerate() {
        let src_root_path = path_relative_to_root(&info.src_url, &repos_root)?;
        let mergeinfo = calculate_target_mergeinfo(
            session.as_ref(),
            &src_root_path,
            &info.src_path,
            info.src_revnum,
        )?;
        info.mergeinfo = Some(mergeinfo.to_string());

        drive_paths.push(info.dst_path.clone());
        actions.insert(info.dst_path.clone(), index);
        if is_move && !info.resurrection {
            drive_paths.push(info.src_path.clone());
            actions.insert(info.src_path.clone(), index);
        }
    }

    let revprop_table = ctx.revprop_table(&message)?;
    let mut editor = session.get_commit_editor(revprop_table)?;

    let drive_result = path_driver(
        editor.as_mut(),
        Some(youngest),
        &drive_paths,
        &mut |editor, path| {
            let info = actions
                .get(path)
                .map(|&index| &infos[index])
                .ok_or_else(|| {
                    ClientError::new(
                        ErrorCode::Base,
                        format!("No commit action recorded for path '{path}'"),
                    )
                })?;
            match plan_action(info.resurrection, is_move, path == info.src_path) {
                Action::Noop => Ok(CallbackOutcome::Done),
                Action::Delete => {
                    editor.delete_entry(path, None)?;
                    Ok(CallbackOutcome::Done)
                }
                Action::Add => {
                    paths::check_valid(path)?;
                    let copyfrom = Some((info.src_url.as_str(), info.src_revnum));
                    if info.src_kind == NodeKind::File {
                        editor.add_file(path, copyfrom)?;
                        if let Some(mergeinfo) = &info.mergeinfo {
                            editor.change_file_prop(path, PROP_MERGEINFO, Some(mergeinfo))?;
                        }
                        editor.close_file(path)?;
                        Ok(CallbackOutcome::Done)
                    } else {
                        editor.add_directory(path, copyfrom)?;
                        if let Some(mergeinfo) = &info.mergeinfo {
                            editor.change_dir_prop(path, PROP_MERGEINFO, Some(mergeinfo))?;
                        }
                        Ok(CallbackOutcome::OpenedDirectory)
                    }
                }
            }
        },
    );

    if let Err(err) = drive_result {
        // At least try to abort the transaction before surfacing the error.
        if let Err(abort_err) = editor.abort_edit() {
            tracing::warn!(%abort_err, "could not abort the edit");
        }
        return Err(err);
    }

    *commit_info = Some(editor.close_edit()?);
    Ok(())
}

/// Removes the tempfiles the commit harvest left behind. Paths that are no
/// longer files are skipped.
fn remove_tmpfiles(
    tempfiles: &[PathBuf],
    ctx: &ClientContext<'_>,
) -> ClientResult<()> {
    for path in tempfiles {
        ctx.check_cancelled()?;
        match std::fs::symlink_metadata(path) {
            Ok(metadata) if metadata.is_file() => {
                std::fs::remove_file(path).map_err(|err| {
                    ClientError::new(
                        ErrorCode::Io,
                        format!("Can't remove file '{}': {err}", path.display()),
                    )
                })?;
            }
            _ => {}
        }
    }
    Ok(())
}

/// Folds the three phase errors of the working-copy -> repository arm into
/// one chain, headed by the commit error when there is one.
fn reconcile_errors(
    commit_err: Option<ClientError>,
    unlock_err: Option<ClientError>,
    cleanup_err: Option<ClientError>,
) -> Option<ClientError> {
    if commit_err.is_none() && unlock_err.is_none() && cleanup_err.is_none() {
        return None;
    }
    let mut err = match commit_err {
        Some(commit_err) => commit_err.wrap("Commit failed (details follow):"),
        None => ClientError::new(ErrorCode::Base, "Commit succeeded, but other errors follow:"),
    };
    if let Some(unlock_err) = unlock_err {
        err.compose(unlock_err.wrap("Error unlocking locked dirs (details follow):"));
    }
    if let Some(cleanup_err) = cleanup_err {
        err.compose(cleanup_err.wrap("Error in post-commit clean-up (details follow):"));
    }
    Some(err)
}

#[instrument(skip_all)]
fn wc_to_repos_copy(
    pairs: &mut [CopyPair],
    ctx: &ClientContext<'_>,
    commit_info: &mut Option<CommitInfo>,
) -> ClientResult<()> {
    // The commit machinery works on absolute paths throughout.
    for pair in pairs.iter_mut() {
        pair.src_abs = paths::get_absolute(&pair.src)?;
    }

    let top_src_path = get_copy_pair_ancestors(pairs).src;
    let adm = ctx.wc.adm_probe_open(
        &paths::to_os_path(&top_src_path),
        false,
        LockDepth::Infinity,
        ctx.cancel,
    )?;

    let mut top_dst_url = paths::dirname(&pairs[0].dst).to_owned();
    for pair in &pairs[1..] {
        top_dst_url = paths::longest_common_ancestor(&top_dst_url, &pair.dst).to_owned();
    }

    // Pre-flight and the log message: failures here surface directly, after
    // releasing the lock.
    let prepared = (|| -> ClientResult<Option<(Box<dyn RaSession>, HashMap<String, String>)>> {
        let mut session = ctx.ra.open(&top_dst_url)?;
        let repos_root = session.get_repos_root()?;

        for pair in pairs.iter_mut() {
            ctx.check_cancelled()?;

            let entry = ctx
                .wc
                .entry(&paths::to_os_path(&pair.src), adm.as_ref(), false)?
                .ok_or_else(|| {
                    ClientError::new(
                        ErrorCode::EntryNotFound,
                        format!(
                            "'{}' is not under version control",
                            paths::local_style(&pair.src)
                        ),
                    )
                })?;
            let url = entry.url.clone().ok_or_else(|| {
                ClientError::new(
                    ErrorCode::EntryMissingUrl,
                    format!(
                        "'{}' does not seem to have a URL associated with it",
                        paths::local_style(&pair.src)
                    ),
                )
            })?;
            pair.src_rel = path_relative_to_root(&url, &repos_root)?;
            pair.src_revnum = Some(entry.revision);

            pair.dst_rel = paths::is_child(&top_dst_url, &pair.dst)
                .unwrap_or("")
                .to_owned();
            let dst_kind = session.check_path(&paths::uri_decode(&pair.dst_rel), None)?;
            if dst_kind != NodeKind::None {
                return Err(ClientError::new(
                    ErrorCode::FsAlreadyExists,
                    format!("Path '{}' already exists", pair.dst),
                ));
            }
        }

        let message = match ctx.log_msg {
            Some(log_msg) => {
                let items: Vec<CommitItem> = pairs
                    .iter()
                    .map(|pair| CommitItem::new(pair.dst.clone(), CommitItemState::Add))
                    .collect();
                match log_msg(&items)? {
                    Some(message) => message,
                    None => {
                        tracing::debug!("log message callback declined; aborting quietly");
                        return Ok(None);
                    }
                }
            }
            None => String::new(),
        };
        let revprop_table = ctx.revprop_table(&message)?;

        // History queries below address repository-root-relative paths.
        session.reparent(&repos_root)?;
        Ok(Some((session, revprop_table)))
    })();

    let (session, revprop_table) = match prepared {
        Ok(Some(prepared)) => prepared,
        Ok(None) => {
            // Silent abort from the log-message callback.
            wc::sleep_for_timestamps();
            return adm.close();
        }
        Err(err) => {
            wc::sleep_for_timestamps();
            if let Err(unlock_err) = adm.close() {
                tracing::warn!(%unlock_err, "could not release the source lock");
            }
            return Err(err);
        }
    };

    // From here on, failures must not short-circuit the cleanup phases.
    let mut tempfiles: Vec<PathBuf> = Vec::new();
    let commit_result = (|| -> ClientResult<Option<CommitInfo>> {
        let base_kind = ctx.wc.check_path(&paths::to_os_path(&top_src_path))?;
        let retrieved_access;
        let dir_access: &dyn AdmAccess = if base_kind == NodeKind::Dir {
            retrieved_access = adm.retrieve(&paths::to_os_path(&top_src_path))?;
            retrieved_access.as_ref()
        } else {
            adm.as_ref()
        };

        let requests: Vec<HarvestRequest> = pairs
            .iter()
            .map(|pair| HarvestRequest {
                src_path: pair.src_abs.clone(),
                dst_url: pair.dst.clone(),
            })
            .collect();
        let mut commit_items = ctx.wc.copy_committables(&requests, dir_access, ctx.cancel)?;
        if commit_items.is_empty() {
            return Ok(None);
        }

        // Attach the combined history metadata to every item: repository
        // implied and explicit history plus whatever the working copy has
        // recorded locally.
        for (pair, item) in pairs.iter().zip_eq(&mut commit_items) {
            ctx.check_cancelled()?;
            let src_revnum = pair.src_revnum.expect("resolved during pre-flight");
            let src_session_rel = pair.src_rel.trim_start_matches('/').to_owned();
            let mut mergeinfo = calculate_target_mergeinfo(
                session.as_ref(),
                &pair.src_rel,
                &src_session_rel,
                src_revnum,
            )?;
            let wc_mergeinfo = ctx
                .wc
                .parse_mergeinfo(&paths::to_os_path(&pair.src), adm.as_ref())?;
            mergeinfo.merge(&wc_mergeinfo);
            item.outgoing_prop_changes
                .push((PROP_MERGEINFO.to_owned(), mergeinfo.to_string()));
        }

        let base_url = commit::condense_commit_items(&mut commit_items)?;
        let commit_session = ctx.ra.open(&base_url)?;
        let mut editor = commit_session.get_commit_editor(revprop_table)?;
        let info = ctx.wc.do_commit(
            &base_url,
            &commit_items,
            adm.as_ref(),
            editor.as_mut(),
            ctx.notify,
            &mut tempfiles,
        )?;
        Ok(Some(info))
    })();

    wc::sleep_for_timestamps();

    let commit_err = match commit_result {
        Ok(info) => {
            *commit_info = info;
            None
        }
        Err(err) => Some(err),
    };
    // Only a read lock, so unlocking is harmless even after a failed commit.
    let unlock_err = adm.close().err();
    let cleanup_err = remove_tmpfiles(&tempfiles, ctx).err();

    match reconcile_errors(commit_err, unlock_err, cleanup_err) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// One pair of the repository -> working copy arm.
fn repos_to_wc_copy_single(
    pair: &CopyPair,
    same_repositories: bool,
    session: &dyn RaSession,
    adm: &dyn AdmAccess,
    ctx: &ClientContext<'_>,
) -> ClientResult<()> {
    match pair.src_kind {
        NodeKind::Dir => {
            ctx.checkout.checkout(
                &pair.src_original,
                &paths::to_os_path(&pair.dst),
                pair.src_peg_revision,
                pair.src_op_revision,
                ctx.cancel,
                ctx.notify,
            )?;

            if !same_repositories {
                return Err(ClientError::new(
                    ErrorCode::UnsupportedFeature,
                    format!(
                        "Source URL '{}' is from foreign repository; leaving it as a disjoint WC",
                        pair.src
                    ),
                ));
            }

            let dst = paths::to_os_path(&pair.dst);
            let dst_access =
                ctx.wc
                    .adm_open(&dst, true, LockDepth::Infinity, ctx.cancel)?;
            let result = (|| {
                let dst_entry = ctx
                    .wc
                    .entry(&dst, dst_access.as_ref(), false)?
                    .ok_or_else(|| {
                        ClientError::new(
                            ErrorCode::EntryNotFound,
                            format!(
                                "'{}' is not under version control",
                                paths::local_style(&pair.dst)
                            ),
                        )
                    })?;

                // A checkout at head leaves the concrete revision in the
                // entry; the later commit needs that number as its
                // copy-from, not a floating head.
                let src_revnum = if pair.src_op_revision == Revision::Head {
                    dst_entry.revision
                } else {
                    pair.src_revnum.expect("resolved during pre-flight")
                };

                // Schedule the checked-out tree for addition with history.
                ctx.wc.add(
                    &dst,
                    adm,
                    Some((&pair.src, src_revnum)),
                    ctx.cancel,
                    ctx.notify,
                )?;

                let repos_root = session.get_repos_root()?;
                let src_root_path = path_relative_to_root(&pair.src, &repos_root)?;
                let mergeinfo = calculate_target_mergeinfo(
                    session,
                    &src_root_path,
                    &pair.src_rel,
                    src_revnum,
                )?;
                extend_wc_mergeinfo(&dst, &mergeinfo, dst_access.as_ref(), ctx)
            })();
            let close_result = dst_access.close();
            result.and(close_result)
        }
        NodeKind::File => {
            let prefix = format!("{}.", pair.base_name);
            let mut tmp = tempfile::Builder::new()
                .prefix(&prefix)
                .suffix(".tmp")
                .tempfile_in(paths::to_os_path(&pair.dst_parent))
                .map_err(|err| {
                    ClientError::new(
                        ErrorCode::Io,
                        format!(
                            "Can't create a temporary file in '{}': {err}",
                            paths::local_style(&pair.dst_parent)
                        ),
                    )
                })?;
            let (fetched_rev, props) =
                session.get_file(&pair.src_rel, pair.src_revnum, tmp.as_file_mut())?;

            // When the operative revision floated, the fetch pinned it.
            let src_revnum = pair.src_revnum.unwrap_or(fetched_rev);

            let dst = paths::to_os_path(&pair.dst);
            let copyfrom = same_repositories.then(|| (pair.src.as_str(), src_revnum));
            ctx.wc.add_repos_file(&dst, adm, tmp.path(), &props, copyfrom)?;

            let repos_root = session.get_repos_root()?;
            let src_root_path = path_relative_to_root(&pair.src, &repos_root)?;
            let mergeinfo =
                calculate_target_mergeinfo(session, &src_root_path, &pair.src_rel, src_revnum)?;
            extend_wc_mergeinfo(&dst, &mergeinfo, adm, ctx)?;

            // The underlying add routine does not notify; synthesize the
            // addition here.
            ctx.send_notification(
                &Notification::new(paths::local_style(&pair.dst), NotifyAction::Add)
                    .with_kind(NodeKind::File),
            );
            Ok(())
        }
        NodeKind::None => Err(ClientError::new(
            ErrorCode::NodeUnknownKind,
            format!("Path '{}' does not exist", pair.src),
        )),
    }
}

fn repos_to_wc_locked(
    pairs: &[CopyPair],
    top_dst_path: &str,
    session: &dyn RaSession,
    adm: &dyn AdmAccess,
    ctx: &ClientContext<'_>,
) -> ClientResult<()> {
    // Physical obstructions were ruled out above; an entry whose working
    // file is missing still obstructs logically.
    for pair in pairs {
        ctx.check_cancelled()?;
        if let Some(entry) = ctx
            .wc
            .entry(&paths::to_os_path(&pair.dst), adm, false)?
            && entry.kind != NodeKind::Dir
            && entry.schedule != Schedule::Delete
        {
            return Err(ClientError::new(
                ErrorCode::WcObstructedUpdate,
                format!(
                    "Entry for '{}' exists (though the working file is missing)",
                    paths::local_style(&pair.dst)
                ),
            ));
        }
    }

    // Decide whether the two repositories are the same. A missing UUID on
    // either side means a very old server; assume different repositories
    // rather than guessing, which forgoes copy history.
    let src_uuid = match session.get_uuid() {
        Ok(uuid) => Some(uuid),
        Err(err) if err.code() == ErrorCode::RaNoReposUuid => None,
        Err(err) => return Err(err),
    };
    let uuid_parent = if pairs.len() == 1 {
        paths::dirname(top_dst_path).to_owned()
    } else {
        top_dst_path.to_owned()
    };
    let dst_uuid = ctx
        .wc
        .entry(&paths::to_os_path(&uuid_parent), adm, true)?
        .and_then(|entry| entry.uuid);
    let same_repositories = match (&src_uuid, &dst_uuid) {
        (Some(src), Some(dst)) => src == dst,
        _ => false,
    };

    for pair in pairs {
        ctx.check_cancelled()?;
        repos_to_wc_copy_single(pair, same_repositories, session, adm, ctx)?;
    }
    Ok(())
}

#[instrument(skip_all)]
fn repos_to_wc_copy(pairs: &mut [CopyPair], ctx: &ClientContext<'_>) -> ClientResult<()> {
    let result = (|| {
        // Resolve each source to where its peg actually points.
        for pair in pairs.iter_mut() {
            ctx.check_cancelled()?;
            let session = ctx.ra.open(&pair.src)?;
            let (located, _) =
                session.locations(&pair.src, pair.src_peg_revision, pair.src_op_revision)?;
            pair.src_original = pair.src.clone();
            pair.src = located;
        }

        let ancestors = get_copy_pair_ancestors(pairs);
        let mut top_src_url = ancestors.src;
        let top_dst_path = ancestors.dst;
        if pairs.len() == 1 {
            // Sit the session at the parent so the source itself stays
            // addressable.
            top_src_url = paths::dirname(&top_src_url).to_owned();
        }
        let session = ctx.ra.open(&top_src_url)?;

        for pair in pairs.iter_mut() {
            pair.src_revnum = Some(ra::resolve_revnum(session.as_ref(), pair.src_op_revision)?);
        }

        for pair in pairs.iter_mut() {
            ctx.check_cancelled()?;

            pair.src_rel = paths::is_child(&top_src_url, &pair.src)
                .unwrap_or("")
                .to_owned();
            pair.src_kind = session.check_path(&pair.src_rel, pair.src_revnum)?;
            if pair.src_kind == NodeKind::None {
                return Err(match pair.src_revnum {
                    Some(revnum) => ClientError::new(
                        ErrorCode::FsNotFound,
                        format!("Path '{}' not found in revision {revnum}", pair.src),
                    ),
                    None => ClientError::new(
                        ErrorCode::FsNotFound,
                        format!("Path '{}' not found in head revision", pair.src),
                    ),
                });
            }

            let dst_kind = ctx.wc.check_path(&paths::to_os_path(&pair.dst))?;
            if dst_kind != NodeKind::None {
                return Err(ClientError::new(
                    ErrorCode::EntryExists,
                    format!("Path '{}' already exists", paths::local_style(&pair.dst)),
                ));
            }

            let (dst_parent, base_name) = paths::split(&pair.dst);
            pair.dst_parent = dst_parent.to_owned();
            pair.base_name = base_name.to_owned();

            let dst_parent_kind = ctx.wc.check_path(&paths::to_os_path(&pair.dst_parent))?;
            if dst_parent_kind != NodeKind::Dir {
                return Err(ClientError::new(
                    ErrorCode::WcNotDirectory,
                    format!(
                        "Path '{}' is not a directory",
                        paths::local_style(&pair.dst_parent)
                    ),
                ));
            }
        }

        let adm = ctx.wc.adm_probe_open(
            &paths::to_os_path(&top_dst_path),
            true,
            LockDepth::Empty,
            ctx.cancel,
        )?;
        let locked =
            repos_to_wc_locked(pairs, &top_dst_path, session.as_ref(), adm.as_ref(), ctx);
        let close_result = adm.close();
        locked.and(close_result)
    })();

    // Files were possibly written; later change detection needs fresh
    // timestamps either way.
    wc::sleep_for_timestamps();
    result
}

/// Builds the pair list, rejects illegal combinations, and dispatches to the
/// right transport arm.
///
/// `_force` is accepted for signature compatibility with the move entry
/// points but not consulted by any arm.
#[instrument(skip_all, fields(dst = dst_path, is_move = is_move))]
fn setup_copy(
    sources: &[CopySource],
    dst_path: &str,
    is_move: bool,
    _force: bool,
    ctx: &ClientContext<'_>,
    commit_info: &mut Option<CommitInfo>,
) -> ClientResult<()> {
    let Some(first) = sources.first() else {
        return Err(ClientError::new(
            ErrorCode::Base,
            "No copy sources were given",
        ));
    };

    // Sidedness comes from the first source; homogeneity is checked while
    // building the pairs below.
    let mut srcs_are_urls = first.is_url();
    let dst_is_url = paths::is_url(dst_path);

    for source in sources {
        if source.is_url() && source.peg().requires_working_copy() {
            return Err(ClientError::new(
                ErrorCode::ClientBadRevision,
                "Revision type requires a working copy path, not a URL",
            ));
        }
    }

    // Multiple sources land as children of the destination directory; a
    // single source addresses the destination itself.
    let mut pairs: Vec<CopyPair> = if sources.len() > 1 {
        sources
            .iter()
            .map(|source| {
                if source.is_url() != srcs_are_urls {
                    return Err(ClientError::new(
                        ErrorCode::UnsupportedFeature,
                        "Cannot mix repository and working copy sources",
                    ));
                }
                let dst = paths::join(dst_path, paths::basename(source.target()));
                Ok(CopyPair::new(source, dst))
            })
            .collect::<ClientResult<_>>()?
    } else {
        vec![CopyPair::new(first, dst_path.to_owned())]
    };

    if !srcs_are_urls && !dst_is_url {
        for pair in &pairs {
            if paths::is_child(&pair.src, &pair.dst).is_some() {
                return Err(ClientError::new(
                    ErrorCode::UnsupportedFeature,
                    format!(
                        "Cannot copy path '{}' into its own child '{}'",
                        paths::local_style(&pair.src),
                        paths::local_style(&pair.dst)
                    ),
                ));
            }
        }
    }

    if is_move {
        if srcs_are_urls == dst_is_url {
            for pair in &pairs {
                if pair.src == pair.dst {
                    return Err(ClientError::new(
                        ErrorCode::UnsupportedFeature,
                        format!(
                            "Cannot move path '{}' into itself",
                            paths::local_style(&pair.src)
                        ),
                    ));
                }
            }
        } else {
            return Err(ClientError::new(
                ErrorCode::UnsupportedFeature,
                "Moves between the working copy and the repository are not supported",
            ));
        }
    } else if !srcs_are_urls {
        // A local copy pinned to a repository revision is really a
        // repository copy; promote the sources to their recorded URLs.
        let need_repos_revision = pairs.iter().any(|pair| {
            !matches!(
                pair.src_op_revision,
                Revision::Unspecified | Revision::Working
            )
        });
        if need_repos_revision {
            for pair in pairs.iter_mut() {
                let src = paths::to_os_path(&pair.src);
                let adm = ctx
                    .wc
                    .adm_probe_open(&src, false, LockDepth::Empty, ctx.cancel)?;
                let entry_result = ctx.wc.entry(&src, adm.as_ref(), false);
                let close_result = adm.close();
                let entry = entry_result?.ok_or_else(|| {
                    ClientError::new(
                        ErrorCode::EntryNotFound,
                        format!(
                            "'{}' is not under version control",
                            paths::local_style(&pair.src)
                        ),
                    )
                })?;
                close_result?;
                let url = entry.url.ok_or_else(|| {
                    ClientError::new(
                        ErrorCode::EntryMissingUrl,
                        format!(
                            "'{}' does not seem to have a URL associated with it",
                            paths::local_style(&pair.src)
                        ),
                    )
                })?;
                pair.src = url;
                pair.src_peg_revision = Revision::Number(entry.revision);
            }
            srcs_are_urls = true;
        }
    }

    match (srcs_are_urls, dst_is_url) {
        (false, false) => {
            *commit_info = None;
            wc_to_wc_copy(&mut pairs, is_move, ctx)
        }
        (false, true) => wc_to_repos_copy(&mut pairs, ctx, commit_info),
        (true, false) => {
            *commit_info = None;
            repos_to_wc_copy(&mut pairs, ctx)
        }
        (true, true) => repos_to_repos_copy(&mut pairs, is_move, ctx, commit_info),
    }
}

/// Whether `err` means "the destination already exists" and the request may
/// be retried with the source as a child of the destination.
fn retryable_as_child(err: &ClientError) -> bool {
    matches!(
        err.code(),
        ErrorCode::EntryExists | ErrorCode::FsAlreadyExists
    )
}

/// Copies each source to the destination.
///
/// With several sources, each lands as a child of `dst_path` and
/// `copy_as_child` must be set. With one source and `copy_as_child`, an
/// existing destination is reinterpreted as the parent directory and the
/// copy retried once.
///
/// `commit_info` is filled for the commit-producing arms (working copy ->
/// repository and repository -> repository), even when a post-commit phase
/// fails.
#[instrument(skip(ctx, commit_info))]
pub fn copy(
    sources: &[CopySource],
    dst_path: &str,
    copy_as_child: bool,
    ctx: &ClientContext<'_>,
    commit_info: &mut Option<CommitInfo>,
) -> ClientResult<()> {
    if sources.len() > 1 && !copy_as_child {
        return Err(ClientError::new(
            ErrorCode::MultipleSourcesDisallowed,
            "Multiple sources disallowed",
        ));
    }

    *commit_info = None;
    match setup_copy(sources, dst_path, false, true, ctx, commit_info) {
        Err(err) if copy_as_child && sources.len() == 1 && retryable_as_child(&err) => {
            tracing::debug!(%err, "destination exists; retrying with the source as its child");
            let child_dst = paths::join(dst_path, paths::basename(sources[0].target()));
            *commit_info = None;
            setup_copy(sources, &child_dst, false, true, ctx, commit_info)
        }
        result => result,
    }
}

/// Moves each source to the destination, preserving history.
///
/// Sources and destination must be on the same side: both working-copy
/// paths or both URLs. `force` is accepted for compatibility and currently
/// not consulted. `move_as_child` mirrors [`copy`]'s `copy_as_child`.
#[instrument(skip(ctx, commit_info))]
pub fn move_path(
    src_paths: &[&str],
    dst_path: &str,
    force: bool,
    move_as_child: bool,
    ctx: &ClientContext<'_>,
    commit_info: &mut Option<CommitInfo>,
) -> ClientResult<()> {
    if src_paths.len() > 1 && !move_as_child {
        return Err(ClientError::new(
            ErrorCode::MultipleSourcesDisallowed,
            "Multiple sources disallowed",
        ));
    }

    let sources: Vec<CopySource> = src_paths
        .iter()
        .map(|path| CopySource::new(*path, Revision::Head, Revision::Head))
        .collect();

    *commit_info = None;
    match setup_copy(&sources, dst_path, true, force, ctx, commit_info) {
        Err(err) if move_as_child && src_paths.len() == 1 && retryable_as_child(&err) => {
            tracing::debug!(%err, "destination exists; retrying with the source as its child");
            let child_dst = paths::join(dst_path, paths::basename(src_paths[0]));
            *commit_info = None;
            setup_copy(&sources, &child_dst, true, force, ctx, commit_info)
        }
        result => result,
    }
}

/// Single-source copy without the as-child retry.
pub fn copy_single(
    src: &str,
    src_revision: Revision,
    dst_path: &str,
    ctx: &ClientContext<'_>,
    commit_info: &mut Option<CommitInfo>,
) -> ClientResult<()> {
    let source = CopySource::new(src, src_revision, src_revision);
    copy(std::slice::from_ref(&source), dst_path, false, ctx, commit_info)
}

/// Single-source move without the as-child retry.
///
/// A move always operates on the latest version; any revision other than
/// head is rejected rather than silently ignored.
pub fn move_single(
    src: &str,
    src_revision: Revision,
    dst_path: &str,
    force: bool,
    ctx: &ClientContext<'_>,
    commit_info: &mut Option<CommitInfo>,
) -> ClientResult<()> {
    if !matches!(src_revision, Revision::Unspecified | Revision::Head) {
        return Err(ClientError::new(
            ErrorCode::UnsupportedFeature,
            "Cannot specify revisions (except HEAD) with move operations",
        ));
    }
    move_path(&[src], dst_path, force, false, ctx, commit_info)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn pair(src: &str, dst: &str) -> CopyPair {
        CopyPair::new(&CopySource::from_target(src), dst.to_owned())
    }

    #[test]
    fn test_ancestors_single_pair() {
        let pairs = [pair("svn://host/repo/trunk/a", "svn://host/repo/branches/a")];
        let ancestors = get_copy_pair_ancestors(&pairs);
        assert_eq!(ancestors.src, "svn://host/repo/trunk/a");
        assert_eq!(ancestors.dst, "svn://host/repo/branches/a");
        assert_eq!(ancestors.common, "svn://host/repo");
    }

    #[test]
    fn test_ancestors_multiple_pairs() {
        let pairs = [
            pair("wc/a/x", "wc/b/x"),
            pair("wc/a/y/deep", "wc/b/y"),
        ];
        let ancestors = get_copy_pair_ancestors(&pairs);
        assert_eq!(ancestors.src, "wc/a");
        assert_eq!(ancestors.dst, "wc/b");
        assert_eq!(ancestors.common, "wc");
    }

    #[test_case(true, true, true, Action::Noop; "move resurrection does nothing")]
    #[test_case(true, false, true, Action::Add; "copy resurrection adds")]
    #[test_case(false, true, true, Action::Delete; "move source is deleted")]
    #[test_case(false, true, false, Action::Add; "move destination is added")]
    #[test_case(false, false, false, Action::Add; "plain copy adds")]
    fn test_plan_action(resurrection: bool, is_move: bool, is_source_path: bool, want: Action) {
        assert_eq!(plan_action(resurrection, is_move, is_source_path), want);
    }

    #[test]
    fn test_path_relative_to_root() {
        assert_eq!(
            path_relative_to_root("svn://host/repo/trunk%20x", "svn://host/repo").unwrap(),
            "/trunk x"
        );
        assert_eq!(
            path_relative_to_root("svn://host/repo", "svn://host/repo").unwrap(),
            "/"
        );
        let err = path_relative_to_root("svn://other/x", "svn://host/repo").unwrap_err();
        assert_eq!(err.code(), ErrorCode::RaIllegalUrl);
    }

    #[test]
    fn test_reconcile_nothing() {
        assert!(reconcile_errors(None, None, None).is_none());
    }

    #[test]
    fn test_reconcile_commit_error_leads() {
        let commit_err = ClientError::new(ErrorCode::FsAlreadyExists, "exists");
        let err = reconcile_errors(Some(commit_err), None, None).unwrap();
        let messages: Vec<_> = err.chain().map(|e| e.message()).collect();
        assert_eq!(messages, vec!["Commit failed (details follow):", "exists"]);
        assert_eq!(err.code(), ErrorCode::FsAlreadyExists);
    }

    #[test]
    fn test_reconcile_success_with_late_failures() {
        let unlock_err = ClientError::new(ErrorCode::Io, "unlock");
        let err = reconcile_errors(None, Some(unlock_err), None).unwrap();
        let messages: Vec<_> = err.chain().map(|e| e.message()).collect();
        assert_eq!(
            messages,
            vec![
                "Commit succeeded, but other errors follow:",
                "Error unlocking locked dirs (details follow):",
                "unlock",
            ]
        );
        assert_eq!(err.code(), ErrorCode::Base);
    }

    #[test]
    fn test_reconcile_all_three_phases_in_order() {
        let commit_err = ClientError::new(ErrorCode::Io, "commit");
        let unlock_err = ClientError::new(ErrorCode::Io, "unlock");
        let cleanup_err = ClientError::new(ErrorCode::Io, "cleanup");
        let err = reconcile_errors(Some(commit_err), Some(unlock_err), Some(cleanup_err)).unwrap();
        let messages: Vec<_> = err.chain().map(|e| e.message()).collect();
        assert_eq!(
            messages,
            vec![
                "Commit failed (details follow):",
                "commit",
                "Error unlocking locked dirs (details follow):",
                "unlock",
                "Error in post-commit clean-up (details follow):",
                "cleanup",
            ]
        );
    }
}
