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

use std::path::PathBuf;

use crate::error::ClientError;
use crate::error::ClientResult;
use crate::error::ErrorCode;
use crate::paths;
use crate::ra::NodeKind;
use crate::revision::Revnum;

/// What a commit item does to its path.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CommitItemState {
    Add,
    Delete,
}

/// One intended change, as consumed by the commit machinery and shown to the
/// log-message callback.
#[derive(Clone, Debug)]
pub struct CommitItem {
    /// Repository URL the change addresses.
    pub url: String,
    pub kind: NodeKind,
    pub state: CommitItemState,
    /// Copy history for additions-with-history.
    pub copyfrom: Option<(String, Revnum)>,
    /// Working-copy path backing this item, for harvested items.
    pub path: Option<PathBuf>,
    /// Property changes sent along with the change.
    pub outgoing_prop_changes: Vec<(String, String)>,
}

impl CommitItem {
    pub fn new(url: impl Into<String>, state: CommitItemState) -> Self {
        Self {
            url: url.into(),
            kind: NodeKind::None,
            state,
            copyfrom: None,
            path: None,
            outgoing_prop_changes: Vec::new(),
        }
    }
}

/// One source to harvest commit items for: a working-copy path headed for a
/// repository URL.
#[derive(Clone, Debug)]
pub struct HarvestRequest {
    pub src_path: String,
    pub dst_url: String,
}

/// Finds the common base URL of `items`, keeps it strictly above every item,
/// and sorts the items into depth-first path order.
pub fn condense_commit_items(items: &mut [CommitItem]) -> ClientResult<String> {
    let Some(first) = items.first() else {
        return Err(ClientError::new(
            ErrorCode::Base,
            "Cannot condense an empty commit item list",
        ));
    };
    let mut base = first.url.clone();
    for item in &items[1..] {
        base = paths::longest_common_ancestor(&base, &item.url).to_owned();
    }
    if items.iter().any(|item| item.url == base) {
        base = paths::dirname(&base).to_owned();
    }
    if base.is_empty() {
        return Err(ClientError::new(
            ErrorCode::UnsupportedFeature,
            "Commit items do not share a common repository",
        ));
    }
    items.sort_by(|a, b| a.url.split('/').cmp(b.url.split('/')));
    Ok(base)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_condense_single_item_bases_on_its_parent() {
        let mut items = vec![CommitItem::new("svn://host/repo/dir/new", CommitItemState::Add)];
        let base = condense_commit_items(&mut items).unwrap();
        assert_eq!(base, "svn://host/repo/dir");
    }

    #[test]
    fn test_condense_sorts_and_shares_the_ancestor() {
        let mut items = vec![
            CommitItem::new("svn://host/repo/d/b", CommitItemState::Add),
            CommitItem::new("svn://host/repo/d/a/x", CommitItemState::Add),
        ];
        let base = condense_commit_items(&mut items).unwrap();
        assert_eq!(base, "svn://host/repo/d");
        assert_eq!(items[0].url, "svn://host/repo/d/a/x");
        assert_eq!(items[1].url, "svn://host/repo/d/b");
    }

    #[test]
    fn test_condense_rejects_disjoint_repositories() {
        let mut items = vec![
            CommitItem::new("svn://host-a/repo/x", CommitItemState::Add),
            CommitItem::new("svn://host-b/repo/y", CommitItemState::Add),
        ];
        let err = condense_commit_items(&mut items).unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnsupportedFeature);
    }
}
