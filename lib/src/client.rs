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

use std::collections::HashMap;
use std::fmt::Debug;
use std::path::Path;

use crate::commit::CommitItem;
use crate::error::ClientError;
use crate::error::ClientResult;
use crate::error::ErrorCode;
use crate::ra::NodeKind;
use crate::ra::RaConnect;
use crate::revision::Revision;
use crate::revision::Revnum;
use crate::wc::Wc;

/// Name of the revision property holding the log message.
pub const PROP_REVISION_LOG: &str = "svn:log";

/// Prefix of property names reserved for the system.
pub const PROP_PREFIX: &str = "svn:";

/// What a notification reports.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NotifyAction {
    Add,
    Copy,
    Delete,
    CommitAdded,
    CommitDeleted,
}

/// A progress notification sent to the caller's callback.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Notification {
    /// Affected working-copy path or URL.
    pub path: String,
    pub action: NotifyAction,
    pub kind: NodeKind,
}

impl Notification {
    pub fn new(path: impl Into<String>, action: NotifyAction) -> Self {
        Self {
            path: path.into(),
            action,
            kind: NodeKind::None,
        }
    }

    pub fn with_kind(mut self, kind: NodeKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Cancellation callback: returns an error to abort the operation.
pub type CancelFn<'a> = Option<&'a dyn Fn() -> ClientResult<()>>;

/// Notification callback.
pub type NotifyFn<'a> = Option<&'a dyn Fn(&Notification)>;

/// Log-message callback: shown the intended changes, returns the message, or
/// `None` to abort the commit silently.
pub type LogMessageFn<'a> = &'a dyn Fn(&[CommitItem]) -> ClientResult<Option<String>>;

/// Builds extra revision properties for a commit, given the log message.
pub type RevpropsFn<'a> = &'a dyn Fn(&str) -> ClientResult<HashMap<String, String>>;

/// Recursive checkout, delegated to a peer of this core.
pub trait Checkout: Debug {
    /// Checks out `url` at the given revisions into the unversioned path
    /// `dst`, recursively, and returns the checked-out revision.
    fn checkout(
        &self,
        url: &str,
        dst: &Path,
        peg: Revision,
        op: Revision,
        cancel: CancelFn<'_>,
        notify: NotifyFn<'_>,
    ) -> ClientResult<Revnum>;
}

/// Everything a client operation needs from its caller: the collaborator
/// seams and the per-request callbacks.
pub struct ClientContext<'a> {
    pub ra: &'a dyn RaConnect,
    pub wc: &'a dyn Wc,
    pub checkout: &'a dyn Checkout,
    pub cancel: CancelFn<'a>,
    pub notify: NotifyFn<'a>,
    pub log_msg: Option<LogMessageFn<'a>>,
    pub revprops: Option<RevpropsFn<'a>>,
}

impl<'a> ClientContext<'a> {
    pub fn new(ra: &'a dyn RaConnect, wc: &'a dyn Wc, checkout: &'a dyn Checkout) -> Self {
        Self {
            ra,
            wc,
            checkout,
            cancel: None,
            notify: None,
            log_msg: None,
            revprops: None,
        }
    }

    /// Consults the cancellation callback, if any.
    pub fn check_cancelled(&self) -> ClientResult<()> {
        match self.cancel {
            Some(cancel) => cancel(),
            None => Ok(()),
        }
    }

    pub fn send_notification(&self, notification: &Notification) {
        if let Some(notify) = self.notify {
            notify(notification);
        }
    }

    /// Assembles the revision property table for a commit: the caller's
    /// extra properties plus the log message. Reserved names are rejected.
    pub fn revprop_table(&self, log_message: &str) -> ClientResult<HashMap<String, String>> {
        let mut table = match self.revprops {
            Some(revprops) => revprops(log_message)?,
            None => HashMap::new(),
        };
        if let Some(name) = table.keys().find(|name| name.starts_with(PROP_PREFIX)) {
            return Err(ClientError::new(
                ErrorCode::PropertyName,
                format!("Standard properties can't be set explicitly as revision properties ('{name}')"),
            ));
        }
        table.insert(PROP_REVISION_LOG.to_owned(), log_message.to_owned());
        Ok(table)
    }
}

impl Debug for ClientContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientContext")
            .field("ra", &self.ra)
            .field("wc", &self.wc)
            .field("checkout", &self.checkout)
            .finish_non_exhaustive()
    }
}
