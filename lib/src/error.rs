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

use std::iter;

use thiserror::Error;

/// Machine-readable classification of a [`ClientError`].
///
/// Codes are stable across the public boundary; messages are not.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ErrorCode {
    /// Generic lead-in error used to head a composed error chain.
    Base,
    /// The operation was cancelled through the cancellation callback.
    Cancelled,
    /// A revision specifier cannot be used in this context.
    ClientBadRevision,
    /// A working-copy path or entry already exists.
    EntryExists,
    /// A working-copy entry has no recorded repository URL.
    EntryMissingUrl,
    /// A path is not under version control.
    EntryNotFound,
    /// A repository path already exists.
    FsAlreadyExists,
    /// A repository path does not exist at the requested revision.
    FsNotFound,
    /// A filesystem operation failed.
    Io,
    /// A serialized history-metadata property could not be parsed.
    MergeinfoParse,
    /// Multiple sources were given without opting into as-child copies.
    MultipleSourcesDisallowed,
    /// A node has no discernible kind (it does not exist on disk).
    NodeUnknownKind,
    /// A path contains characters that cannot appear in a repository.
    PathSyntax,
    /// A reserved property name was used where it is not allowed.
    PropertyName,
    /// A URL does not address any known repository.
    RaIllegalUrl,
    /// The repository does not report a UUID.
    RaNoReposUuid,
    /// The requested combination of arguments is not supported.
    UnsupportedFeature,
    /// A working-copy path that must be a directory is not one.
    WcNotDirectory,
    /// A working-copy entry obstructs the requested addition.
    WcObstructedUpdate,
}

/// An error produced by the client library.
///
/// Errors form a singly-linked chain through [`ClientError::cause`], in the
/// manner of wrapped errors: the head is the most recently added context, the
/// tail is the original failure. [`ClientError::wrap`] pushes a new head,
/// [`ClientError::compose`] appends a second chain after this one.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ClientError {
    code: ErrorCode,
    message: String,
    #[source]
    cause: Option<Box<ClientError>>,
}

impl ClientError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// The error raised by a cancellation callback.
    pub fn cancelled() -> Self {
        Self::new(ErrorCode::Cancelled, "Caught signal")
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&Self> {
        self.cause.as_deref()
    }

    /// Wraps this error in a new one carrying `message`, with the same code.
    pub fn wrap(self, message: impl Into<String>) -> Self {
        Self {
            code: self.code,
            message: message.into(),
            cause: Some(Box::new(self)),
        }
    }

    /// Appends `other` (and its whole chain) after the last link of this
    /// chain.
    pub fn compose(&mut self, other: Self) {
        let mut last = self;
        while last.cause.is_some() {
            last = last.cause.as_mut().unwrap();
        }
        last.cause = Some(Box::new(other));
    }

    /// Iterates over the chain from this error to the root cause.
    pub fn chain(&self) -> impl Iterator<Item = &Self> {
        iter::successors(Some(self), |err| err.cause())
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_preserves_code_and_chains() {
        let err = ClientError::new(ErrorCode::FsNotFound, "Path 'a' does not exist")
            .wrap("Commit failed (details follow):");
        assert_eq!(err.code(), ErrorCode::FsNotFound);
        assert_eq!(err.message(), "Commit failed (details follow):");
        let cause = err.cause().unwrap();
        assert_eq!(cause.message(), "Path 'a' does not exist");
        assert!(cause.cause().is_none());
    }

    #[test]
    fn test_compose_appends_after_existing_chain() {
        let mut err = ClientError::new(ErrorCode::Io, "inner").wrap("outer");
        let mut tail = ClientError::new(ErrorCode::Cancelled, "tail inner").wrap("tail outer");
        tail.compose(ClientError::new(ErrorCode::Base, "very last"));
        err.compose(tail);
        let messages: Vec<_> = err.chain().map(|e| e.message()).collect();
        assert_eq!(
            messages,
            vec!["outer", "inner", "tail outer", "tail inner", "very last"]
        );
    }

    #[test]
    fn test_std_error_source_walks_the_chain() {
        let err = ClientError::new(ErrorCode::Io, "root").wrap("context");
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "root");
    }
}
