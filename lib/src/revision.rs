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

use std::fmt;

use chrono::DateTime;
use chrono::Utc;

/// A concrete repository revision number.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Revnum(pub u64);

impl Revnum {
    pub fn number(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Revnum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A revision specifier as supplied by the user.
///
/// `Base`, `Committed`, `Previous` and `Working` are only meaningful for
/// working-copy paths; the repository arms reject them.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Revision {
    /// No revision was supplied; defaulted during pair building.
    Unspecified,
    Number(Revnum),
    Date(DateTime<Utc>),
    Head,
    Base,
    Committed,
    Previous,
    Working,
}

impl Revision {
    pub fn is_unspecified(&self) -> bool {
        matches!(self, Self::Unspecified)
    }

    /// Whether this specifier can only be resolved against a working copy.
    pub fn requires_working_copy(&self) -> bool {
        matches!(self, Self::Base | Self::Committed | Self::Previous)
    }
}

/// Fills in unspecified peg and operative revisions.
///
/// An unspecified peg defaults to head for URLs and to the working version
/// for local paths; an unspecified operative revision then follows the peg.
pub fn resolve_revisions(peg: Revision, op: Revision, is_url: bool) -> (Revision, Revision) {
    let peg = if peg.is_unspecified() {
        if is_url { Revision::Head } else { Revision::Working }
    } else {
        peg
    };
    let op = if op.is_unspecified() { peg } else { op };
    (peg, op)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(true, Revision::Head, Revision::Head; "url defaults to head")]
    #[test_case(false, Revision::Working, Revision::Working; "local defaults to working")]
    fn test_resolve_fully_unspecified(is_url: bool, want_peg: Revision, want_op: Revision) {
        let (peg, op) = resolve_revisions(Revision::Unspecified, Revision::Unspecified, is_url);
        assert_eq!(peg, want_peg);
        assert_eq!(op, want_op);
    }

    #[test]
    fn test_resolve_op_follows_explicit_peg() {
        let (peg, op) =
            resolve_revisions(Revision::Number(Revnum(7)), Revision::Unspecified, true);
        assert_eq!(peg, Revision::Number(Revnum(7)));
        assert_eq!(op, Revision::Number(Revnum(7)));
    }

    #[test]
    fn test_resolve_keeps_explicit_revisions() {
        let (peg, op) = resolve_revisions(Revision::Head, Revision::Number(Revnum(3)), false);
        assert_eq!(peg, Revision::Head);
        assert_eq!(op, Revision::Number(Revnum(3)));
    }
}
