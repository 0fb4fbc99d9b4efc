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

//! History metadata ("merge info") attached to versioned nodes.
//!
//! A [`Mergeinfo`] catalog maps repository-root-relative source paths to the
//! revision ranges that have been merged from them. Copy operations extend it
//! so that later merge tracking stays consistent; the serialized form lives
//! in the [`PROP_MERGEINFO`] node property.

use std::collections::BTreeMap;
use std::fmt;

use crate::error::ClientError;
use crate::error::ClientResult;
use crate::error::ErrorCode;
use crate::revision::Revnum;

/// Name of the node property holding serialized history metadata.
pub const PROP_MERGEINFO: &str = "svn:mergeinfo";

/// An inclusive revision range.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RevRange {
    pub start: Revnum,
    pub end: Revnum,
}

impl RevRange {
    pub fn new(start: Revnum, end: Revnum) -> Self {
        Self { start, end }
    }
}

impl fmt::Display for RevRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// A catalog of merged revision ranges keyed by source path.
///
/// Ranges per path are kept sorted, disjoint and maximal, so two catalogs
/// describing the same history always serialize identically.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Mergeinfo {
    paths: BTreeMap<String, Vec<RevRange>>,
}

impl Mergeinfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Ranges recorded for `path`, if any.
    pub fn ranges(&self, path: &str) -> Option<&[RevRange]> {
        self.paths.get(path).map(Vec::as_slice)
    }

    /// Adds `range` to the history of `path`.
    pub fn record(&mut self, path: impl Into<String>, range: RevRange) {
        let ranges = self.paths.entry(path.into()).or_default();
        ranges.push(range);
        normalize(ranges);
    }

    /// Unions `other` into this catalog.
    pub fn merge(&mut self, other: &Self) {
        for (path, ranges) in &other.paths {
            let entry = self.paths.entry(path.clone()).or_default();
            entry.extend_from_slice(ranges);
            normalize(entry);
        }
    }

    /// Parses the serialized property form produced by [`fmt::Display`].
    pub fn parse(text: &str) -> ClientResult<Self> {
        let mut mergeinfo = Self::new();
        for line in text.lines().filter(|line| !line.is_empty()) {
            let (path, rangelist) = line.rsplit_once(':').ok_or_else(|| parse_error(line))?;
            if path.is_empty() {
                return Err(parse_error(line));
            }
            for piece in rangelist.split(',') {
                let range = match piece.split_once('-') {
                    Some((start, end)) => RevRange::new(
                        parse_revnum(start).ok_or_else(|| parse_error(line))?,
                        parse_revnum(end).ok_or_else(|| parse_error(line))?,
                    ),
                    None => {
                        let rev = parse_revnum(piece).ok_or_else(|| parse_error(line))?;
                        RevRange::new(rev, rev)
                    }
                };
                if range.end < range.start {
                    return Err(parse_error(line));
                }
                mergeinfo.record(path, range);
            }
        }
        Ok(mergeinfo)
    }
}

impl fmt::Display for Mergeinfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (path, ranges)) in self.paths.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{path}:")?;
            for (j, range) in ranges.iter().enumerate() {
                if j > 0 {
                    write!(f, ",")?;
                }
                write!(f, "{range}")?;
            }
        }
        Ok(())
    }
}

/// Sorts `ranges` and fuses overlapping or adjacent ones.
fn normalize(ranges: &mut Vec<RevRange>) {
    ranges.sort_by_key(|range| (range.start, range.end));
    let mut fused: Vec<RevRange> = Vec::with_capacity(ranges.len());
    for range in ranges.drain(..) {
        match fused.last_mut() {
            Some(last) if range.start.number() <= last.end.number() + 1 => {
                last.end = last.end.max(range.end);
            }
            _ => fused.push(range),
        }
    }
    *ranges = fused;
}

fn parse_revnum(text: &str) -> Option<Revnum> {
    text.parse::<u64>().ok().map(Revnum)
}

fn parse_error(line: &str) -> ClientError {
    ClientError::new(
        ErrorCode::MergeinfoParse,
        format!("Could not parse mergeinfo string '{line}'"),
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn range(start: u64, end: u64) -> RevRange {
        RevRange::new(Revnum(start), Revnum(end))
    }

    #[test]
    fn test_record_fuses_overlapping_and_adjacent_ranges() {
        let mut mergeinfo = Mergeinfo::new();
        mergeinfo.record("/trunk", range(4, 6));
        mergeinfo.record("/trunk", range(7, 9));
        mergeinfo.record("/trunk", range(1, 2));
        assert_eq!(mergeinfo.ranges("/trunk").unwrap(), &[range(1, 2), range(4, 9)]);
    }

    #[test]
    fn test_merge_unions_per_path() {
        let mut a = Mergeinfo::new();
        a.record("/trunk", range(1, 5));
        a.record("/branches/b", range(3, 3));
        let mut b = Mergeinfo::new();
        b.record("/trunk", range(4, 8));
        b.record("/tags/t", range(2, 2));
        a.merge(&b);
        assert_eq!(a.ranges("/trunk").unwrap(), &[range(1, 8)]);
        assert_eq!(a.ranges("/branches/b").unwrap(), &[range(3, 3)]);
        assert_eq!(a.ranges("/tags/t").unwrap(), &[range(2, 2)]);
    }

    #[test]
    fn test_serialization_is_canonical() {
        let mut mergeinfo = Mergeinfo::new();
        mergeinfo.record("/trunk", range(9, 9));
        mergeinfo.record("/trunk", range(2, 5));
        mergeinfo.record("/branches/b", range(1, 3));
        assert_eq!(mergeinfo.to_string(), "/branches/b:1-3\n/trunk:2-5,9");
    }

    #[test]
    fn test_parse_round_trips() {
        let text = "/branches/b:1-3\n/trunk:2-5,9";
        let mergeinfo = Mergeinfo::parse(text).unwrap();
        assert_eq!(mergeinfo.to_string(), text);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(
            Mergeinfo::parse("no ranges here").unwrap_err().code(),
            ErrorCode::MergeinfoParse
        );
        assert_eq!(
            Mergeinfo::parse("/trunk:9-2").unwrap_err().code(),
            ErrorCode::MergeinfoParse
        );
        assert_eq!(
            Mergeinfo::parse(":1-2").unwrap_err().code(),
            ErrorCode::MergeinfoParse
        );
    }

    #[test]
    fn test_parse_empty_is_empty_catalog() {
        assert!(Mergeinfo::parse("").unwrap().is_empty());
    }
}
