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

//! String algebra over canonical paths and URLs.
//!
//! The client core addresses working-copy paths and repository URLs through
//! one representation: `/`-separated strings with no trailing separator. That
//! lets the pair builder and the ancestor utilities treat both sides
//! uniformly; conversion to [`std::path::Path`] happens only at the
//! working-copy boundary.

use std::path::Path;
use std::path::PathBuf;

use percent_encoding::percent_decode_str;

use crate::error::ClientError;
use crate::error::ClientResult;
use crate::error::ErrorCode;

/// Whether `path` looks like a URL (`scheme://...`).
pub fn is_url(path: &str) -> bool {
    match path.split_once("://") {
        Some((scheme, rest)) => {
            !scheme.is_empty()
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
                && !rest.is_empty()
        }
        None => false,
    }
}

/// Whether `path` is the canonical empty path.
pub fn is_empty(path: &str) -> bool {
    path.is_empty()
}

/// Everything up to the last component, `""` for a single component and `"/"`
/// for a child of the root.
pub fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        None => "",
        Some(0) => "/",
        Some(i) => &path[..i],
    }
}

/// The last component of `path`.
pub fn basename(path: &str) -> &str {
    match path.rfind('/') {
        None => path,
        Some(i) => &path[i + 1..],
    }
}

/// Splits `path` into `(dirname, basename)`.
pub fn split(path: &str) -> (&str, &str) {
    (dirname(path), basename(path))
}

/// Appends `component` to `base` with exactly one separator.
pub fn join(base: &str, component: &str) -> String {
    if component.is_empty() {
        base.to_owned()
    } else if base.is_empty() {
        component.to_owned()
    } else if base.ends_with('/') {
        // Only the filesystem root keeps its trailing separator.
        format!("{base}{component}")
    } else {
        format!("{base}/{component}")
    }
}

/// The longest ancestor shared by `a` and `b`, ending on a component
/// boundary.
///
/// A URL and a non-URL share nothing; two URLs share nothing unless the
/// ancestor reaches into the path below `scheme://authority`.
pub fn longest_common_ancestor<'a>(a: &'a str, b: &str) -> &'a str {
    if is_url(a) != is_url(b) {
        return "";
    }
    if a == b {
        return a;
    }
    let mut end = 0;
    let mut first = true;
    for (ca, cb) in a.split('/').zip(b.split('/')) {
        if ca != cb {
            break;
        }
        end = if first { ca.len() } else { end + 1 + ca.len() };
        first = false;
    }
    if is_url(a) {
        // The shared prefix must cover at least "scheme://authority".
        match a.find("://") {
            Some(pos) if end > pos + 3 => {}
            _ => return "",
        }
    } else if end == 0 && a.starts_with('/') && b.starts_with('/') {
        return "/";
    }
    &a[..end]
}

/// Returns the remainder of `child` below `parent`, or `None` when `child`
/// equals `parent` or lies outside it.
pub fn is_child<'a>(parent: &str, child: &'a str) -> Option<&'a str> {
    if parent.is_empty() {
        if child.is_empty() || child.starts_with('/') {
            return None;
        }
        return Some(child);
    }
    let rest = child.strip_prefix(parent)?;
    let rest = if parent.ends_with('/') {
        // `parent` is the filesystem root.
        rest
    } else {
        rest.strip_prefix('/')?
    };
    (!rest.is_empty()).then_some(rest)
}

/// Reverses URI escaping on `path`.
pub fn uri_decode(path: &str) -> String {
    percent_decode_str(path).decode_utf8_lossy().into_owned()
}

/// Renders an internal path for humans: `""` becomes `"."`, separators become
/// the platform's.
pub fn local_style(path: &str) -> String {
    if path.is_empty() {
        return ".".to_owned();
    }
    if std::path::MAIN_SEPARATOR == '/' {
        path.to_owned()
    } else {
        path.replace('/', std::path::MAIN_SEPARATOR_STR)
    }
}

/// Rejects paths containing control characters.
pub fn check_valid(path: &str) -> ClientResult<()> {
    if let Some(c) = path.chars().find(|c| c.is_control()) {
        return Err(ClientError::new(
            ErrorCode::PathSyntax,
            format!(
                "Invalid control character '0x{:02x}' in path '{}'",
                c as u32,
                local_style(path)
            ),
        ));
    }
    Ok(())
}

/// Makes a local path absolute against the current working directory.
pub fn get_absolute(path: &str) -> ClientResult<String> {
    let absolute = std::path::absolute(Path::new(path)).map_err(|err| {
        ClientError::new(
            ErrorCode::Io,
            format!("Couldn't determine absolute path of '{}': {err}", local_style(path)),
        )
    })?;
    path_to_string(&absolute)
}

/// Converts an OS path back to the internal string form.
pub fn path_to_string(path: &Path) -> ClientResult<String> {
    match path.to_str() {
        Some(s) => Ok(s.replace(std::path::MAIN_SEPARATOR, "/")),
        None => Err(ClientError::new(
            ErrorCode::PathSyntax,
            format!("Path '{}' is not valid UTF-8", path.display()),
        )),
    }
}

/// Converts an internal path string to an OS path.
pub fn to_os_path(path: &str) -> PathBuf {
    PathBuf::from(local_style(path))
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("http://host/path", true)]
    #[test_case("svn+ssh://host/path", true)]
    #[test_case("file:///path", true)]
    #[test_case("a/b/c", false)]
    #[test_case("/a/b", false)]
    #[test_case("://host", false)]
    #[test_case("", false)]
    fn test_is_url(path: &str, want: bool) {
        assert_eq!(is_url(path), want);
    }

    #[test_case("a/b/c", "a/b", "c"; "three_components")]
    #[test_case("a", "", "a"; "single_component")]
    #[test_case("/a", "/", "a"; "root_child")]
    #[test_case("svn://host/repo/x", "svn://host/repo", "x"; "url")]
    fn test_split(path: &str, parent: &str, base: &str) {
        assert_eq!(split(path), (parent, base));
    }

    #[test_case("a/b", "c", "a/b/c"; "non_empty_base")]
    #[test_case("", "c", "c"; "empty_base")]
    #[test_case("a/b", "", "a/b"; "empty_component")]
    #[test_case("/", "c", "/c"; "root_base")]
    #[test_case("svn://host", "repo", "svn://host/repo"; "url")]
    fn test_join(base: &str, component: &str, want: &str) {
        assert_eq!(join(base, component), want);
    }

    #[test_case("a/b/c", "a/b/d", "a/b"; "three_components")]
    #[test_case("a/b", "a/b", "a/b"; "identical")]
    #[test_case("a/bc", "a/bd", "a"; "prefix_component")]
    #[test_case("a", "b", ""; "no_common_ancestor")]
    #[test_case("/a/x", "/a/y", "/a"; "root_children")]
    #[test_case("/a", "/b", "/"; "root_only")]
    #[test_case("svn://host/repo/a", "svn://host/repo/b", "svn://host/repo"; "url")]
    #[test_case("svn://h1/a", "svn://h2/a", ""; "different_hosts")]
    #[test_case("svn://host/a", "/local/a", ""; "url_and_local")]
    fn test_longest_common_ancestor(a: &str, b: &str, want: &str) {
        assert_eq!(longest_common_ancestor(a, b), want);
        assert_eq!(longest_common_ancestor(b, a), want);
    }

    #[test_case("a", "a/b", Some("b"))]
    #[test_case("a", "a/b/c", Some("b/c"))]
    #[test_case("a", "a", None)]
    #[test_case("a", "ab", None)]
    #[test_case("a/b", "a", None)]
    #[test_case("", "a/b", Some("a/b"))]
    #[test_case("", "/a", None)]
    #[test_case("/", "/a", Some("a"))]
    #[test_case("svn://host/repo", "svn://host/repo/t/a", Some("t/a"))]
    fn test_is_child(parent: &str, child: &str, want: Option<&str>) {
        assert_eq!(is_child(parent, child), want);
    }

    #[test]
    fn test_uri_decode() {
        assert_eq!(uri_decode("a%20b/c%2Bd"), "a b/c+d");
        assert_eq!(uri_decode("plain/path"), "plain/path");
    }

    #[test]
    fn test_check_valid() {
        assert!(check_valid("a/b c").is_ok());
        let err = check_valid("a/b\u{7}c").unwrap_err();
        assert_eq!(err.code(), ErrorCode::PathSyntax);
    }

    #[test]
    fn test_local_style_empty_is_dot() {
        assert_eq!(local_style(""), ".");
    }
}
