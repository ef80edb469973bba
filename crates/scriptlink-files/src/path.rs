//! Request URI to filesystem path resolution.
//!
//! A request URI becomes an on-disk path by stripping the query/fragment
//! suffix, bounding the combined base + path length, lexically normalizing
//! `.`/`..` segments and verifying the result still lives under the base
//! directory. The bound is checked before any filesystem access.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Combined base + request path byte bound: a short mount prefix plus 128
/// bytes of request path.
pub const MAX_PATH_LEN: usize = 144;

/// Errors that can occur while resolving a request URI.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// The combined base + path length exceeds the destination bound.
    #[error("combined path exceeds {max} bytes")]
    TooLong {
        /// The bound that was exceeded.
        max: usize,
    },

    /// The normalized path would escape the base directory.
    #[error("path escapes the base directory")]
    Traversal,

    /// The path names a directory, which is invalid for a file target.
    #[error("path names a directory")]
    IsDirectory,

    /// The path has no segments left after normalization.
    #[error("path is empty")]
    Empty,
}

/// Resolve a request URI to a path under `base_dir`.
///
/// The query (`?`) and fragment (`#`) suffixes are stripped before the
/// length computation. `.` segments are dropped, `..` segments are resolved
/// lexically and rejected when they would climb above `base_dir`. The
/// filesystem is never consulted.
pub fn resolve(base_dir: &Path, uri: &str, max_len: usize) -> Result<PathBuf, PathError> {
    let path = strip_suffixes(uri);

    if base_dir.as_os_str().len() + path.len() > max_len {
        return Err(PathError::TooLong { max: max_len });
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(PathError::Traversal);
                }
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        return Err(PathError::Empty);
    }

    let mut resolved = base_dir.to_path_buf();
    for segment in segments {
        resolved.push(segment);
    }
    debug_assert!(resolved.starts_with(base_dir));
    Ok(resolved)
}

/// Resolve a request URI that must name a file, not a directory.
///
/// Same as [`resolve`], additionally rejecting a trailing `/` — upload and
/// delete targets cannot be directories.
pub fn resolve_file(base_dir: &Path, uri: &str, max_len: usize) -> Result<PathBuf, PathError> {
    let path = strip_suffixes(uri);
    if path.ends_with('/') {
        return Err(PathError::IsDirectory);
    }
    resolve(base_dir, uri, max_len)
}

fn strip_suffixes(uri: &str) -> &str {
    uri.split(['?', '#']).next().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> PathBuf {
        PathBuf::from("/srv")
    }

    #[test]
    fn test_plain_path() {
        let resolved = resolve(&base(), "/index.html", MAX_PATH_LEN).unwrap();
        assert_eq!(resolved, PathBuf::from("/srv/index.html"));
    }

    #[test]
    fn test_nested_path() {
        let resolved = resolve(&base(), "/assets/app.js", MAX_PATH_LEN).unwrap();
        assert_eq!(resolved, PathBuf::from("/srv/assets/app.js"));
    }

    #[test]
    fn test_query_and_fragment_stripped() {
        let resolved = resolve(&base(), "/page.html?dark=1#top", MAX_PATH_LEN).unwrap();
        assert_eq!(resolved, PathBuf::from("/srv/page.html"));

        let resolved = resolve(&base(), "/page.html#frag?not-a-query", MAX_PATH_LEN).unwrap();
        assert_eq!(resolved, PathBuf::from("/srv/page.html"));
    }

    #[test]
    fn test_length_bound() {
        let long = format!("/{}", "a".repeat(MAX_PATH_LEN));
        assert_eq!(
            resolve(&base(), &long, MAX_PATH_LEN),
            Err(PathError::TooLong { max: MAX_PATH_LEN })
        );

        // The bound applies to the stripped path, not the raw URI.
        let query = format!("/f?{}", "q".repeat(MAX_PATH_LEN));
        assert!(resolve(&base(), &query, MAX_PATH_LEN).is_ok());
    }

    #[test]
    fn test_dot_segments_normalized() {
        let resolved = resolve(&base(), "/a/./b//c", MAX_PATH_LEN).unwrap();
        assert_eq!(resolved, PathBuf::from("/srv/a/b/c"));

        let resolved = resolve(&base(), "/a/b/../c", MAX_PATH_LEN).unwrap();
        assert_eq!(resolved, PathBuf::from("/srv/a/c"));
    }

    #[test]
    fn test_traversal_rejected() {
        assert_eq!(
            resolve(&base(), "/../etc/passwd", MAX_PATH_LEN),
            Err(PathError::Traversal)
        );
        assert_eq!(
            resolve(&base(), "/a/../../etc/passwd", MAX_PATH_LEN),
            Err(PathError::Traversal)
        );
        // Climbing inside the base and back down is fine.
        assert!(resolve(&base(), "/a/../b", MAX_PATH_LEN).is_ok());
    }

    #[test]
    fn test_empty_path_rejected() {
        assert_eq!(resolve(&base(), "/", MAX_PATH_LEN), Err(PathError::Empty));
        assert_eq!(resolve(&base(), "", MAX_PATH_LEN), Err(PathError::Empty));
        assert_eq!(
            resolve(&base(), "/a/..", MAX_PATH_LEN),
            Err(PathError::Empty)
        );
    }

    #[test]
    fn test_resolve_file_rejects_trailing_slash() {
        assert_eq!(
            resolve_file(&base(), "/dir/", MAX_PATH_LEN),
            Err(PathError::IsDirectory)
        );
        assert!(resolve_file(&base(), "/dir/file.txt", MAX_PATH_LEN).is_ok());
    }

    #[test]
    fn test_resolve_file_trailing_slash_checked_after_strip() {
        // The query is stripped before the trailing-slash check.
        assert_eq!(
            resolve_file(&base(), "/dir/?x=1", MAX_PATH_LEN),
            Err(PathError::IsDirectory)
        );
    }
}
