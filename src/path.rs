//! Joining request paths onto the client root.
//!
//! Paths handed to the client are plain, unescaped and relative to the root
//! URL. Every segment is percent-escaped when it is appended, so a name such as
//! `my file #1.txt` travels as `my%20file%20%231.txt`.

use crate::{Error, Result};
use url::Url;

/// Joins `path` onto `root` and percent-escapes each segment.
///
/// A trailing slash on `path` is preserved, which is how collections are
/// addressed. Empty and `.` segments are dropped and `..` removes the segment
/// before it. The result never climbs above the root.
///
/// # Examples
///
/// ```
/// use url::Url;
///
/// let root = Url::parse("http://localhost/dav/").unwrap();
/// let url = davcall::path::join(&root, "a b/c.txt").unwrap();
/// assert_eq!(url.as_str(), "http://localhost/dav/a%20b/c.txt");
/// ```
pub fn join(root: &Url, path: &str) -> Result<Url> {
    let segments = clean(path);

    let mut url = root.clone();
    if segments.is_empty() {
        return Ok(url);
    }

    {
        let mut out = url.path_segments_mut().map_err(|()| {
            Error::ConfigurationError(format!("Root URL cannot carry a path: {}", root))
        })?;
        out.pop_if_empty();
        out.extend(segments);
        if path.ends_with('/') {
            out.push("");
        }
    }

    Ok(url)
}

/// Returns the parent collection of `path`, or `None` when the parent is the
/// root (or there is no parent at all).
///
/// # Examples
///
/// ```
/// use davcall::path::parent_collection;
///
/// assert_eq!(parent_collection("a/b/file.txt"), Some("a/b"));
/// assert_eq!(parent_collection("/file.txt"), None);
/// assert_eq!(parent_collection("file.txt"), None);
/// ```
pub fn parent_collection(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    let idx = trimmed.rfind('/')?;
    let parent = trimmed[..idx].trim_end_matches('/');
    if parent.is_empty() {
        None
    } else {
        Some(parent)
    }
}

/// Lists the collections leading to and including `path`, outermost first,
/// each as an absolute collection path with a trailing slash.
pub(crate) fn ancestors(path: &str) -> Vec<String> {
    let mut sub = String::from("/");
    clean(path)
        .into_iter()
        .map(|segment| {
            sub.push_str(segment);
            sub.push('/');
            sub.clone()
        })
        .collect()
}

/// Splits `path` into segments with `.` and `..` resolved, clamped at the root.
fn clean(path: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            segment => segments.push(segment),
        }
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> Url {
        Url::parse("http://localhost:8080/dav/").unwrap()
    }

    #[test]
    fn test_join_relative_and_absolute() {
        assert_eq!(
            join(&root(), "a/b.txt").unwrap().as_str(),
            "http://localhost:8080/dav/a/b.txt"
        );
        assert_eq!(
            join(&root(), "/a/b.txt").unwrap().as_str(),
            "http://localhost:8080/dav/a/b.txt"
        );
    }

    #[test]
    fn test_join_keeps_collection_slash() {
        assert_eq!(
            join(&root(), "/a/b/").unwrap().as_str(),
            "http://localhost:8080/dav/a/b/"
        );
    }

    #[test]
    fn test_join_root() {
        assert_eq!(join(&root(), "").unwrap(), root());
        assert_eq!(join(&root(), "/").unwrap(), root());
    }

    #[test]
    fn test_join_escapes_segments() {
        assert_eq!(
            join(&root(), "100% done/#1?.txt").unwrap().as_str(),
            "http://localhost:8080/dav/100%25%20done/%231%3F.txt"
        );
    }

    #[test]
    fn test_join_resolves_dot_segments() {
        assert_eq!(
            join(&root(), "a/../b").unwrap().as_str(),
            "http://localhost:8080/dav/b"
        );
        assert_eq!(
            join(&root(), "./a/./b/../c/").unwrap().as_str(),
            "http://localhost:8080/dav/a/c/"
        );
        assert_eq!(
            join(&root(), "../../etc/passwd").unwrap().as_str(),
            "http://localhost:8080/dav/etc/passwd"
        );
        assert_eq!(join(&root(), "a/..").unwrap(), root());
    }

    #[test]
    fn test_join_root_without_slash() {
        let root = Url::parse("http://localhost/dav").unwrap();
        assert_eq!(
            join(&root, "x").unwrap().as_str(),
            "http://localhost/dav/x"
        );
    }

    #[test]
    fn test_parent_collection() {
        assert_eq!(parent_collection("a/b/file.txt"), Some("a/b"));
        assert_eq!(parent_collection("/a/b/"), Some("/a"));
        assert_eq!(parent_collection("/a"), None);
        assert_eq!(parent_collection("a"), None);
        assert_eq!(parent_collection("/"), None);
        assert_eq!(parent_collection(""), None);
    }

    #[test]
    fn test_ancestors() {
        assert_eq!(ancestors("a/b"), vec!["/a/", "/a/b/"]);
        assert_eq!(ancestors("/a//b/"), vec!["/a/", "/a/b/"]);
        assert!(ancestors("/").is_empty());
        assert_eq!(ancestors("a/../b/c"), vec!["/b/", "/b/c/"]);
    }
}
