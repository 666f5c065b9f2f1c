//! POSIX path splitting.
//!
//! No normalization happens here: `.` and `..` pass through as ordinary
//! names, and consecutive slashes yield empty components (which then fail
//! resolution with ENOENT).

/// Split a path into its name components.
///
/// `/` maps to the empty sequence; one leading and one trailing slash are
/// stripped; the rest is split on `/`.
pub fn split(path: &str) -> Vec<String> {
    if path == "/" {
        return Vec::new();
    }

    let path = path.strip_prefix('/').unwrap_or(path);
    let path = path.strip_suffix('/').unwrap_or(path);

    path.split('/').map(str::to_string).collect()
}

/// Split a path into its parent's components and the final name.
///
/// Returns `None` when the path names the root (no final component exists).
pub fn split_parent(path: &str) -> Option<(Vec<String>, String)> {
    let mut components = split(path);
    let name = components.pop()?;
    Some((components, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_is_empty() {
        assert!(split("/").is_empty());
    }

    #[test]
    fn plain_components() {
        assert_eq!(split("/tmp/tmp/tmp"), ["tmp", "tmp", "tmp"]);
        assert_eq!(split("/a"), ["a"]);
    }

    #[test]
    fn leading_and_trailing_slash_stripped() {
        assert_eq!(split("/a/b/"), ["a", "b"]);
        assert_eq!(split("a/b"), ["a", "b"]);
    }

    #[test]
    fn consecutive_slashes_keep_empty_components() {
        assert_eq!(split("/a//b"), ["a", "", "b"]);
    }

    #[test]
    fn dot_components_pass_through() {
        assert_eq!(split("/a/./.."), ["a", ".", ".."]);
    }

    #[test]
    fn split_parent_peels_final_name() {
        assert_eq!(split_parent("/a/b"), Some((vec!["a".to_string()], "b".to_string())));
        assert_eq!(split_parent("/a"), Some((vec![], "a".to_string())));
        assert_eq!(split_parent("/"), None);
    }
}
