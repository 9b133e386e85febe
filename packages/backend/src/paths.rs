//! Lexical rules for settings keys, dirs, and paths.
//!
//! Names in a settings backend are canonical strings; nothing here
//! normalizes, trims, or percent-decodes. The three predicates are total,
//! pure, and run in O(n) over the raw bytes. `/` is an ordinary byte; no
//! Unicode segmentation is involved.

/// Check if `s` is a valid path.
///
/// Paths must start with `/` and must not contain `//`. A path is either a
/// key or a dir; use [`is_key`] and [`is_dir`] to tell them apart.
///
/// # Examples
///
/// ```rust
/// use prefstore_backend::paths::is_path;
///
/// assert!(is_path("/"));
/// assert!(is_path("/a/b"));
/// assert!(is_path("/a/b/"));
/// assert!(!is_path(""));
/// assert!(!is_path("a/b"));
/// assert!(!is_path("/a//b"));
/// ```
pub fn is_path(s: &str) -> bool {
    let bytes = s.as_bytes();

    if bytes.first() != Some(&b'/') {
        return false;
    }

    !bytes.windows(2).any(|pair| pair == b"//")
}

/// Check if `s` is a valid key.
///
/// Keys must start with `/`, must not contain `//`, and must not end with
/// `/`. A key is the potential location of a single value.
///
/// `/a`, `/a/b` and `/a/b/c` are keys. ``, `/`, `a`, `//a/b` and `/a/` are
/// not.
pub fn is_key(s: &str) -> bool {
    is_path(s) && !s.ends_with('/')
}

/// Check if `s` is a valid dir.
///
/// Dirs must start and end with `/` and must not contain `//`. A dir names
/// a subtree: it is a lexical prefix of every key and dir beneath it.
///
/// `/`, `/a/` and `/a/b/` are dirs. ``, `a/`, `/a` and `/a//b/` are not.
pub fn is_dir(s: &str) -> bool {
    is_path(s) && s.ends_with('/')
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn keys_accepted() {
        assert!(is_key("/a"));
        assert!(is_key("/a/b"));
        assert!(is_key("/a/b/c"));
        assert!(is_key("/with spaces/and:colons"));
    }

    #[test]
    fn keys_rejected() {
        assert!(!is_key(""));
        assert!(!is_key("/"));
        assert!(!is_key("a"));
        assert!(!is_key("a/b"));
        assert!(!is_key("//a/b"));
        assert!(!is_key("/a//b"));
        assert!(!is_key("/a/"));
    }

    #[test]
    fn dirs_accepted() {
        assert!(is_dir("/"));
        assert!(is_dir("/a/"));
        assert!(is_dir("/a/b/"));
    }

    #[test]
    fn dirs_rejected() {
        assert!(!is_dir(""));
        assert!(!is_dir("a/"));
        assert!(!is_dir("a/b/"));
        assert!(!is_dir("//a/b/"));
        assert!(!is_dir("/a//b/"));
        assert!(!is_dir("/a"));
    }

    #[test]
    fn paths_accept_both_forms() {
        assert!(is_path("/a"));
        assert!(is_path("/a/"));
        assert!(!is_path(""));
        assert!(!is_path("relative"));
    }

    #[test]
    fn dir_is_prefix_of_contained_key() {
        let dir = "/a/b/";
        let key = "/a/b/c";
        assert!(is_dir(dir));
        assert!(is_key(key));
        assert!(key.starts_with(dir));
    }

    proptest! {
        // A string is never both a key and a dir, and being either implies
        // being a path.
        #[test]
        fn key_dir_path_algebra(s in "[/a-c]{0,8}") {
            prop_assert!(!(is_key(&s) && is_dir(&s)));
            if is_key(&s) || is_dir(&s) {
                prop_assert!(is_path(&s));
            }
            if is_path(&s) {
                prop_assert!(is_key(&s) ^ is_dir(&s));
            }
        }
    }
}
