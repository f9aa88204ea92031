//! Route path canonicalization

/// Canonicalizes a route path.
///
/// The result always starts with `/`, ends with `/`, and contains no run of
/// consecutive slashes. Idempotent: `normalize(normalize(p)) == normalize(p)`.
#[must_use]
pub fn normalize(path: &str) -> String {
    let mut normalized = String::with_capacity(path.len() + 2);
    normalized.push('/');
    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        normalized.push_str(segment);
        normalized.push('/');
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adds_leading_and_trailing_slash() {
        assert_eq!(normalize("users"), "/users/");
        assert_eq!(normalize("/users"), "/users/");
        assert_eq!(normalize("users/"), "/users/");
        assert_eq!(normalize("/users/"), "/users/");
    }

    #[test]
    fn test_collapses_slash_runs() {
        assert_eq!(normalize("/a//b/"), "/a/b/");
        assert_eq!(normalize("//a///b//c"), "/a/b/c/");
    }

    #[test]
    fn test_empty_path_is_root() {
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("///"), "/");
    }

    #[test]
    fn test_idempotent() {
        for path in ["users", "/a//b/", "", "///", "/api/v1/items", "a/b//c/"] {
            let once = normalize(path);
            assert_eq!(normalize(&once), once, "not idempotent for {path:?}");
        }
    }

    #[test]
    fn test_prefix_concatenation() {
        let prefix = normalize("/api/");
        let combined = normalize(&format!("{prefix}{}", "/nested/"));
        assert_eq!(combined, "/api/nested/");
    }
}
