//! Dotted-path helpers.

/// Converts a path vector to a dot-separated string.
///
/// For example, `["db", "tables", "list"]` becomes `"db.tables.list"`.
pub fn path_to_string(path: &[String]) -> String {
    path.join(".")
}

/// Parses a dot-separated path string into segments.
///
/// Empty input yields an empty path; empty segments are preserved so that
/// `"db..list"` fails resolution instead of silently skipping a hop.
pub fn string_to_path(s: &str) -> Vec<String> {
    if s.is_empty() {
        Vec::new()
    } else {
        s.split('.').map(String::from).collect()
    }
}

/// Joins a parent path and a name.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_to_string() {
        let path = vec!["db".to_string(), "tables".to_string(), "list".to_string()];
        assert_eq!(path_to_string(&path), "db.tables.list");
        assert_eq!(path_to_string(&[]), "");
    }

    #[test]
    fn test_string_to_path() {
        assert_eq!(string_to_path("db.tables"), vec!["db", "tables"]);
        assert_eq!(string_to_path("list"), vec!["list"]);
        assert!(string_to_path("").is_empty());
        assert_eq!(string_to_path("db..list"), vec!["db", "", "list"]);
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("", "db"), "db");
        assert_eq!(join_path("db", "tables"), "db.tables");
    }
}
