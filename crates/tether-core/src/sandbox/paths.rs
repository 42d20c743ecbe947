//! Path normalization for sandbox decisions.
//!
//! Decisions are made on a canonical textual form: `~` expanded, separators
//! turned into `/`, lower-cased, `.`/`..` resolved lexically, duplicate and
//! trailing slashes removed. The filesystem is never consulted, so a path
//! that does not exist yet normalizes the same way as one that does.

/// Canonical textual form of `path` used for every gate comparison.
pub fn normalize_path(path: &str) -> String {
    let expanded = shellexpand::tilde(path.trim());
    let unified = expanded.replace('\\', "/").to_lowercase();

    let (root, rest) = split_root(&unified);
    let mut parts: Vec<&str> = Vec::new();
    for part in rest.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                // Popping past the root stays at the root
                if parts.last().is_some_and(|p| *p != "..") {
                    parts.pop();
                } else if root.is_empty() {
                    parts.push("..");
                }
            }
            other => parts.push(other),
        }
    }

    let joined = parts.join("/");
    match (root.as_str(), joined.is_empty()) {
        ("", true) => ".".to_string(),
        ("", false) => joined,
        (root, true) => root.to_string(),
        (root, false) => format!("{}{}", root, joined),
    }
}

/// Split off `/` or a drive root like `c:/`.
fn split_root(path: &str) -> (String, &str) {
    let bytes = path.as_bytes();
    if bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' {
        return (format!("{}/", &path[..2]), path[2..].trim_start_matches('/'));
    }
    if let Some(rest) = path.strip_prefix('/') {
        return ("/".to_string(), rest);
    }
    (String::new(), path)
}

/// Textual prefix test on normalized paths.
pub fn has_prefix(path: &str, prefix: &str) -> bool {
    path.starts_with(prefix)
}
