//! Slash-separated logical paths as stored in the `files` table.

pub const ROOT: &str = "/";

/// Lexically clean `path` into an absolute path without a trailing slash.
///
/// Empty input is root, `.` segments vanish and `..` never climbs above root.
pub fn clean(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }

    if parts.is_empty() {
        ROOT.to_string()
    } else {
        format!("/{}", parts.join("/"))
    }
}

/// Split a path into its cleaned parent and leaf name. Root splits into (`/`, ``).
pub fn split(path: &str) -> (String, String) {
    let cleaned = clean(path);
    match cleaned.rfind('/') {
        Some(0) => (ROOT.to_string(), cleaned[1..].to_string()),
        Some(idx) => (cleaned[..idx].to_string(), cleaned[idx + 1..].to_string()),
        None => (ROOT.to_string(), cleaned),
    }
}

pub fn parent(path: &str) -> String {
    split(path).0
}

pub fn join(parent: &str, name: &str) -> String {
    if name.is_empty() {
        return clean(parent);
    }
    clean(&format!("{}/{}", parent, name))
}

pub fn is_root(path: &str) -> bool {
    clean(path) == ROOT
}

/// Every non-root prefix of `path`, shortest first
pub fn prefixes(path: &str) -> Vec<String> {
    let cleaned = clean(path);
    let mut current = String::new();
    let mut result = Vec::new();
    for part in cleaned.split('/').filter(|p| !p.is_empty()) {
        current.push('/');
        current.push_str(part);
        result.push(current.clone());
    }
    result
}

/// Whether `path` lies strictly below `ancestor`
pub fn is_descendant(path: &str, ancestor: &str) -> bool {
    let path = clean(path);
    let ancestor = clean(ancestor);
    if ancestor == ROOT {
        return path != ROOT;
    }
    path.len() > ancestor.len()
        && path.starts_with(&ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}
