//! Canonicalization of virtual paths.
//!
//! `normalize` is pure and total: every input string maps to some canonical
//! path, and the function never fails. Traversal above the root is clamped
//! rather than rejected, which is what neutralizes `..`-based escapes —
//! there is no "too many `..`" error to route around.

/// A canonical virtual path: always starts with `/`, contains no `.` or
/// `..` segments, no empty segments (other than the leading root), and no
/// backslashes.
pub fn normalize(input: &str) -> String {
    let replaced = input.replace('\\', "/");

    let mut stack: Vec<&str> = Vec::new();
    for segment in replaced.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }

    if stack.is_empty() {
        "/".to_string()
    } else {
        let mut out = String::with_capacity(replaced.len());
        for segment in stack {
            out.push('/');
            out.push_str(segment);
        }
        out
    }
}

/// Splits a canonical path into its non-empty segments, e.g. `/a/b` -> `["a", "b"]`.
/// The root path `/` yields an empty slice.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Returns the basename (last segment) of a canonical path, with no leading slash.
/// The root path yields an empty string.
pub fn basename(path: &str) -> &str {
    segments(path).last().copied().unwrap_or("")
}

/// Returns the canonical parent of a path. The parent of `/` is `/`.
pub fn parent(path: &str) -> String {
    let segs = segments(path);
    if segs.len() <= 1 {
        return "/".to_string();
    }
    let mut out = String::new();
    for segment in &segs[..segs.len() - 1] {
        out.push('/');
        out.push_str(segment);
    }
    out
}

/// Joins a canonical prefix with a relative (possibly traversal-laden)
/// suffix, normalizing the result. Used when mounting a subtree (e.g.
/// `add_source_dir`) at a given virtual prefix.
pub fn join(prefix: &str, suffix: &str) -> String {
    if suffix.is_empty() {
        return normalize(prefix);
    }
    let mut combined = String::with_capacity(prefix.len() + suffix.len() + 1);
    combined.push_str(prefix);
    if !prefix.ends_with('/') {
        combined.push('/');
    }
    combined.push_str(suffix);
    normalize(&combined)
}
