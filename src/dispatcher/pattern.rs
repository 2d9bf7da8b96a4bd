//! Pattern Matcher (§4.8): binds `{param}` segments of a route pattern
//! against an actual request path, plus a small regex helper the dispatcher
//! uses for the `{param}`-in-virtual-path sibling-match fallback (§4.9 step
//! 2), which is a different operation over the same `{...}` syntax.

use std::collections::HashMap;

use regex::Regex;

/// Matches `pattern` (optionally prefixed with an HTTP method and a space,
/// e.g. `"GET /widgets/{id}"`) against `path`. Segment counts must agree;
/// a `{name}` pattern segment binds the corresponding path segment unless
/// `name` is the reserved `$`, which matches without binding anything.
pub fn match_pattern(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern = strip_method_prefix(pattern);

    let pattern_segments: Vec<&str> = segments(pattern);
    let path_segments: Vec<&str> = segments(path);

    if pattern_segments.len() != path_segments.len() {
        return None;
    }

    let mut params = HashMap::new();
    for (p, actual) in pattern_segments.iter().zip(path_segments.iter()) {
        if let Some(name) = p.strip_prefix('{').and_then(|rest| rest.strip_suffix('}')) {
            if name != "$" {
                params.insert(name.to_string(), (*actual).to_string());
            }
        } else if p != actual {
            return None;
        }
    }

    Some(params)
}

fn segments(s: &str) -> Vec<&str> {
    s.trim_matches('/').split('/').filter(|s| !s.is_empty()).collect()
}

fn strip_method_prefix(pattern: &str) -> &str {
    match pattern.split_once(' ') {
        Some((method, rest)) if !method.is_empty() && method.chars().all(|c| c.is_ascii_uppercase()) => {
            rest.trim_start()
        }
        _ => pattern,
    }
}

/// Builds a regex matching a filename, treating each `{param}` placeholder
/// as a wildcard for exactly one path segment's worth of characters. Used
/// to find the sibling file an unresolved `{param}`-bearing virtual path
/// refers to by scanning its containing directory (§4.9 step 2).
pub fn template_to_regex(name: &str) -> Regex {
    let mut out = String::from("^");
    let mut rest = name;

    while let Some(start) = rest.find('{') {
        out.push_str(&regex::escape(&rest[..start]));
        let after_brace = &rest[start + 1..];
        match after_brace.find('}') {
            Some(end) => {
                out.push_str("[^/]+");
                rest = &after_brace[end + 1..];
            }
            None => {
                out.push_str(&regex::escape(&rest[start..]));
                rest = "";
                break;
            }
        }
    }
    out.push_str(&regex::escape(rest));
    out.push('$');

    Regex::new(&out).expect("template-derived regex is always well-formed")
}
