//! Helpers for `/`-separated dataset paths.

/// Joins `base` and `rel` with exactly one separator between them.
pub fn join_path(base: &str, rel: &str) -> String {
    let base = base.trim_end_matches('/');
    let rel = rel.trim_start_matches('/');
    match (base.is_empty(), rel.is_empty()) {
        (true, _) => rel.to_string(),
        (false, true) => base.to_string(),
        (false, false) => format!("{base}/{rel}"),
    }
}

/// Collapses repeated separators and drops a trailing one, keeping a leading
/// separator if present.
pub fn normalize(path: &str) -> String {
    let absolute = path.starts_with('/');
    let body = split_segments(path).join("/");
    if absolute {
        format!("/{body}")
    } else {
        body
    }
}

/// Path of `path` relative to `base_dir`, or `None` when it lies outside it.
pub fn strip_base_dir(path: &str, base_dir: &str) -> Option<String> {
    let path = normalize(path);
    let base = normalize(base_dir);
    if base.is_empty() || base == "/" {
        return Some(path.trim_start_matches('/').to_string());
    }
    if path == base {
        return Some(String::new());
    }
    path.strip_prefix(&base)
        .and_then(|rest| rest.strip_prefix('/'))
        .map(str::to_string)
}

pub fn split_segments(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Directory segments of a relative file path (everything but the file name).
pub fn parent_segments(path: &str) -> Vec<String> {
    let mut segments = split_segments(path);
    segments.pop();
    segments
}

pub fn basename(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
}

/// Parent directory of `path`; empty for a bare name.
pub fn dirname(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(i) => trimmed[..i].to_string(),
        None => String::new(),
    }
}

/// True when any component of the relative path starts with one of `prefixes`.
pub fn has_ignored_prefix(rel: &str, prefixes: &[String]) -> bool {
    split_segments(rel)
        .iter()
        .any(|seg| prefixes.iter().any(|p| !p.is_empty() && seg.starts_with(p.as_str())))
}
