//! In-container path helpers
//!
//! EPUB hrefs are relative to the file that contains them. These helpers
//! normalize them into container paths without touching the filesystem.

/// Split an href on the first `#` into `(file, fragment)`
pub fn split_fragment(href: &str) -> (&str, &str) {
    href.split_once('#').unwrap_or((href, ""))
}

/// Directory part of a container path (empty for top-level files)
pub fn parent_dir(path: &str) -> &str {
    path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("")
}

/// Final path segment
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Resolve `href` against `base_dir`, collapsing `.` and `..` segments
///
/// A leading `/` makes the href container-absolute. `..` never escapes the
/// container root.
pub fn resolve_href(base_dir: &str, href: &str) -> String {
    let href = href.replace('\\', "/");
    let joined = if href.starts_with('/') || base_dir.is_empty() {
        href
    } else {
        format!("{}/{}", base_dir, href)
    };

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Express a container path relative to `dir` when it lives underneath it
pub fn strip_dir<'a>(dir: &str, path: &'a str) -> &'a str {
    if dir.is_empty() {
        return path;
    }
    path.strip_prefix(dir)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(path)
}
