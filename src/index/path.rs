// Helpers for `/`-separated cache-relative paths.

use std::path::{Path, PathBuf};

/// Joins a folder and a child name. The root folder is `""`.
pub fn join(folder: &str, name: &str) -> String {
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", folder.trim_end_matches('/'), name)
    }
}

/// Folder containing `rel`; `""` for top-level entries.
pub fn parent(rel: &str) -> &str {
    let rel = rel.trim_matches('/');
    match rel.rfind('/') {
        Some(idx) => &rel[..idx],
        None => "",
    }
}

/// Last segment of `rel`.
pub fn file_name(rel: &str) -> &str {
    let rel = rel.trim_matches('/');
    match rel.rfind('/') {
        Some(idx) => &rel[idx + 1..],
        None => rel,
    }
}

/// Absolute location of `rel` under `root`.
pub fn physical(root: &Path, rel: &str) -> PathBuf {
    let mut out = root.to_path_buf();
    for segment in rel.split('/').filter(|s| !s.is_empty()) {
        out.push(segment);
    }
    out
}
