#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScanRequest {
    /// Image paths relative to the server's image root.
    pub image_paths: Vec<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatusResponse {
    pub state: String,
    pub loads: usize,
    pub classes: usize,
}

/// MIME type implied by a file extension, for any format the decoder knows.
pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    image::ImageFormat::from_path(path)
        .ok()
        .map(|format| format.to_mime_type())
}

/// Joins a client supplied path onto `root`.
///
/// Absolute paths and `..` components are refused so the result never names
/// a file outside `root`. Symlinks placed inside `root` are still followed.
pub fn resolve_under(root: &Path, requested: &Path) -> Option<PathBuf> {
    let mut resolved = root.to_path_buf();
    for component in requested.components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    (resolved != root).then_some(resolved)
}
