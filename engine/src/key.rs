//! Destination object keys.
//!
//! A `RelativeKey` is a source file's path relative to the source root,
//! joined with `/` regardless of the platform that produced it.

use std::fmt;
use std::path::{Component, Path};

use serde::Serialize;

use crate::error::EngineError;

/// Platform-independent object key, e.g. `img/2024/a.jpg`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RelativeKey(String);

impl RelativeKey {
    /// Build the key for `path` by stripping `root` and normalizing separators.
    pub fn from_paths(root: &Path, path: &Path) -> Result<Self, EngineError> {
        let relative = path.strip_prefix(root).map_err(|_| EngineError::InvalidPath {
            path: path.to_path_buf(),
            reason: format!("not under {}", root.display()),
        })?;

        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(name) => {
                    let name = name.to_str().ok_or_else(|| EngineError::InvalidPath {
                        path: path.to_path_buf(),
                        reason: "path is not valid UTF-8".to_string(),
                    })?;
                    segments.push(name);
                }
                Component::CurDir => {}
                _ => {
                    return Err(EngineError::InvalidPath {
                        path: path.to_path_buf(),
                        reason: "unexpected path component".to_string(),
                    })
                }
            }
        }

        normalize(&segments.join("/")).ok_or_else(|| EngineError::InvalidPath {
            path: path.to_path_buf(),
            reason: "path does not name a file under the root".to_string(),
        })
    }

    /// Best-effort key for reporting paths that have no valid key.
    pub(crate) fn from_paths_lossy(root: &Path, path: &Path) -> Self {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let raw = relative.to_string_lossy();
        normalize(&raw).unwrap_or_else(|| RelativeKey(raw.into_owned()))
    }

    /// Parse a raw key string, accepting either separator.
    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        normalize(raw).ok_or_else(|| EngineError::InvalidPath {
            path: raw.into(),
            reason: "not a valid relative key".to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last segment of the key.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Extension of the last segment, without the dot. Dotfiles have none.
    pub fn extension(&self) -> Option<&str> {
        match self.file_name().rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
            _ => None,
        }
    }
}

fn normalize(raw: &str) -> Option<RelativeKey> {
    let mut segments = Vec::new();
    for segment in raw.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => return None,
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        return None;
    }
    Some(RelativeKey(segments.join("/")))
}

impl fmt::Display for RelativeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RelativeKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
