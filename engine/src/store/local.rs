//! Local filesystem passthrough backend.

use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::TransferError;
use crate::fs_ops;
use crate::key::RelativeKey;

use super::DestinationStore;

pub const BACKEND_NAME: &str = "local filesystem";

/// Stores objects as files under a root directory.
///
/// When the root is the source tree itself every key already exists, so a
/// run against it skips everything.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem path for a key.
    pub fn path_for(&self, key: &RelativeKey) -> PathBuf {
        key.as_str()
            .split('/')
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }
}

impl DestinationStore for LocalStore {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn exists(&self, key: &RelativeKey) -> Result<bool, TransferError> {
        let path = self.path_for(key);
        path.try_exists().map_err(|e| TransferError::Check {
            key: key.to_string(),
            source: e,
        })
    }

    fn write(&self, key: &RelativeKey, content: &mut dyn Read) -> Result<u64, TransferError> {
        fs_ops::write_stream_to_file(content, &self.path_for(key)).map_err(|e| {
            TransferError::Write {
                key: key.to_string(),
                source: e,
            }
        })
    }
}
