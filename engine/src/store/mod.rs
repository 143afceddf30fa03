//! Destination object stores.
//!
//! The sync loop only ever sees a `&dyn DestinationStore`. Which concrete
//! backend sits behind it is decided once at startup by resolving a
//! [`Backend`] from the settings.

use std::fmt;
use std::io::{self, Read};
use std::path::PathBuf;

use crate::error::{EngineError, TransferError};
use crate::key::RelativeKey;

pub mod cloudinary;
pub mod local;
pub mod memory;
pub mod s3;

pub use cloudinary::{CloudinaryConfig, CloudinaryStore};
pub use local::LocalStore;
pub use memory::MemoryStore;
pub use s3::{S3Config, S3Store};

/// Key-addressed object store the sync engine writes into.
///
/// Implementations are called sequentially from a single thread.
pub trait DestinationStore {
    /// Short human-readable backend name.
    fn name(&self) -> &str;

    /// Whether an object already exists under `key`.
    fn exists(&self, key: &RelativeKey) -> Result<bool, TransferError>;

    /// Store `content` under `key`, returning the number of bytes written.
    fn write(&self, key: &RelativeKey, content: &mut dyn Read) -> Result<u64, TransferError>;
}

/// Read up to `limit` bytes. A shorter chunk means the input is exhausted.
pub(crate) fn read_chunk(content: &mut dyn Read, limit: u64) -> io::Result<Vec<u8>> {
    let mut chunk = Vec::new();
    content.take(limit).read_to_end(&mut chunk)?;
    Ok(chunk)
}

/// The destination backend chosen by configuration precedence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backend {
    /// Managed media CDN
    Cloudinary(CloudinaryConfig),
    /// Bucket-style object storage
    S3(S3Config),
    /// Local filesystem directory (no persistence on ephemeral hosts)
    Local(PathBuf),
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::Cloudinary(_) => cloudinary::BACKEND_NAME,
            Backend::S3(_) => s3::BACKEND_NAME,
            Backend::Local(_) => local::BACKEND_NAME,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, Backend::Local(_))
    }

    /// Construct the store for this backend.
    pub fn open(&self) -> Result<Box<dyn DestinationStore>, EngineError> {
        Ok(match self {
            Backend::Cloudinary(config) => Box::new(CloudinaryStore::new(config.clone())?),
            Backend::S3(config) => Box::new(S3Store::new(config)?),
            Backend::Local(root) => Box::new(LocalStore::new(root)),
        })
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Cloudinary(config) => write!(f, "{} (cloud: {})", self.name(), config.cloud_name),
            Backend::S3(config) => write!(f, "{} (bucket: {})", self.name(), config.bucket_name),
            Backend::Local(root) => write!(f, "{} ({})", self.name(), root.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_display_names_target() {
        let local = Backend::Local(PathBuf::from("media"));
        assert_eq!(local.to_string(), "local filesystem (media)");
        assert!(local.is_local());

        let s3 = Backend::S3(S3Config::new("AKIA", "secret", "uploads"));
        assert_eq!(s3.to_string(), "AWS S3 (bucket: uploads)");
        assert!(!s3.is_local());
    }

    #[test]
    fn test_open_local_backend() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = Backend::Local(temp_dir.path().to_path_buf())
            .open()
            .expect("open");
        assert_eq!(store.name(), "local filesystem");
    }

    #[test]
    fn test_read_chunk_stops_at_limit_then_drains() {
        let mut content: &[u8] = b"0123456789";
        assert_eq!(read_chunk(&mut content, 4).expect("read"), b"0123");
        assert_eq!(read_chunk(&mut content, 4).expect("read"), b"4567");
        assert_eq!(read_chunk(&mut content, 4).expect("read"), b"89");
        assert!(read_chunk(&mut content, 4).expect("read").is_empty());
    }
}
