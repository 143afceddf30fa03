//! In-memory backend, for dry runs and tests.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Read;
use std::sync::{Mutex, MutexGuard};

use crate::error::TransferError;
use crate::key::RelativeKey;

use super::DestinationStore;

pub const BACKEND_NAME: &str = "memory";

#[derive(Debug, Default)]
struct Inner {
    objects: BTreeMap<String, Vec<u8>>,
    failing_writes: BTreeSet<String>,
    failing_checks: BTreeSet<String>,
    operations: usize,
}

/// Object store backed by a map, with optional injected failures.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed an object.
    pub fn with_object(self, key: &str, content: &[u8]) -> Self {
        self.lock().objects.insert(key.to_string(), content.to_vec());
        self
    }

    /// Make every write to `key` fail.
    pub fn fail_writes_for(self, key: &str) -> Self {
        self.lock().failing_writes.insert(key.to_string());
        self
    }

    /// Make every existence check for `key` fail.
    pub fn fail_checks_for(self, key: &str) -> Self {
        self.lock().failing_checks.insert(key.to_string());
        self
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().objects.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `exists` and `write` calls received.
    pub fn operation_count(&self) -> usize {
        self.lock().operations
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A poisoned map is still consistent: every mutation is a single insert.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DestinationStore for MemoryStore {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn exists(&self, key: &RelativeKey) -> Result<bool, TransferError> {
        let mut inner = self.lock();
        inner.operations += 1;
        if inner.failing_checks.contains(key.as_str()) {
            return Err(TransferError::Backend {
                backend: BACKEND_NAME,
                key: key.to_string(),
                message: "injected existence check failure".to_string(),
            });
        }
        Ok(inner.objects.contains_key(key.as_str()))
    }

    fn write(&self, key: &RelativeKey, content: &mut dyn Read) -> Result<u64, TransferError> {
        let mut inner = self.lock();
        inner.operations += 1;
        if inner.failing_writes.contains(key.as_str()) {
            return Err(TransferError::Backend {
                backend: BACKEND_NAME,
                key: key.to_string(),
                message: "injected write failure".to_string(),
            });
        }

        let mut body = Vec::new();
        content
            .read_to_end(&mut body)
            .map_err(|e| TransferError::Read {
                key: key.to_string(),
                source: e,
            })?;
        let len = body.len() as u64;
        inner.objects.insert(key.to_string(), body);
        Ok(len)
    }
}
