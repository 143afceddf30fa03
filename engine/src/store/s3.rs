//! Bucket-style backend for S3 and S3-compatible services.
//!
//! The AWS SDK is async. The store owns a current-thread runtime and blocks on
//! each request, so callers stay synchronous.

use std::fmt;
use std::io::Read;

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use tokio::runtime::Runtime;
use tracing::{debug, warn};

use crate::error::{EngineError, TransferError};
use crate::key::RelativeKey;

use super::{read_chunk, DestinationStore};

pub const BACKEND_NAME: &str = "AWS S3";

pub const DEFAULT_REGION: &str = "us-east-1";

/// Objects at least this large are sent as a multipart upload.
pub const DEFAULT_PART_SIZE: u64 = 8 * 1024 * 1024;

/// Smallest part S3 accepts for anything but the last part.
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Connection settings for a bucket.
#[derive(Clone, PartialEq, Eq)]
pub struct S3Config {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    pub region: String,
    /// Custom endpoint (MinIO, R2, ...); enables path-style addressing
    pub endpoint_url: Option<String>,
    /// Key prefix inside the bucket
    pub location: Option<String>,
    /// Multipart part size; raised to [`MIN_PART_SIZE`] if lower
    pub part_size: u64,
}

impl S3Config {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        bucket_name: impl Into<String>,
    ) -> Self {
        S3Config {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            bucket_name: bucket_name.into(),
            region: DEFAULT_REGION.to_string(),
            endpoint_url: None,
            location: None,
            part_size: DEFAULT_PART_SIZE,
        }
    }

    /// Object key inside the bucket for a relative key.
    pub fn object_key(&self, key: &RelativeKey) -> String {
        match self.location.as_deref().map(|l| l.trim_matches('/')) {
            Some(prefix) if !prefix.is_empty() => format!("{}/{}", prefix, key),
            _ => key.to_string(),
        }
    }
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("bucket_name", &self.bucket_name)
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .field("location", &self.location)
            .field("part_size", &self.part_size)
            .finish()
    }
}

/// S3 object store.
pub struct S3Store {
    client: Client,
    runtime: Runtime,
    config: S3Config,
}

impl S3Store {
    pub fn new(config: &S3Config) -> Result<Self, EngineError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| EngineError::BackendInit {
                backend: BACKEND_NAME,
                message: e.to_string(),
            })?;

        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "upload-media",
        );

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(credentials);

        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Ok(S3Store {
            client: Client::from_conf(builder.build()),
            runtime,
            config: config.clone(),
        })
    }

    fn backend_error(key: &RelativeKey, message: String) -> TransferError {
        TransferError::Backend {
            backend: BACKEND_NAME,
            key: key.to_string(),
            message,
        }
    }

    fn put_whole(&self, key: &RelativeKey, object_key: &str, body: Vec<u8>) -> Result<u64, TransferError> {
        let size = body.len() as u64;
        let request = self
            .client
            .put_object()
            .bucket(&self.config.bucket_name)
            .key(object_key)
            .body(ByteStream::from(body))
            .send();

        self.runtime
            .block_on(request)
            .map_err(|e| Self::backend_error(key, format!("put object failed: {}", DisplayErrorContext(&e))))?;
        Ok(size)
    }

    /// Multipart upload holding at most one part in memory. A failed upload
    /// is aborted so no orphaned parts are left in the bucket.
    fn put_parts(
        &self,
        key: &RelativeKey,
        object_key: &str,
        first: Vec<u8>,
        content: &mut dyn Read,
        part_size: u64,
    ) -> Result<u64, TransferError> {
        let created = self
            .runtime
            .block_on(
                self.client
                    .create_multipart_upload()
                    .bucket(&self.config.bucket_name)
                    .key(object_key)
                    .send(),
            )
            .map_err(|e| {
                Self::backend_error(key, format!("create multipart upload failed: {}", DisplayErrorContext(&e)))
            })?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| Self::backend_error(key, "multipart upload id missing".to_string()))?
            .to_string();

        let result = self.upload_parts(key, object_key, &upload_id, first, content, part_size);
        if result.is_err() {
            let abort = self
                .client
                .abort_multipart_upload()
                .bucket(&self.config.bucket_name)
                .key(object_key)
                .upload_id(&upload_id)
                .send();
            if let Err(e) = self.runtime.block_on(abort) {
                warn!(key = %key, error = %DisplayErrorContext(&e), "abort multipart upload failed");
            }
        }
        result
    }

    fn upload_parts(
        &self,
        key: &RelativeKey,
        object_key: &str,
        upload_id: &str,
        first: Vec<u8>,
        content: &mut dyn Read,
        part_size: u64,
    ) -> Result<u64, TransferError> {
        let mut parts = Vec::new();
        let mut total = 0u64;
        let mut part_number = 1;
        let mut chunk = first;

        loop {
            let len = chunk.len() as u64;
            let uploaded = self
                .runtime
                .block_on(
                    self.client
                        .upload_part()
                        .bucket(&self.config.bucket_name)
                        .key(object_key)
                        .upload_id(upload_id)
                        .part_number(part_number)
                        .body(ByteStream::from(chunk))
                        .send(),
                )
                .map_err(|e| {
                    Self::backend_error(
                        key,
                        format!("upload part {} failed: {}", part_number, DisplayErrorContext(&e)),
                    )
                })?;
            parts.push(
                CompletedPart::builder()
                    .set_e_tag(uploaded.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
            total += len;

            if len < part_size {
                break;
            }
            chunk = read_chunk(content, part_size).map_err(|e| TransferError::Read {
                key: key.to_string(),
                source: e,
            })?;
            if chunk.is_empty() {
                break;
            }
            part_number += 1;
        }

        let completed = CompletedMultipartUpload::builder().set_parts(Some(parts)).build();
        self.runtime
            .block_on(
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.config.bucket_name)
                    .key(object_key)
                    .upload_id(upload_id)
                    .multipart_upload(completed)
                    .send(),
            )
            .map_err(|e| {
                Self::backend_error(key, format!("complete multipart upload failed: {}", DisplayErrorContext(&e)))
            })?;
        Ok(total)
    }
}

impl DestinationStore for S3Store {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn exists(&self, key: &RelativeKey) -> Result<bool, TransferError> {
        let object_key = self.config.object_key(key);
        let request = self
            .client
            .head_object()
            .bucket(&self.config.bucket_name)
            .key(&object_key)
            .send();

        match self.runtime.block_on(request) {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_not_found() {
                    Ok(false)
                } else {
                    Err(Self::backend_error(
                        key,
                        format!("head object failed: {}", DisplayErrorContext(&service_err)),
                    ))
                }
            }
        }
    }

    fn write(&self, key: &RelativeKey, content: &mut dyn Read) -> Result<u64, TransferError> {
        let part_size = self.config.part_size.max(MIN_PART_SIZE);
        let object_key = self.config.object_key(key);

        let first = read_chunk(content, part_size).map_err(|e| TransferError::Read {
            key: key.to_string(),
            source: e,
        })?;
        let size = if (first.len() as u64) < part_size {
            self.put_whole(key, &object_key, first)?
        } else {
            self.put_parts(key, &object_key, first, content, part_size)?
        };

        debug!("uploaded {size} bytes to s3://{}/{object_key}", self.config.bucket_name);
        Ok(size)
    }
}
