//! Managed media CDN backend (Cloudinary HTTP API).
//!
//! Uploads go through the signed upload endpoint; existence checks use the
//! Admin API with basic auth.

use std::fmt;
use std::io::Read;
use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, Response};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::error::{EngineError, TransferError};
use crate::key::RelativeKey;

use super::{read_chunk, DestinationStore};

pub const BACKEND_NAME: &str = "Cloudinary";

pub const DEFAULT_API_BASE_URL: &str = "https://api.cloudinary.com";

pub const DEFAULT_PREFIX: &str = "media";

/// Assets larger than this go up in several requests sharing one upload id.
pub const DEFAULT_CHUNK_SIZE: u64 = 20 * 1024 * 1024;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Account settings.
#[derive(Clone, PartialEq, Eq)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    /// Folder prepended to every public id; empty for none
    pub prefix: String,
    pub api_base_url: String,
    /// Largest body sent in a single upload request
    pub chunk_size: u64,
}

impl CloudinaryConfig {
    pub fn new(
        cloud_name: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        CloudinaryConfig {
            cloud_name: cloud_name.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            prefix: DEFAULT_PREFIX.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Public id for a key: the prefix followed by the whole key, extension
    /// included, so `a.jpg` and `a.png` stay distinct assets.
    pub fn public_id(&self, key: &RelativeKey) -> String {
        let prefix = self.prefix.trim_matches('/');
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", prefix, key)
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/v1_1/{}/{}",
            self.api_base_url.trim_end_matches('/'),
            self.cloud_name,
            path
        )
    }

    /// Admin API URL of one asset. Each public id segment is percent-encoded.
    fn resource_url(&self, resource_type: ResourceType, public_id: &str) -> Result<Url, String> {
        let base = self.endpoint(&format!("resources/{}/upload", resource_type.as_str()));
        let mut url = Url::parse(&base).map_err(|e| format!("invalid API URL {}: {}", base, e))?;
        url.path_segments_mut()
            .map_err(|_| format!("invalid API URL {}", base))?
            .extend(public_id.split('/'));
        Ok(url)
    }
}

impl fmt::Debug for CloudinaryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudinaryConfig")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("prefix", &self.prefix)
            .field("api_base_url", &self.api_base_url)
            .field("chunk_size", &self.chunk_size)
            .finish()
    }
}

/// Cloudinary asset class, chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Image,
    Video,
    Raw,
}

impl ResourceType {
    pub fn for_key(key: &RelativeKey) -> Self {
        let ext = match key.extension() {
            Some(ext) => ext.to_ascii_lowercase(),
            None => return ResourceType::Raw,
        };
        match ext.as_str() {
            "jpg" | "jpeg" | "png" | "gif" | "webp" | "bmp" | "tif" | "tiff" | "ico" | "svg"
            | "heic" | "heif" | "avif" | "psd" | "pdf" => ResourceType::Image,
            // Audio is stored as video.
            "mp4" | "webm" | "mov" | "avi" | "mkv" | "flv" | "wmv" | "m4v" | "ogv" | "mp3"
            | "wav" | "ogg" | "flac" | "aac" | "m4a" => ResourceType::Video,
            _ => ResourceType::Raw,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Image => "image",
            ResourceType::Video => "video",
            ResourceType::Raw => "raw",
        }
    }
}

/// Signature for a set of upload parameters: parameters sorted by name,
/// joined as `k=v` with `&`, followed by the API secret, SHA-256 hex.
///
/// Requests carrying it must also send `signature_algorithm=sha256`.
pub fn sign_params(params: &[(&str, &str)], api_secret: &str) -> String {
    let mut sorted = params.to_vec();
    sorted.sort_by(|a, b| a.0.cmp(b.0));
    let to_sign = sorted
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Deserialize)]
struct UploadResponse {
    bytes: Option<u64>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Signed fields shared by every request of one upload.
struct SignedUpload {
    public_id: String,
    timestamp: String,
    signature: String,
}

/// Cloudinary object store.
pub struct CloudinaryStore {
    client: Client,
    config: CloudinaryConfig,
}

impl CloudinaryStore {
    pub fn new(config: CloudinaryConfig) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| EngineError::BackendInit {
                backend: BACKEND_NAME,
                message: e.to_string(),
            })?;
        Ok(CloudinaryStore { client, config })
    }

    pub fn config(&self) -> &CloudinaryConfig {
        &self.config
    }

    fn backend_error(key: &RelativeKey, message: String) -> TransferError {
        TransferError::Backend {
            backend: BACKEND_NAME,
            key: key.to_string(),
            message,
        }
    }

    fn rejection(key: &RelativeKey, response: Response) -> TransferError {
        let status = response.status();
        let body = response.text().unwrap_or_default();
        let message = match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(parsed) => format!("{}: {}", status, parsed.error.message),
            Err(_) if body.is_empty() => status.to_string(),
            Err(_) => format!("{}: {}", status, body),
        };
        Self::backend_error(key, message)
    }

    fn sign(&self, key: &RelativeKey) -> SignedUpload {
        let public_id = self.config.public_id(key);
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let signature = sign_params(
            &[("public_id", public_id.as_str()), ("timestamp", timestamp.as_str())],
            &self.config.api_secret,
        );
        SignedUpload {
            public_id,
            timestamp,
            signature,
        }
    }

    /// POST one upload request. `range` carries the upload id and the
    /// `Content-Range` value when the asset is sent in chunks.
    fn post_upload(
        &self,
        key: &RelativeKey,
        url: &str,
        signed: &SignedUpload,
        body: Vec<u8>,
        range: Option<(&str, &str)>,
    ) -> Result<Response, TransferError> {
        let form = Form::new()
            .text("api_key", self.config.api_key.clone())
            .text("public_id", signed.public_id.clone())
            .text("timestamp", signed.timestamp.clone())
            .text("signature_algorithm", "sha256")
            .text("signature", signed.signature.clone())
            .part("file", Part::bytes(body).file_name(key.file_name().to_string()));

        let mut request = self.client.post(url).multipart(form);
        if let Some((upload_id, content_range)) = range {
            request = request
                .header("X-Unique-Upload-Id", upload_id)
                .header("Content-Range", content_range);
        }

        let response = request
            .send()
            .map_err(|e| Self::backend_error(key, e.to_string()))?;
        if !response.status().is_success() {
            return Err(Self::rejection(key, response));
        }
        Ok(response)
    }
}

fn stored_bytes(response: Response, sent: u64) -> u64 {
    response
        .json::<UploadResponse>()
        .ok()
        .and_then(|r| r.bytes)
        .unwrap_or(sent)
}

impl DestinationStore for CloudinaryStore {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn exists(&self, key: &RelativeKey) -> Result<bool, TransferError> {
        let resource_type = ResourceType::for_key(key);
        let url = self
            .config
            .resource_url(resource_type, &self.config.public_id(key))
            .map_err(|message| Self::backend_error(key, message))?;

        let response = self
            .client
            .get(url)
            .basic_auth(&self.config.api_key, Some(&self.config.api_secret))
            .send()
            .map_err(|e| Self::backend_error(key, e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(Self::rejection(key, response)),
        }
    }

    fn write(&self, key: &RelativeKey, content: &mut dyn Read) -> Result<u64, TransferError> {
        let read_error = |e| TransferError::Read {
            key: key.to_string(),
            source: e,
        };
        let chunk_size = self.config.chunk_size.max(1);
        let resource_type = ResourceType::for_key(key);
        let url = self
            .config
            .endpoint(&format!("{}/upload", resource_type.as_str()));
        let signed = self.sign(key);

        let mut chunk = read_chunk(content, chunk_size).map_err(read_error)?;
        let mut next = if chunk.len() as u64 == chunk_size {
            read_chunk(content, chunk_size).map_err(read_error)?
        } else {
            Vec::new()
        };

        if next.is_empty() {
            let size = chunk.len() as u64;
            let response = self.post_upload(key, &url, &signed, chunk, None)?;
            let stored = stored_bytes(response, size);
            debug!(public_id = %signed.public_id, bytes = stored, "uploaded to cloudinary");
            return Ok(stored);
        }

        let upload_id = Uuid::new_v4().simple().to_string();
        let mut offset = 0u64;
        loop {
            let len = chunk.len() as u64;
            let last = next.is_empty();
            // The total is only known once the final chunk has been read.
            let total = if last {
                (offset + len).to_string()
            } else {
                "-1".to_string()
            };
            let content_range = format!("bytes {}-{}/{}", offset, offset + len - 1, total);
            let response = self.post_upload(
                key,
                &url,
                &signed,
                chunk,
                Some((upload_id.as_str(), content_range.as_str())),
            )?;
            offset += len;

            if last {
                let stored = stored_bytes(response, offset);
                debug!(
                    public_id = %signed.public_id,
                    bytes = stored,
                    upload_id = %upload_id,
                    "uploaded to cloudinary in chunks"
                );
                return Ok(stored);
            }

            chunk = next;
            next = if chunk.len() as u64 == chunk_size {
                read_chunk(content, chunk_size).map_err(read_error)?
            } else {
                Vec::new()
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> RelativeKey {
        RelativeKey::parse(raw).expect("key")
    }

    #[test]
    fn test_sign_params_sorts_and_appends_secret() {
        let signature = sign_params(
            &[("timestamp", "1315060510"), ("public_id", "sample_image")],
            "abcd",
        );
        assert_eq!(
            signature,
            "e3c44b54e67a3ecc918f5d7236ca5faa36250ea8a8cd6cbabfd2d6bb2453acac"
        );
    }

    #[test]
    fn test_resource_type_from_extension() {
        assert_eq!(ResourceType::for_key(&key("img/a.JPG")), ResourceType::Image);
        assert_eq!(ResourceType::for_key(&key("docs/report.pdf")), ResourceType::Image);
        assert_eq!(ResourceType::for_key(&key("clips/intro.mp4")), ResourceType::Video);
        assert_eq!(ResourceType::for_key(&key("audio/song.mp3")), ResourceType::Video);
        assert_eq!(ResourceType::for_key(&key("data/export.csv")), ResourceType::Raw);
        assert_eq!(ResourceType::for_key(&key("LICENSE")), ResourceType::Raw);
    }

    #[test]
    fn test_public_id_keeps_extension() {
        let config = CloudinaryConfig::new("demo", "key", "secret");
        assert_eq!(config.public_id(&key("img/a.jpg")), "media/img/a.jpg");
        assert_ne!(config.public_id(&key("img/a.jpg")), config.public_id(&key("img/a.png")));
        assert_eq!(config.public_id(&key("data/export.csv")), "media/data/export.csv");
    }

    #[test]
    fn test_public_id_without_prefix() {
        let mut config = CloudinaryConfig::new("demo", "key", "secret");
        config.prefix = String::new();
        assert_eq!(config.public_id(&key("img/a.jpg")), "img/a.jpg");
    }

    #[test]
    fn test_resource_url_encodes_reserved_characters() {
        let config = CloudinaryConfig::new("demo", "key", "secret");
        let url = config
            .resource_url(ResourceType::Image, "media/img/what?#1.jpg")
            .expect("url");
        assert_eq!(
            url.as_str(),
            "https://api.cloudinary.com/v1_1/demo/resources/image/upload/media/img/what%3F%231.jpg"
        );
        assert_eq!(url.query(), None);
    }

    #[test]
    fn test_endpoint_tolerates_trailing_slash() {
        let mut config = CloudinaryConfig::new("demo", "key", "secret");
        config.api_base_url = "http://localhost:8080/".to_string();
        assert_eq!(
            config.endpoint("image/upload"),
            "http://localhost:8080/v1_1/demo/image/upload"
        );
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = CloudinaryConfig::new("demo", "key", "hunter2");
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
