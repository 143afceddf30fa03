//! Settings and backend resolution.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! environment variables. The destination backend is resolved once from the
//! final settings.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::error::EngineError;
use crate::store::{cloudinary, s3, Backend, CloudinaryConfig, S3Config};

pub const DEFAULT_MEDIA_ROOT: &str = "media";

/// Explicit backend choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Cloudinary,
    S3,
    Local,
}

impl FromStr for BackendKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cloudinary" => Ok(BackendKind::Cloudinary),
            "s3" | "aws" => Ok(BackendKind::S3),
            "local" | "filesystem" => Ok(BackendKind::Local),
            other => Err(EngineError::UnknownBackend {
                name: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Cloudinary => write!(f, "cloudinary"),
            BackendKind::S3 => write!(f, "s3"),
            BackendKind::Local => write!(f, "local"),
        }
    }
}

/// Cloudinary credentials as found in the environment or config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CloudinarySettings {
    pub cloud_name: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub prefix: Option<String>,
    pub api_base_url: Option<String>,
}

impl CloudinarySettings {
    /// Names of required variables that are unset.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !is_set(&self.cloud_name) {
            missing.push("CLOUDINARY_CLOUD_NAME");
        }
        if !is_set(&self.api_key) {
            missing.push("CLOUDINARY_API_KEY");
        }
        if !is_set(&self.api_secret) {
            missing.push("CLOUDINARY_API_SECRET");
        }
        missing
    }

    fn to_config(&self) -> Result<CloudinaryConfig, EngineError> {
        match (&self.cloud_name, &self.api_key, &self.api_secret) {
            (Some(cloud), Some(key), Some(secret)) if self.missing().is_empty() => {
                let mut config = CloudinaryConfig::new(cloud, key, secret);
                if let Some(prefix) = &self.prefix {
                    config.prefix = prefix.clone();
                }
                if let Some(url) = &self.api_base_url {
                    config.api_base_url = url.clone();
                }
                Ok(config)
            }
            _ => Err(EngineError::MissingCredentials {
                backend: cloudinary::BACKEND_NAME,
                missing: self.missing(),
            }),
        }
    }
}

/// Bucket credentials as found in the environment or config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct S3Settings {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub bucket_name: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub location: Option<String>,
}

impl S3Settings {
    /// Names of required variables that are unset.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if !is_set(&self.access_key_id) {
            missing.push("AWS_ACCESS_KEY_ID");
        }
        if !is_set(&self.secret_access_key) {
            missing.push("AWS_SECRET_ACCESS_KEY");
        }
        if !is_set(&self.bucket_name) {
            missing.push("AWS_STORAGE_BUCKET_NAME");
        }
        missing
    }

    fn to_config(&self) -> Result<S3Config, EngineError> {
        match (&self.access_key_id, &self.secret_access_key, &self.bucket_name) {
            (Some(id), Some(secret), Some(bucket)) if self.missing().is_empty() => {
                let mut config = S3Config::new(id, secret, bucket);
                if let Some(region) = &self.region {
                    config.region = region.clone();
                }
                config.endpoint_url = self.endpoint_url.clone();
                config.location = self.location.clone();
                Ok(config)
            }
            _ => Err(EngineError::MissingCredentials {
                backend: s3::BACKEND_NAME,
                missing: self.missing(),
            }),
        }
    }
}

/// Everything the sync needs to know, with defaults for all of it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Source tree to upload
    pub media_root: PathBuf,
    /// Force a backend instead of detecting one
    pub storage_backend: Option<BackendKind>,
    /// Target directory of the local backend; defaults to `media_root`
    pub local_destination: Option<PathBuf>,
    pub cloudinary: CloudinarySettings,
    pub s3: S3Settings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            media_root: PathBuf::from(DEFAULT_MEDIA_ROOT),
            storage_backend: None,
            local_destination: None,
            cloudinary: CloudinarySettings::default(),
            s3: S3Settings::default(),
        }
    }
}

impl Settings {
    /// Parse settings from TOML text. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Read and parse a TOML settings file.
    pub fn from_toml_file(path: &Path) -> Result<Self, EngineError> {
        let text = std::fs::read_to_string(path).map_err(|e| EngineError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&text).map_err(|e| EngineError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Overlay values from environment variables. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), EngineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(root) = var("MEDIA_ROOT") {
            self.media_root = PathBuf::from(root);
        }
        if let Some(backend) = var("STORAGE_BACKEND") {
            self.storage_backend = Some(backend.parse()?);
        }
        if let Some(dest) = var("LOCAL_STORAGE_ROOT") {
            self.local_destination = Some(PathBuf::from(dest));
        }

        overlay(&mut self.cloudinary.cloud_name, var("CLOUDINARY_CLOUD_NAME"));
        overlay(&mut self.cloudinary.api_key, var("CLOUDINARY_API_KEY"));
        overlay(&mut self.cloudinary.api_secret, var("CLOUDINARY_API_SECRET"));
        overlay(&mut self.cloudinary.prefix, var("CLOUDINARY_PREFIX"));

        overlay(&mut self.s3.access_key_id, var("AWS_ACCESS_KEY_ID"));
        overlay(&mut self.s3.secret_access_key, var("AWS_SECRET_ACCESS_KEY"));
        overlay(&mut self.s3.bucket_name, var("AWS_STORAGE_BUCKET_NAME"));
        overlay(&mut self.s3.region, var("AWS_S3_REGION_NAME"));
        overlay(&mut self.s3.endpoint_url, var("AWS_S3_ENDPOINT_URL"));
        overlay(&mut self.s3.location, var("AWS_LOCATION"));

        Ok(())
    }

    /// Overlay values from the process environment.
    pub fn apply_process_env(&mut self) -> Result<(), EngineError> {
        self.apply_env(|name| std::env::var(name).ok())
    }

    /// Directory the local backend writes into.
    pub fn local_destination(&self) -> &Path {
        self.local_destination.as_deref().unwrap_or(&self.media_root)
    }

    /// Pick the destination backend.
    ///
    /// An explicit `storage_backend` wins and must be fully configured.
    /// Otherwise: Cloudinary if all three of its credentials are set, then S3
    /// if all three of its credentials are set. A backend with only some of
    /// its credentials set is an error rather than a silent fallback. With
    /// nothing configured the local filesystem is used.
    pub fn resolve_backend(&self) -> Result<Backend, EngineError> {
        match self.storage_backend {
            Some(BackendKind::Cloudinary) => self.cloudinary.to_config().map(Backend::Cloudinary),
            Some(BackendKind::S3) => self.s3.to_config().map(Backend::S3),
            Some(BackendKind::Local) => self.local_backend(),
            None => {
                let cloudinary_missing = self.cloudinary.missing();
                let s3_missing = self.s3.missing();

                if cloudinary_missing.is_empty() {
                    self.cloudinary.to_config().map(Backend::Cloudinary)
                } else if s3_missing.is_empty() {
                    self.s3.to_config().map(Backend::S3)
                } else if cloudinary_missing.len() < 3 {
                    Err(EngineError::MissingCredentials {
                        backend: cloudinary::BACKEND_NAME,
                        missing: cloudinary_missing,
                    })
                } else if s3_missing.len() < 3 {
                    Err(EngineError::MissingCredentials {
                        backend: s3::BACKEND_NAME,
                        missing: s3_missing,
                    })
                } else {
                    self.local_backend()
                }
            }
        }
    }

    /// The local destination may be the media root itself but never a
    /// directory inside it: later runs would enumerate the copies again.
    fn local_backend(&self) -> Result<Backend, EngineError> {
        let destination = self.local_destination();
        let root = resolved(&self.media_root);
        let target = resolved(destination);
        if target != root && target.starts_with(&root) {
            return Err(EngineError::InvalidPath {
                path: destination.to_path_buf(),
                reason: format!(
                    "local destination is inside the media root {}",
                    self.media_root.display()
                ),
            });
        }
        Ok(Backend::Local(destination.to_path_buf()))
    }
}

/// Absolute form of `path` with symlinks resolved as far as it exists.
fn resolved(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => resolved(parent).join(name),
        _ => std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf()),
    }
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

fn overlay(slot: &mut Option<String>, value: Option<String>) {
    if value.is_some() {
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn settings_from(pairs: &[(&str, &str)]) -> Settings {
        let mut settings = Settings::default();
        settings.apply_env(env(pairs)).expect("env");
        settings
    }

    const CLOUDINARY: [(&str, &str); 3] = [
        ("CLOUDINARY_CLOUD_NAME", "demo"),
        ("CLOUDINARY_API_KEY", "123"),
        ("CLOUDINARY_API_SECRET", "abc"),
    ];

    const S3: [(&str, &str); 3] = [
        ("AWS_ACCESS_KEY_ID", "AKIA"),
        ("AWS_SECRET_ACCESS_KEY", "secret"),
        ("AWS_STORAGE_BUCKET_NAME", "uploads"),
    ];

    #[test]
    fn test_defaults_resolve_to_local_media_root() {
        let settings = Settings::default();
        assert_eq!(settings.media_root, PathBuf::from("media"));
        assert_eq!(
            settings.resolve_backend().expect("backend"),
            Backend::Local(PathBuf::from("media"))
        );
    }

    #[test]
    fn test_cloudinary_takes_priority() {
        let pairs: Vec<_> = CLOUDINARY.iter().chain(S3.iter()).copied().collect();
        let backend = settings_from(&pairs).resolve_backend().expect("backend");
        match backend {
            Backend::Cloudinary(config) => {
                assert_eq!(config.cloud_name, "demo");
                assert_eq!(config.prefix, "media");
            }
            other => panic!("expected Cloudinary, got {:?}", other),
        }
    }

    #[test]
    fn test_s3_when_cloudinary_absent() {
        let mut pairs = S3.to_vec();
        pairs.push(("AWS_S3_REGION_NAME", "eu-west-1"));
        let backend = settings_from(&pairs).resolve_backend().expect("backend");
        match backend {
            Backend::S3(config) => {
                assert_eq!(config.bucket_name, "uploads");
                assert_eq!(config.region, "eu-west-1");
            }
            other => panic!("expected S3, got {:?}", other),
        }
    }

    #[test]
    fn test_s3_wins_over_partial_cloudinary() {
        let mut pairs = S3.to_vec();
        pairs.push(("CLOUDINARY_CLOUD_NAME", "demo"));
        let backend = settings_from(&pairs).resolve_backend().expect("backend");
        assert!(matches!(backend, Backend::S3(_)));
    }

    #[test]
    fn test_partial_s3_is_missing_credentials() {
        let settings = settings_from(&[("AWS_ACCESS_KEY_ID", "AKIA")]);
        match settings.resolve_backend() {
            Err(EngineError::MissingCredentials { backend, missing }) => {
                assert_eq!(backend, "AWS S3");
                assert_eq!(missing, vec!["AWS_SECRET_ACCESS_KEY", "AWS_STORAGE_BUCKET_NAME"]);
            }
            other => panic!("expected MissingCredentials, got {:?}", other),
        }
    }

    #[test]
    fn test_partial_cloudinary_is_missing_credentials() {
        let settings = settings_from(&[("CLOUDINARY_API_SECRET", "abc")]);
        let err = settings.resolve_backend().expect_err("should fail");
        assert!(err.to_string().contains("CLOUDINARY_CLOUD_NAME"));
    }

    #[test]
    fn test_explicit_backend_requires_credentials() {
        let settings = settings_from(&[("STORAGE_BACKEND", "s3")]);
        assert!(matches!(
            settings.resolve_backend(),
            Err(EngineError::MissingCredentials { backend: "AWS S3", .. })
        ));
    }

    #[test]
    fn test_explicit_local_ignores_cloud_credentials() {
        let mut pairs = CLOUDINARY.to_vec();
        pairs.push(("STORAGE_BACKEND", "local"));
        pairs.push(("LOCAL_STORAGE_ROOT", "/srv/copy"));
        let backend = settings_from(&pairs).resolve_backend().expect("backend");
        assert_eq!(backend, Backend::Local(PathBuf::from("/srv/copy")));
    }

    #[test]
    fn test_local_destination_inside_media_root_rejected() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let media = temp_dir.path().join("media");
        std::fs::create_dir_all(media.join("backup")).expect("mkdir");

        for destination in [media.join("backup"), media.join("not-yet-created")] {
            let settings = Settings {
                media_root: media.clone(),
                local_destination: Some(destination),
                ..Settings::default()
            };
            assert!(matches!(
                settings.resolve_backend(),
                Err(EngineError::InvalidPath { .. })
            ));
        }
    }

    #[test]
    fn test_local_destination_beside_media_root_accepted() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let media = temp_dir.path().join("media");
        std::fs::create_dir_all(&media).expect("mkdir");

        let sibling = Settings {
            media_root: media.clone(),
            local_destination: Some(temp_dir.path().join("media-copy")),
            ..Settings::default()
        };
        assert_eq!(
            sibling.resolve_backend().expect("backend"),
            Backend::Local(temp_dir.path().join("media-copy"))
        );

        let same_tree = Settings {
            media_root: media.clone(),
            local_destination: Some(media.join(".")),
            ..Settings::default()
        };
        assert!(same_tree.resolve_backend().expect("backend").is_local());
    }

    #[test]
    fn test_empty_values_count_as_unset() {
        let settings = settings_from(&[
            ("AWS_ACCESS_KEY_ID", ""),
            ("AWS_SECRET_ACCESS_KEY", "  "),
            ("MEDIA_ROOT", ""),
        ]);
        assert_eq!(settings.media_root, PathBuf::from("media"));
        assert!(settings.resolve_backend().expect("backend").is_local());
    }

    #[test]
    fn test_unknown_backend_name() {
        let mut settings = Settings::default();
        let result = settings.apply_env(env(&[("STORAGE_BACKEND", "ftp")]));
        assert!(matches!(result, Err(EngineError::UnknownBackend { .. })));
    }

    #[test]
    fn test_toml_then_env_overlay() {
        let mut settings = Settings::from_toml_str(
            r#"
            media_root = "/srv/media"

            [s3]
            access_key_id = "from-file"
            secret_access_key = "file-secret"
            bucket_name = "file-bucket"
            location = "media"
            "#,
        )
        .expect("toml");

        settings
            .apply_env(env(&[("AWS_STORAGE_BUCKET_NAME", "env-bucket")]))
            .expect("env");

        assert_eq!(settings.media_root, PathBuf::from("/srv/media"));
        match settings.resolve_backend().expect("backend") {
            Backend::S3(config) => {
                assert_eq!(config.access_key_id, "from-file");
                assert_eq!(config.bucket_name, "env-bucket");
                assert_eq!(config.location.as_deref(), Some("media"));
            }
            other => panic!("expected S3, got {:?}", other),
        }
    }

    #[test]
    fn test_toml_storage_backend_field() {
        let settings = Settings::from_toml_str("storage_backend = \"local\"").expect("toml");
        assert_eq!(settings.storage_backend, Some(BackendKind::Local));
    }

    #[test]
    fn test_missing_config_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = Settings::from_toml_file(&temp_dir.path().join("absent.toml"));
        assert!(matches!(result, Err(EngineError::Config { .. })));
    }
}
