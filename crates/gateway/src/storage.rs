//! Uploaded file storage
//!
//! Backends:
//! - local: files under the upload directory
//! - s3: objects in a bucket, addressed as `s3://bucket/key`

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use chrono::Utc;
use ragforge_common::config::{StorageConfig, StorageProvider};
use ragforge_common::errors::{AppError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Where an upload ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredFile {
    /// Path on this machine, readable by the ingestion pipeline
    Local(PathBuf),
    /// Object URI; ingestion works from the in-memory bytes
    Remote(String),
}

impl StoredFile {
    pub fn location(&self) -> String {
        match self {
            StoredFile::Local(path) => path.display().to_string(),
            StoredFile::Remote(uri) => uri.clone(),
        }
    }
}

#[async_trait]
pub trait FileStorage: Send + Sync {
    async fn save(&self, bytes: &[u8], original_name: &str) -> Result<StoredFile>;

    fn provider(&self) -> StorageProvider;
}

/// Build the backend selected by `storage.provider`
pub async fn from_config(config: &StorageConfig) -> Result<Arc<dyn FileStorage>> {
    match config.provider()? {
        StorageProvider::Local => Ok(Arc::new(LocalStorage::new(&config.upload_dir).await?)),
        StorageProvider::S3 => Ok(Arc::new(S3Storage::from_config(config).await?)),
    }
}

/// `<millis>-<random>-<name>`, with the name reduced to a safe file name
fn unique_name(original_name: &str) -> String {
    let base = Path::new(original_name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");
    let safe: String = base
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') { c } else { '_' })
        .collect();
    let suffix = Uuid::new_v4().as_u128() % 1_000_000_000;

    format!("{}-{}-{}", Utc::now().timestamp_millis(), suffix, safe)
}

pub struct LocalStorage {
    upload_dir: PathBuf,
}

impl LocalStorage {
    /// Creates the upload directory if it is missing
    pub async fn new(upload_dir: impl Into<PathBuf>) -> Result<Self> {
        let upload_dir = upload_dir.into();
        tokio::fs::create_dir_all(&upload_dir)
            .await
            .map_err(|source| AppError::Io {
                path: upload_dir.display().to_string(),
                source,
            })?;
        Ok(Self { upload_dir })
    }
}

#[async_trait]
impl FileStorage for LocalStorage {
    async fn save(&self, bytes: &[u8], original_name: &str) -> Result<StoredFile> {
        let path = self.upload_dir.join(unique_name(original_name));

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| AppError::Io {
                path: path.display().to_string(),
                source,
            })?;

        info!(path = %path.display(), bytes = bytes.len(), "File stored locally");
        Ok(StoredFile::Local(path))
    }

    fn provider(&self) -> StorageProvider {
        StorageProvider::Local
    }
}

pub struct S3Storage {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
}

impl S3Storage {
    /// Credentials and region come from the standard AWS environment
    pub async fn from_config(config: &StorageConfig) -> Result<Self> {
        let bucket = config
            .s3_bucket
            .clone()
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| AppError::configuration("storage.s3_bucket is not configured"))?;

        let sdk_config = aws_config::load_from_env().await;

        Ok(Self {
            client: aws_sdk_s3::Client::new(&sdk_config),
            bucket,
            prefix: config.s3_prefix.clone(),
        })
    }
}

#[async_trait]
impl FileStorage for S3Storage {
    async fn save(&self, bytes: &[u8], original_name: &str) -> Result<StoredFile> {
        let key = format!("{}{}", self.prefix, unique_name(original_name));

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .map_err(|e| {
                AppError::transient(
                    "s3",
                    format!("put_object failed: {}", aws_sdk_s3::error::DisplayErrorContext(&e)),
                )
            })?;

        let uri = format!("s3://{}/{}", self.bucket, key);
        info!(uri = %uri, bytes = bytes.len(), "File stored in S3");
        Ok(StoredFile::Remote(uri))
    }

    fn provider(&self) -> StorageProvider {
        StorageProvider::S3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_storage_writes_unique_files() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path().join("uploads")).await.unwrap();

        let first = storage.save(b"hello", "notes.txt").await.unwrap();
        let second = storage.save(b"hello", "notes.txt").await.unwrap();

        let StoredFile::Local(path) = &first else {
            panic!("expected a local file, got {:?}", first);
        };
        assert_ne!(first, second);
        assert!(path.file_name().unwrap().to_str().unwrap().ends_with("-notes.txt"));
        assert_eq!(std::fs::read(path).unwrap(), b"hello");
    }

    #[test]
    fn test_unique_name_strips_directories() {
        let name = unique_name("../../etc/pass wd.txt");
        assert!(name.ends_with("-pass_wd.txt"));
        assert!(!name.contains('/'));
    }

    #[tokio::test]
    async fn test_from_config_requires_provider() {
        let result = from_config(&StorageConfig::default()).await;
        assert!(matches!(result, Err(AppError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_from_config_builds_local_backend() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            provider: Some("LOCAL".to_string()),
            upload_dir: dir.path().display().to_string(),
            ..StorageConfig::default()
        };

        let storage = from_config(&config).await.unwrap();
        assert_eq!(storage.provider(), StorageProvider::Local);
    }
}
