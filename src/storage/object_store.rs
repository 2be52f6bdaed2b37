use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use super::StoreError;

/// Bucket-scoped blob storage with public URLs.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put_object(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StoreError>;

    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn make_public(&self, key: &str) -> Result<(), StoreError>;

    async fn delete_object(&self, key: &str) -> Result<bool, StoreError>;

    fn public_url(&self, key: &str) -> String;
}

/// Object store on the local filesystem. Objects are served read-only by the
/// HTTP layer under `/storage`, so every stored object is public once written.
#[derive(Clone, Debug)]
pub struct LocalFileStorage {
    base_dir: PathBuf,
    base_url: String,
    bucket: String,
}

impl LocalFileStorage {
    pub fn new(base_dir: PathBuf, base_url: String, bucket: String) -> Self {
        Self {
            base_dir,
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.trim_matches('/').to_string(),
        }
    }

    pub fn resolve_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let normalized = key.trim_start_matches('/');
        let relative = Path::new(normalized);
        let safe = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if normalized.is_empty() || !safe {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.base_dir.join(&self.bucket).join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalFileStorage {
    async fn put_object(&self, key: &str, data: &[u8], content_type: &str) -> Result<(), StoreError> {
        let path = self.resolve_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, data).await?;
        tracing::debug!(key, content_type, size = data.len(), "object written");
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let path = self.resolve_path(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    async fn make_public(&self, key: &str) -> Result<(), StoreError> {
        let path = self.resolve_path(key)?;
        match fs::metadata(&path).await {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn delete_object(&self, key: &str) -> Result<bool, StoreError> {
        let path = self.resolve_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    fn public_url(&self, key: &str) -> String {
        let key = key.trim_start_matches('/');
        format!("{}/storage/{}/{key}", self.base_url, self.bucket)
    }
}
