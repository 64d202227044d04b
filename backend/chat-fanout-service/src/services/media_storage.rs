use async_trait::async_trait;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::config::MediaConfig;
use crate::error::{AppError, AppResult};

#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Persist `bytes` under a fresh name and return its public URL.
    async fn store(&self, bytes: &[u8], original_name: &str) -> AppResult<String>;
    /// Idempotent.
    async fn delete(&self, name: &str) -> AppResult<()>;
}

/// Files on local disk, served elsewhere under `base_url`.
pub struct LocalMediaStorage {
    upload_dir: PathBuf,
    base_url: String,
}

impl LocalMediaStorage {
    pub fn new(config: &MediaConfig) -> Self {
        Self {
            upload_dir: config.upload_dir.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        }
    }

    fn stored_name(original_name: &str) -> String {
        let extension = Path::new(original_name)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();
        format!("{}{}", Uuid::new_v4(), extension)
    }
}

fn check_name(name: &str) -> AppResult<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
        return Err(AppError::Validation(format!("invalid file name: {name}")));
    }
    Ok(())
}

#[async_trait]
impl MediaStorage for LocalMediaStorage {
    async fn store(&self, bytes: &[u8], original_name: &str) -> AppResult<String> {
        if bytes.is_empty() {
            return Err(AppError::Validation("file is empty".into()));
        }
        check_name(original_name)?;

        tokio::fs::create_dir_all(&self.upload_dir).await?;
        let name = Self::stored_name(original_name);
        tokio::fs::write(self.upload_dir.join(&name), bytes).await?;

        tracing::info!(file = %name, size = bytes.len(), "media stored");
        Ok(format!("{}/{}", self.base_url, name))
    }

    async fn delete(&self, name: &str) -> AppResult<()> {
        check_name(name)?;
        match tokio::fs::remove_file(self.upload_dir.join(name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage(dir: &Path) -> LocalMediaStorage {
        LocalMediaStorage::new(&MediaConfig {
            upload_dir: dir.to_path_buf(),
            base_url: "http://cdn.local/files/".into(),
        })
    }

    #[tokio::test]
    async fn store_keeps_extension_and_returns_url() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path());

        let url = storage.store(b"png-bytes", "Photo.PNG").await.unwrap();
        assert!(url.starts_with("http://cdn.local/files/"));
        assert!(url.ends_with(".png"));

        let name = url.rsplit('/').next().unwrap();
        assert!(dir.path().join(name).exists());

        storage.delete(name).await.unwrap();
        assert!(!dir.path().join(name).exists());
        storage.delete(name).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_empty_and_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(dir.path());

        assert!(matches!(
            storage.store(b"", "a.txt").await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            storage.delete("../secrets").await,
            Err(AppError::Validation(_))
        ));
    }
}
