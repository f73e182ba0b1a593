use super::AssetStorage;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

/// 本地磁盘上的沙箱
///
/// 沙箱路径（如 `/storage/cloud/files/Photo/1/a.jpg`）映射到 `base_path` 之下。
pub struct LocalStorage {
    base_path: PathBuf,
}

impl LocalStorage {
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let base_path = path.into();
        if !base_path.exists() {
            std::fs::create_dir_all(&base_path)?;
        }
        Ok(Self { base_path })
    }

    pub fn resolve_path(&self, path: &str) -> PathBuf {
        let path = path.trim_start_matches('/').trim_start_matches('\\');
        if path.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(path)
        }
    }
}

#[async_trait]
impl AssetStorage for LocalStorage {
    async fn exists(&self, path: &str) -> Result<bool> {
        let full_path = self.resolve_path(path);
        Ok(fs::try_exists(&full_path).await?)
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from_path = self.resolve_path(from);
        let to_path = self.resolve_path(to);

        if let Some(parent) = to_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&from_path, &to_path)
            .await
            .with_context(|| format!("rename {} -> {}", from, to))?;

        debug!("移动文件: {} -> {}", from, to);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rename_inside_sandbox() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).unwrap();

        std::fs::create_dir_all(dir.path().join("Photo/1")).unwrap();
        std::fs::write(dir.path().join("Photo/1/a.jpg"), b"x").unwrap();

        assert!(storage.exists("/Photo/1/a.jpg").await.unwrap());
        storage.rename("/Photo/1/a.jpg", "/Photo/2/a_1.jpg").await.unwrap();

        assert!(!storage.exists("/Photo/1/a.jpg").await.unwrap());
        assert!(storage.exists("/Photo/2/a_1.jpg").await.unwrap());
    }

    #[tokio::test]
    async fn test_rename_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path()).unwrap();

        assert!(storage.rename("/nope.jpg", "/nope_1.jpg").await.is_err());
    }
}
