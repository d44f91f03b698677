//! 资源存储 - 基础设施层
//!
//! 持有文件系统根目录和 HTTP 客户端，只暴露"按引用读 / 写"的能力

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{AssetError, ConfigError};

/// 资源存储能力
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// 按引用读取字节
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, AssetError>;

    /// 写入字节，返回可再次 fetch 的引用
    async fn store(&self, key: &str, bytes: &[u8]) -> Result<String, AssetError>;
}

/// 本地目录 + HTTP 的资源存储
///
/// - `http://` / `https://` 引用通过 HTTP GET 读取
/// - 其余引用视为根目录下的相对路径
pub struct LocalAssetStore {
    root: PathBuf,
    http: reqwest::Client,
}

impl LocalAssetStore {
    pub fn new(root: impl Into<PathBuf>, request_timeout: Duration) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;
        Ok(Self {
            root: root.into(),
            http,
        })
    }

    fn is_remote(reference: &str) -> bool {
        reference.starts_with("http://") || reference.starts_with("https://")
    }

    /// 引用只能落在根目录之内
    fn local_path(&self, reference: &str) -> Result<PathBuf, AssetError> {
        let relative = Path::new(reference.trim_start_matches('/'));
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if escapes || reference.trim().is_empty() {
            return Err(AssetError::NotFound(reference.to_string()));
        }
        Ok(self.root.join(relative))
    }

    async fn fetch_remote(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| AssetError::ReadFailed {
                reference: url.to_string(),
                message: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(AssetError::NotFound(format!(
                "{} (status {})",
                url,
                response.status()
            )));
        }

        let bytes = response.bytes().await.map_err(|e| AssetError::ReadFailed {
            reference: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl AssetStore for LocalAssetStore {
    async fn fetch(&self, reference: &str) -> Result<Vec<u8>, AssetError> {
        debug!("读取资源: {}", reference);
        if Self::is_remote(reference) {
            return self.fetch_remote(reference).await;
        }

        let path = self.local_path(reference)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AssetError::NotFound(reference.to_string()),
            _ => AssetError::ReadFailed {
                reference: reference.to_string(),
                message: e.to_string(),
            },
        })
    }

    async fn store(&self, key: &str, bytes: &[u8]) -> Result<String, AssetError> {
        let path = self.local_path(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| AssetError::WriteFailed {
                    reference: key.to_string(),
                    source,
                })?;
        }
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| AssetError::WriteFailed {
                reference: key.to_string(),
                source,
            })?;
        debug!("资源已写入: {} ({} 字节)", path.display(), bytes.len());
        Ok(key.to_string())
    }
}
