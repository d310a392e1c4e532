//! ServiceBuilder - ImageService の構築とワイヤリング
//!
//! # Fail-fast 設計
//! - store 未設定、ttl が 0、marker が空なら build() 時に BuildError を返す
//! - 起動後に設定ミスで reaper が暴走することを防ぐ

use std::sync::Arc;
use std::time::Duration;

use super::config::{DEFAULT_IMAGE_API, ServiceConfig};
use super::service::ImageService;
use crate::domain::ConfigError;
use crate::ports::ImageStore;

/// BuildError はサービス構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no image store configured")]
    MissingStore,

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// ServiceBuilder は ImageService を構築
///
/// # 使用例
/// ```ignore
/// let service = ServiceBuilder::new()
///     .store(Arc::new(InMemoryImageStore::new()))
///     .ttl(Duration::from_secs(3600))
///     .image_api("/api/v1/picture/")
///     .build()?;
/// ```
pub struct ServiceBuilder {
    store: Option<Arc<dyn ImageStore>>,
    ttl: Option<Duration>,
    image_api: String,
}

impl ServiceBuilder {
    pub fn new() -> Self {
        Self {
            store: None,
            ttl: None,
            image_api: DEFAULT_IMAGE_API.to_string(),
        }
    }

    pub fn store(mut self, store: Arc<dyn ImageStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn image_api(mut self, image_api: impl Into<String>) -> Self {
        self.image_api = image_api.into();
        self
    }

    /// 設定を検証して ImageService を生成（tokio runtime の中で呼ぶこと）
    pub fn build(self) -> Result<ImageService, BuildError> {
        let store = self.store.ok_or(BuildError::MissingStore)?;
        let config = ServiceConfig::new(self.ttl.unwrap_or_default(), self.image_api)?;
        Ok(ImageService::new(store, config))
    }
}

impl Default for ServiceBuilder {
    fn default() -> Self {
        Self::new()
    }
}
