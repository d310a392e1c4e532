//! InMemoryImageStore - 開発・テスト用の ImageStore
//!
//! # 実装詳細
//! - HashMap<ImageId, StoredImage> を単一の tokio Mutex で保護
//! - commit と cleanup は同じロックの中で check-then-act するため、
//!   id ごとの状態遷移は常に原子的
//! - staging の経過時間は注入した Clock で測る（デフォルトは MonotonicClock）

use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

use super::{DEFAULT_MAX_SIZE, read_limited};
use crate::domain::ids::validate_segment;
use crate::domain::{
    CleanupReport, ImageError, ImageId, ImageMeta, ImageState, StorageError,
};
use crate::ports::{Clock, FileNameGenerator, ImageReader, ImageStore, MonotonicClock, UlidFileNames};

/// Metadata + content for one image.
#[derive(Debug, Clone)]
struct StoredImage {
    meta: ImageMeta,
    content: Arc<[u8]>,
}

/// InMemoryImageStore はプロセス内だけで完結する ImageStore
///
/// # 使用例
/// ```ignore
/// let store = Arc::new(InMemoryImageStore::new());
/// let id = store.save("pic.png", "u1", Box::new(&b"..."[..])).await?;
/// store.commit(&id).await?;
/// ```
pub struct InMemoryImageStore {
    images: Mutex<HashMap<ImageId, StoredImage>>,
    clock: Arc<dyn Clock>,
    names: UlidFileNames<Arc<dyn Clock>>,
    max_size: u64,
}

impl InMemoryImageStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(MonotonicClock::new()))
    }

    /// 時刻源を指定して作成（テストでは FixedClock を渡す）
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            images: Mutex::new(HashMap::new()),
            names: UlidFileNames::new(Arc::clone(&clock)),
            clock,
            max_size: DEFAULT_MAX_SIZE,
        }
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Current metadata of an image, `None` when absent.
    pub async fn stat(&self, id: &ImageId) -> Option<ImageMeta> {
        let images = self.images.lock().await;
        images.get(id).map(|image| image.meta.clone())
    }

    /// Number of images in each state: `(staged, committed)`.
    pub async fn counts(&self) -> (usize, usize) {
        let images = self.images.lock().await;
        images.values().fold((0, 0), |(staged, committed), image| match image.meta.state {
            ImageState::Staged => (staged + 1, committed),
            ImageState::Committed => (staged, committed + 1),
        })
    }
}

impl Default for InMemoryImageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ImageStore for InMemoryImageStore {
    async fn save(
        &self,
        file_name: &str,
        user_id: &str,
        content: ImageReader,
    ) -> Result<ImageId, ImageError> {
        validate_segment("user", user_id).map_err(StorageError::from)?;
        let content = read_limited(content, self.max_size).await?;

        let mut images = self.images.lock().await;
        let id = loop {
            let id = ImageId::new(user_id, self.names.generate(file_name))
                .map_err(StorageError::from)?;
            if !images.contains_key(&id) {
                break id;
            }
        };
        let meta = ImageMeta {
            id: id.clone(),
            state: ImageState::Staged,
            size: content.len() as u64,
            created_at: self.clock.now(),
        };
        images.insert(
            id.clone(),
            StoredImage {
                meta,
                content: content.into(),
            },
        );
        debug!(%id, "staged image");
        Ok(id)
    }

    async fn commit(&self, id: &ImageId) -> Result<(), ImageError> {
        let mut images = self.images.lock().await;
        let image = images.get_mut(id).ok_or_else(|| ImageError::not_found(id))?;
        match image.meta.state {
            ImageState::Staged => {
                image.meta.state = ImageState::Committed;
                debug!(%id, "committed image");
            }
            ImageState::Committed => debug!(%id, "image already committed"),
        }
        Ok(())
    }

    async fn load(&self, id: &ImageId) -> Result<(ImageReader, u64), ImageError> {
        let images = self.images.lock().await;
        let image = images.get(id).ok_or_else(|| ImageError::not_found(id))?;
        let reader: ImageReader = Box::new(Cursor::new(Arc::clone(&image.content)));
        Ok((reader, image.meta.size))
    }

    async fn cleanup(&self, ttl: Duration) -> Result<CleanupReport, ImageError> {
        let mut report = CleanupReport::default();
        let mut images = self.images.lock().await;
        let now = self.clock.now();

        let expired: Vec<ImageId> = images
            .values()
            .filter(|image| image.meta.is_expired(now, ttl))
            .map(|image| image.meta.id.clone())
            .collect();

        for id in expired {
            images.remove(&id);
            debug!(%id, "removed expired staged image");
            report.record_removed(id);
        }
        Ok(report)
    }
}
