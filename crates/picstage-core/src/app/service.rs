//! ImageService - 利用者向けのファサード
//!
//! ImageStore + StagingScheduler + ReferenceExtractor + ReaperLoop をまとめます。
//! 保持する状態は設定だけで、store の不変条件以外を追加しません。

use std::sync::Arc;
use tokio::sync::watch;

use super::config::ServiceConfig;
use super::extractor::ReferenceExtractor;
use super::reaper_loop::{ReaperHandle, ReaperLoop, StopCause};
use super::scheduler::StagingScheduler;
use crate::domain::{ImageError, ImageId};
use crate::ports::{ImageReader, ImageStore};

/// ImageService は画像のライフサイクル API
///
/// # 典型的な使い方
/// 1. アップロード時に `save` → 返った id を `<img src>` に埋め込む
/// 2. content を永続化したら `commit_referenced`（= `extract_pictures` + `submit`）
/// 3. プロセス起動時に一度 `spawn_cleanup` で reaper を起動する
pub struct ImageService {
    store: Arc<dyn ImageStore>,
    scheduler: StagingScheduler,
    extractor: ReferenceExtractor,
    config: ServiceConfig,
}

impl ImageService {
    /// tokio runtime の中で呼ぶこと（scheduler の driver を起動する）
    pub fn new(store: Arc<dyn ImageStore>, config: ServiceConfig) -> Self {
        let scheduler = StagingScheduler::spawn(Arc::clone(&store), config.ttl());
        let extractor = ReferenceExtractor::new(config.image_api());
        Self {
            store,
            scheduler,
            extractor,
            config,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ImageStore> {
        &self.store
    }

    pub async fn save(
        &self,
        file_name: &str,
        user_id: &str,
        content: ImageReader,
    ) -> Result<ImageId, ImageError> {
        self.store.save(file_name, user_id, content).await
    }

    pub async fn commit(&self, id: &ImageId) -> Result<(), ImageError> {
        self.store.commit(id).await
    }

    pub async fn load(&self, id: &ImageId) -> Result<(ImageReader, u64), ImageError> {
        self.store.load(id).await
    }

    /// ttl 後に各 id を commit する（ブロックしない、取り消し不可）
    pub fn submit(&self, ids: Vec<ImageId>) {
        self.scheduler.submit(ids);
    }

    pub fn pending_batches(&self) -> usize {
        self.scheduler.pending_batches()
    }

    pub fn extract_pictures(&self, content: &str) -> Result<Vec<ImageId>, ImageError> {
        self.extractor.extract_pictures(content)
    }

    /// 永続化済み content が参照する画像を遅延 commit に回し、その id を返す
    pub fn commit_referenced(&self, content: &str) -> Result<Vec<ImageId>, ImageError> {
        let ids = self.extract_pictures(content)?;
        self.submit(ids.clone());
        Ok(ids)
    }

    /// reaper ループを現在のタスクで実行する（shutdown まで戻らない）
    pub async fn cleanup(&self, shutdown: watch::Receiver<bool>) -> StopCause {
        self.reaper().run(shutdown).await
    }

    /// reaper ループを別タスクで起動する
    pub fn spawn_cleanup(&self) -> ReaperHandle {
        self.reaper().spawn()
    }

    fn reaper(&self) -> ReaperLoop {
        ReaperLoop::new(Arc::clone(&self.store), self.config.ttl())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::DEFAULT_IMAGE_API;
    use crate::domain::ImageState;
    use crate::impls::InMemoryImageStore;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;

    const TTL: Duration = Duration::from_secs(2);

    fn service() -> (Arc<InMemoryImageStore>, ImageService) {
        let store = Arc::new(InMemoryImageStore::new());
        let config = ServiceConfig::new(TTL, DEFAULT_IMAGE_API).unwrap();
        let service = ImageService::new(store.clone(), config);
        (store, service)
    }

    fn comment_html(ids: &[&ImageId]) -> String {
        ids.iter()
            .map(|id| format!(r#"<p><img src="https://remark.example{DEFAULT_IMAGE_API}{id}"></p>"#))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn save_then_load_passes_through() {
        let (_, service) = service();
        let id = service.save("pic.png", "u1", Box::new(&b"bytes"[..])).await.unwrap();

        let (mut reader, size) = service.load(&id).await.unwrap();
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf).await.unwrap();
        assert_eq!((buf.as_slice(), size), (&b"bytes"[..], 5));

        service.commit(&id).await.unwrap();
        service.commit(&id).await.unwrap();

        let (_, size) = service.store().load(&id).await.unwrap();
        assert_eq!(size, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn referenced_images_survive_and_abandoned_ones_are_reaped() {
        let (store, service) = service();
        let reaper = service.spawn_cleanup();

        let kept = service.save("a.png", "u1", Box::new(&b"a"[..])).await.unwrap();
        let abandoned = service.save("b.png", "u1", Box::new(&b"b"[..])).await.unwrap();

        let html = comment_html(&[&kept]);
        assert_eq!(service.commit_referenced(&html).unwrap(), vec![kept.clone()]);
        assert_eq!(service.pending_batches(), 1);

        tokio::time::sleep(TTL * 2).await;

        assert_eq!(store.stat(&kept).await.unwrap().state, ImageState::Committed);
        assert!(store.stat(&abandoned).await.is_none());
        assert_eq!(reaper.shutdown_and_join().await.unwrap(), StopCause::Requested);
    }

    #[tokio::test(start_paused = true)]
    async fn extraction_errors_surface_to_the_caller() {
        let (_, service) = service();
        let err = service.commit_referenced(r#"<img src="/api/v1/pic"#).unwrap_err();
        assert!(matches!(err, ImageError::Parse { .. }));
        assert_eq!(service.pending_batches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_runs_until_shutdown() {
        let (_, service) = service();
        let (tx, rx) = watch::channel(false);

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            tx.send(true).unwrap();
        });

        assert_eq!(service.cleanup(rx).await, StopCause::Requested);
        stopper.await.unwrap();
    }
}
