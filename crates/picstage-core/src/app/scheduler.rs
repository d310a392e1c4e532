//! StagingScheduler - submit されたバッチの遅延 commit
//!
//! # フロー
//! 1. `submit(ids)` がバッチを channel に送る（呼び出し元はブロックしない）
//! 2. driver タスクが `(due_at, batch)` の min-heap を持ち、最も早い due_at まで眠る
//! 3. due になったバッチは別タスクで id ごとに `commit` する（失敗は warn ログのみ）
//!
//! タイマーは tokio の時計を使うので、テストでは `start_paused` で仮想時間を進められます。
//! 一度 submit したバッチは取り消せません。

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::ImageId;
use crate::ports::ImageStore;

/// heap が空のときの待ち時間（precondition で無効化されるので実際には使われない）
const IDLE_WAIT: Duration = Duration::from_secs(3600);

/// A batch waiting for its commit time.
#[derive(Debug)]
struct PendingBatch {
    due_at: Instant,
    seq: u64,
    ids: Vec<ImageId>,
}

impl PartialEq for PendingBatch {
    fn eq(&self, other: &Self) -> bool {
        self.due_at == other.due_at && self.seq == other.seq
    }
}

impl Eq for PendingBatch {}

impl PartialOrd for PendingBatch {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingBatch {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reverse ordering: earliest due_at (then earliest submit) on top
        other
            .due_at
            .cmp(&self.due_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// StagingScheduler は遅延 commit のキュー
///
/// # 使用例
/// ```ignore
/// let scheduler = StagingScheduler::spawn(store, ttl);
/// scheduler.submit(vec![id1, id2]); // ttl 後に commit される
/// ```
///
/// 全ハンドルを drop しても、すでに submit されたバッチは期限に commit されてから driver が終了します。
pub struct StagingScheduler {
    tx: mpsc::UnboundedSender<(Instant, Vec<ImageId>)>,
    delay: Duration,
    pending: Arc<AtomicUsize>,
}

impl StagingScheduler {
    /// driver タスクを起動する（tokio runtime の中で呼ぶこと）
    pub fn spawn(store: Arc<dyn ImageStore>, delay: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        tokio::spawn(drive(store, rx, Arc::clone(&pending)));
        Self { tx, delay, pending }
    }

    /// バッチを登録する。空なら何もしない。
    pub fn submit(&self, ids: Vec<ImageId>) {
        if ids.is_empty() {
            return;
        }
        let due_at = Instant::now() + self.delay;
        let count = ids.len();
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.tx.send((due_at, ids)).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            warn!(count, "staging scheduler is gone, batch left to the reaper");
            return;
        }
        debug!(count, delay = ?self.delay, "batch submitted for delayed commit");
    }

    /// Batches submitted but not fired yet.
    pub fn pending_batches(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

async fn drive(
    store: Arc<dyn ImageStore>,
    mut rx: mpsc::UnboundedReceiver<(Instant, Vec<ImageId>)>,
    pending: Arc<AtomicUsize>,
) {
    let mut heap = BinaryHeap::new();
    let mut next_seq = 0u64;
    let mut open = true;

    while open || !heap.is_empty() {
        let next_due = heap.peek().map(|batch: &PendingBatch| batch.due_at);
        let wake_at = next_due.unwrap_or_else(|| Instant::now() + IDLE_WAIT);

        tokio::select! {
            msg = rx.recv(), if open => match msg {
                Some((due_at, ids)) => {
                    heap.push(PendingBatch { due_at, seq: next_seq, ids });
                    next_seq += 1;
                }
                None => open = false,
            },
            _ = tokio::time::sleep_until(wake_at), if next_due.is_some() => {
                let now = Instant::now();
                while heap.peek().is_some_and(|batch| batch.due_at <= now) {
                    let Some(batch) = heap.pop() else { break };
                    pending.fetch_sub(1, Ordering::SeqCst);
                    tokio::spawn(commit_batch(Arc::clone(&store), batch.ids));
                }
            }
        }
    }
    debug!("staging scheduler stopped");
}

/// id ごとに独立して commit する。失敗しても残りは続行。
async fn commit_batch(store: Arc<dyn ImageStore>, ids: Vec<ImageId>) {
    for id in ids {
        match store.commit(&id).await {
            Ok(()) => debug!(%id, "delayed commit done"),
            Err(e) => warn!(%id, error = %e, "failed to commit image"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CleanupReport, ImageError, ImageState, StorageError};
    use crate::impls::InMemoryImageStore;
    use crate::ports::ImageReader;
    use async_trait::async_trait;

    const TTL: Duration = Duration::from_secs(2);

    async fn stage(store: &InMemoryImageStore, user: &str) -> ImageId {
        store.save("pic.png", user, Box::new(&b"img"[..])).await.unwrap()
    }

    async fn state(store: &InMemoryImageStore, id: &ImageId) -> Option<ImageState> {
        store.stat(id).await.map(|meta| meta.state)
    }

    #[tokio::test(start_paused = true)]
    async fn commits_batch_after_delay() {
        let store = Arc::new(InMemoryImageStore::new());
        let a = stage(&store, "u1").await;
        let b = stage(&store, "u1").await;
        let scheduler = StagingScheduler::spawn(store.clone(), TTL);

        scheduler.submit(vec![a.clone(), b.clone()]);
        assert_eq!(scheduler.pending_batches(), 1);
        assert_eq!(scheduler.delay(), TTL);

        tokio::time::sleep(scheduler.delay() - Duration::from_millis(10)).await;
        assert_eq!(state(&store, &a).await, Some(ImageState::Staged));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(state(&store, &a).await, Some(ImageState::Committed));
        assert_eq!(state(&store, &b).await, Some(ImageState::Committed));
        assert_eq!(scheduler.pending_batches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_batch_is_noop() {
        let store = Arc::new(InMemoryImageStore::new());
        let scheduler = StagingScheduler::spawn(store, TTL);
        scheduler.submit(Vec::new());
        assert_eq!(scheduler.pending_batches(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn batches_fire_in_due_order() {
        let store = Arc::new(InMemoryImageStore::new());
        let first = stage(&store, "u1").await;
        let second = stage(&store, "u2").await;
        let scheduler = StagingScheduler::spawn(store.clone(), TTL);

        scheduler.submit(vec![first.clone()]);
        tokio::time::sleep(Duration::from_secs(1)).await;
        scheduler.submit(vec![second.clone()]);

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(state(&store, &first).await, Some(ImageState::Committed));
        assert_eq!(state(&store, &second).await, Some(ImageState::Staged));
        assert_eq!(scheduler.pending_batches(), 1);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(state(&store, &second).await, Some(ImageState::Committed));
    }

    #[tokio::test(start_paused = true)]
    async fn armed_batches_survive_dropping_the_handle() {
        let store = Arc::new(InMemoryImageStore::new());
        let id = stage(&store, "u1").await;
        let scheduler = StagingScheduler::spawn(store.clone(), TTL);

        scheduler.submit(vec![id.clone()]);
        drop(scheduler);

        tokio::time::sleep(TTL + Duration::from_millis(10)).await;
        assert_eq!(state(&store, &id).await, Some(ImageState::Committed));
    }

    /// commit を特定の id だけ失敗させる store
    struct FlakyStore {
        inner: InMemoryImageStore,
        failing: ImageId,
    }

    #[async_trait]
    impl ImageStore for FlakyStore {
        async fn save(
            &self,
            file_name: &str,
            user_id: &str,
            content: ImageReader,
        ) -> Result<ImageId, ImageError> {
            self.inner.save(file_name, user_id, content).await
        }

        async fn commit(&self, id: &ImageId) -> Result<(), ImageError> {
            if *id == self.failing {
                return Err(StorageError::Backend("transient failure".into()).into());
            }
            self.inner.commit(id).await
        }

        async fn load(&self, id: &ImageId) -> Result<(ImageReader, u64), ImageError> {
            self.inner.load(id).await
        }

        async fn cleanup(&self, ttl: Duration) -> Result<CleanupReport, ImageError> {
            self.inner.cleanup(ttl).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn one_failing_commit_does_not_block_the_rest() {
        let inner = InMemoryImageStore::new();
        let a = stage(&inner, "u1").await;
        let b = stage(&inner, "u1").await;
        let store = Arc::new(FlakyStore {
            inner,
            failing: a.clone(),
        });
        let scheduler = StagingScheduler::spawn(store.clone(), TTL);

        scheduler.submit(vec![a.clone(), b.clone()]);
        tokio::time::sleep(TTL + Duration::from_millis(10)).await;

        assert_eq!(state(&store.inner, &a).await, Some(ImageState::Staged));
        assert_eq!(state(&store.inner, &b).await, Some(ImageState::Committed));
    }
}
