//! ReaperLoop - staging の期限切れ画像の回収
//!
//! # 状態
//! - Running: `ttl / 2` ごとに `ImageStore::cleanup(ttl)` を呼ぶ。失敗は warn ログのみで継続
//! - Stopped: shutdown signal を受けたら終了（終端。自分では再起動しない）
//!
//! 周期が ttl / 2 なので、staged 画像は最悪でも作成から 1.5 × ttl 以内に削除されます。
//! sweep 中は shutdown を見ないため、遅い cleanup は停止検知をその分遅らせます。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

use super::config::reap_period;
use crate::ports::ImageStore;

/// ReaperLoop が止まった理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    /// shutdown signal に `true` が送られた
    Requested,
    /// signal の送信側がすべて drop された
    SignalDropped,
}

/// ReaperLoop は staging を定期的に掃除する
///
/// # 使用例
/// ```ignore
/// let (tx, rx) = watch::channel(false);
/// let reaper = ReaperLoop::new(store, ttl);
/// let join = tokio::spawn(async move { reaper.run(rx).await });
/// tx.send(true)?; // 停止
/// ```
pub struct ReaperLoop {
    store: Arc<dyn ImageStore>,
    ttl: Duration,
    period: Duration,
}

impl ReaperLoop {
    pub fn new(store: Arc<dyn ImageStore>, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            period: reap_period(ttl),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// shutdown まで sweep を繰り返す。最初の sweep は 1 周期後。
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> StopCause {
        info!(ttl = ?self.ttl, period = ?self.period, "start pictures cleanup");

        let mut ticker = tokio::time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let cause = loop {
            if *shutdown.borrow_and_update() {
                break StopCause::Requested;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break StopCause::SignalDropped;
                    }
                }
                _ = ticker.tick() => self.sweep().await,
            }
        };
        info!(?cause, "pictures cleanup terminated");
        cause
    }

    /// 1 回分の sweep。エラーはログに残すだけ。
    pub async fn sweep(&self) {
        match self.store.cleanup(self.ttl).await {
            Ok(report) => {
                for failure in &report.failures {
                    warn!(target_path = %failure.target, reason = %failure.reason, "failed to remove staged image");
                }
                if !report.removed.is_empty() {
                    info!(removed = report.removed.len(), "removed expired staged images");
                }
            }
            Err(e) => warn!(error = %e, "failed to cleanup"),
        }
    }

    /// ループを別タスクで起動し、停止用のハンドルを返す
    pub fn spawn(self) -> ReaperHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move { self.run(shutdown_rx).await });
        ReaperHandle { shutdown_tx, join }
    }
}

/// Reaper task handle.
/// - `request_shutdown()` で停止を要求（実行中の sweep は最後まで走る）
/// - ハンドルを drop しても signal が閉じるのでループは止まる
pub struct ReaperHandle {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<StopCause>,
}

impl ReaperHandle {
    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for the loop to exit.
    pub async fn shutdown_and_join(self) -> Result<StopCause, JoinError> {
        self.request_shutdown();
        self.join.await
    }
}
