//! Clock port - 時刻の抽象化
//!
//! # 実装
//! - **SystemClock**: 壁時計（FS store の mtime と比較するため本番用）
//! - **MonotonicClock**: 生成時の壁時計を起点に tokio の単調時計で進む
//! - **FixedClock**: テスト用（set / advance で手動操作）

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Clock は現在時刻を提供
///
/// # テスト容易性
/// - trait により時刻を差し替え可能
/// - store の staging 経過時間はすべてこの Clock で測る
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

/// SystemClock は OS の壁時計
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// MonotonicClock は壁時計を一度だけ読み、以降は tokio の単調時計で進む
///
/// tokio の時計が pause されているテストでは仮想時間に従うため、
/// `tokio::time::advance` だけで staging の経過時間を進められます。
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    anchor_wall: DateTime<Utc>,
    anchor: tokio::time::Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            anchor_wall: Utc::now(),
            anchor: tokio::time::Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> DateTime<Utc> {
        chrono::Duration::from_std(self.anchor.elapsed())
            .map(|elapsed| self.anchor_wall + elapsed)
            .unwrap_or(self.anchor_wall)
    }
}

/// FixedClock はテスト用の手動時計
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        if let Ok(by) = chrono::Duration::from_std(by) {
            *now += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_clock_advances_manually() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now(), start + chrono::Duration::seconds(90));

        let shared: Arc<dyn Clock> = Arc::new(FixedClock::new(start));
        assert_eq!(shared.now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn monotonic_clock_follows_paused_tokio_time() {
        let clock = MonotonicClock::new();
        let before = clock.now();

        tokio::time::advance(Duration::from_secs(5)).await;

        let elapsed = clock.now() - before;
        assert_eq!(elapsed, chrono::Duration::seconds(5));
    }
}
