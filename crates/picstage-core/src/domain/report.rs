//! CleanupReport - 1 回の sweep の結果
//!
//! 一部の削除失敗で sweep 全体を止めないため、失敗は `Err` ではなく
//! report に集めて返します。

use serde::{Deserialize, Serialize};

use super::ids::ImageId;

/// 1 件分の削除失敗
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupFailure {
    /// ImageId として解釈できない場合はパスなどの生の値
    pub target: String,
    pub reason: String,
}

/// CleanupReport は sweep で削除した id と失敗を保持
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub removed: Vec<ImageId>,
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    pub fn record_removed(&mut self, id: ImageId) {
        self.removed.push(id);
    }

    pub fn record_failure(&mut self, target: impl Into<String>, reason: impl ToString) {
        self.failures.push(CleanupFailure {
            target: target.into(),
            reason: reason.to_string(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}
