//! State - 画像の状態
//!
//! # 状態遷移
//! - (absent) -> Staged: save
//! - Staged -> Committed: commit
//! - Staged -> (absent): cleanup（TTL 超過）
//! - Committed -> Committed: commit（冪等）
//!
//! Committed から absent への遷移はこのクレートの範囲外です。

use serde::{Deserialize, Serialize};

/// ImageState は store 内の画像の状態
///
/// absent は「store が知らない」ことで表現するため variant を持ちません。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageState {
    /// 保存済みだが参照元 content が未確定。TTL で削除対象になる。
    Staged,

    /// 参照が確定済み。sweep の対象外。
    Committed,
}

impl ImageState {
    /// Can the reaper remove an image in this state?
    pub fn is_expirable(self) -> bool {
        matches!(self, ImageState::Staged)
    }
}
