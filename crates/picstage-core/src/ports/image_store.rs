//! ImageStore port - 永続化層（InMemory / LocalFs / 外部ストレージ）
//!
//! 各画像は staged と committed の 2 状態を持ちます。
//!
//! # 実装
//! - `impls::InMemoryImageStore`: 開発・テスト用
//! - `impls::LocalFsImageStore`: staging / location の 2 ディレクトリ構成

use async_trait::async_trait;
use std::time::Duration;
use tokio::io::AsyncRead;

use crate::domain::{CleanupReport, ImageError, ImageId};

/// save に渡す content / load が返す content のストリーム
///
/// load の呼び出し元が所有し、drop で解放されます。
pub type ImageReader = Box<dyn AsyncRead + Send + Unpin>;

/// ImageStore は staged / committed の 2 段階保存を提供
///
/// # 設計原則
/// - 状態遷移（staged → committed, staged → 削除）はすべて store 内で原子的に行う
/// - orchestration 層（app）はロックを追加しない
/// - commit と cleanup の競合: commit が先なら sweep は対象外にする。
///   sweep が先なら commit は NotFound を返す。両方が成立することはない
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// content を staged として保存し、user スコープの新しい ImageId を返す
    async fn save(
        &self,
        file_name: &str,
        user_id: &str,
        content: ImageReader,
    ) -> Result<ImageId, ImageError>;

    /// staged を committed へ移す。committed 済みなら何もしない（冪等）
    async fn commit(&self, id: &ImageId) -> Result<(), ImageError>;

    /// 状態に関係なく content とサイズを返す
    async fn load(&self, id: &ImageId) -> Result<(ImageReader, u64), ImageError>;

    /// 経過時間が `ttl` を超えた staged を削除する
    ///
    /// 個別の削除失敗は report に記録して続行します。
    /// `Err` は sweep 自体を開始できない場合のみ。
    async fn cleanup(&self, ttl: Duration) -> Result<CleanupReport, ImageError>;
}
