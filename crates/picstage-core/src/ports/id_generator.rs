//! FileNameGenerator port - 保存時のファイル名生成
//!
//! save のたびに user スコープで新しいファイル名を割り当てます。
//! 元のファイル名は拡張子だけを引き継ぎます。
//!
//! # 実装
//! - **UlidFileNames**: ULID ベース（本番用）

use crate::ports::Clock;
use ulid::Ulid;

/// 引き継ぐ拡張子の最大長
const MAX_EXTENSION_LEN: usize = 8;

/// FileNameGenerator は ImageId の file_name 部分を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（store は複数タスクから使われる）
pub trait FileNameGenerator: Send + Sync {
    /// `original` はアップロード時のファイル名（拡張子の判定にのみ使う）
    fn generate(&self, original: &str) -> String;
}

/// UlidFileNames は ULID ベースのファイル名生成器
///
/// Clock を使って現在時刻ベースの ULID を生成します。
/// 同じディレクトリ内で生成順にソートされます。
pub struct UlidFileNames<C> {
    clock: C,
}

impl<C: Clock> UlidFileNames<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> FileNameGenerator for UlidFileNames<C> {
    fn generate(&self, original: &str) -> String {
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        let stem = ulid.to_string().to_lowercase();
        match extension(original) {
            Some(ext) => format!("{stem}.{ext}"),
            None => stem,
        }
    }
}

/// 短い英数字の拡張子だけを小文字で返す
fn extension(original: &str) -> Option<String> {
    let base = original.rsplit(['/', '\\']).next().unwrap_or(original);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty()
        || ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
