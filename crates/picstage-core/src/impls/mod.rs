//! Impls - ImageStore の実装
//!
//! # 含まれる実装
//! - **InMemoryImageStore**: 開発・テスト用
//! - **LocalFsImageStore**: ローカルファイルシステム（staging / location）
//!
//! オブジェクトストレージや DB の実装は別クレートに置く想定です。

pub mod fs_store;
pub mod inmem_store;

pub use self::fs_store::LocalFsImageStore;
pub use self::inmem_store::InMemoryImageStore;

use tokio::io::AsyncReadExt;

use crate::domain::StorageError;
use crate::ports::ImageReader;

/// Default upload size limit (5 MiB).
pub const DEFAULT_MAX_SIZE: u64 = 5 * 1024 * 1024;

/// Read the whole upload, rejecting empty content and content over `limit`.
pub(crate) async fn read_limited(content: ImageReader, limit: u64) -> Result<Vec<u8>, StorageError> {
    let mut buf = Vec::new();
    content
        .take(limit.saturating_add(1))
        .read_to_end(&mut buf)
        .await?;
    if buf.is_empty() {
        return Err(StorageError::EmptyContent);
    }
    if buf.len() as u64 > limit {
        return Err(StorageError::TooLarge { limit });
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reader(bytes: &'static [u8]) -> ImageReader {
        Box::new(bytes)
    }

    #[tokio::test]
    async fn reads_content_within_limit() {
        let buf = read_limited(reader(b"abcd"), 4).await.unwrap();
        assert_eq!(buf, b"abcd");
    }

    #[tokio::test]
    async fn rejects_empty_and_oversized_content() {
        assert!(matches!(
            read_limited(reader(b""), 4).await,
            Err(StorageError::EmptyContent)
        ));
        assert!(matches!(
            read_limited(reader(b"abcde"), 4).await,
            Err(StorageError::TooLarge { limit: 4 })
        ));
    }
}
