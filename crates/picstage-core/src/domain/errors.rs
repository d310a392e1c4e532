//! Errors - エラー型と分類
//!
//! # 分類
//! - **Storage**: I/O・バックエンド障害、不正な content（呼び出し元へ返す）
//! - **NotFound**: 存在しない ImageId（呼び出し元へ返す）
//! - **Parse**: HTML が解析できない（extract の呼び出し元へ返す）
//!
//! scheduler の commit 失敗と reaper の sweep 失敗はログのみで伝播しません。

use thiserror::Error;

use super::ids::ImageId;

/// ImageError は store / service の操作エラー
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("image {id} not found")]
    NotFound { id: ImageId },

    #[error("can't parse content: {message}")]
    Parse { message: String },
}

impl ImageError {
    pub fn not_found(id: &ImageId) -> Self {
        Self::NotFound { id: id.clone() }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<std::io::Error> for ImageError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(StorageError::Io(err))
    }
}

/// StorageError は永続化層の失敗
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("image content is empty")]
    EmptyContent,

    #[error("image content exceeds the limit of {limit} bytes")]
    TooLarge { limit: u64 },

    #[error("invalid image id: {0}")]
    InvalidId(#[from] IdError),

    #[error("{0}")]
    Backend(String),
}

/// IdError は ImageId の解析・検証エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("image id must look like <user>/<file>, got {0:?}")]
    MissingSeparator(String),

    #[error("image id has an empty {0} segment")]
    EmptySegment(&'static str),

    #[error("invalid {kind} segment {value:?}")]
    InvalidSegment { kind: &'static str, value: String },
}

/// ConfigError は ServiceConfig の検証エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("staging ttl must be greater than zero")]
    ZeroTtl,

    #[error("image api marker must not be empty")]
    EmptyImageApi,
}
