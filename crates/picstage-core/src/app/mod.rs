//! App - アプリケーション層
//!
//! ports を組み合わせて画像のライフサイクルを実装します。
//!
//! # 主要コンポーネント
//! - **ServiceBuilder**: 構築と起動時検証
//! - **ImageService**: 利用者向けファサード
//! - **StagingScheduler**: 遅延 commit
//! - **ReferenceExtractor**: HTML からの ImageId 抽出
//! - **ReaperLoop**: staging の期限切れ回収

pub mod builder;
pub mod config;
pub mod extractor;
pub mod reaper_loop;
pub mod scheduler;
pub mod service;

// 主要な型を再エクスポート
pub use self::builder::{BuildError, ServiceBuilder};
pub use self::config::{DEFAULT_IMAGE_API, ServiceConfig};
pub use self::extractor::ReferenceExtractor;
pub use self::reaper_loop::{ReaperHandle, ReaperLoop, StopCause};
pub use self::scheduler::StagingScheduler;
pub use self::service::ImageService;
