//! picstage-core
//!
//! アップロード画像の staged → committed ライフサイクルと、
//! commit されなかった画像のガベージコレクション。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ImageId, ImageState, ImageMeta, CleanupReport, errors）
//! - **ports**: 抽象化レイヤー（ImageStore, Clock, FileNameGenerator）
//! - **app**: アプリケーションロジック（ImageService, StagingScheduler, ReaperLoop, ReferenceExtractor）
//! - **impls**: 実装（InMemoryImageStore, LocalFsImageStore）

pub mod app;
pub mod domain;
pub mod impls;
pub mod ports;

pub use app::{ImageService, ServiceBuilder, ServiceConfig, StopCause};
pub use domain::{ImageError, ImageId, ImageState};
pub use ports::ImageStore;
