//! Domain model（ImageId, 状態, メタデータ, sweep 結果, エラー）
//!
//! ports / app / impls はすべてこのモジュールの型を介してやり取りします。

pub mod errors;
pub mod ids;
pub mod meta;
pub mod report;
pub mod state;

pub use self::errors::{ConfigError, IdError, ImageError, StorageError};
pub use self::ids::ImageId;
pub use self::meta::{ImageMeta, is_past_ttl};
pub use self::report::{CleanupFailure, CleanupReport};
pub use self::state::ImageState;
