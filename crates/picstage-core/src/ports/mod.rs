//! Ports - 抽象化レイヤー
//!
//! 外部システム（ストレージ、時刻、ID 採番）へのインターフェースを定義します。
//! app はこれらの trait だけに依存し、実装は impls か利用側が提供します。

pub mod clock;
pub mod id_generator;
pub mod image_store;

pub use self::clock::{Clock, FixedClock, MonotonicClock, SystemClock};
pub use self::id_generator::{FileNameGenerator, UlidFileNames};
pub use self::image_store::{ImageReader, ImageStore};
