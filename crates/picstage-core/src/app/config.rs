//! ServiceConfig - プロセス全体の設定
//!
//! 構築時に一度だけ渡し、実行中の再設定はしません。

use std::time::Duration;

use crate::domain::ConfigError;

/// HTML 内で自前の画像 URL を見分けるためのデフォルトのパス断片
pub const DEFAULT_IMAGE_API: &str = "/api/v1/picture/";

/// reaper の最短周期（ttl が極端に短いときの下限）
const MIN_REAP_PERIOD: Duration = Duration::from_millis(1);

/// ServiceConfig は TTL と image API marker を保持
///
/// - `ttl`: staging の最大寿命。遅延 commit の待ち時間にも同じ値を使う
/// - `image_api`: `<img src>` のうち、この断片を含むものだけを自前の画像とみなす
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    ttl: Duration,
    image_api: String,
}

impl ServiceConfig {
    pub fn new(ttl: Duration, image_api: impl Into<String>) -> Result<Self, ConfigError> {
        let image_api = image_api.into();
        if ttl.is_zero() {
            return Err(ConfigError::ZeroTtl);
        }
        if image_api.is_empty() {
            return Err(ConfigError::EmptyImageApi);
        }
        Ok(Self { ttl, image_api })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn image_api(&self) -> &str {
        &self.image_api
    }

    /// reaper の周期（ttl / 2）
    pub fn reap_period(&self) -> Duration {
        reap_period(self.ttl)
    }
}

/// `ttl / 2`, never zero.
///
/// Worst case a staged image is swept at `1.5 * ttl` after creation.
pub fn reap_period(ttl: Duration) -> Duration {
    (ttl / 2).max(MIN_REAP_PERIOD)
}
