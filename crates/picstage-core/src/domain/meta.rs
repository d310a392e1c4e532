//! Image metadata and TTL arithmetic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::ids::ImageId;
use super::state::ImageState;

/// Metadata of a stored image (no content).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMeta {
    pub id: ImageId,
    pub state: ImageState,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

impl ImageMeta {
    /// Should a sweep at `now` with `ttl` remove this image?
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.state.is_expirable() && is_past_ttl(self.created_at, now, ttl)
    }
}

/// `now - created_at > ttl`.
///
/// Age equal to the ttl is still retained. A ttl too large for chrono never expires.
pub fn is_past_ttl(created_at: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    let Ok(ttl) = chrono::Duration::from_std(ttl) else {
        return false;
    };
    now.signed_duration_since(created_at) > ttl
}
