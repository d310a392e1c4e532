//! Domain identifiers.
//!
//! # ImageId
//! `"<user_id>/<file_name>"` 形式の識別子です。
//! - store のキー（FS 実装ではそのままパスの一部になる）
//! - 描画後 HTML の `<img src>` URL の末尾 2 セグメント
//!
//! 一意性は user ごとのスコープで保証されます。
//! パスとして安全に使えるよう、空・`.`・`..`・区切り文字を含むセグメントは拒否します。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::IdError;

/// ImageId は staged / committed を問わず画像を指す識別子
///
/// # 例
/// ```ignore
/// let id: ImageId = "u123/pic.png".parse()?;
/// assert_eq!(id.user_id(), "u123");
/// assert_eq!(id.to_string(), "u123/pic.png");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageId {
    user_id: String,
    file_name: String,
}

impl ImageId {
    /// user と file name から ImageId を作成（両セグメントを検証）
    pub fn new(user_id: impl Into<String>, file_name: impl Into<String>) -> Result<Self, IdError> {
        let user_id = user_id.into();
        let file_name = file_name.into();
        validate_segment("user", &user_id)?;
        validate_segment("file", &file_name)?;
        Ok(Self { user_id, file_name })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

/// セグメント単体の検証。store 実装が user_id を受け取った時点でも使う。
pub(crate) fn validate_segment(kind: &'static str, value: &str) -> Result<(), IdError> {
    if value.is_empty() {
        return Err(IdError::EmptySegment(kind));
    }
    if value == "." || value == ".." || value.contains(['/', '\\', '\0']) {
        return Err(IdError::InvalidSegment {
            kind,
            value: value.to_string(),
        });
    }
    Ok(())
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.file_name)
    }
}

impl FromStr for ImageId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (user_id, file_name) = s
            .split_once('/')
            .ok_or_else(|| IdError::MissingSeparator(s.to_string()))?;
        Self::new(user_id, file_name)
    }
}

impl TryFrom<String> for ImageId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ImageId> for String {
    fn from(id: ImageId) -> Self {
        id.to_string()
    }
}
