//! ReferenceExtractor - content 内で参照されている画像の抽出
//!
//! 描画済み HTML を解析し、`<img src>` のうち image API marker を含む URL から
//! ImageId（末尾 2 セグメント `<user>/<file>`）を取り出します。
//!
//! # 方針
//! - 結果は集合として扱う（重複なし、文書中で最初に現れた順）
//! - 個々の壊れた要素（src なし、セグメント不足、不正な id）は黙って飛ばす
//! - 入力がタグ・属性・コメントの途中で途切れている場合だけ Parse エラー
//!   （末尾にぽつんと残った `<` は文字として扱う）

use scraper::{ElementRef, Html};
use std::collections::HashSet;

use crate::domain::{ImageError, ImageId};

/// ReferenceExtractor は HTML から参照中の ImageId を集める
///
/// # 使用例
/// ```ignore
/// let extractor = ReferenceExtractor::new("/api/v1/picture/");
/// let ids = extractor.extract_pictures(r#"<img src="/api/v1/picture/u1/a.png">"#)?;
/// assert_eq!(ids[0].to_string(), "u1/a.png");
/// ```
#[derive(Debug, Clone)]
pub struct ReferenceExtractor {
    image_api: String,
}

impl ReferenceExtractor {
    pub fn new(image_api: impl Into<String>) -> Self {
        Self {
            image_api: image_api.into(),
        }
    }

    pub fn image_api(&self) -> &str {
        &self.image_api
    }

    /// content 内の自前画像の ImageId を返す
    ///
    /// # Errors
    /// 入力の途中で tokenizer が EOF に達した（途切れた markup）場合 `ImageError::Parse`。
    pub fn extract_pictures(&self, content: &str) -> Result<Vec<ImageId>, ImageError> {
        let document = Html::parse_fragment(content);
        if let Some(err) = eof_error(&document)
            && !ends_with_bare_tag_open(content)
        {
            return Err(ImageError::parse(format!("truncated markup: {err}")));
        }

        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for node in document.root_element().descendants() {
            let Some(element) = ElementRef::wrap(node) else {
                continue;
            };
            if element.value().name() != "img" {
                continue;
            }
            if let Some(id) = element.value().attr("src").and_then(|src| self.id_from_src(src))
                && seen.insert(id.clone())
            {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    /// marker より後ろのパスから末尾 2 セグメントを ImageId にする
    fn id_from_src(&self, src: &str) -> Option<ImageId> {
        let (_, after_marker) = src.split_once(self.image_api.as_str())?;
        let path = after_marker.split(['?', '#']).next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let [.., user_id, file_name] = segments.as_slice() else {
            return None;
        };
        ImageId::new(*user_id, *file_name).ok()
    }
}

/// tokenizer がタグ・属性・コメントの途中で入力終端に達したときのエラー
fn eof_error(document: &Html) -> Option<&str> {
    document
        .errors
        .iter()
        .find(|e| e.contains("EOF"))
        .map(|e| &**e)
}

/// 末尾の `<` / `</` だけが EOF の原因なら、それはただの文字として扱う。
/// 取り除いても EOF エラーが残る（属性値やコメントの中の `<`）なら途切れた markup。
fn ends_with_bare_tag_open(content: &str) -> bool {
    content
        .strip_suffix("</")
        .or_else(|| content.strip_suffix('<'))
        .is_some_and(|rest| eof_error(&Html::parse_fragment(rest)).is_none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const MARKER: &str = "/api/v1/picture/";

    fn extract(content: &str) -> Result<Vec<String>, ImageError> {
        let ids = ReferenceExtractor::new(MARKER).extract_pictures(content)?;
        Ok(ids.into_iter().map(|id| id.to_string()).collect())
    }

    #[test]
    fn finds_own_images_and_ignores_third_party() {
        let html = r#"<p>look <img src="https://example.com/api/v1/picture/u123/pic.png"> and
            <img src="https://other.example/x.png"></p>"#;
        assert_eq!(extract(html).unwrap(), vec!["u123/pic.png"]);
    }

    #[test]
    fn keeps_document_order_without_duplicates() {
        let html = r#"
            <img src="/api/v1/picture/u1/b.png">
            <div><img src="/api/v1/picture/u1/a.png"></div>
            <img src="/api/v1/picture/u1/b.png">
        "#;
        assert_eq!(extract(html).unwrap(), vec!["u1/b.png", "u1/a.png"]);
    }

    #[rstest]
    #[case::query("/api/v1/picture/u1/a.png?w=100", Some("u1/a.png"))]
    #[case::fragment("/api/v1/picture/u1/a.png#top", Some("u1/a.png"))]
    #[case::trailing_slash("/api/v1/picture/u1/a.png/", Some("u1/a.png"))]
    #[case::last_two_segments("/api/v1/picture/x/u1/a.png", Some("u1/a.png"))]
    #[case::single_segment("/api/v1/picture/a.png", None)]
    #[case::marker_only("/api/v1/picture/", None)]
    #[case::dot_segments("/api/v1/picture/../..", None)]
    fn src_to_id(#[case] src: &str, #[case] expected: Option<&str>) {
        let id = ReferenceExtractor::new(MARKER).id_from_src(src);
        assert_eq!(id.map(|id| id.to_string()).as_deref(), expected);
    }

    #[test]
    fn skips_malformed_img_elements() {
        let html = r#"<img><img src=""><img alt="x" src="/api/v1/picture/u9"><p><b>unbalanced</p>
            <img src="/api/v1/picture/u1/ok.jpg">"#;
        assert_eq!(extract(html).unwrap(), vec!["u1/ok.jpg"]);
    }

    #[test]
    fn empty_content_has_no_pictures() {
        assert!(extract("").unwrap().is_empty());
        assert!(extract("plain text, no markup").unwrap().is_empty());
    }

    #[rstest]
    #[case::inside_attribute(r#"<p>see <img src="/api/v1/picture/u1/a.png"#)]
    #[case::inside_tag(r#"<p>see <img src="/api/v1/picture/u1/a.png" "#)]
    #[case::inside_comment("<p>ok</p><!-- never closed")]
    #[case::lt_inside_attribute(r#"<img src="/api/v1/picture/u1/a<"#)]
    fn truncated_markup_is_a_parse_error(#[case] html: &str) {
        let err = extract(html).unwrap_err();
        assert!(matches!(err, ImageError::Parse { .. }), "{err}");
    }

    #[rstest]
    #[case::text_then_lt("x <")]
    #[case::element_then_lt(r#"<p><img src="/api/v1/picture/u1/a.png"></p><"#)]
    #[case::dangling_end_tag_open("a </")]
    #[case::unclosed_elements(r#"<div><p><img src="/api/v1/picture/u1/a.png">"#)]
    fn trailing_text_is_not_truncation(#[case] html: &str) {
        let ids = extract(html).unwrap();
        assert!(ids.len() <= 1, "{ids:?}");
        assert!(ids.iter().all(|id| id == "u1/a.png"));
    }
}
