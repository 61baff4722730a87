use serde::Serialize;

use crate::parsers::html::html_to_dom;
use crate::rewrite::config::RewriteConfig;
use crate::rewrite::document::LiveDocument;
use crate::rewrite::error::RewriteResult;
use crate::rewrite::pipeline::SegmentSource;

pub const DEFAULT_ENCODING: &str = "utf-8";

/// 一次性改写的结果
#[derive(Debug, Clone, Serialize)]
pub struct RewriteOutput {
    #[serde(skip)]
    pub html: Vec<u8>,
    pub text_nodes: usize,
    pub replacements: usize,
    pub rejected_segments: usize,
}

/// 解析、改写并序列化一份 HTML 文档
///
/// 只执行初始遍历，不开启变更观察
pub async fn rewrite_html<S>(
    input: &[u8],
    encoding: &str,
    config: &RewriteConfig,
    source: S,
) -> RewriteResult<RewriteOutput>
where
    S: SegmentSource + 'static,
{
    let dom = html_to_dom(input, encoding)?;
    let document = LiveDocument::without_observation(dom);
    let service = crate::rewrite::core::RewriteService::new(document, config.clone(), source)?;

    let text_nodes = service.process_document().await;
    let stats = service.stats();
    let html = service.document().serialize(encoding)?;

    Ok(RewriteOutput {
        html,
        text_nodes,
        replacements: stats.replacements,
        rejected_segments: stats.rejected_segments,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::pipeline::Dictionary;

    #[tokio::test]
    async fn test_rewrite_html_replaces_and_keeps_skipped_text() {
        let dict = Dictionary::new([("Donald Trump", "Agent Orange")]);
        let input = b"<p>Donald Trump said hi</p><code>Donald Trump</code>";

        let output = rewrite_html(input, DEFAULT_ENCODING, &RewriteConfig::default(), dict)
            .await
            .unwrap();
        let html = String::from_utf8(output.html).unwrap();

        assert_eq!(output.replacements, 1);
        assert!(html.contains(r#"data-original-text="Donald Trump""#));
        assert!(html.contains(">Agent Orange</span> said hi</p>"));
        assert!(html.contains("<code>Donald Trump</code>"));
    }

    #[tokio::test]
    async fn test_rewrite_html_respects_encoding() {
        let dict = Dictionary::new([("café", "coffee")]);
        // windows-1252 编码的 "café"
        let input = b"<p>caf\xe9</p>";

        let output = rewrite_html(input, "windows-1252", &RewriteConfig::default(), dict)
            .await
            .unwrap();
        assert_eq!(output.replacements, 1);
    }

    #[tokio::test]
    async fn test_rewrite_html_inline_style_visibility() {
        let dict = Dictionary::new([("cat", "dog")]);
        let input = concat!(
            r#"<div style="display:/**/none">cat</div>"#,
            r#"<div style='--v: "1;display:none;"'>cat</div>"#,
        );

        let output = rewrite_html(input.as_bytes(), DEFAULT_ENCODING, &RewriteConfig::default(), dict)
            .await
            .unwrap();
        let html = String::from_utf8(output.html).unwrap();

        assert_eq!(output.replacements, 1);
        assert!(html.contains(r#"<div style="display:/**/none">cat</div>"#));
    }
}
