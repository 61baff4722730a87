use encoding_rs::Encoding;
use html5ever::serialize::{serialize, SerializeOpts};
use markup5ever_rcdom::{Handle, RcDom, SerializableHandle};

use crate::rewrite::error::{RewriteError, RewriteResult};

/// 序列化文档
///
/// `document_encoding` 为空或无法识别时输出 UTF-8
pub fn serialize_document(dom: &RcDom, document_encoding: &str) -> RewriteResult<Vec<u8>> {
    let buf = serialize_node(&dom.document)?;

    if !document_encoding.is_empty() {
        if let Some(encoding) = Encoding::for_label(document_encoding.as_bytes()) {
            let s: &str = &String::from_utf8_lossy(&buf);
            let (data, _, _) = encoding.encode(s);
            return Ok(data.to_vec());
        }
    }

    Ok(buf)
}

/// 序列化单个节点的子树（不含节点自身）
pub fn serialize_node(node: &Handle) -> RewriteResult<Vec<u8>> {
    let mut buf: Vec<u8> = Vec::new();
    let serializable: SerializableHandle = node.clone().into();
    serialize(&mut buf, &serializable, SerializeOpts::default())
        .map_err(|e| RewriteError::SerializationError(format!("DOM序列化失败: {}", e)))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::dom::{find_element_by_name, html_to_dom};

    #[test]
    fn test_serialize_node_children_only() {
        let dom = html_to_dom(b"<p>a <b>b</b></p>", "utf-8").unwrap();
        let p = find_element_by_name(&dom.document, "p").unwrap();
        let out = serialize_node(&p).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "a <b>b</b>");
    }

    #[test]
    fn test_serialize_document_roundtrips_body_text() {
        let dom = html_to_dom(b"<p>hello</p>", "utf-8").unwrap();
        let out = String::from_utf8(serialize_document(&dom, "").unwrap()).unwrap();
        assert!(out.contains("<p>hello</p>"));
    }
}
