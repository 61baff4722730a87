use std::cell::RefCell;
use std::rc::Rc;

use encoding_rs::Encoding;
use html5ever::interface::{Attribute, QualName};
use html5ever::parse_document;
use html5ever::tendril::{StrTendril, TendrilSink};
use html5ever::{namespace_url, ns, LocalName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom};

use crate::rewrite::error::{RewriteError, RewriteResult};

/// 将 HTML 字节转换为 DOM
pub fn html_to_dom(data: &[u8], document_encoding: &str) -> RewriteResult<RcDom> {
    let s: String = match Encoding::for_label(document_encoding.as_bytes()) {
        Some(encoding) => {
            let (string, _, _) = encoding.decode(data);
            string.into_owned()
        }
        None => String::from_utf8_lossy(data).into_owned(),
    };

    parse_document(RcDom::default(), Default::default())
        .from_utf8()
        .read_from(&mut s.as_bytes())
        .map_err(|e| RewriteError::ParseError(format!("HTML解析失败: {}", e)))
}

/// 获取节点名称（小写）
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| &*attr.name.local == attr_name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

/// 检查节点是否带有指定属性
pub fn has_node_attr(node: &Handle, attr_name: &str) -> bool {
    match &node.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .any(|attr| &*attr.name.local == attr_name),
        _ => false,
    }
}

/// 设置节点属性
///
/// `attr_value` 为 `None` 时移除该属性；非元素节点上是空操作
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: Option<&str>) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let attrs_mut = &mut attrs.borrow_mut();

        match attr_value {
            Some(value) => {
                if let Some(existing) = attrs_mut
                    .iter_mut()
                    .find(|attr| &*attr.name.local == attr_name)
                {
                    existing.value = StrTendril::from_slice(value);
                } else {
                    attrs_mut.push(Attribute {
                        name: QualName::new(None, ns!(), LocalName::from(attr_name)),
                        value: StrTendril::from_slice(value),
                    });
                }
            }
            None => attrs_mut.retain(|attr| &*attr.name.local != attr_name),
        }
    }
}

/// 获取文本节点内容
pub fn get_text(node: &Handle) -> Option<String> {
    match &node.data {
        NodeData::Text { contents } => Some(contents.borrow().to_string()),
        _ => None,
    }
}

/// 获取父节点
///
/// 读取后会把弱引用放回去，不会破坏父子关系
pub fn get_parent_node(child: &Handle) -> Option<Handle> {
    let weak = child.parent.take();
    let parent = weak.as_ref().and_then(|w| w.upgrade());
    child.parent.set(weak);
    parent
}

/// 检查 `ancestor` 是否为 `node` 自身或其祖先
pub fn is_inclusive_ancestor(ancestor: &Handle, node: &Handle) -> bool {
    let mut current = Some(node.clone());
    while let Some(n) = current {
        if Rc::ptr_eq(&n, ancestor) {
            return true;
        }
        current = get_parent_node(&n);
    }
    false
}

/// 检查节点是否仍挂在某个文档节点之下
pub fn is_attached(node: &Handle) -> bool {
    let mut current = node.clone();
    loop {
        if let NodeData::Document = current.data {
            return true;
        }
        match get_parent_node(&current) {
            Some(parent) => current = parent,
            None => return false,
        }
    }
}

/// 子节点在父节点中的位置
pub fn child_index(parent: &Handle, child: &Handle) -> Option<usize> {
    parent
        .children
        .borrow()
        .iter()
        .position(|c| Rc::ptr_eq(c, child))
}

/// 创建文本节点（未挂载）
pub fn create_text_node(text: &str) -> Handle {
    Node::new(NodeData::Text {
        contents: RefCell::new(StrTendril::from_slice(text)),
    })
}

/// 创建元素节点（未挂载）
pub fn create_element(tag: &str, attributes: &[(&str, &str)]) -> Handle {
    let attrs = attributes
        .iter()
        .map(|(name, value)| Attribute {
            name: QualName::new(None, ns!(), LocalName::from(*name)),
            value: StrTendril::from_slice(value),
        })
        .collect();

    Node::new(NodeData::Element {
        name: QualName::new(None, ns!(html), LocalName::from(tag)),
        attrs: RefCell::new(attrs),
        template_contents: RefCell::new(None),
        mathml_annotation_xml_integration_point: false,
    })
}

/// 把 `child` 从原父节点中摘下
pub fn detach_node(child: &Handle) {
    if let Some(parent) = get_parent_node(child) {
        parent
            .children
            .borrow_mut()
            .retain(|c| !Rc::ptr_eq(c, child));
    }
    child.parent.set(None);
}

/// 在 `parent` 的 `index` 位置插入子节点
///
/// `child` 先从原位置摘下，`index` 按摘下之后的子节点列表计算
pub fn insert_child_at(parent: &Handle, index: usize, child: Handle) {
    detach_node(&child);
    child.parent.set(Some(Rc::downgrade(parent)));
    let mut children = parent.children.borrow_mut();
    let index = index.min(children.len());
    children.insert(index, child);
}

/// 用 `replacement` 替换 `old`，返回父节点
pub fn replace_node(old: &Handle, replacement: Handle) -> RewriteResult<Handle> {
    let parent = get_parent_node(old)
        .ok_or_else(|| RewriteError::DetachedNode("被替换节点没有父节点".to_string()))?;
    if Rc::ptr_eq(old, &replacement) {
        return Ok(parent);
    }

    detach_node(&replacement);
    let index = child_index(&parent, old)
        .ok_or_else(|| RewriteError::DetachedNode("被替换节点不在父节点的子节点中".to_string()))?;

    replacement.parent.set(Some(Rc::downgrade(&parent)));
    parent.children.borrow_mut()[index] = replacement;
    old.parent.set(None);

    Ok(parent)
}

/// 在字节偏移 `offset` 处拆分文本节点
///
/// 原节点保留 `[0, offset)`，新节点持有 `[offset, len)` 并插入到原节点之后。
/// 位置校验全部通过后才修改文本，失败时节点保持原样。
pub fn split_text_node(node: &Handle, offset: usize) -> RewriteResult<Handle> {
    let NodeData::Text { contents } = &node.data else {
        return Err(RewriteError::InvalidInput("只能拆分文本节点".to_string()));
    };

    let parent = get_parent_node(node)
        .ok_or_else(|| RewriteError::DetachedNode("待拆分的文本节点没有父节点".to_string()))?;
    let index = child_index(&parent, node)
        .ok_or_else(|| RewriteError::DetachedNode("待拆分的文本节点不在父节点的子节点中".to_string()))?;

    let tail = {
        let mut text = contents.borrow_mut();
        if offset > text.len() || !text.is_char_boundary(offset) {
            return Err(RewriteError::InvalidInput(format!(
                "拆分位置 {} 无效（文本长度 {}）",
                offset,
                text.len()
            )));
        }
        let tail = text[offset..].to_string();
        let head = StrTendril::from_slice(&text[..offset]);
        *text = head;
        tail
    };

    let new_node = create_text_node(&tail);
    insert_child_at(&parent, index + 1, new_node.clone());
    Ok(new_node)
}

/// 按名称查找第一个匹配的后代元素（迭代实现）
pub fn find_element_by_name(root: &Handle, node_name: &str) -> Option<Handle> {
    let mut stack = vec![root.clone()];
    while let Some(node) = stack.pop() {
        if get_node_name(&node) == Some(node_name) {
            return Some(node);
        }
        for child in node.children.borrow().iter().rev() {
            stack.push(child.clone());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_of(dom: &RcDom) -> Handle {
        find_element_by_name(&dom.document, "body").unwrap()
    }

    #[test]
    fn test_get_parent_node_is_not_destructive() {
        let dom = html_to_dom(b"<p>hello</p>", "utf-8").unwrap();
        let p = find_element_by_name(&dom.document, "p").unwrap();
        let text = p.children.borrow()[0].clone();

        let first = get_parent_node(&text).unwrap();
        let second = get_parent_node(&text).unwrap();
        assert!(Rc::ptr_eq(&first, &p));
        assert!(Rc::ptr_eq(&second, &p));
    }

    #[test]
    fn test_set_and_remove_attr() {
        let el = create_element("span", &[("class", "a")]);
        set_node_attr(&el, "class", Some("b"));
        set_node_attr(&el, "title", Some("t"));
        assert_eq!(get_node_attr(&el, "class").as_deref(), Some("b"));
        assert_eq!(get_node_attr(&el, "title").as_deref(), Some("t"));

        set_node_attr(&el, "class", None);
        assert!(!has_node_attr(&el, "class"));
    }

    #[test]
    fn test_split_text_node() {
        let dom = html_to_dom(b"<body>Hello world</body>", "utf-8").unwrap();
        let body = body_of(&dom);
        let text = body.children.borrow()[0].clone();

        let tail = split_text_node(&text, 5).unwrap();
        assert_eq!(get_text(&text).as_deref(), Some("Hello"));
        assert_eq!(get_text(&tail).as_deref(), Some(" world"));
        assert_eq!(body.children.borrow().len(), 2);
        assert!(Rc::ptr_eq(&get_parent_node(&tail).unwrap(), &body));
    }

    #[test]
    fn test_split_text_node_rejects_non_char_boundary() {
        let dom = html_to_dom("<body>世界</body>".as_bytes(), "utf-8").unwrap();
        let body = body_of(&dom);
        let text = body.children.borrow()[0].clone();

        assert!(split_text_node(&text, 1).is_err());
        assert_eq!(get_text(&text).as_deref(), Some("世界"));
    }

    #[test]
    fn test_split_detached_text_node_fails() {
        let text = create_text_node("orphan");
        assert!(matches!(
            split_text_node(&text, 2),
            Err(RewriteError::DetachedNode(_))
        ));
    }

    #[test]
    fn test_replace_node_keeps_position() {
        let dom = html_to_dom(b"<body><i>a</i><b>b</b><u>c</u></body>", "utf-8").unwrap();
        let body = body_of(&dom);
        let b = find_element_by_name(&body, "b").unwrap();
        let span = create_element("span", &[]);

        replace_node(&b, span.clone()).unwrap();
        let names: Vec<_> = body
            .children
            .borrow()
            .iter()
            .map(|c| get_node_name(c).unwrap_or("").to_string())
            .collect();
        assert_eq!(names, vec!["i", "span", "u"]);
        assert!(get_parent_node(&b).is_none());
    }

    #[test]
    fn test_split_keeps_text_when_sibling_lookup_fails() {
        let dom = html_to_dom(b"<body></body>", "utf-8").unwrap();
        let body = body_of(&dom);
        let stray = create_text_node("Hello world");
        stray.parent.set(Some(Rc::downgrade(&body)));

        assert!(matches!(
            split_text_node(&stray, 5),
            Err(RewriteError::DetachedNode(_))
        ));
        assert_eq!(get_text(&stray).as_deref(), Some("Hello world"));
        assert!(body.children.borrow().is_empty());
    }

    fn child_names(parent: &Handle) -> Vec<String> {
        parent
            .children
            .borrow()
            .iter()
            .map(|c| get_node_name(c).unwrap_or("#text").to_string())
            .collect()
    }

    #[test]
    fn test_moves_within_same_parent() {
        let dom = html_to_dom(b"<body><a></a><b></b><i></i><u></u></body>", "utf-8").unwrap();
        let body = body_of(&dom);
        let a = find_element_by_name(&body, "a").unwrap();
        let b = find_element_by_name(&body, "b").unwrap();
        let u = find_element_by_name(&body, "u").unwrap();

        insert_child_at(&body, 2, a.clone());
        assert_eq!(child_names(&body), vec!["b", "i", "a", "u"]);

        replace_node(&u, b.clone()).unwrap();
        assert_eq!(child_names(&body), vec!["i", "a", "b"]);
        assert!(get_parent_node(&u).is_none());

        replace_node(&a, a.clone()).unwrap();
        assert_eq!(child_names(&body), vec!["i", "a", "b"]);
    }

    #[test]
    fn test_split_text_node_in_middle_of_siblings() {
        let dom = html_to_dom(b"<body><i></i>Hello world<b></b></body>", "utf-8").unwrap();
        let body = body_of(&dom);
        let text = body.children.borrow()[1].clone();

        let tail = split_text_node(&text, 6).unwrap();
        assert_eq!(child_names(&body), vec!["i", "#text", "#text", "b"]);
        assert!(Rc::ptr_eq(&body.children.borrow()[2], &tail));
        assert_eq!(get_text(&tail).as_deref(), Some("world"));
    }

    #[test]
    fn test_is_attached() {
        let dom = html_to_dom(b"<p>x</p>", "utf-8").unwrap();
        let p = find_element_by_name(&dom.document, "p").unwrap();
        assert!(is_attached(&p));

        detach_node(&p);
        assert!(!is_attached(&p));
        assert!(is_inclusive_ancestor(&p, &p.children.borrow()[0]));
    }
}
