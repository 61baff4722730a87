// 集成测试公共模块
//
// 提供测试辅助工具和共享功能

use std::rc::Rc;

use markup5ever_rcdom::{Handle, NodeData};
use tempfile::TempDir;

use live_rewrite::parsers::html::{
    create_element, create_text_node, find_element_by_name, get_node_attr, get_text, insert_child_at,
};
use live_rewrite::rewrite::{Dictionary, LiveDocument, ManualClock, RewriteConfig, RewriteService};

/// HTML测试助手
pub struct HtmlTestHelper;

impl HtmlTestHelper {
    /// 创建测试用的活动文档
    pub fn create_document(html: &str) -> LiveDocument {
        LiveDocument::parse(html).unwrap()
    }

    /// 创建简单的英文HTML页面
    pub fn create_simple_english_page() -> String {
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <title>Donald Trump news</title>
    <style>.x { content: "Donald Trump"; }</style>
</head>
<body>
    <h1>Donald Trump said hi</h1>
    <p>Yesterday Donald Trump met Donald Trump's lawyer.</p>
    <div>
        <p>Nothing to see here.</p>
        <p contenteditable="true">Donald Trump in an editor</p>
        <pre>Donald Trump in a pre block</pre>
    </div>
    <div style="display:none">Donald Trump hidden</div>
    <div id="live-rewrite-tooltip">Donald Trump tooltip</div>
    <textarea>Donald Trump draft</textarea>
</body>
</html>"#
            .to_string()
    }

    /// 创建包含大量段落的页面
    pub fn create_large_page(paragraphs: usize) -> String {
        let mut html = String::from("<html><body>");
        for i in 0..paragraphs {
            html.push_str(&format!(
                "<section><h2>Section {}</h2><p>Donald Trump paragraph {} <b>bold {}</b></p><script>var x = {};</script></section>",
                i, i, i, i
            ));
        }
        html.push_str("</body></html>");
        html
    }

    /// 收集子树中的全部文本节点（文档顺序）
    pub fn text_nodes(root: &Handle) -> Vec<Handle> {
        let mut found = Vec::new();
        let mut stack = vec![root.clone()];
        while let Some(node) = stack.pop() {
            if let NodeData::Text { .. } = node.data {
                found.push(node.clone());
            }
            for child in node.children.borrow().iter().rev() {
                stack.push(child.clone());
            }
        }
        found
    }

    /// 收集子树中的标记元素
    pub fn markers(root: &Handle) -> Vec<Handle> {
        let mut found = Vec::new();
        let mut stack = vec![root.clone()];
        while let Some(node) = stack.pop() {
            if get_node_attr(&node, "data-original-text").is_some() {
                found.push(node.clone());
            }
            for child in node.children.borrow().iter().rev() {
                stack.push(child.clone());
            }
        }
        found
    }

    /// 标记元素内的替换文本
    pub fn marker_text(marker: &Handle) -> String {
        marker
            .children
            .borrow()
            .iter()
            .filter_map(get_text)
            .collect()
    }

    /// 创建带文本的元素
    pub fn element_with_text(tag: &str, text: &str) -> Handle {
        let element = create_element(tag, &[]);
        insert_child_at(&element, 0, create_text_node(text));
        element
    }

    pub fn find(root: &Handle, tag: &str) -> Handle {
        find_element_by_name(root, tag).unwrap()
    }
}

/// 测试文档夹具：文档、手动时钟与改写服务
pub struct DocumentFixture {
    pub clock: ManualClock,
    pub service: RewriteService,
}

impl DocumentFixture {
    pub fn new(html: &str) -> Self {
        Self::with_config(html, RewriteConfig::default())
    }

    pub fn with_config(html: &str, config: RewriteConfig) -> Self {
        let clock = ManualClock::new();
        let service = RewriteService::with_clock(
            HtmlTestHelper::create_document(html),
            config,
            default_dictionary(),
            Rc::new(clock.clone()),
        )
        .unwrap();
        Self { clock, service }
    }

    pub fn document(&self) -> &LiveDocument {
        self.service.document()
    }

    pub fn root(&self) -> Handle {
        self.service.document().root().clone()
    }
}

/// 测试用词典
pub fn default_dictionary() -> Dictionary {
    Dictionary::new([("Donald Trump", "Agent Orange"), ("cat", "dog")])
}

/// 测试用临时目录
///
/// 返回的 `TempDir` 被丢弃时目录随之删除
pub fn temp_dir(name: &str) -> TempDir {
    tempfile::Builder::new()
        .prefix(&format!("live-rewrite-{}-", name))
        .tempdir()
        .unwrap()
}
