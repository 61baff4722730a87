//! 遍历引擎
//!
//! 使用显式栈做深度优先遍历，找出需要改写的文本节点。
//!
//! ## 跳过规则
//!
//! - 已处理的节点（`skip_processed` 为真时）
//! - 标签在 `skip_tags` 中、可编辑、`display:none`/`hidden`、或带有退出标识的元素
//! - 空白文本，或位于可编辑祖先之下的文本
//!
//! ## 分片执行
//!
//! [`TraversalEngine::traverse_chunked`] 每个分片最多处理 `chunk_size` 个节点，
//! 且不超过 `time_slice_ms` 的墙钟时间；分片之间让出执行权，剩余的栈原样保留。
//! 祖先链检查全部用循环实现，不依赖递归深度。

use std::cell::Cell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use markup5ever_rcdom::{Handle, NodeData};

use super::state::NodeStateTracker;
use crate::parsers::html::{get_node_attr, get_parent_node, has_node_attr, is_blank};
use crate::parsers::html::{parse_contenteditable, style_hides_element};
use crate::rewrite::clock::{default_clock, Clock};
use crate::rewrite::config::constants;

/// 遍历选项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraversalOptions {
    /// 跳过的标签（小写）
    pub skip_tags: HashSet<String>,
    /// 是否跳过已处理的节点
    pub skip_processed: bool,
    /// 每个分片最多处理的节点数
    pub chunk_size: usize,
    /// 每个分片的时间预算（毫秒）
    pub time_slice_ms: u64,
    /// 退出改写的元素 id
    pub opt_out_ids: HashSet<String>,
}

impl Default for TraversalOptions {
    fn default() -> Self {
        Self {
            skip_tags: constants::SKIP_TAGS.iter().map(|s| s.to_string()).collect(),
            skip_processed: true,
            chunk_size: constants::DEFAULT_CHUNK_SIZE,
            time_slice_ms: constants::DEFAULT_TIME_SLICE_MS,
            opt_out_ids: constants::DEFAULT_OPT_OUT_IDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// 最近一次遍历的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraversalStats {
    pub nodes_visited: usize,
    pub subtrees_skipped: usize,
    pub text_nodes: usize,
    pub chunks: usize,
}

/// 遍历引擎
#[derive(Clone)]
pub struct TraversalEngine {
    tracker: Rc<NodeStateTracker>,
    clock: Rc<dyn Clock>,
    last_stats: Rc<Cell<TraversalStats>>,
}

impl fmt::Debug for TraversalEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraversalEngine")
            .field("clock", &self.clock)
            .field("last_stats", &self.last_stats.get())
            .finish()
    }
}

impl TraversalEngine {
    pub fn new(tracker: Rc<NodeStateTracker>) -> Self {
        Self::with_clock(tracker, default_clock())
    }

    pub fn with_clock(tracker: Rc<NodeStateTracker>, clock: Rc<dyn Clock>) -> Self {
        Self {
            tracker,
            clock,
            last_stats: Rc::new(Cell::new(TraversalStats::default())),
        }
    }

    pub fn tracker(&self) -> &Rc<NodeStateTracker> {
        &self.tracker
    }

    /// 最近一次遍历的统计
    pub fn last_stats(&self) -> TraversalStats {
        self.last_stats.get()
    }

    /// 同步遍历整个子树，返回交给回调的文本节点数
    pub fn traverse<F>(&self, root: &Handle, mut on_text_node: F, options: &TraversalOptions) -> usize
    where
        F: FnMut(&Handle),
    {
        let mut stats = TraversalStats {
            chunks: 1,
            ..Default::default()
        };
        let mut stack = vec![root.clone()];

        while let Some(node) = stack.pop() {
            if let Some(text) = self.step(node, &mut stack, options, &mut stats) {
                on_text_node(&text);
                self.tracker.mark_processed(&text);
                stats.text_nodes += 1;
            }
        }

        self.last_stats.set(stats);
        stats.text_nodes
    }

    /// 分片遍历整个子树
    ///
    /// 达到节点上限或时间片用尽时让出执行权，下一轮从保留的栈继续
    pub async fn traverse_chunked<F>(
        &self,
        root: &Handle,
        mut on_text_node: F,
        options: &TraversalOptions,
    ) -> usize
    where
        F: FnMut(&Handle),
    {
        let chunk_size = options.chunk_size.max(1);
        let time_slice = Duration::from_millis(options.time_slice_ms.max(1));
        let mut stats = TraversalStats::default();
        let mut stack = vec![root.clone()];

        while !stack.is_empty() {
            stats.chunks += 1;
            let deadline = self.clock.now() + time_slice;
            let mut handled = 0;

            while let Some(node) = stack.pop() {
                if let Some(text) = self.step(node, &mut stack, options, &mut stats) {
                    on_text_node(&text);
                    self.tracker.mark_processed(&text);
                    stats.text_nodes += 1;
                }

                handled += 1;
                if handled >= chunk_size || self.clock.now() >= deadline {
                    break;
                }
            }

            if !stack.is_empty() {
                tracing::trace!(
                    "遍历分片 {} 结束，剩余 {} 个节点，让出执行权",
                    stats.chunks,
                    stack.len()
                );
                tokio::task::yield_now().await;
            }
        }

        tracing::debug!(
            "分片遍历完成: {} 个文本节点，{} 个分片",
            stats.text_nodes,
            stats.chunks
        );
        self.last_stats.set(stats);
        stats.text_nodes
    }

    /// 清除 `root` 子树上的全部处理标记
    pub fn reset_processed(&self, root: &Handle) -> usize {
        self.tracker.reset_processed(root)
    }

    /// 处理一个出栈节点；返回需要交给回调的文本节点
    fn step(
        &self,
        node: Handle,
        stack: &mut Vec<Handle>,
        options: &TraversalOptions,
        stats: &mut TraversalStats,
    ) -> Option<Handle> {
        stats.nodes_visited += 1;

        if options.skip_processed && self.tracker.is_processed(&node) {
            stats.subtrees_skipped += 1;
            return None;
        }

        match &node.data {
            NodeData::Element { .. } => {
                if self.element_excluded(&node, options) {
                    stats.subtrees_skipped += 1;
                    return None;
                }
                self.tracker.mark_processed(&node);
                // 逆序压栈，出栈时保持文档顺序
                for child in node.children.borrow().iter().rev() {
                    stack.push(child.clone());
                }
                None
            }
            NodeData::Text { contents } => {
                if is_blank(&contents.borrow()) {
                    return None;
                }
                if is_editable(&node) {
                    return None;
                }
                Some(node)
            }
            NodeData::Document => {
                for child in node.children.borrow().iter().rev() {
                    stack.push(child.clone());
                }
                None
            }
            _ => None,
        }
    }

    /// 元素自身是否需要整棵子树跳过
    fn element_excluded(&self, node: &Handle, options: &TraversalOptions) -> bool {
        if let NodeData::Element { name, .. } = &node.data {
            let tag = name.local.as_ref().to_ascii_lowercase();
            if options.skip_tags.contains(&tag) {
                return true;
            }
        }

        is_editable(node) || is_hidden(node) || is_opted_out(node, options)
    }

    /// 以 `node` 为根做局部遍历前的检查：祖先链上不能有被跳过的元素
    pub fn is_eligible_root(&self, node: &Handle, options: &TraversalOptions) -> bool {
        if is_editable(node) {
            return false;
        }

        let mut current = get_parent_node(node);
        while let Some(ancestor) = current {
            if let NodeData::Element { name, .. } = &ancestor.data {
                let tag = name.local.as_ref().to_ascii_lowercase();
                if options.skip_tags.contains(&tag)
                    || is_hidden(&ancestor)
                    || is_opted_out(&ancestor, options)
                {
                    return false;
                }
            }
            current = get_parent_node(&ancestor);
        }

        true
    }
}

/// 节点（或其最近的声明了 `contenteditable` 的祖先）是否可编辑
pub fn is_editable(node: &Handle) -> bool {
    let mut current = Some(node.clone());
    while let Some(n) = current {
        if let Some(value) = get_node_attr(&n, "contenteditable") {
            if let Some(editable) = parse_contenteditable(&value) {
                return editable;
            }
        }
        current = get_parent_node(&n);
    }
    false
}

/// 元素是否隐藏（内联 `display:none` 或 `hidden` 属性）
pub fn is_hidden(node: &Handle) -> bool {
    if has_node_attr(node, "hidden") {
        return true;
    }
    get_node_attr(node, "style")
        .map(|style| style_hides_element(&style))
        .unwrap_or(false)
}

/// 元素是否带有退出标识
pub fn is_opted_out(node: &Handle, options: &TraversalOptions) -> bool {
    if has_node_attr(node, constants::OPT_OUT_ATTR) {
        return true;
    }
    get_node_attr(node, "id")
        .map(|id| options.opt_out_ids.contains(&id))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::{find_element_by_name, get_text, html_to_dom};
    use crate::rewrite::clock::ManualClock;

    fn collect_texts(engine: &TraversalEngine, root: &Handle, options: &TraversalOptions) -> Vec<String> {
        let mut seen = Vec::new();
        engine.traverse(root, |n| seen.push(get_text(n).unwrap_or_default()), options);
        seen
    }

    fn engine() -> TraversalEngine {
        TraversalEngine::new(Rc::new(NodeStateTracker::new()))
    }

    #[test]
    fn test_visits_text_in_document_order() {
        let dom = html_to_dom(b"<div>one<p>two<b>three</b></p>four</div>", "utf-8").unwrap();
        let texts = collect_texts(&engine(), &dom.document, &TraversalOptions::default());
        assert_eq!(texts, vec!["one", "two", "three", "four"]);
    }

    #[test]
    fn test_skip_rules() {
        let html = r#"<body>
            <p>keep</p>
            <script>var skip = 1;</script>
            <code>skip code</code>
            <div contenteditable="true">skip editable <span>nested</span></div>
            <div contenteditable="true"><p contenteditable="false">skip false island</p></div>
            <div style="color:red; display: none">skip hidden</div>
            <div hidden>skip hidden attr</div>
            <div id="live-rewrite-tooltip">skip tooltip</div>
            <div data-rewrite-ignore>skip ignored</div>
            <p>   </p>
            <p>also keep</p>
        </body>"#;
        let dom = html_to_dom(html.as_bytes(), "utf-8").unwrap();
        let texts = collect_texts(&engine(), &dom.document, &TraversalOptions::default());
        let kept: Vec<_> = texts.iter().map(|t| t.trim()).filter(|t| !t.is_empty()).collect();
        assert_eq!(kept, vec!["keep", "also keep"]);
    }

    #[test]
    fn test_second_pass_is_idempotent() {
        let dom = html_to_dom(b"<div><p>a</p><p>b</p></div>", "utf-8").unwrap();
        let engine = engine();
        let options = TraversalOptions::default();

        assert_eq!(engine.traverse(&dom.document, |_| {}, &options), 2);
        assert_eq!(engine.traverse(&dom.document, |_| {}, &options), 0);
    }

    #[test]
    fn test_without_skip_processed_revisits() {
        let dom = html_to_dom(b"<p>a</p>", "utf-8").unwrap();
        let engine = engine();
        let options = TraversalOptions {
            skip_processed: false,
            ..Default::default()
        };

        assert_eq!(engine.traverse(&dom.document, |_| {}, &options), 1);
        assert_eq!(engine.traverse(&dom.document, |_| {}, &options), 1);
    }

    #[test]
    fn test_reset_processed_allows_reprocessing() {
        let dom = html_to_dom(b"<p>a</p><p>b</p>", "utf-8").unwrap();
        let engine = engine();
        let options = TraversalOptions::default();

        engine.traverse(&dom.document, |_| {}, &options);
        engine.reset_processed(&dom.document);
        assert_eq!(engine.traverse(&dom.document, |_| {}, &options), 2);
    }

    #[test]
    fn test_is_eligible_root() {
        let html = r#"<div><script>x</script><p id="live-rewrite-tooltip"><b>t</b></p><i>ok</i></div>"#;
        let dom = html_to_dom(html.as_bytes(), "utf-8").unwrap();
        let engine = engine();
        let options = TraversalOptions::default();

        let script = find_element_by_name(&dom.document, "script").unwrap();
        let script_text = script.children.borrow()[0].clone();
        assert!(!engine.is_eligible_root(&script_text, &options));

        let b = find_element_by_name(&dom.document, "b").unwrap();
        assert!(!engine.is_eligible_root(&b, &options));

        let i = find_element_by_name(&dom.document, "i").unwrap();
        assert!(engine.is_eligible_root(&i, &options));
    }

    #[tokio::test]
    async fn test_chunked_matches_unbounded() {
        let mut html = String::from("<body>");
        for i in 0..40 {
            html.push_str(&format!("<div><p>para {}</p><span>s{}</span></div>", i, i));
        }
        html.push_str("</body>");

        let unbounded = {
            let dom = html_to_dom(html.as_bytes(), "utf-8").unwrap();
            collect_texts(&engine(), &dom.document, &TraversalOptions::default())
        };

        for chunk_size in [1, 3, 7, 50, 1000] {
            let dom = html_to_dom(html.as_bytes(), "utf-8").unwrap();
            let engine = engine();
            let options = TraversalOptions {
                chunk_size,
                ..Default::default()
            };
            let mut seen = Vec::new();
            let count = engine
                .traverse_chunked(&dom.document, |n| seen.push(get_text(n).unwrap_or_default()), &options)
                .await;

            assert_eq!(count, 80);
            assert_eq!(seen, unbounded, "chunk_size={}", chunk_size);
        }
    }

    #[tokio::test]
    async fn test_chunk_size_bounds_each_burst() {
        let dom = html_to_dom(b"<p>a</p><p>b</p><p>c</p>", "utf-8").unwrap();
        let engine = engine();
        let options = TraversalOptions {
            chunk_size: 2,
            ..Default::default()
        };

        engine.traverse_chunked(&dom.document, |_| {}, &options).await;
        let stats = engine.last_stats();
        assert_eq!(stats.text_nodes, 3);
        assert_eq!(stats.chunks, (stats.nodes_visited + 1) / 2);
    }

    #[tokio::test]
    async fn test_time_slice_forces_yield() {
        let dom = html_to_dom(b"<p>a</p><p>b</p><p>c</p>", "utf-8").unwrap();
        let clock = ManualClock::new();
        let engine = TraversalEngine::with_clock(Rc::new(NodeStateTracker::new()), Rc::new(clock.clone()));
        let options = TraversalOptions {
            chunk_size: 10_000,
            time_slice_ms: 5,
            ..Default::default()
        };

        // 每处理一个文本节点就耗尽时间片
        let count = engine
            .traverse_chunked(&dom.document, |_| clock.advance_ms(5), &options)
            .await;

        assert_eq!(count, 3);
        assert!(engine.last_stats().chunks >= 3);
    }
}
