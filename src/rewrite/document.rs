//! 活动文档
//!
//! 包装一棵 `RcDom`，并持有随文档存在的状态：处理标记跟踪器与变更分发中心。
//! 宿主对文档的修改应通过这里的方法进行，修改会同时发布为变更记录。

use std::fmt;
use std::rc::Rc;

use html5ever::tendril::StrTendril;
use markup5ever_rcdom::{Handle, NodeData, RcDom};

use crate::parsers::html::{child_index, detach_node, html_to_dom, insert_child_at};
use crate::parsers::serialize_document;
use crate::rewrite::error::{RewriteError, RewriteResult};
use crate::rewrite::observer::{MutationHub, MutationRecord};
use crate::rewrite::pipeline::NodeStateTracker;

struct DocumentInner {
    dom: RcDom,
    tracker: Rc<NodeStateTracker>,
    hub: Option<Rc<MutationHub>>,
    top_level: bool,
}

/// 活动文档句柄，克隆后共享同一棵树
#[derive(Clone)]
pub struct LiveDocument {
    inner: Rc<DocumentInner>,
}

impl fmt::Debug for LiveDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveDocument")
            .field("observable", &self.inner.hub.is_some())
            .field("top_level", &self.inner.top_level)
            .field("tracked_text_nodes", &self.inner.tracker.tracked_text_nodes())
            .finish()
    }
}

impl LiveDocument {
    /// 创建支持变更观察的顶层文档
    pub fn new(dom: RcDom) -> Self {
        Self::build(dom, Some(MutationHub::new()), true)
    }

    /// 创建不支持变更观察的文档
    pub fn without_observation(dom: RcDom) -> Self {
        Self::build(dom, None, true)
    }

    /// 创建框架内文档
    pub fn framed(dom: RcDom) -> Self {
        Self::build(dom, Some(MutationHub::new()), false)
    }

    /// 解析 UTF-8 HTML 文本
    pub fn parse(html: &str) -> RewriteResult<Self> {
        Ok(Self::new(html_to_dom(html.as_bytes(), "utf-8")?))
    }

    fn build(dom: RcDom, hub: Option<Rc<MutationHub>>, top_level: bool) -> Self {
        Self {
            inner: Rc::new(DocumentInner {
                dom,
                tracker: Rc::new(NodeStateTracker::new()),
                hub,
                top_level,
            }),
        }
    }

    /// 文档根节点
    pub fn root(&self) -> &Handle {
        &self.inner.dom.document
    }

    pub fn dom(&self) -> &RcDom {
        &self.inner.dom
    }

    pub fn tracker(&self) -> &Rc<NodeStateTracker> {
        &self.inner.tracker
    }

    pub fn hub(&self) -> Option<&Rc<MutationHub>> {
        self.inner.hub.as_ref()
    }

    pub fn is_top_level(&self) -> bool {
        self.inner.top_level
    }

    /// 序列化整个文档
    pub fn serialize(&self, encoding: &str) -> RewriteResult<Vec<u8>> {
        serialize_document(&self.inner.dom, encoding)
    }

    /// 追加子节点
    pub fn append_child(&self, parent: &Handle, child: Handle) {
        let index = parent.children.borrow().len();
        insert_child_at(parent, index, child.clone());
        self.publish(MutationRecord::child_list(parent.clone(), vec![child], Vec::new()));
    }

    /// 在 `reference` 之前插入子节点
    ///
    /// `child` 已在 `parent` 中时按移动处理
    pub fn insert_before(&self, parent: &Handle, child: Handle, reference: &Handle) -> RewriteResult<()> {
        if child_index(parent, reference).is_none() {
            return Err(RewriteError::DetachedNode("参考节点不是该父节点的子节点".to_string()));
        }
        if Rc::ptr_eq(&child, reference) {
            return Ok(());
        }

        detach_node(&child);
        let index = child_index(parent, reference)
            .ok_or_else(|| RewriteError::DetachedNode("参考节点不是该父节点的子节点".to_string()))?;
        insert_child_at(parent, index, child.clone());
        self.publish(MutationRecord::child_list(parent.clone(), vec![child], Vec::new()));
        Ok(())
    }

    /// 移除子节点
    pub fn remove_child(&self, parent: &Handle, child: &Handle) -> RewriteResult<()> {
        if child_index(parent, child).is_none() {
            return Err(RewriteError::DetachedNode("待移除节点不是该父节点的子节点".to_string()));
        }
        detach_node(child);
        self.publish(MutationRecord::child_list(parent.clone(), Vec::new(), vec![child.clone()]));
        Ok(())
    }

    /// 修改文本节点内容
    pub fn set_text(&self, node: &Handle, text: &str) -> RewriteResult<()> {
        let NodeData::Text { contents } = &node.data else {
            return Err(RewriteError::InvalidInput("只能修改文本节点的内容".to_string()));
        };
        *contents.borrow_mut() = StrTendril::from_slice(text);
        self.publish(MutationRecord::character_data(node.clone()));
        Ok(())
    }

    fn publish(&self, record: MutationRecord) {
        if let Some(hub) = &self.inner.hub {
            hub.notify(record);
        }
    }
}
