//! 节点处理状态跟踪
//!
//! 元素节点的“已处理”标记以属性形式写在节点上；文本节点无法携带属性，
//! 改为记录在跟踪器的带外集合中。跟踪器随文档存在，跨多次遍历保持稳定。

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use markup5ever_rcdom::{Handle, Node, NodeData};

use crate::parsers::html::{has_node_attr, set_node_attr};
use crate::rewrite::config::constants;

/// 带外集合超过该大小时清理失效条目
const PRUNE_THRESHOLD: usize = 4096;

/// 节点状态跟踪器
#[derive(Debug, Default)]
pub struct NodeStateTracker {
    /// 已处理的文本节点，按节点地址索引，保存弱引用防止地址复用误判
    text_marks: RefCell<HashMap<usize, Weak<Node>>>,
}

impl NodeStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 节点是否已处理
    pub fn is_processed(&self, node: &Handle) -> bool {
        match node.data {
            NodeData::Element { .. } => has_node_attr(node, constants::PROCESSED_ATTR),
            NodeData::Text { .. } => {
                let key = node_key(node);
                let mut marks = self.text_marks.borrow_mut();
                match marks.get(&key).and_then(Weak::upgrade) {
                    Some(existing) => Rc::ptr_eq(&existing, node),
                    None => {
                        marks.remove(&key);
                        false
                    }
                }
            }
            _ => false,
        }
    }

    /// 标记节点为已处理；无法携带标记的节点上是空操作
    pub fn mark_processed(&self, node: &Handle) {
        match node.data {
            NodeData::Element { .. } => {
                set_node_attr(node, constants::PROCESSED_ATTR, Some("true"));
            }
            NodeData::Text { .. } => {
                let mut marks = self.text_marks.borrow_mut();
                if marks.len() >= PRUNE_THRESHOLD {
                    marks.retain(|_, weak| weak.strong_count() > 0);
                }
                marks.insert(node_key(node), Rc::downgrade(node));
            }
            _ => {}
        }
    }

    /// 清除单个节点的标记
    pub fn clear_processed(&self, node: &Handle) {
        match node.data {
            NodeData::Element { .. } => set_node_attr(node, constants::PROCESSED_ATTR, None),
            NodeData::Text { .. } => {
                self.text_marks.borrow_mut().remove(&node_key(node));
            }
            _ => {}
        }
    }

    /// 递归清除 `root` 及其全部后代的标记（迭代实现）
    pub fn reset_processed(&self, root: &Handle) -> usize {
        let mut cleared = 0;
        let mut stack = vec![root.clone()];

        while let Some(node) = stack.pop() {
            if self.is_processed(&node) {
                cleared += 1;
            }
            self.clear_processed(&node);
            for child in node.children.borrow().iter() {
                stack.push(child.clone());
            }
        }

        tracing::debug!("已清除 {} 个节点的处理标记", cleared);
        cleared
    }

    /// 当前记录的文本节点数（含尚未清理的失效条目）
    pub fn tracked_text_nodes(&self) -> usize {
        self.text_marks.borrow().len()
    }
}

fn node_key(node: &Handle) -> usize {
    Rc::as_ptr(node) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::html::{create_element, create_text_node, find_element_by_name, html_to_dom};

    #[test]
    fn test_mark_and_query_element() {
        let tracker = NodeStateTracker::new();
        let el = create_element("div", &[]);

        assert!(!tracker.is_processed(&el));
        tracker.mark_processed(&el);
        assert!(tracker.is_processed(&el));

        tracker.clear_processed(&el);
        assert!(!tracker.is_processed(&el));
    }

    #[test]
    fn test_mark_and_query_text() {
        let tracker = NodeStateTracker::new();
        let text = create_text_node("hello");
        let other = create_text_node("hello");

        tracker.mark_processed(&text);
        assert!(tracker.is_processed(&text));
        assert!(!tracker.is_processed(&other));
    }

    #[test]
    fn test_markers_shared_between_trackers_views() {
        // 元素标记是文档上的属性，任何跟踪器实例都能看到
        let el = create_element("p", &[]);
        NodeStateTracker::new().mark_processed(&el);
        assert!(NodeStateTracker::new().is_processed(&el));
    }

    #[test]
    fn test_other_kinds_are_noops() {
        let tracker = NodeStateTracker::new();
        let dom = html_to_dom(b"<p>x</p>", "utf-8").unwrap();

        tracker.mark_processed(&dom.document);
        assert!(!tracker.is_processed(&dom.document));
        tracker.clear_processed(&dom.document);
    }

    #[test]
    fn test_dropped_text_node_does_not_alias() {
        let tracker = NodeStateTracker::new();
        {
            let text = create_text_node("temporary");
            tracker.mark_processed(&text);
        }
        let fresh = create_text_node("fresh");
        assert!(!tracker.is_processed(&fresh));
    }

    #[test]
    fn test_reset_processed_clears_subtree() {
        let tracker = NodeStateTracker::new();
        let dom = html_to_dom(b"<div><p>a</p><p>b</p></div>", "utf-8").unwrap();
        let div = find_element_by_name(&dom.document, "div").unwrap();

        let mut stack = vec![div.clone()];
        while let Some(node) = stack.pop() {
            tracker.mark_processed(&node);
            stack.extend(node.children.borrow().iter().cloned());
        }
        assert!(tracker.is_processed(&div));

        let cleared = tracker.reset_processed(&div);
        assert_eq!(cleared, 5);
        assert!(!tracker.is_processed(&div));
        let p = find_element_by_name(&div, "p").unwrap();
        assert!(!tracker.is_processed(&p.children.borrow()[0]));
    }
}
