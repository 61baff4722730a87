//! 片段包装器
//!
//! 把文本节点中匹配到的片段改写成标记元素：
//!
//! ```text
//! "Donald Trump said hi"
//!   => <span class="live-rewrite" data-original-text="Donald Trump">Agent Orange</span>" said hi"
//! ```
//!
//! 片段按起始位置降序应用。每次先在 `end_index` 处拆出 `after`，
//! 再在 `start_index` 处拆出 `middle`，剩下的 `before` 成为下一个（更靠前的）
//! 片段的当前节点。所有修改都发生在尚未消费的索引右侧，因此前面的索引始终有效。
//!
//! 中途出错时已完成的拆分保留，后续片段不再处理；不提供事务性回滚。

use std::rc::Rc;

use markup5ever_rcdom::{Handle, NodeData};

use super::segment::Segment;
use super::state::NodeStateTracker;
use crate::parsers::html::{
    create_element, create_text_node, get_node_attr, get_node_name, get_parent_node,
    insert_child_at, replace_node, split_text_node,
};
use crate::rewrite::config::constants;
use crate::rewrite::error::{helpers, RewriteError, RewriteResult};
use crate::rewrite::observer::{MutationHub, MutationRecord};

/// 标记元素配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerConfig {
    pub tag: String,
    pub class_name: String,
    pub original_text_attr: String,
}

impl Default for MarkerConfig {
    fn default() -> Self {
        Self {
            tag: constants::MARKER_TAG.to_string(),
            class_name: constants::MARKER_CLASS.to_string(),
            original_text_attr: constants::ORIGINAL_TEXT_ATTR.to_string(),
        }
    }
}

/// 一次包装的结果
#[derive(Debug, Default)]
pub struct WrapReport {
    pub applied: usize,
    pub rejected: usize,
    /// 新建的标记元素及对应片段，按文档顺序
    pub markers: Vec<(Handle, Segment)>,
}

/// 片段包装器
#[derive(Debug, Clone)]
pub struct SegmentWrapper {
    tracker: Rc<NodeStateTracker>,
    marker: MarkerConfig,
    hub: Option<Rc<MutationHub>>,
}

impl SegmentWrapper {
    pub fn new(tracker: Rc<NodeStateTracker>, marker: MarkerConfig) -> Self {
        Self {
            tracker,
            marker,
            hub: None,
        }
    }

    /// 包装产生的修改同样发布到变更中心
    pub fn with_hub(mut self, hub: Option<Rc<MutationHub>>) -> Self {
        self.hub = hub;
        self
    }

    pub fn marker_config(&self) -> &MarkerConfig {
        &self.marker
    }

    /// 包装文本节点，至少应用了一个片段时返回 `true`
    pub fn wrap(&self, text_node: &Handle, segments: &[Segment]) -> bool {
        match self.apply(text_node, segments) {
            Ok(report) => report.applied > 0,
            Err(e) => {
                helpers::log(&e);
                false
            }
        }
    }

    /// 包装文本节点并返回详细结果
    pub fn apply(&self, text_node: &Handle, segments: &[Segment]) -> RewriteResult<WrapReport> {
        let content = match &text_node.data {
            NodeData::Text { contents } => contents.borrow().to_string(),
            _ => return Err(RewriteError::InvalidInput("只能包装文本节点".to_string())),
        };
        if content.is_empty() {
            return Err(RewriteError::InvalidInput("文本节点内容为空".to_string()));
        }
        let parent = get_parent_node(text_node)
            .ok_or_else(|| RewriteError::DetachedNode("文本节点没有父节点".to_string()))?;

        let (accepted, rejected) = select_segments(&content, segments);
        let mut report = WrapReport {
            rejected,
            ..Default::default()
        };
        if accepted.is_empty() {
            return Ok(report);
        }

        let mut added = Vec::new();
        let mut replaced_original = false;
        let mut failure = None;

        for segment in accepted {
            match self.apply_segment(text_node, &content, &segment) {
                Ok((marker, after)) => {
                    if let Some(after) = after {
                        self.tracker.mark_processed(&after);
                        added.push(after);
                    }
                    if segment.start_index == 0 {
                        replaced_original = true;
                    }
                    added.push(marker.clone());
                    report.markers.push((marker, segment));
                    report.applied += 1;
                }
                Err(e) => {
                    failure = Some(e.with_context("片段包装"));
                    break;
                }
            }
        }

        if !replaced_original {
            self.tracker.mark_processed(text_node);
        }
        report.markers.reverse();
        self.publish(text_node, &parent, added, replaced_original);

        match failure {
            Some(e) => Err(e),
            None => {
                tracing::debug!("文本节点包装完成: 应用 {} 个，拒绝 {} 个", report.applied, report.rejected);
                Ok(report)
            }
        }
    }

    /// 应用单个片段，返回标记元素和拆出的 `after` 节点
    fn apply_segment(
        &self,
        current: &Handle,
        content: &str,
        segment: &Segment,
    ) -> RewriteResult<(Handle, Option<Handle>)> {
        let current_len = text_len(current);
        if segment.end_index > current_len {
            return Err(helpers::internal_error(format!(
                "当前节点长度 {} 小于片段结束位置 {}",
                current_len, segment.end_index
            )));
        }

        let after = if segment.end_index < current_len {
            Some(split_text_node(current, segment.end_index)?)
        } else {
            None
        };

        let middle = if segment.start_index > 0 {
            split_text_node(current, segment.start_index)?
        } else {
            current.clone()
        };

        let original = &content[segment.start_index..segment.end_index];
        let marker = self.create_marker(original, &segment.converted_text);
        replace_node(&middle, marker.clone())?;

        Ok((marker, after))
    }

    /// 创建标记元素
    fn create_marker(&self, original: &str, converted: &str) -> Handle {
        let mut attributes = Vec::with_capacity(3);
        if !self.marker.class_name.is_empty() {
            attributes.push(("class", self.marker.class_name.as_str()));
        }
        attributes.push((self.marker.original_text_attr.as_str(), original));
        attributes.push((constants::PROCESSED_ATTR, "true"));

        let marker = create_element(&self.marker.tag, &attributes);
        let inner = create_text_node(converted);
        self.tracker.mark_processed(&inner);
        insert_child_at(&marker, 0, inner);
        marker
    }

    fn publish(&self, text_node: &Handle, parent: &Handle, added: Vec<Handle>, replaced: bool) {
        let Some(hub) = &self.hub else {
            return;
        };
        if added.is_empty() {
            return;
        }

        let removed = if replaced {
            vec![text_node.clone()]
        } else {
            hub.notify(MutationRecord::character_data(text_node.clone()));
            Vec::new()
        };
        hub.notify(MutationRecord::child_list(parent.clone(), added, removed));
    }

    /// 节点是否为本包装器创建的标记元素
    pub fn is_marker(&self, node: &Handle) -> bool {
        get_node_name(node).is_some_and(|name| name.eq_ignore_ascii_case(&self.marker.tag))
            && get_node_attr(node, &self.marker.original_text_attr).is_some()
    }

    /// 节点是否位于标记元素之内（含自身）
    pub fn is_inside_marker(&self, node: &Handle) -> bool {
        let mut current = Some(node.clone());
        while let Some(n) = current {
            if self.is_marker(&n) {
                return true;
            }
            current = get_parent_node(&n);
        }
        false
    }
}

/// 过滤无效片段并处理重叠
///
/// 起始位置降序，起始相同时较长者优先；与已接受片段重叠的片段被拒绝
fn select_segments(content: &str, segments: &[Segment]) -> (Vec<Segment>, usize) {
    let mut rejected = 0;
    let mut candidates: Vec<Segment> = Vec::with_capacity(segments.len());

    for segment in segments {
        match validate_segment(content, segment) {
            Ok(()) => candidates.push(segment.clone()),
            Err(e) => {
                rejected += 1;
                helpers::log(&e);
            }
        }
    }

    candidates.sort_by(|a, b| {
        b.start_index
            .cmp(&a.start_index)
            .then_with(|| b.len().cmp(&a.len()))
    });

    let mut accepted = Vec::with_capacity(candidates.len());
    let mut boundary = content.len();
    for segment in candidates {
        if segment.end_index > boundary {
            rejected += 1;
            tracing::debug!(
                "忽略重叠片段 [{}, {})，与 {} 之后的片段冲突",
                segment.start_index,
                segment.end_index,
                boundary
            );
            continue;
        }
        boundary = segment.start_index;
        accepted.push(segment);
    }

    (accepted, rejected)
}

fn validate_segment(content: &str, segment: &Segment) -> RewriteResult<()> {
    let (start, end) = (segment.start_index, segment.end_index);

    if start >= end {
        return Err(helpers::validation_error(format!("片段索引倒置: [{}, {})", start, end)));
    }
    if end > content.len() {
        return Err(helpers::validation_error(format!(
            "片段结束位置 {} 超出文本长度 {}",
            end,
            content.len()
        )));
    }
    if !content.is_char_boundary(start) || !content.is_char_boundary(end) {
        return Err(helpers::validation_error(format!(
            "片段索引 [{}, {}) 不在字符边界上",
            start, end
        )));
    }
    if !segment.original_text.is_empty() && content[start..end] != segment.original_text {
        return Err(helpers::validation_error(format!(
            "片段原文 {:?} 与文本内容 {:?} 不一致",
            segment.original_text,
            &content[start..end]
        )));
    }

    Ok(())
}

fn text_len(node: &Handle) -> usize {
    match &node.data {
        NodeData::Text { contents } => contents.borrow().len(),
        _ => 0,
    }
}
