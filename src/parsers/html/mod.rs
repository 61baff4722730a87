//! HTML解析和处理模块
//!
//! - `utils`: 基础工具函数和常量
//! - `dom`: 基础DOM操作（读取、拆分、替换节点）
//! - `serializer`: 序列化功能

pub mod dom;
pub mod serializer;
pub mod utils;

pub use dom::{
    child_index, create_element, create_text_node, detach_node, find_element_by_name,
    get_node_attr, get_node_name, get_parent_node, get_text, has_node_attr, html_to_dom,
    insert_child_at, is_attached, is_inclusive_ancestor, replace_node,
    set_node_attr, split_text_node,
};
pub use serializer::{serialize_document, serialize_node};
pub use utils::{is_blank, parse_contenteditable, style_hides_element, WHITESPACES};
