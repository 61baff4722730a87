//! # 解析器模块
//!
//! 这个模块包含HTML文档的解析、DOM操作与序列化功能。
//!
//! # 模块组织
//!
//! - `html` - HTML文档解析、DOM节点读写、序列化

pub mod html;

pub use html::{html_to_dom, serialize_document};
