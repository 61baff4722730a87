//! # Live Rewrite
//!
//! 在活动的 HTML 文档树中增量改写文本：找到与替换词典匹配的子串，
//! 原地替换为可检查的标记元素，并持续跟踪宿主之后对文档的修改。
//!
//! ## 模块组织
//!
//! - `core` - 一次性改写入口
//! - `parsers` - HTML 解析、DOM 操作与序列化
//! - `rewrite` - 遍历、包装与变更观察管道
//! - `env` - 环境变量覆盖

pub mod core;
pub mod env;
pub mod parsers;
pub mod rewrite;

// Re-export commonly used items for convenience
pub use self::core::*;
pub use parsers::*;
pub use rewrite::{
    Dictionary, LiveDocument, RewriteConfig, RewriteError, RewriteResult, RewriteService, Segment,
    SegmentSource,
};
