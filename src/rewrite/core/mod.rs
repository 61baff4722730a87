//! 改写服务核心模块
//!
//! - **服务层** (`service.rs`): 组合遍历、包装与变更观察，对外提供统一接口

pub mod service;

pub use service::{ReplacementEvent, RewriteService, ServiceStats};
