//! 增量文本改写
//!
//! - `pipeline` - 处理标记、分片遍历、片段包装
//! - `observer` - 变更观察与批处理状态机
//! - `core` - 组合以上组件的改写服务
//! - `config` - 配置管理
//! - `error` - 错误类型

pub mod clock;
pub mod config;
pub mod core;
pub mod document;
pub mod error;
pub mod observer;
pub mod pipeline;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{ConfigManager, RewriteConfig};
pub use self::core::{ReplacementEvent, RewriteService, ServiceStats};
pub use document::LiveDocument;
pub use error::{RewriteError, RewriteResult};
pub use observer::{MutationBatcher, MutationRecord, ObserveConfig, ObserverState};
pub use pipeline::{
    Dictionary, MarkerConfig, NodeStateTracker, Segment, SegmentSource, SegmentWrapper,
    TraversalEngine, TraversalOptions,
};
