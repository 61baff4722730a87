//! 文本改写管道
//!
//! - `state`: 节点处理标记
//! - `traversal`: 分片遍历引擎
//! - `segment`: 片段与匹配协作方
//! - `wrapper`: 片段包装器

pub mod segment;
pub mod state;
pub mod traversal;
pub mod wrapper;

pub use segment::{Dictionary, Segment, SegmentSource};
pub use state::NodeStateTracker;
pub use traversal::{TraversalEngine, TraversalOptions, TraversalStats};
pub use wrapper::{MarkerConfig, SegmentWrapper, WrapReport};
