//! 变更观察模块
//!
//! - `record`: 变更记录与观察配置
//! - `hub`: 变更分发与观察登记
//! - `schedule`: 防抖/节流合成的刷新调度
//! - `batcher`: 批处理状态机

pub mod batcher;
pub mod hub;
pub mod record;
pub mod schedule;

pub use batcher::{BatchCallback, BatcherOptions, BatcherStats, MutationBatcher, ObserverState};
pub use hub::{MutationHub, Observation, Suppression};
pub use record::{MutationKind, MutationRecord, ObserveConfig};
pub use schedule::FlushSchedule;
