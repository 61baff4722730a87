//! 单调时钟抽象
//!
//! 遍历分片的截止时间和变更刷新的计时都通过 [`Clock`] 读取当前时间，
//! 测试中可替换为手动推进的 [`ManualClock`]。

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// 单调时钟
pub trait Clock: fmt::Debug {
    fn now(&self) -> Instant;
}

/// 运行时时钟
///
/// 读取 tokio 的时间源：在暂停时间的测试运行时中随虚拟时间推进，
/// 在运行时之外等同于 `Instant::now()`
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }
}

/// 手动推进的时钟
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(Instant::now())),
        }
    }

    /// 时间前进 `by`
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    /// 时间前进 `ms` 毫秒
    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

/// 默认时钟
pub fn default_clock() -> Rc<dyn Clock> {
    Rc::new(MonotonicClock)
}
