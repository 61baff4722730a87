//! 刷新调度
//!
//! 防抖与节流合成为单个截止时间：
//!
//! - 节流：两次刷新开始之间至少间隔 `throttle`，从上次刷新算起
//! - 防抖：最近一条记录之后再等待 `debounce`
//!
//! 截止时间 = `now + 节流剩余 + debounce`，但不晚于
//! `首条待处理记录时间 + throttle + debounce`，持续变更下每个窗口仍至少刷新一次。

use std::time::{Duration, Instant};

/// 刷新调度状态
#[derive(Debug, Clone, Default)]
pub struct FlushSchedule {
    armed: Option<Instant>,
    last_flush: Option<Instant>,
    first_pending: Option<Instant>,
}

impl FlushSchedule {
    pub fn new() -> Self {
        Self::default()
    }

    /// 收到新记录后重新计算截止时间
    pub fn arm(&mut self, now: Instant, throttle: Duration, debounce: Duration) -> Instant {
        let first_pending = *self.first_pending.get_or_insert(now);

        let throttle_end = self.last_flush.map(|last| last + throttle);
        let throttle_remaining = throttle_end
            .map(|end| end.saturating_duration_since(now))
            .unwrap_or(Duration::ZERO);

        let settle = now + throttle_remaining + debounce;
        let cap = first_pending + throttle + debounce;
        let mut deadline = settle.min(cap);
        if let Some(end) = throttle_end {
            deadline = deadline.max(end);
        }

        self.armed = Some(deadline);
        deadline
    }

    /// 当前截止时间
    pub fn deadline(&self) -> Option<Instant> {
        self.armed
    }

    pub fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// 截止时间是否已到
    pub fn is_due(&self, now: Instant) -> bool {
        self.armed.is_some_and(|deadline| now >= deadline)
    }

    /// 记录一次刷新开始，清除截止时间
    pub fn record_flush(&mut self, now: Instant) {
        self.last_flush = Some(now);
        self.armed = None;
        self.first_pending = None;
    }

    /// 清除所有计时
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
