//! 变更批处理状态机
//!
//! ```text
//! Inactive --start--> Active --flush--> Processing --> Active
//!                      Active <--pause/resume--> Paused
//!           any --stop--> Inactive
//! ```
//!
//! 缓冲超过 `max_buffer_size` 时立即刷新，不等待防抖与节流。
//! 回调执行期间观察被抑制，处理过程中产生的修改不会回流到缓冲区。
//! 回调返回错误或发生 panic 时，该批记录被丢弃，状态恢复到刷新前。

use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use markup5ever_rcdom::{Handle, Node};

use super::hub::Observation;
use super::record::{MutationRecord, ObserveConfig};
use super::schedule::FlushSchedule;
use crate::parsers::html::{is_attached, is_inclusive_ancestor};
use crate::rewrite::clock::{default_clock, Clock};
use crate::rewrite::config::constants;
use crate::rewrite::document::LiveDocument;
use crate::rewrite::error::{helpers, ErrorStats, RewriteError, RewriteResult};

/// 处理回调
pub type BatchCallback = Box<dyn FnMut(&[MutationRecord]) -> RewriteResult<()>>;

/// 记录过滤器，返回 `false` 的记录被丢弃
pub type RecordFilter = Box<dyn Fn(&MutationRecord) -> bool>;

/// 观察状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObserverState {
    Inactive,
    Active,
    Paused,
    Processing,
}

impl fmt::Display for ObserverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObserverState::Inactive => "inactive",
            ObserverState::Active => "active",
            ObserverState::Paused => "paused",
            ObserverState::Processing => "processing",
        };
        f.write_str(name)
    }
}

/// 批处理选项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatcherOptions {
    pub batch_size: usize,
    pub debounce_ms: u64,
    pub throttle_ms: u64,
    pub max_buffer_size: usize,
}

impl Default for BatcherOptions {
    fn default() -> Self {
        Self {
            batch_size: constants::DEFAULT_BATCH_SIZE,
            debounce_ms: constants::DEFAULT_DEBOUNCE_MS,
            throttle_ms: constants::DEFAULT_THROTTLE_MS,
            max_buffer_size: constants::DEFAULT_MAX_BUFFER_SIZE,
        }
    }
}

impl BatcherOptions {
    pub fn validate(&self) -> RewriteResult<()> {
        if self.batch_size == 0 {
            return Err(helpers::config_error("batch_size 必须大于0"));
        }
        if self.max_buffer_size == 0 {
            return Err(helpers::config_error("max_buffer_size 必须大于0"));
        }
        Ok(())
    }

    fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

/// 批处理统计
#[derive(Debug, Clone, Default)]
pub struct BatcherStats {
    pub records_received: usize,
    pub records_processed: usize,
    pub records_filtered: usize,
    pub flushes: usize,
    pub overflow_flushes: usize,
    pub callback_faults: usize,
    pub errors: ErrorStats,
}

/// 变更批处理器
pub struct MutationBatcher {
    clock: Rc<dyn Clock>,
    options: BatcherOptions,
    state: ObserverState,
    callback: Option<BatchCallback>,
    filters: Vec<RecordFilter>,
    skipped_nodes: Vec<Weak<Node>>,
    buffer: VecDeque<MutationRecord>,
    observation: Option<Rc<Observation>>,
    schedule: FlushSchedule,
    stats: BatcherStats,
}

impl fmt::Debug for MutationBatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationBatcher")
            .field("state", &self.state)
            .field("options", &self.options)
            .field("initialized", &self.callback.is_some())
            .field("buffered", &self.buffer.len())
            .field("schedule", &self.schedule)
            .field("stats", &self.stats)
            .finish()
    }
}

impl Default for MutationBatcher {
    fn default() -> Self {
        Self::new(default_clock())
    }
}

impl MutationBatcher {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            clock,
            options: BatcherOptions::default(),
            state: ObserverState::Inactive,
            callback: None,
            filters: Vec::new(),
            skipped_nodes: Vec::new(),
            buffer: VecDeque::new(),
            observation: None,
            schedule: FlushSchedule::new(),
            stats: BatcherStats::default(),
        }
    }

    /// 设置选项和处理回调
    pub fn initialize(&mut self, options: BatcherOptions, callback: BatchCallback) -> bool {
        if self.state != ObserverState::Inactive {
            tracing::warn!("批处理器运行中（{}），忽略重复初始化", self.state);
            return false;
        }
        if let Err(e) = options.validate() {
            helpers::log(&e);
            return false;
        }

        self.options = options;
        self.callback = Some(callback);
        tracing::debug!("批处理器已初始化: {:?}", self.options);
        true
    }

    /// 开始观察 `target`
    pub fn start(&mut self, document: &LiveDocument, target: &Handle, config: ObserveConfig) -> bool {
        match self.state {
            ObserverState::Active => return true,
            ObserverState::Inactive => {}
            state => {
                tracing::debug!("批处理器处于 {} 状态，无法启动", state);
                return false;
            }
        }

        if self.callback.is_none() {
            tracing::warn!("批处理器尚未初始化");
            return false;
        }
        if !document.is_top_level() {
            tracing::info!("框架内文档不启用变更观察");
            return false;
        }
        let Some(hub) = document.hub() else {
            helpers::log(&RewriteError::EnvironmentUnavailable(
                "文档不支持变更观察，仅执行初始遍历".to_string(),
            ));
            return false;
        };
        if !is_attached(target) {
            helpers::log(&RewriteError::DetachedNode("观察目标不在文档中".to_string()));
            return false;
        }

        self.observation = Some(hub.observe(target, config));
        self.state = ObserverState::Active;
        tracing::info!("变更观察已启动");
        true
    }

    /// 停止观察，清空缓冲与计时
    pub fn stop(&mut self) {
        if let Some(observation) = self.observation.take() {
            observation.disconnect();
        }
        let dropped = self.buffer.len();
        self.buffer.clear();
        self.schedule.reset();
        self.state = ObserverState::Inactive;
        tracing::debug!("变更观察已停止，丢弃 {} 条缓冲记录", dropped);
    }

    /// 暂停观察，保留已缓冲的记录
    pub fn pause(&mut self) -> bool {
        if self.state != ObserverState::Active {
            return false;
        }
        if let Some(observation) = &self.observation {
            let records = observation.take_records();
            self.stats.records_received += records.len();
            self.buffer.extend(records);
            observation.disconnect();
        }
        self.state = ObserverState::Paused;
        tracing::debug!("变更观察已暂停，缓冲 {} 条记录", self.buffer.len());
        true
    }

    /// 恢复观察；已缓冲的记录在下一次刷新时处理
    pub fn resume(&mut self) -> bool {
        if self.state != ObserverState::Paused {
            return false;
        }

        let target_valid = self
            .observation
            .as_ref()
            .is_some_and(|observation| is_attached(observation.target()));
        if !target_valid {
            tracing::warn!("观察目标已脱离文档，停止观察");
            self.stop();
            return false;
        }

        if let Some(observation) = &self.observation {
            observation.reconnect();
        }
        self.state = ObserverState::Active;
        if !self.buffer.is_empty() {
            self.arm();
        }
        tracing::debug!("变更观察已恢复");
        true
    }

    /// 从观察登记取走记录并送入缓冲区
    pub fn deliver(&mut self) -> usize {
        if self.state != ObserverState::Active {
            return 0;
        }
        let records = match &self.observation {
            Some(observation) => observation.take_records(),
            None => return 0,
        };
        let count = records.len();
        if count > 0 {
            self.handle_mutations(records);
        }
        count
    }

    /// 接收一批原始记录
    pub fn handle_mutations(&mut self, records: Vec<MutationRecord>) {
        if self.state == ObserverState::Inactive {
            tracing::debug!("批处理器未启动，忽略 {} 条记录", records.len());
            return;
        }

        self.stats.records_received += records.len();
        self.buffer.extend(records);

        if self.buffer.len() > self.options.max_buffer_size {
            tracing::debug!(
                "缓冲区溢出（{} > {}），立即刷新",
                self.buffer.len(),
                self.options.max_buffer_size
            );
            while self.buffer.len() > self.options.max_buffer_size {
                if self.flush_batch() == 0 {
                    break;
                }
                self.stats.overflow_flushes += 1;
            }
        }

        if !self.buffer.is_empty() && self.state == ObserverState::Active {
            self.arm();
        }
    }

    /// 立即处理所有缓冲记录，忽略计时
    pub fn flush(&mut self) -> usize {
        self.deliver();
        let mut processed = 0;
        while !self.buffer.is_empty() {
            match self.state {
                ObserverState::Active | ObserverState::Paused => processed += self.flush_batch(),
                _ => break,
            }
        }
        processed
    }

    /// 截止时间已到则执行一次刷新
    pub fn poll(&mut self) -> bool {
        if self.state != ObserverState::Active {
            return false;
        }
        self.deliver();

        if self.state == ObserverState::Active && self.schedule.is_due(self.clock.now()) {
            self.flush_batch();
            return true;
        }
        false
    }

    /// 下一次刷新的截止时间（仅在观察中时）
    pub fn next_deadline(&self) -> Option<Instant> {
        if self.state != ObserverState::Active {
            return None;
        }
        self.schedule.deadline()
    }

    /// 按计时驱动刷新，直到没有待处理记录，返回刷新次数
    pub async fn run_pending(&mut self) -> usize {
        let mut flushes = 0;
        loop {
            self.deliver();
            let Some(deadline) = self.next_deadline() else {
                break;
            };
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
            if self.poll() {
                flushes += 1;
            }
        }
        flushes
    }

    /// 添加记录过滤器
    pub fn add_filter<F>(&mut self, filter: F)
    where
        F: Fn(&MutationRecord) -> bool + 'static,
    {
        self.filters.push(Box::new(filter));
    }

    /// 忽略目标位于 `node` 子树中的记录
    pub fn skip_node(&mut self, node: &Handle) {
        self.skipped_nodes.retain(|weak| weak.strong_count() > 0);
        self.skipped_nodes.push(Rc::downgrade(node));
    }

    pub fn is_active(&self) -> bool {
        self.state == ObserverState::Active
    }

    pub fn get_state(&self) -> ObserverState {
        self.state
    }

    /// 已缓冲和尚未取走的记录总数
    pub fn get_pending_count(&self) -> usize {
        let undelivered = self
            .observation
            .as_ref()
            .map(|observation| observation.pending_len())
            .unwrap_or(0);
        self.buffer.len() + undelivered
    }

    pub fn options(&self) -> &BatcherOptions {
        &self.options
    }

    /// 更新选项，运行中也可调用
    pub fn update_options(&mut self, options: BatcherOptions) -> bool {
        if let Err(e) = options.validate() {
            helpers::log(&e);
            return false;
        }
        self.options = options;
        if self.state == ObserverState::Active && !self.buffer.is_empty() {
            self.arm();
        }
        true
    }

    pub fn stats(&self) -> &BatcherStats {
        &self.stats
    }

    fn arm(&mut self) {
        let deadline = self
            .schedule
            .arm(self.clock.now(), self.options.throttle(), self.options.debounce());
        tracing::trace!("刷新已排期: {:?}", deadline);
    }

    /// 处理一批记录，返回取出的记录数
    fn flush_batch(&mut self) -> usize {
        let prior = self.state;
        if !matches!(prior, ObserverState::Active | ObserverState::Paused) {
            return 0;
        }

        let take = self.options.batch_size.min(self.buffer.len());
        if take == 0 {
            return 0;
        }
        self.state = ObserverState::Processing;
        self.schedule.record_flush(self.clock.now());

        let batch: Vec<MutationRecord> = self.buffer.drain(..take).collect();
        let working: Vec<MutationRecord> = batch
            .into_iter()
            .filter(|record| self.keep_record(record))
            .collect();
        self.stats.records_filtered += take - working.len();

        if !working.is_empty() {
            self.invoke_callback(&working);
        }

        self.stats.flushes += 1;
        self.stats.records_processed += working.len();
        self.restore_after_flush(prior);

        if self.state == ObserverState::Active && !self.buffer.is_empty() {
            self.arm();
        }
        take
    }

    fn keep_record(&self, record: &MutationRecord) -> bool {
        let skipped = self.skipped_nodes.iter().filter_map(Weak::upgrade).any(|node| {
            is_inclusive_ancestor(&node, &record.target)
        });
        !skipped && self.filters.iter().all(|filter| filter(record))
    }

    fn invoke_callback(&mut self, batch: &[MutationRecord]) {
        let observation = self.observation.clone();
        let Some(callback) = self.callback.as_mut() else {
            return;
        };

        let outcome = {
            let _suppressed = observation.as_ref().map(|o| o.suppress());
            catch_unwind(AssertUnwindSafe(|| callback(batch)))
        };

        let fault = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(RewriteError::CallbackFault(format!("处理回调返回错误: {}", e))),
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "未知错误".to_string());
                Some(RewriteError::CallbackFault(format!("处理回调 panic: {}", message)))
            }
        };

        if let Some(fault) = fault {
            helpers::log(&fault);
            self.stats.callback_faults += 1;
            self.stats.errors.record_error(&fault);
            tracing::warn!("丢弃 {} 条记录的批次", batch.len());
        }
    }

    /// 恢复刷新前的状态；目标失效时转为停止
    fn restore_after_flush(&mut self, prior: ObserverState) {
        if self.state != ObserverState::Processing {
            return;
        }

        let target_valid = self
            .observation
            .as_ref()
            .is_some_and(|observation| is_attached(observation.target()));

        if prior == ObserverState::Active && !target_valid {
            tracing::warn!("观察目标已脱离文档，刷新后不再重新连接");
            self.stop();
            return;
        }
        self.state = prior;
    }
}
