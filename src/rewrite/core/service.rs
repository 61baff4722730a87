//! 改写服务
//!
//! 把遍历引擎、片段包装器和变更批处理器组合到同一个活动文档上：
//! 先做一次分片的全文遍历，然后在文档根上开启观察，
//! 之后的每次变更只重新处理受影响的节点。

use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use std::time::Instant;

use markup5ever_rcdom::Handle;
use serde::Serialize;

use crate::parsers::html::{get_text, is_attached};
use crate::rewrite::clock::{default_clock, Clock};
use crate::rewrite::config::RewriteConfig;
use crate::rewrite::document::LiveDocument;
use crate::rewrite::error::{helpers, ErrorStats, RewriteError, RewriteResult};
use crate::rewrite::observer::{
    BatchCallback, BatcherStats, MutationBatcher, MutationKind, MutationRecord, ObserveConfig,
    ObserverState,
};
use crate::rewrite::pipeline::{
    Segment, SegmentSource, SegmentWrapper, TraversalEngine, TraversalOptions, TraversalStats,
};

/// 一次替换事件，交给提示框等协作方
#[derive(Debug, Clone)]
pub struct ReplacementEvent {
    pub marker: Handle,
    pub segment: Segment,
}

type ReplacementHook = Box<dyn Fn(&ReplacementEvent)>;

/// 服务统计
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServiceStats {
    pub text_nodes_seen: usize,
    pub text_nodes_rewritten: usize,
    pub replacements: usize,
    pub rejected_segments: usize,
    pub node_faults: usize,
    pub rescanned_records: usize,
    pub last_pass_ms: u64,
    #[serde(skip)]
    pub errors: ErrorStats,
}

/// 单个文本节点的处理逻辑，初始遍历与变更回调共用
struct TextNodeProcessor {
    wrapper: SegmentWrapper,
    source: Box<dyn SegmentSource>,
    hooks: RefCell<Vec<ReplacementHook>>,
    stats: RefCell<ServiceStats>,
}

impl TextNodeProcessor {
    /// 处理一个文本节点；panic 被捕获并记录，不会中断遍历
    fn handle(&self, node: &Handle) {
        if catch_unwind(AssertUnwindSafe(|| self.process(node))).is_err() {
            let fault = RewriteError::CallbackFault("处理文本节点时发生 panic".to_string());
            helpers::log(&fault);
            let mut stats = self.stats.borrow_mut();
            stats.node_faults += 1;
            stats.errors.record_error(&fault);
        }
    }

    fn process(&self, node: &Handle) {
        let Some(text) = get_text(node) else {
            return;
        };
        self.stats.borrow_mut().text_nodes_seen += 1;

        let segments = self.source.identify_segments(&text);
        if segments.is_empty() {
            return;
        }

        match self.wrapper.apply(node, &segments) {
            Ok(report) => {
                {
                    let mut stats = self.stats.borrow_mut();
                    stats.replacements += report.applied;
                    stats.rejected_segments += report.rejected;
                    if report.applied > 0 {
                        stats.text_nodes_rewritten += 1;
                    }
                }
                self.emit(report.markers);
            }
            Err(e) => {
                helpers::log(&e);
                self.stats.borrow_mut().errors.record_error(&e);
            }
        }
    }

    fn emit(&self, markers: Vec<(Handle, Segment)>) {
        let hooks = self.hooks.borrow();
        if hooks.is_empty() {
            return;
        }
        for (marker, segment) in markers {
            let event = ReplacementEvent { marker, segment };
            for hook in hooks.iter() {
                hook(&event);
            }
        }
    }

    /// 根据变更记录重新处理受影响的节点
    fn rescan(&self, records: &[MutationRecord], engine: &TraversalEngine, options: &TraversalOptions) -> usize {
        let mut handled = 0;

        for record in records {
            match record.kind {
                MutationKind::ChildList => {
                    for node in &record.added_nodes {
                        if !self.should_rescan(node, engine, options) {
                            continue;
                        }
                        handled += engine.traverse(node, |n| self.handle(n), options);
                    }
                }
                MutationKind::CharacterData => {
                    let target = &record.target;
                    if !is_attached(target) || self.wrapper.is_inside_marker(target) {
                        continue;
                    }
                    // 文本已变化，原有标记失效
                    engine.tracker().clear_processed(target);
                    if engine.is_eligible_root(target, options) {
                        handled += engine.traverse(target, |n| self.handle(n), options);
                    }
                }
            }
        }

        self.stats.borrow_mut().rescanned_records += records.len();
        tracing::debug!("变更批次处理完成: {} 条记录，{} 个文本节点", records.len(), handled);
        handled
    }

    fn should_rescan(&self, node: &Handle, engine: &TraversalEngine, options: &TraversalOptions) -> bool {
        is_attached(node) && !self.wrapper.is_inside_marker(node) && engine.is_eligible_root(node, options)
    }
}

/// 改写服务
pub struct RewriteService {
    document: LiveDocument,
    config: RewriteConfig,
    options: TraversalOptions,
    engine: TraversalEngine,
    processor: Rc<TextNodeProcessor>,
    batcher: RefCell<MutationBatcher>,
    passes: Cell<usize>,
}

impl std::fmt::Debug for RewriteService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewriteService")
            .field("document", &self.document)
            .field("options", &self.options)
            .field("engine", &self.engine)
            .field("batcher", &self.batcher)
            .field("passes", &self.passes.get())
            .finish()
    }
}

impl RewriteService {
    /// 创建改写服务
    pub fn new<S>(document: LiveDocument, config: RewriteConfig, source: S) -> RewriteResult<Self>
    where
        S: SegmentSource + 'static,
    {
        Self::with_clock(document, config, source, default_clock())
    }

    /// 使用指定时钟创建改写服务
    pub fn with_clock<S>(
        document: LiveDocument,
        config: RewriteConfig,
        source: S,
        clock: Rc<dyn Clock>,
    ) -> RewriteResult<Self>
    where
        S: SegmentSource + 'static,
    {
        config.validate()?;

        let tracker = document.tracker().clone();
        let engine = TraversalEngine::with_clock(tracker.clone(), clock.clone());
        let wrapper =
            SegmentWrapper::new(tracker, config.marker_config()).with_hub(document.hub().cloned());

        let processor = Rc::new(TextNodeProcessor {
            wrapper,
            source: Box::new(source),
            hooks: RefCell::new(Vec::new()),
            stats: RefCell::new(ServiceStats::default()),
        });

        Ok(Self {
            options: config.traversal_options(),
            document,
            config,
            engine,
            processor,
            batcher: RefCell::new(MutationBatcher::new(clock)),
            passes: Cell::new(0),
        })
    }

    pub fn document(&self) -> &LiveDocument {
        &self.document
    }

    pub fn config(&self) -> &RewriteConfig {
        &self.config
    }

    /// 分片处理整个文档，返回处理的文本节点数
    pub async fn process_document(&self) -> usize {
        let start = Instant::now();
        tracing::info!("开始文档改写");

        let processor = self.processor.clone();
        let count = self
            .engine
            .traverse_chunked(self.document.root(), |node| processor.handle(node), &self.options)
            .await;

        self.passes.set(self.passes.get() + 1);
        let elapsed = start.elapsed();
        let mut stats = self.processor.stats.borrow_mut();
        stats.last_pass_ms = elapsed.as_millis() as u64;

        tracing::info!(
            "文档改写完成: {} 个文本节点，累计 {} 处替换，耗时 {:?}",
            count,
            stats.replacements,
            elapsed
        );
        count
    }

    /// 同步处理一棵子树
    pub fn process_subtree(&self, root: &Handle) -> usize {
        if !self.engine.is_eligible_root(root, &self.options) {
            tracing::debug!("子树位于被跳过的元素之内，不做处理");
            return 0;
        }
        let processor = self.processor.clone();
        self.engine
            .traverse(root, |node| processor.handle(node), &self.options)
    }

    /// 在文档根上开启变更观察
    pub fn start_observing(&self) -> bool {
        let mut batcher = self.batcher.borrow_mut();
        if batcher.is_active() {
            return true;
        }

        if batcher.get_state() == ObserverState::Inactive
            && !batcher.initialize(self.config.batcher_options(), self.batch_callback())
        {
            return false;
        }

        batcher.start(&self.document, self.document.root(), ObserveConfig::default())
    }

    fn batch_callback(&self) -> BatchCallback {
        let processor = self.processor.clone();
        let engine = self.engine.clone();
        let options = self.options.clone();

        Box::new(move |records: &[MutationRecord]| {
            processor.rescan(records, &engine, &options);
            Ok(())
        })
    }

    pub fn stop_observing(&self) {
        self.batcher.borrow_mut().stop();
    }

    pub fn pause(&self) -> bool {
        self.batcher.borrow_mut().pause()
    }

    pub fn resume(&self) -> bool {
        self.batcher.borrow_mut().resume()
    }

    /// 立即处理所有待处理变更
    pub fn flush(&self) -> usize {
        self.batcher.borrow_mut().flush()
    }

    /// 截止时间已到则刷新一次
    pub fn poll(&self) -> bool {
        self.batcher.borrow_mut().poll()
    }

    /// 等待并处理所有待处理变更，返回刷新次数
    pub async fn run_pending(&self) -> usize {
        let mut flushes = 0;
        loop {
            let deadline = {
                let mut batcher = self.batcher.borrow_mut();
                batcher.deliver();
                batcher.next_deadline()
            };
            let Some(deadline) = deadline else {
                break;
            };

            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
            if self.batcher.borrow_mut().poll() {
                flushes += 1;
            }
        }
        flushes
    }

    /// 忽略来自 `node` 子树的变更
    pub fn skip_node(&self, node: &Handle) {
        self.batcher.borrow_mut().skip_node(node);
    }

    /// 注册替换事件回调
    pub fn add_hook<F>(&self, hook: F)
    where
        F: Fn(&ReplacementEvent) + 'static,
    {
        self.processor.hooks.borrow_mut().push(Box::new(hook));
    }

    /// 清除文档上的全部处理标记，已替换的内容保持不变
    pub fn reset(&self) -> usize {
        self.engine.reset_processed(self.document.root())
    }

    /// 累计替换次数
    pub fn processed_count(&self) -> usize {
        self.processor.stats.borrow().replacements
    }

    pub fn observer_state(&self) -> ObserverState {
        self.batcher.borrow().get_state()
    }

    pub fn pending_count(&self) -> usize {
        self.batcher.borrow().get_pending_count()
    }

    pub fn stats(&self) -> ServiceStats {
        self.processor.stats.borrow().clone()
    }

    pub fn batcher_stats(&self) -> BatcherStats {
        self.batcher.borrow().stats().clone()
    }

    pub fn traversal_stats(&self) -> TraversalStats {
        self.engine.last_stats()
    }
}
