//! 变更分发中心
//!
//! 文档上的每次修改都通过 [`MutationHub::notify`] 发布，
//! 已连接且未被抑制的观察登记会把匹配的记录攒在自己的待取队列里，
//! 由持有者主动取走。

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use markup5ever_rcdom::Handle;

use super::record::{MutationRecord, ObserveConfig};
use crate::parsers::html::is_inclusive_ancestor;

/// 变更分发中心
#[derive(Debug, Default)]
pub struct MutationHub {
    registrations: RefCell<Vec<Weak<Observation>>>,
}

impl MutationHub {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// 在 `target` 上登记观察
    pub fn observe(self: &Rc<Self>, target: &Handle, config: ObserveConfig) -> Rc<Observation> {
        let observation = Rc::new(Observation {
            target: target.clone(),
            config,
            connected: Cell::new(true),
            suppressed: Cell::new(false),
            pending: RefCell::new(Vec::new()),
        });
        self.registrations
            .borrow_mut()
            .push(Rc::downgrade(&observation));
        observation
    }

    /// 发布一条变更记录
    pub fn notify(&self, record: MutationRecord) {
        let live: Vec<Rc<Observation>> = {
            let mut registrations = self.registrations.borrow_mut();
            registrations.retain(|weak| weak.strong_count() > 0);
            registrations.iter().filter_map(Weak::upgrade).collect()
        };

        for observation in live {
            if observation.accepts(&record) {
                observation.pending.borrow_mut().push(record.clone());
            }
        }
    }

    /// 仍然存活的观察登记数
    pub fn observer_count(&self) -> usize {
        self.registrations
            .borrow()
            .iter()
            .filter(|weak| weak.strong_count() > 0)
            .count()
    }
}

/// 一次观察登记
#[derive(Debug)]
pub struct Observation {
    target: Handle,
    config: ObserveConfig,
    connected: Cell<bool>,
    suppressed: Cell<bool>,
    pending: RefCell<Vec<MutationRecord>>,
}

impl Observation {
    pub fn target(&self) -> &Handle {
        &self.target
    }

    pub fn is_connected(&self) -> bool {
        self.connected.get()
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed.get()
    }

    /// 取走所有待处理记录
    pub fn take_records(&self) -> Vec<MutationRecord> {
        std::mem::take(&mut *self.pending.borrow_mut())
    }

    /// 尚未取走的记录数
    pub fn pending_len(&self) -> usize {
        self.pending.borrow().len()
    }

    /// 断开观察，丢弃未取走的记录
    pub fn disconnect(&self) {
        self.connected.set(false);
        self.pending.borrow_mut().clear();
    }

    /// 重新连接
    pub fn reconnect(&self) {
        self.connected.set(true);
    }

    /// 在守卫存活期间忽略所有变更
    pub fn suppress(&self) -> Suppression<'_> {
        let previous = self.suppressed.replace(true);
        Suppression {
            observation: self,
            previous,
        }
    }

    fn accepts(&self, record: &MutationRecord) -> bool {
        if !self.connected.get() || self.suppressed.get() {
            return false;
        }
        if !self.config.accepts(record.kind) {
            return false;
        }
        if self.config.subtree {
            is_inclusive_ancestor(&self.target, &record.target)
        } else {
            Rc::ptr_eq(&self.target, &record.target)
        }
    }
}

/// 抑制守卫，离开作用域时恢复原状态
#[derive(Debug)]
pub struct Suppression<'a> {
    observation: &'a Observation,
    previous: bool,
}

impl Drop for Suppression<'_> {
    fn drop(&mut self) {
        self.observation.suppressed.set(self.previous);
    }
}
