//! 变更记录

use markup5ever_rcdom::Handle;

/// 变更种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    /// 子节点增删
    ChildList,
    /// 文本内容变化
    CharacterData,
}

/// 一条变更记录
#[derive(Debug, Clone)]
pub struct MutationRecord {
    pub kind: MutationKind,
    pub target: Handle,
    pub added_nodes: Vec<Handle>,
    pub removed_nodes: Vec<Handle>,
}

impl MutationRecord {
    pub fn child_list(target: Handle, added_nodes: Vec<Handle>, removed_nodes: Vec<Handle>) -> Self {
        Self {
            kind: MutationKind::ChildList,
            target,
            added_nodes,
            removed_nodes,
        }
    }

    pub fn character_data(target: Handle) -> Self {
        Self {
            kind: MutationKind::CharacterData,
            target,
            added_nodes: Vec::new(),
            removed_nodes: Vec::new(),
        }
    }
}

/// 观察配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObserveConfig {
    pub child_list: bool,
    pub character_data: bool,
    pub subtree: bool,
}

impl Default for ObserveConfig {
    fn default() -> Self {
        Self {
            child_list: true,
            character_data: true,
            subtree: true,
        }
    }
}

impl ObserveConfig {
    /// 是否接收该种类的记录
    pub fn accepts(&self, kind: MutationKind) -> bool {
        match kind {
            MutationKind::ChildList => self.child_list,
            MutationKind::CharacterData => self.character_data,
        }
    }
}
