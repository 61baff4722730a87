//! 改写配置管理模块
//!
//! 提供简化的配置管理，支持配置文件、环境变量和默认值

pub mod manager;

// 重新导出主要类型
pub use manager::{ConfigManager, RewriteConfig};

/// 配置常量
pub mod constants {
    // 遍历相关
    pub const DEFAULT_CHUNK_SIZE: usize = 50;
    pub const DEFAULT_TIME_SLICE_MS: u64 = 15;

    // 变更批处理相关
    pub const DEFAULT_BATCH_SIZE: usize = 20;
    pub const DEFAULT_DEBOUNCE_MS: u64 = 50;
    pub const DEFAULT_THROTTLE_MS: u64 = 100;
    pub const DEFAULT_MAX_BUFFER_SIZE: usize = 100;

    // 跳过的元素
    pub const SKIP_TAGS: &[&str] = &[
        "script", "style", "svg", "noscript", "iframe", "object", "embed", "input",
        "textarea", "select", "option", "pre", "code",
    ];

    // 标记相关
    pub const PROCESSED_ATTR: &str = "data-rewrite-processed";
    pub const OPT_OUT_ATTR: &str = "data-rewrite-ignore";
    pub const DEFAULT_OPT_OUT_IDS: &[&str] = &["live-rewrite-tooltip"];
    pub const MARKER_TAG: &str = "span";
    pub const MARKER_CLASS: &str = "live-rewrite";
    pub const ORIGINAL_TEXT_ATTR: &str = "data-original-text";

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "live-rewrite.toml",
        ".live-rewrite.toml",
        "~/.config/live-rewrite/config.toml",
        "/etc/live-rewrite/config.toml",
    ];
}
