//! 简化的配置管理器
//!
//! 提供统一的配置接口，支持文件配置、环境变量和默认值

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::constants;
use crate::env::{pipeline, EnvVar};
use crate::rewrite::error::{RewriteError, RewriteResult};
use crate::rewrite::observer::batcher::BatcherOptions;
use crate::rewrite::pipeline::traversal::TraversalOptions;
use crate::rewrite::pipeline::wrapper::MarkerConfig;

/// 改写配置
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct RewriteConfig {
    // 遍历配置
    pub chunk_size: usize,
    pub time_slice_ms: u64,
    pub skip_tags: Vec<String>,
    pub skip_processed: bool,
    pub opt_out_ids: Vec<String>,

    // 变更批处理配置
    pub batch_size: usize,
    pub debounce_ms: u64,
    pub throttle_ms: u64,
    pub max_buffer_size: usize,

    // 标记元素配置
    pub marker_tag: String,
    pub marker_class: String,
    pub original_text_attr: String,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            chunk_size: constants::DEFAULT_CHUNK_SIZE,
            time_slice_ms: constants::DEFAULT_TIME_SLICE_MS,
            skip_tags: constants::SKIP_TAGS.iter().map(|s| s.to_string()).collect(),
            skip_processed: true,
            opt_out_ids: constants::DEFAULT_OPT_OUT_IDS
                .iter()
                .map(|s| s.to_string())
                .collect(),

            batch_size: constants::DEFAULT_BATCH_SIZE,
            debounce_ms: constants::DEFAULT_DEBOUNCE_MS,
            throttle_ms: constants::DEFAULT_THROTTLE_MS,
            max_buffer_size: constants::DEFAULT_MAX_BUFFER_SIZE,

            marker_tag: constants::MARKER_TAG.to_string(),
            marker_class: constants::MARKER_CLASS.to_string(),
            original_text_attr: constants::ORIGINAL_TEXT_ATTR.to_string(),
        }
    }
}

impl RewriteConfig {
    /// 从 TOML 文本解析配置
    pub fn from_toml_str(source: &str) -> RewriteResult<Self> {
        let config: Self = toml::from_str(source)?;
        Ok(config)
    }

    /// 从 TOML 文件加载配置
    pub fn from_file(path: &Path) -> RewriteResult<Self> {
        let source = std::fs::read_to_string(path)
            .map_err(|e| RewriteError::IoError(format!("读取配置文件 {} 失败: {}", path.display(), e)))?;
        Self::from_toml_str(&source)
    }

    /// 验证配置
    pub fn validate(&self) -> RewriteResult<()> {
        if self.chunk_size == 0 {
            return Err(RewriteError::ConfigError("chunk_size 必须大于0".to_string()));
        }

        if self.time_slice_ms == 0 {
            return Err(RewriteError::ConfigError("time_slice_ms 必须大于0".to_string()));
        }

        if self.batch_size == 0 {
            return Err(RewriteError::ConfigError("batch_size 必须大于0".to_string()));
        }

        if self.max_buffer_size == 0 {
            return Err(RewriteError::ConfigError("max_buffer_size 必须大于0".to_string()));
        }

        if self.marker_tag.trim().is_empty() {
            return Err(RewriteError::ConfigError("marker_tag 不能为空".to_string()));
        }

        if self.original_text_attr.trim().is_empty() {
            return Err(RewriteError::ConfigError("original_text_attr 不能为空".to_string()));
        }

        Ok(())
    }

    /// 应用环境变量覆盖（只覆盖显式设置的变量）
    pub fn apply_env_overrides(&mut self) {
        override_from_env::<pipeline::ChunkSize, _>(&mut self.chunk_size);
        override_from_env::<pipeline::TimeSliceMs, _>(&mut self.time_slice_ms);
        override_from_env::<pipeline::BatchSize, _>(&mut self.batch_size);
        override_from_env::<pipeline::DebounceMs, _>(&mut self.debounce_ms);
        override_from_env::<pipeline::ThrottleMs, _>(&mut self.throttle_ms);
        override_from_env::<pipeline::MaxBufferSize, _>(&mut self.max_buffer_size);
    }

    /// 转换为遍历选项
    pub fn traversal_options(&self) -> TraversalOptions {
        TraversalOptions {
            skip_tags: self.skip_tags.iter().map(|t| t.to_ascii_lowercase()).collect(),
            skip_processed: self.skip_processed,
            chunk_size: self.chunk_size,
            time_slice_ms: self.time_slice_ms,
            opt_out_ids: self.opt_out_ids.iter().cloned().collect(),
        }
    }

    /// 转换为批处理选项
    pub fn batcher_options(&self) -> BatcherOptions {
        BatcherOptions {
            batch_size: self.batch_size,
            debounce_ms: self.debounce_ms,
            throttle_ms: self.throttle_ms,
            max_buffer_size: self.max_buffer_size,
        }
    }

    /// 转换为标记元素配置
    pub fn marker_config(&self) -> MarkerConfig {
        MarkerConfig {
            tag: self.marker_tag.clone(),
            class_name: self.marker_class.clone(),
            original_text_attr: self.original_text_attr.clone(),
        }
    }
}

fn override_from_env<V: EnvVar<T>, T>(target: &mut T) {
    match V::lookup() {
        Some(Ok(value)) => {
            tracing::debug!("环境变量 {} 覆盖配置: {}", V::NAME, V::DESCRIPTION);
            *target = value;
        }
        Some(Err(e)) => tracing::warn!("忽略无效的环境变量: {}", e),
        None => {}
    }
}

/// 简化的配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    config: RewriteConfig,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// 创建新的配置管理器（搜索默认路径）
    pub fn new() -> RewriteResult<Self> {
        Self::load(None)
    }

    /// 从指定路径或默认搜索路径加载配置
    ///
    /// 顺序：文件 -> 环境变量覆盖 -> 验证
    pub fn load(path: Option<&Path>) -> RewriteResult<Self> {
        let source = match path {
            Some(p) => Some(p.to_path_buf()),
            None => Self::find_config_file(),
        };

        let mut config = match &source {
            Some(p) => {
                tracing::info!("加载配置文件: {}", p.display());
                RewriteConfig::from_file(p)?
            }
            None => RewriteConfig::default(),
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(Self { config, source })
    }

    /// 获取配置
    pub fn get_config(&self) -> &RewriteConfig {
        &self.config
    }

    /// 配置来源文件（如果有）
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// 更新配置（先验证）
    pub fn update_config(&mut self, config: RewriteConfig) -> RewriteResult<()> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// 在默认路径中查找第一个存在的配置文件
    fn find_config_file() -> Option<PathBuf> {
        constants::CONFIG_PATHS
            .iter()
            .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
            .find(|p| p.exists())
    }
}
