//! 改写模块统一错误处理
//!
//! 提供结构化错误类型和错误处理机制。改写核心对可恢复的错误一律
//! “记录并继续”，只有配置与I/O类错误会向调用方传播。

use std::fmt;

use thiserror::Error;

/// 改写错误类型
#[derive(Error, Debug, Clone)]
pub enum RewriteError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 输入验证错误（无效片段、非文本节点等）
    #[error("输入无效: {0}")]
    InvalidInput(String),

    /// 节点已脱离文档
    #[error("节点已脱离文档: {0}")]
    DetachedNode(String),

    /// 运行环境不支持（如无法观察变更）
    #[error("环境不可用: {0}")]
    EnvironmentUnavailable(String),

    /// 宿主回调出错
    #[error("回调执行失败: {0}")]
    CallbackFault(String),

    /// 解析错误
    #[error("解析错误: {0}")]
    ParseError(String),

    /// 序列化错误
    #[error("序列化错误: {0}")]
    SerializationError(String),

    /// I/O 错误
    #[error("IO错误: {0}")]
    IoError(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    InternalError(String),
}

impl RewriteError {
    /// 检查错误是否可以就地恢复（跳过并继续）
    pub fn is_recoverable(&self) -> bool {
        match self {
            RewriteError::InvalidInput(_) => true,
            RewriteError::DetachedNode(_) => true,
            RewriteError::EnvironmentUnavailable(_) => true,
            RewriteError::CallbackFault(_) => true,
            RewriteError::ConfigError(_) => false,
            RewriteError::ParseError(_) => false,
            RewriteError::SerializationError(_) => false,
            RewriteError::IoError(_) => false,
            RewriteError::InternalError(_) => false,
        }
    }

    /// 获取错误的严重程度
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            RewriteError::InvalidInput(_) => ErrorSeverity::Info,
            RewriteError::DetachedNode(_) => ErrorSeverity::Warning,
            RewriteError::EnvironmentUnavailable(_) => ErrorSeverity::Warning,
            RewriteError::CallbackFault(_) => ErrorSeverity::Error,
            RewriteError::ParseError(_) => ErrorSeverity::Error,
            RewriteError::SerializationError(_) => ErrorSeverity::Error,
            RewriteError::IoError(_) => ErrorSeverity::Error,
            RewriteError::ConfigError(_) => ErrorSeverity::Critical,
            RewriteError::InternalError(_) => ErrorSeverity::Critical,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            RewriteError::ConfigError(_) => ErrorCategory::Configuration,
            RewriteError::InvalidInput(_) | RewriteError::DetachedNode(_) => {
                ErrorCategory::InputValidation
            }
            RewriteError::EnvironmentUnavailable(_) => ErrorCategory::Environment,
            RewriteError::CallbackFault(_) => ErrorCategory::Callback,
            RewriteError::ParseError(_) => ErrorCategory::Parsing,
            RewriteError::SerializationError(_) => ErrorCategory::Serialization,
            RewriteError::IoError(_) => ErrorCategory::Io,
            RewriteError::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// 创建带上下文的错误
    pub fn with_context<T: fmt::Display>(mut self, context: T) -> Self {
        let new_msg = format!("{} (上下文: {})", self.message(), context);

        match &mut self {
            RewriteError::ConfigError(msg)
            | RewriteError::InvalidInput(msg)
            | RewriteError::DetachedNode(msg)
            | RewriteError::EnvironmentUnavailable(msg)
            | RewriteError::CallbackFault(msg)
            | RewriteError::ParseError(msg)
            | RewriteError::SerializationError(msg)
            | RewriteError::IoError(msg)
            | RewriteError::InternalError(msg) => *msg = new_msg,
        }

        self
    }

    /// 错误携带的原始消息（不含类别前缀）
    fn message(&self) -> &str {
        match self {
            RewriteError::ConfigError(msg)
            | RewriteError::InvalidInput(msg)
            | RewriteError::DetachedNode(msg)
            | RewriteError::EnvironmentUnavailable(msg)
            | RewriteError::CallbackFault(msg)
            | RewriteError::ParseError(msg)
            | RewriteError::SerializationError(msg)
            | RewriteError::IoError(msg)
            | RewriteError::InternalError(msg) => msg,
        }
    }
}

/// 错误严重程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    InputValidation,
    Environment,
    Callback,
    Parsing,
    Serialization,
    Io,
    Internal,
}

impl From<std::io::Error> for RewriteError {
    fn from(error: std::io::Error) -> Self {
        RewriteError::IoError(error.to_string())
    }
}

impl From<serde_json::Error> for RewriteError {
    fn from(error: serde_json::Error) -> Self {
        RewriteError::SerializationError(format!("JSON序列化错误: {}", error))
    }
}

impl From<toml::de::Error> for RewriteError {
    fn from(error: toml::de::Error) -> Self {
        RewriteError::ParseError(format!("TOML解析错误: {}", error))
    }
}

/// 错误结果类型别名
pub type RewriteResult<T> = Result<T, RewriteError>;

/// 错误统计信息
#[derive(Debug, Clone, Default)]
pub struct ErrorStats {
    pub total_errors: usize,
    pub by_category: std::collections::HashMap<ErrorCategory, usize>,
    pub by_severity: std::collections::HashMap<ErrorSeverity, usize>,
    pub recoverable_errors: usize,
    pub critical_errors: usize,
}

impl ErrorStats {
    /// 记录错误
    pub fn record_error(&mut self, error: &RewriteError) {
        self.total_errors += 1;

        *self.by_category.entry(error.category()).or_insert(0) += 1;

        let severity = error.severity();
        *self.by_severity.entry(severity).or_insert(0) += 1;

        if error.is_recoverable() {
            self.recoverable_errors += 1;
        }

        if severity == ErrorSeverity::Critical {
            self.critical_errors += 1;
        }
    }
}

/// 错误处理助手函数
pub mod helpers {
    use super::*;

    /// 按严重程度记录错误（不返回）
    pub fn log(error: &RewriteError) {
        match error.severity() {
            ErrorSeverity::Info => tracing::debug!("改写跳过: {}", error),
            ErrorSeverity::Warning => tracing::warn!("改写警告: {}", error),
            ErrorSeverity::Error => tracing::error!("改写错误: {}", error),
            ErrorSeverity::Critical => tracing::error!("改写严重错误: {}", error),
        }
    }

    /// 创建配置错误
    pub fn config_error<T: fmt::Display>(msg: T) -> RewriteError {
        RewriteError::ConfigError(msg.to_string())
    }

    /// 创建输入验证错误
    pub fn validation_error<T: fmt::Display>(msg: T) -> RewriteError {
        RewriteError::InvalidInput(msg.to_string())
    }

    /// 创建内部错误
    pub fn internal_error<T: fmt::Display>(msg: T) -> RewriteError {
        RewriteError::InternalError(msg.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = RewriteError::InvalidInput("startIndex >= endIndex".to_string());
        assert!(err.is_recoverable());
        assert_eq!(err.severity(), ErrorSeverity::Info);
        assert_eq!(err.category(), ErrorCategory::InputValidation);

        let err = RewriteError::ConfigError("chunk_size 为 0".to_string());
        assert!(!err.is_recoverable());
        assert_eq!(err.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_with_context_keeps_variant() {
        let err = RewriteError::DetachedNode("无父节点".to_string()).with_context("wrap");
        match err {
            RewriteError::DetachedNode(msg) => {
                assert_eq!(msg, "无父节点 (上下文: wrap)");
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn test_error_stats() {
        let mut stats = ErrorStats::default();
        stats.record_error(&RewriteError::CallbackFault("boom".to_string()));
        stats.record_error(&RewriteError::InternalError("bad".to_string()));

        assert_eq!(stats.total_errors, 2);
        assert_eq!(stats.recoverable_errors, 1);
        assert_eq!(stats.critical_errors, 1);
        assert_eq!(stats.by_category.get(&ErrorCategory::Callback), Some(&1));
    }

    #[test]
    fn test_toml_error_conversion() {
        let parse: Result<toml::Value, _> = toml::from_str("= broken");
        let err: RewriteError = parse.unwrap_err().into();
        assert_eq!(err.category(), ErrorCategory::Parsing);
    }
}
