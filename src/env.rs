//! 统一的环境变量管理系统
//!
//! 提供类型安全、可验证的环境变量管理，用于覆盖改写管道的配置

use std::env;
use std::fmt;

use crate::rewrite::config::constants;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DEFAULT: Option<T>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    /// 读取变量；未设置时回退到默认值
    fn get() -> EnvResult<T> {
        match Self::lookup() {
            Some(result) => result,
            None => Self::DEFAULT.ok_or_else(|| EnvError {
                variable: Self::NAME.to_string(),
                message: "Required environment variable not set".to_string(),
            }),
        }
    }

    /// 仅在变量被显式设置时返回结果，用于覆盖配置文件
    fn lookup() -> Option<EnvResult<T>> {
        env::var(Self::NAME).ok().map(|value| Self::parse(&value))
    }
}

/// 核心环境变量定义
pub mod core {
    use super::*;

    /// 日志级别
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "LIVE_REWRITE_LOG_LEVEL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("warn".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            match value.to_lowercase().as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(value.to_lowercase()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!(
                        "Invalid log level '{}'. Use: trace, debug, info, warn, error",
                        value
                    ),
                }),
            }
        }
    }
}

/// 改写管道相关环境变量
pub mod pipeline {
    use super::*;

    /// 每个遍历分片最多处理的节点数
    pub struct ChunkSize;
    impl EnvVar<usize> for ChunkSize {
        const NAME: &'static str = "LIVE_REWRITE_CHUNK_SIZE";
        const DEFAULT: Option<usize> = Some(constants::DEFAULT_CHUNK_SIZE);
        const DESCRIPTION: &'static str = "Maximum nodes handled per traversal chunk";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 100_000)
        }
    }

    /// 每个遍历分片的时间片（毫秒）
    pub struct TimeSliceMs;
    impl EnvVar<u64> for TimeSliceMs {
        const NAME: &'static str = "LIVE_REWRITE_TIME_SLICE_MS";
        const DEFAULT: Option<u64> = Some(constants::DEFAULT_TIME_SLICE_MS);
        const DESCRIPTION: &'static str = "Wall-clock budget of one traversal chunk in milliseconds";

        fn parse(value: &str) -> EnvResult<u64> {
            parse_millis(value, Self::NAME, 1, 1_000)
        }
    }

    /// 每次刷新处理的变更记录数
    pub struct BatchSize;
    impl EnvVar<usize> for BatchSize {
        const NAME: &'static str = "LIVE_REWRITE_BATCH_SIZE";
        const DEFAULT: Option<usize> = Some(constants::DEFAULT_BATCH_SIZE);
        const DESCRIPTION: &'static str = "Mutation records handled per flush";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 10_000)
        }
    }

    /// 防抖窗口（毫秒）
    pub struct DebounceMs;
    impl EnvVar<u64> for DebounceMs {
        const NAME: &'static str = "LIVE_REWRITE_DEBOUNCE_MS";
        const DEFAULT: Option<u64> = Some(constants::DEFAULT_DEBOUNCE_MS);
        const DESCRIPTION: &'static str = "Settle time after the latest mutation before a flush";

        fn parse(value: &str) -> EnvResult<u64> {
            parse_millis(value, Self::NAME, 0, 60_000)
        }
    }

    /// 节流窗口（毫秒）
    pub struct ThrottleMs;
    impl EnvVar<u64> for ThrottleMs {
        const NAME: &'static str = "LIVE_REWRITE_THROTTLE_MS";
        const DEFAULT: Option<u64> = Some(constants::DEFAULT_THROTTLE_MS);
        const DESCRIPTION: &'static str = "Minimum spacing between flush starts";

        fn parse(value: &str) -> EnvResult<u64> {
            parse_millis(value, Self::NAME, 0, 60_000)
        }
    }

    /// 缓冲区上限
    pub struct MaxBufferSize;
    impl EnvVar<usize> for MaxBufferSize {
        const NAME: &'static str = "LIVE_REWRITE_MAX_BUFFER_SIZE";
        const DEFAULT: Option<usize> = Some(constants::DEFAULT_MAX_BUFFER_SIZE);
        const DESCRIPTION: &'static str = "Buffered records that force an immediate flush";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 1_000_000)
        }
    }
}

fn parse_positive_usize(value: &str, var_name: &str, min: usize, max: usize) -> EnvResult<usize> {
    let num: usize = value.trim().parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid positive number".to_string(),
    })?;

    if num < min {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} is below minimum {}", num, min),
        });
    }

    if num > max {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} exceeds maximum {}", num, max),
        });
    }

    Ok(num)
}

fn parse_millis(value: &str, var_name: &str, min: u64, max: u64) -> EnvResult<u64> {
    let millis: u64 = value.trim().parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid number of milliseconds".to_string(),
    })?;

    if millis < min || millis > max {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} is outside {}..={}", millis, min, max),
        });
    }

    Ok(millis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_parsing() {
        assert_eq!(core::LogLevel::parse("DEBUG").unwrap(), "debug");
        assert!(core::LogLevel::parse("verbose").is_err());
    }

    #[test]
    fn test_numeric_validation() {
        assert_eq!(pipeline::ChunkSize::parse("50").unwrap(), 50);
        assert!(pipeline::ChunkSize::parse("0").is_err());
        assert!(pipeline::ChunkSize::parse("abc").is_err());

        assert_eq!(pipeline::DebounceMs::parse("0").unwrap(), 0);
        assert!(pipeline::TimeSliceMs::parse("0").is_err());
        assert!(pipeline::ThrottleMs::parse("70000").is_err());
    }

    #[test]
    fn test_defaults_match_constants() {
        assert_eq!(pipeline::ChunkSize::DEFAULT, Some(50));
        assert_eq!(pipeline::TimeSliceMs::DEFAULT, Some(15));
        assert_eq!(pipeline::BatchSize::DEFAULT, Some(20));
        assert_eq!(pipeline::MaxBufferSize::DEFAULT, Some(100));
    }
}
