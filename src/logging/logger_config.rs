//! 日志配置模块

use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::utils::config::LoggingConfig;

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggerConfig {
    /// 日志级别
    pub level: LogLevel,
    /// 日志输出目标
    pub targets: Vec<LogTarget>,
    /// 文件日志格式
    pub format: LogFormat,
}

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::Error,
            LogLevel::Warn => LevelFilter::Warn,
            LogLevel::Info => LevelFilter::Info,
            LogLevel::Debug => LevelFilter::Debug,
            LogLevel::Trace => LevelFilter::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(format!("Invalid LogLevel: {}", s)),
        }
    }
}

/// 日志输出目标
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogTarget {
    Console,
    File { path: PathBuf },
}

/// 日志格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogFormat {
    /// 单行文本
    Plain,
    /// 每行一个JSON对象
    Json,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            targets: vec![LogTarget::Console],
            format: LogFormat::Plain,
        }
    }
}

impl LoggerConfig {
    /// 由应用配置中的日志段生成
    ///
    /// 无法识别的级别按 Info 处理（配置校验阶段已经拒绝）。
    pub fn from_logging_config(config: &LoggingConfig) -> Self {
        let level = config.log_level.parse().unwrap_or(LogLevel::Info);

        let mut targets = Vec::new();
        if config.console_output {
            targets.push(LogTarget::Console);
        }
        if config.file_output {
            if let Some(path) = &config.log_file_path {
                targets.push(LogTarget::File { path: path.clone() });
            }
        }

        Self {
            level,
            targets,
            format: LogFormat::Plain,
        }
    }

    pub fn has_file_target(&self) -> bool {
        self.targets.iter().any(|t| matches!(t, LogTarget::File { .. }))
    }
}
