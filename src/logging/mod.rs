//! # 日志记录模块
//!
//! 测试台运行日志：状态转换、执行机构动作、逐位置判定轨迹与故障。
//! 启用文件输出时使用 `SimpleLogger`（控制台 + 追加文件），否则使用 `env_logger`。
//! 逐位置评价轨迹在 debug 级别输出。

pub mod logger_config;
pub mod simple_logger;

pub use logger_config::*;
pub use simple_logger::SimpleLogger;

use crate::utils::config::LoggingConfig;
use crate::utils::error::{AppError, AppResult};

/// 按应用配置初始化全局日志
pub fn init_logging(config: &LoggingConfig) -> AppResult<()> {
    let logger_config = LoggerConfig::from_logging_config(config);

    if logger_config.has_file_target() {
        SimpleLogger::new(logger_config).init()
    } else {
        env_logger::Builder::new()
            .filter_level(logger_config.level.into())
            .format_timestamp_millis()
            .try_init()
            .map_err(|e| AppError::configuration_error(format!("初始化日志失败: {}", e)))
    }
}

/// 便捷日志宏 - 记录核心问题日志
/// 只记录4类核心问题，避免日志冗余

/// 记录硬件通信失败日志
#[macro_export]
macro_rules! log_hardware_failure {
    ($msg:expr) => {
        log::error!("[硬件失败] {}", $msg)
    };
    ($msg:expr, $($arg:tt)*) => {
        log::error!("[硬件失败] {}", format!($msg, $($arg)*))
    };
}

/// 记录治具故障日志
#[macro_export]
macro_rules! log_fixture_fault {
    ($msg:expr) => {
        log::error!("[治具故障] {}", $msg)
    };
    ($msg:expr, $($arg:tt)*) => {
        log::error!("[治具故障] {}", format!($msg, $($arg)*))
    };
}

/// 记录操作员操作日志
#[macro_export]
macro_rules! log_operator_action {
    ($msg:expr) => {
        log::info!("[操作员] {}", $msg)
    };
    ($msg:expr, $($arg:tt)*) => {
        log::info!("[操作员] {}", format!($msg, $($arg)*))
    };
}

/// 记录配置警告
#[macro_export]
macro_rules! log_config_warning {
    ($msg:expr) => {
        log::warn!("[配置警告] {}", $msg)
    };
    ($msg:expr, $($arg:tt)*) => {
        log::warn!("[配置警告] {}", format!($msg, $($arg)*))
    };
}

// 重新导出宏
pub use log_config_warning;
pub use log_fixture_fault;
pub use log_hardware_failure;
pub use log_operator_action;
