use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 应用程序统一错误类型
/// 测试台所有层（硬件、配置、时序、日志）共用的错误封装
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum AppError {
    /// 通用错误，包含错误消息
    #[error("通用错误: {message}")]
    Generic { message: String },

    /// 输入/输出错误
    #[error("IO错误: {message} (Kind: {kind})")]
    IoError { message: String, kind: String },

    /// 硬件I/O错误
    ///
    /// **业务含义**: 与数字/模拟量采集模块通信失败
    /// - 模块无法打开或已断开
    /// - 端口写入、传感器读取失败
    /// - 通道组返回的数据个数不对或含非有限值
    ///
    /// **处理方式**: 不做自动重试，立即将测试台状态置为ERROR，等待操作员复位
    #[error("硬件I/O错误: {message}")]
    HardwareIoError { message: String },

    /// 执行机构超时（穿梭气缸未在规定节拍内到位）
    #[error("执行机构超时: {actuator} - 等待 {waited_ms}ms 未到位")]
    ActuatorTimeout { actuator: String, waited_ms: u64 },

    /// 治具自检失败，测量值超出治具自检限值
    #[error("治具故障: 步骤 {step} {quantity} 位置 {position} 测量值 {value:.3}V 超出 [{lower_bound}, {upper_bound}]")]
    FixtureFault {
        step: String,
        quantity: String,
        position: usize,
        value: f64,
        lower_bound: f64,
        upper_bound: f64,
    },

    /// 配置相关错误
    #[error("配置错误: {message}")]
    ConfigurationError { message: String },

    /// 验证错误（数据验证失败）
    #[error("验证错误: {message}")]
    ValidationError { message: String },

    /// 并发/异步操作错误（通道关闭等）
    #[error("并发错误: {message}")]
    ConcurrencyError { message: String },

    /// 权限不足错误（非维护模式下的手动指令）
    #[error("权限不足: {message}")]
    PermissionError { message: String },

    /// 状态转换错误
    #[error("状态转换错误: 从 {from_state} 到 {to_state} - {message}")]
    StateTransitionError {
        from_state: String,
        to_state: String,
        message: String,
    },

    /// JSON序列化/反序列化错误
    #[error("JSON序列化/反序列化错误: {message}")]
    JsonError { message: String },

    /// 用户认证错误
    #[error("用户认证错误: {message}")]
    AuthenticationError { message: String },
}

impl AppError {
    /// 创建通用错误
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// 创建IO错误
    pub fn io_error(message: impl Into<String>, kind_str: impl Into<String>) -> Self {
        Self::IoError {
            message: message.into(),
            kind: kind_str.into(),
        }
    }

    /// 创建硬件I/O错误
    ///
    /// **使用示例**:
    /// ```rust
    /// use inline_tester::error::AppError;
    /// let err = AppError::hardware_io_error("读取通道组 Gate 失败");
    /// assert_eq!(err.error_code(), "HARDWARE_IO_ERROR");
    /// ```
    pub fn hardware_io_error(message: impl Into<String>) -> Self {
        Self::HardwareIoError {
            message: message.into(),
        }
    }

    /// 创建执行机构超时错误
    pub fn actuator_timeout(actuator: impl Into<String>, waited_ms: u64) -> Self {
        Self::ActuatorTimeout {
            actuator: actuator.into(),
            waited_ms,
        }
    }

    /// 创建治具故障错误
    pub fn fixture_fault(
        step: impl Into<String>,
        quantity: impl Into<String>,
        position: usize,
        value: f64,
        lower_bound: f64,
        upper_bound: f64,
    ) -> Self {
        Self::FixtureFault {
            step: step.into(),
            quantity: quantity.into(),
            position,
            value,
            lower_bound,
            upper_bound,
        }
    }

    /// 创建配置错误
    pub fn configuration_error(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }

    /// 创建验证错误
    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }

    /// 创建并发错误
    pub fn concurrency_error(message: impl Into<String>) -> Self {
        Self::ConcurrencyError {
            message: message.into(),
        }
    }

    /// 创建权限错误
    pub fn permission_error(message: impl Into<String>) -> Self {
        Self::PermissionError {
            message: message.into(),
        }
    }

    /// 创建状态转换错误
    pub fn state_transition_error(
        from_state: impl Into<String>,
        to_state: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::StateTransitionError {
            from_state: from_state.into(),
            to_state: to_state.into(),
            message: message.into(),
        }
    }

    /// 创建JSON序列化错误
    pub fn json_error(message: impl Into<String>) -> Self {
        Self::JsonError {
            message: message.into(),
        }
    }

    /// 创建用户认证错误
    pub fn authentication_error(message: impl Into<String>) -> Self {
        Self::AuthenticationError {
            message: message.into(),
        }
    }

    /// 获取错误的简短描述
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::Generic { .. } => "GENERIC",
            AppError::IoError { .. } => "IO_ERROR",
            AppError::HardwareIoError { .. } => "HARDWARE_IO_ERROR",
            AppError::ActuatorTimeout { .. } => "ACTUATOR_TIMEOUT",
            AppError::FixtureFault { .. } => "FIXTURE_FAULT",
            AppError::ConfigurationError { .. } => "CONFIGURATION_ERROR",
            AppError::ValidationError { .. } => "VALIDATION_ERROR",
            AppError::ConcurrencyError { .. } => "CONCURRENCY_ERROR",
            AppError::PermissionError { .. } => "PERMISSION_ERROR",
            AppError::StateTransitionError { .. } => "STATE_TRANSITION_ERROR",
            AppError::JsonError { .. } => "JSON_ERROR",
            AppError::AuthenticationError { .. } => "AUTHENTICATION_ERROR",
        }
    }
}

/// 标准 I/O 错误到 AppError 的转换
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::IoError { message: err.to_string(), kind: format!("{:?}", err.kind()) }
    }
}

/// serde_json 错误到 AppError 的转换
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::JsonError { message: err.to_string() }
    }
}

/// config 库错误到 AppError 的转换
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigurationError { message: err.to_string() }
    }
}

/// bcrypt 校验错误到 AppError 的转换
impl From<bcrypt::BcryptError> for AppError {
    fn from(err: bcrypt::BcryptError) -> Self {
        AppError::AuthenticationError { message: format!("密码哈希校验失败: {}", err) }
    }
}

/// 字符串错误到 AppError 的转换（通用错误）
impl From<String> for AppError {
    fn from(err_msg: String) -> Self {
        Self::Generic { message: err_msg }
    }
}

/// &str 错误到 AppError 的转换（通用错误）
impl From<&str> for AppError {
    fn from(err_msg: &str) -> Self {
        Self::Generic { message: err_msg.to_string() }
    }
}

/// 应用程序结果类型别名
pub type AppResult<T> = Result<T, AppError>;
