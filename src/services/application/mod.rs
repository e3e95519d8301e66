/// 应用层服务模块
///
/// 面向操作员的接口：登录校验、指令句柄与控制台展示

/// 登录服务 - 校验用户凭据并给出权限等级
pub mod logon_service;

/// 操作员控制 - 向时序器发送指令的句柄
pub mod operator_control;

/// 控制台展示层
pub mod console_presenter;

// 重新导出主要的服务
pub use logon_service::{ConfigCredentialStore, CredentialVerifier};
pub use operator_control::{OperatorCommand, SequencerHandle};
pub use console_presenter::{format_snapshot, parse_console_line, ConsolePresenter, ConsoleRequest};
