/// 操作员控制接口
///
/// 展示层通过 `SequencerHandle` 向时序器发送指令。指令经无界队列传递，
/// 时序器在每轮循环开头和每次状态调度时取出；退出信号单独使用取消令牌。

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::models::enums::{ManualCommand, OperatingMode};
use crate::utils::error::{AppError, AppResult};

/// 发给时序器的操作员指令
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    Start,
    Halt,
    SetMode(OperatingMode),
    Logon { username: String, password: String },
    SubmitSerial(String),
    SubmitLotCode(String),
    Manual(ManualCommand),
}

/// 时序器控制句柄，可克隆
#[derive(Debug, Clone)]
pub struct SequencerHandle {
    commands: mpsc::UnboundedSender<OperatorCommand>,
    exit_token: CancellationToken,
}

impl SequencerHandle {
    pub(crate) fn new(commands: mpsc::UnboundedSender<OperatorCommand>, exit_token: CancellationToken) -> Self {
        Self { commands, exit_token }
    }

    fn send(&self, command: OperatorCommand) -> AppResult<()> {
        self.commands
            .send(command)
            .map_err(|e| AppError::concurrency_error(format!("时序器已停止，指令未送达: {:?}", e.0)))
    }

    pub fn start(&self) -> AppResult<()> {
        self.send(OperatorCommand::Start)
    }

    pub fn halt(&self) -> AppResult<()> {
        self.send(OperatorCommand::Halt)
    }

    /// 请求退出，时序器在下一次检查点响应
    pub fn exit(&self) {
        self.exit_token.cancel();
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_token.is_cancelled()
    }

    pub fn set_mode(&self, mode: OperatingMode) -> AppResult<()> {
        self.send(OperatorCommand::SetMode(mode))
    }

    pub fn logon(&self, username: impl Into<String>, password: impl Into<String>) -> AppResult<()> {
        self.send(OperatorCommand::Logon {
            username: username.into(),
            password: password.into(),
        })
    }

    pub fn submit_serial(&self, serial_number: impl Into<String>) -> AppResult<()> {
        self.send(OperatorCommand::SubmitSerial(serial_number.into()))
    }

    pub fn submit_lot_code(&self, lot_code: impl Into<String>) -> AppResult<()> {
        self.send(OperatorCommand::SubmitLotCode(lot_code.into()))
    }

    pub fn manual(&self, command: ManualCommand) -> AppResult<()> {
        self.send(OperatorCommand::Manual(command))
    }

    /// 退出令牌，可用于等待时序器退出
    pub fn exit_token(&self) -> CancellationToken {
        self.exit_token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_are_queued_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = SequencerHandle::new(tx, CancellationToken::new());

        handle.start().unwrap();
        handle.submit_serial("SN0001").unwrap();
        handle.manual(ManualCommand::GateOn).unwrap();

        assert_eq!(rx.try_recv().unwrap(), OperatorCommand::Start);
        assert_eq!(rx.try_recv().unwrap(), OperatorCommand::SubmitSerial("SN0001".to_string()));
        assert_eq!(rx.try_recv().unwrap(), OperatorCommand::Manual(ManualCommand::GateOn));
    }

    #[test]
    fn test_send_after_sequencer_stopped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = SequencerHandle::new(tx, CancellationToken::new());
        drop(rx);
        let err = handle.halt().unwrap_err();
        assert_eq!(err.error_code(), "CONCURRENCY_ERROR");
    }

    #[test]
    fn test_exit_is_shared_between_clones() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let handle = SequencerHandle::new(tx, CancellationToken::new());
        let other = handle.clone();
        other.exit();
        assert!(handle.exit_requested());
    }
}
