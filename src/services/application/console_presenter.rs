/// 控制台展示层
///
/// 从标准输入读取操作员指令转发给时序器，并按固定周期取出最新快照输出状态行。
/// 展示层只持有 `SequencerHandle` 和快照接收端，不直接接触时序器状态。

use std::time::Duration;

use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::interval;

use super::operator_control::{OperatorCommand, SequencerHandle};
use crate::models::enums::{ManualCommand, OperatingMode, SequencerState, TesterStatus};
use crate::models::structs::Snapshot;
use crate::services::infrastructure::snapshot_publisher::SnapshotReceiver;
use crate::utils::error::{AppError, AppResult};

/// 控制台可识别的一条输入
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleRequest {
    Command(OperatorCommand),
    Exit,
    Help,
}

pub const CONSOLE_HELP: &str = "\
指令:
  start | halt | exit
  mode production|service
  logon <用户名> <密码>
  sn <序列号> | lot <批次号>
  shuttle_up | shuttle_down | phase_on | phase_off | phase_forward | phase_reverse
  gate_on | gate_off | read_gate | read_phase | read_source";

/// 解析一行控制台输入，空行返回 None
pub fn parse_console_line(line: &str) -> AppResult<Option<ConsoleRequest>> {
    let mut parts = line.split_whitespace();
    let keyword = match parts.next() {
        Some(keyword) => keyword.to_lowercase(),
        None => return Ok(None),
    };
    let args: Vec<&str> = parts.collect();

    let request = match (keyword.as_str(), args.as_slice()) {
        ("start", []) => ConsoleRequest::Command(OperatorCommand::Start),
        ("halt", []) => ConsoleRequest::Command(OperatorCommand::Halt),
        ("exit" | "quit", []) => ConsoleRequest::Exit,
        ("help" | "?", []) => ConsoleRequest::Help,
        ("mode", [mode]) => {
            let mode: OperatingMode = mode.parse().map_err(AppError::validation_error)?;
            ConsoleRequest::Command(OperatorCommand::SetMode(mode))
        }
        ("logon", [username, password]) => ConsoleRequest::Command(OperatorCommand::Logon {
            username: username.to_string(),
            password: password.to_string(),
        }),
        ("sn", [serial]) => ConsoleRequest::Command(OperatorCommand::SubmitSerial(serial.to_string())),
        ("lot", [lot]) => ConsoleRequest::Command(OperatorCommand::SubmitLotCode(lot.to_string())),
        (other, []) => match other.parse::<ManualCommand>() {
            Ok(manual) => ConsoleRequest::Command(OperatorCommand::Manual(manual)),
            Err(_) => return Err(AppError::validation_error(format!("未知指令: {}", line.trim()))),
        },
        _ => return Err(AppError::validation_error(format!("指令参数不正确: {}", line.trim()))),
    };

    Ok(Some(request))
}

/// 把快照格式化为一行状态
pub fn format_snapshot(snapshot: &Snapshot) -> String {
    let codes: Vec<String> = snapshot.device_codes.iter().map(|c| c.to_string()).collect();
    let yield_text = match snapshot.statistics.yield_percent() {
        Some(percent) => format!("{:.1}%", percent),
        None => "-".to_string(),
    };

    let mut line = format!(
        "#{} {}→{} [{}] 测试台 {} 步骤 {} 板数 {} 良率 {} 故障码 [{}]",
        snapshot.sequence,
        snapshot.current_state,
        snapshot.next_state,
        snapshot.mode,
        snapshot.tester_status,
        snapshot.current_step.as_deref().unwrap_or("-"),
        snapshot.statistics.shuttles_tested,
        yield_text,
        codes.join(", ")
    );
    if let Some(reason) = &snapshot.fault_reason {
        line.push_str(&format!(" 故障 {}: {}", reason.kind, reason.message));
    }
    line
}

/// 控制台展示层
pub struct ConsolePresenter {
    handle: SequencerHandle,
    snapshots: SnapshotReceiver,
    refresh: Duration,
    last_key: Option<(SequencerState, SequencerState, TesterStatus, u64)>,
}

impl ConsolePresenter {
    pub fn new(handle: SequencerHandle, snapshots: SnapshotReceiver, refresh: Duration) -> Self {
        Self {
            handle,
            snapshots,
            refresh,
            last_key: None,
        }
    }

    /// 运行直到时序器退出
    pub async fn run(mut self) -> AppResult<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut ticker = interval(self.refresh);
        let exit_token = self.handle.exit_token();
        let mut stdin_open = true;

        info!("[Console] 输入 help 查看指令");

        loop {
            tokio::select! {
                _ = exit_token.cancelled() => {
                    info!("[Console] 时序器退出，停止控制台");
                    break;
                }
                line = lines.next_line(), if stdin_open => match line {
                    Ok(Some(line)) => self.handle_line(&line),
                    Ok(None) => {
                        info!("[Console] 标准输入已关闭，仅显示状态");
                        stdin_open = false;
                    }
                    Err(e) => {
                        warn!("[Console] 读取标准输入失败: {}", e);
                        stdin_open = false;
                    }
                },
                _ = ticker.tick() => self.render_latest(),
            }
        }

        self.render_latest();
        Ok(())
    }

    fn handle_line(&mut self, line: &str) {
        match parse_console_line(line) {
            Ok(Some(ConsoleRequest::Command(command))) => {
                debug!("[Console] 指令 {:?}", command);
                if let Err(e) = self.dispatch(command) {
                    warn!("[Console] {}", e);
                }
            }
            Ok(Some(ConsoleRequest::Exit)) => self.handle.exit(),
            Ok(Some(ConsoleRequest::Help)) => println!("{}", CONSOLE_HELP),
            Ok(None) => {}
            Err(e) => warn!("[Console] {}", e),
        }
    }

    fn dispatch(&self, command: OperatorCommand) -> AppResult<()> {
        match command {
            OperatorCommand::Start => self.handle.start(),
            OperatorCommand::Halt => self.handle.halt(),
            OperatorCommand::SetMode(mode) => self.handle.set_mode(mode),
            OperatorCommand::Logon { username, password } => self.handle.logon(username, password),
            OperatorCommand::SubmitSerial(serial) => self.handle.submit_serial(serial),
            OperatorCommand::SubmitLotCode(lot) => self.handle.submit_lot_code(lot),
            OperatorCommand::Manual(manual) => self.handle.manual(manual),
        }
    }

    /// 取出队列中最新的快照；状态有变化时以 info 输出
    fn render_latest(&mut self) {
        let Some(snapshot) = self.snapshots.drain_latest() else {
            return;
        };
        let key = (
            snapshot.current_state,
            snapshot.next_state,
            snapshot.tester_status,
            snapshot.statistics.shuttles_tested,
        );
        if self.last_key != Some(key) {
            info!("[Console] {}", format_snapshot(&snapshot));
            self.last_key = Some(key);
        } else {
            debug!("[Console] {}", format_snapshot(&snapshot));
        }
    }
}
