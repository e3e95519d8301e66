/// 测试时序器
///
/// 单任务状态机，驱动治具完成登录、初始化自检、等待穿梭板、七步测试、故障分类的循环。
/// 所有状态转换只在 `schedule` 中发生：先发布快照，再推进 Prev/This/Next 指针，
/// 然后施加退出与测试台ERROR覆盖，最后记录日志。
///
/// 硬件调用只阻塞时序器本身；任何硬件失败、治具自检越限、重复故障都会把测试台置为ERROR，
/// 下一次调度即进入 HALT，必须由操作员重新启动。

use std::time::{Duration, Instant};

use log::{debug, error, info, trace, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::evaluation_engine;
use super::fault_classifier;
use super::history_tracker::HistoryTracker;
use super::state_transition::{self, TransitionCause, TransitionContext};
use super::step_outcome_ledger::StepOutcomeLedger;
use super::test_protocol::{ProtocolStep, StepAction, TestProtocol, SAFE_BASELINE, STANDARD_PROTOCOL};
use crate::models::enums::{
    AccessLevel, ChannelGroup, DeviceFaultCode, FaultKind, Level, ManualCommand, OperatingMode, Port,
    SequencerState, TesterStatus, DEVICES_PER_SHUTTLE,
};
use crate::models::structs::{FaultReason, MeasurementSet, RunStatistics, ShuttleRecord, Snapshot};
use crate::services::application::logon_service::CredentialVerifier;
use crate::services::application::operator_control::{OperatorCommand, SequencerHandle};
use crate::services::infrastructure::hardware::{validate_channel_values, HardwareInterface};
use crate::services::infrastructure::result_log::ResultLog;
use crate::services::infrastructure::snapshot_publisher::SnapshotPublisher;
use crate::utils::config::{AppConfig, TestConfig};
use crate::utils::error::{AppError, AppResult};
use crate::utils::time_utils;
use crate::{log_fixture_fault, log_hardware_failure, log_operator_action};

/// 时序器依赖的外部服务
pub struct SequencerServices {
    pub hardware: Box<dyn HardwareInterface>,
    pub credentials: Box<dyn CredentialVerifier>,
    pub result_log: Box<dyn ResultLog>,
}

pub struct TestSequencer {
    config: TestConfig,
    valve_tick: Duration,
    valve_max_ticks: u32,
    debug_mode: bool,
    protocol: &'static TestProtocol,

    hardware: Box<dyn HardwareInterface>,
    hardware_open: bool,
    credentials: Box<dyn CredentialVerifier>,
    result_log: Box<dyn ResultLog>,
    publisher: SnapshotPublisher,
    commands: mpsc::UnboundedReceiver<OperatorCommand>,
    exit_token: CancellationToken,
    session_id: Uuid,
    snapshot_sequence: u64,

    previous_state: SequencerState,
    current_state: SequencerState,
    next_state: SequencerState,
    start_requested: bool,
    mode: OperatingMode,
    access_level: AccessLevel,
    operator: Option<String>,
    pending_logon: Option<(String, String)>,
    tester_status: TesterStatus,
    fault_reason: Option<FaultReason>,

    measurements: MeasurementSet,
    ledger: StepOutcomeLedger,
    device_codes: Vec<DeviceFaultCode>,
    history: HistoryTracker,
    statistics: RunStatistics,
    current_step: Option<String>,

    lot_code: Option<String>,
    serial_number: Option<String>,
    present_count: u32,
    shuttle_number: u64,
    evaluated_shuttle: Option<u64>,
    test_elapsed: Duration,
}

impl TestSequencer {
    /// 创建时序器及其控制句柄
    pub fn new(
        config: &AppConfig,
        services: SequencerServices,
        publisher: SnapshotPublisher,
    ) -> (Self, SequencerHandle) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let exit_token = CancellationToken::new();
        let handle = SequencerHandle::new(command_tx, exit_token.clone());
        let session_id = Uuid::new_v4();

        info!("[Sequencer] 🚀 创建时序器，会话 {}", session_id);

        let sequencer = Self {
            config: config.test_config.clone(),
            valve_tick: Duration::from_millis(config.fixture_config.shuttle_tick_ms),
            valve_max_ticks: config.fixture_config.shuttle_max_ticks,
            debug_mode: config.app_settings.debug_mode,
            protocol: &STANDARD_PROTOCOL,
            hardware: services.hardware,
            hardware_open: false,
            credentials: services.credentials,
            result_log: services.result_log,
            publisher,
            commands: command_rx,
            exit_token,
            session_id,
            snapshot_sequence: 0,
            previous_state: SequencerState::Entry,
            current_state: SequencerState::Entry,
            next_state: SequencerState::Entry,
            start_requested: false,
            mode: OperatingMode::Production,
            access_level: AccessLevel::Production,
            operator: None,
            pending_logon: None,
            tester_status: TesterStatus::NoResult,
            fault_reason: None,
            measurements: MeasurementSet::default(),
            ledger: StepOutcomeLedger::new(),
            device_codes: vec![DeviceFaultCode::NoResult; DEVICES_PER_SHUTTLE],
            history: HistoryTracker::new(config.test_config.history_depth),
            statistics: RunStatistics::default(),
            current_step: None,
            lot_code: None,
            serial_number: None,
            present_count: 0,
            shuttle_number: 0,
            evaluated_shuttle: None,
            test_elapsed: Duration::ZERO,
        };

        (sequencer, handle)
    }

    // ==================== 只读访问 ====================

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn previous_state(&self) -> SequencerState {
        self.previous_state
    }

    pub fn current_state(&self) -> SequencerState {
        self.current_state
    }

    /// 下一轮循环要执行的状态
    pub fn next_state(&self) -> SequencerState {
        self.next_state
    }

    pub fn tester_status(&self) -> TesterStatus {
        self.tester_status
    }

    pub fn fault_reason(&self) -> Option<&FaultReason> {
        self.fault_reason.as_ref()
    }

    pub fn mode(&self) -> OperatingMode {
        self.mode
    }

    pub fn access_level(&self) -> AccessLevel {
        self.access_level
    }

    pub fn statistics(&self) -> &RunStatistics {
        &self.statistics
    }

    pub fn device_codes(&self) -> &[DeviceFaultCode] {
        &self.device_codes
    }

    pub fn history(&self) -> &HistoryTracker {
        &self.history
    }

    pub fn measurements(&self) -> &MeasurementSet {
        &self.measurements
    }

    pub fn lot_code(&self) -> Option<&str> {
        self.lot_code.as_deref()
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.serial_number.as_deref()
    }

    pub fn shuttle_number(&self) -> u64 {
        self.shuttle_number
    }

    pub fn publisher(&self) -> &SnapshotPublisher {
        &self.publisher
    }

    // ==================== 主循环 ====================

    /// 运行直到退出，返回本次会话的统计
    pub async fn run(mut self) -> AppResult<RunStatistics> {
        while self.run_cycle().await {}
        info!(
            "[Sequencer] 会话 {} 结束：共 {} 块穿梭板，{} 个器件",
            self.session_id, self.statistics.shuttles_tested, self.statistics.total_tested
        );
        Ok(self.statistics)
    }

    /// 执行一轮循环，退出后返回 false
    pub async fn run_cycle(&mut self) -> bool {
        pause(self.config.cycle_delay_ms).await;
        self.process_commands().await;

        if self.exit_token.is_cancelled() && self.next_state != SequencerState::Exit {
            self.schedule(SequencerState::Exit).await;
        }

        match self.next_state {
            SequencerState::Entry => self.schedule(SequencerState::Logon).await,
            SequencerState::Logon => self.handle_logon().await,
            SequencerState::Halt => self.handle_halt().await,
            SequencerState::Init => self.handle_init().await,
            SequencerState::GetLot => self.handle_get_lot().await,
            SequencerState::Idle => self.handle_idle().await,
            SequencerState::GetSn => self.handle_get_sn().await,
            SequencerState::Testing => self.handle_testing().await,
            SequencerState::Evaluate => self.handle_evaluate().await,
            SequencerState::Exit => {
                self.handle_exit().await;
                return false;
            }
        }
        true
    }

    /// 状态调度，唯一发生状态转换的地方
    async fn schedule(&mut self, requested: SequencerState) {
        self.process_commands().await;
        self.publish_snapshot();

        let ctx = TransitionContext {
            exit_requested: self.exit_token.is_cancelled(),
            start_requested: self.start_requested,
            tester_status: self.tester_status,
        };
        let transition = state_transition::resolve(self.next_state, requested, ctx);

        self.previous_state = self.current_state;
        self.current_state = self.next_state;
        self.next_state = transition.next;

        match transition.cause {
            TransitionCause::Requested => {
                if self.current_state != self.next_state {
                    info!("[Sequencer] {} → {}", self.current_state, self.next_state);
                } else {
                    trace!("[Sequencer] {} → {}", self.current_state, self.next_state);
                }
            }
            TransitionCause::ExitSignal => {
                info!("[Sequencer] 收到退出信号，{} → EXIT", self.current_state);
            }
            TransitionCause::TesterError => {
                self.tester_status = TesterStatus::NoResult;
                self.start_requested = false;
                error!(
                    "[Sequencer] 测试台ERROR，{} 请求 {} 被改为 HALT，需操作员重新启动",
                    self.current_state, requested
                );
            }
            TransitionCause::OperatorHalt => {
                info!("[Sequencer] 未启动，{} 请求 {} 改为 HALT", self.current_state, requested);
            }
            TransitionCause::InvalidEdge => {
                let err = AppError::state_transition_error(
                    self.current_state.to_string(),
                    requested.to_string(),
                    "转换表中不存在该边",
                );
                error!("[Sequencer] {}", err);
            }
        }
    }

    // ==================== 操作员指令 ====================

    async fn process_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            self.apply_command(command).await;
        }
    }

    async fn apply_command(&mut self, command: OperatorCommand) {
        match command {
            OperatorCommand::Start => {
                log_operator_action!("启动");
                self.start_requested = true;
            }
            OperatorCommand::Halt => {
                log_operator_action!("停机");
                self.start_requested = false;
            }
            OperatorCommand::SetMode(mode) => {
                if self.access_level.permits(mode) {
                    log_operator_action!("切换到 {} 模式", mode);
                    self.mode = mode;
                } else {
                    warn!(
                        "[Sequencer] 权限 {} 不允许进入 {} 模式，保持 {}",
                        self.access_level, mode, self.mode
                    );
                }
            }
            OperatorCommand::Logon { username, password } => {
                self.pending_logon = Some((username, password));
            }
            OperatorCommand::SubmitSerial(serial) => {
                let serial = serial.trim().to_string();
                if serial.is_empty() {
                    warn!("[Sequencer] 序列号为空，忽略");
                } else if !self.accepts_serial() {
                    warn!(
                        "[Sequencer] {} 中不接受序列号 {}，请在等待扫码时输入",
                        self.next_state, serial
                    );
                } else {
                    log_operator_action!("序列号 {}", serial);
                    self.serial_number = Some(serial);
                }
            }
            OperatorCommand::SubmitLotCode(lot) => {
                let lot = lot.trim().to_string();
                if lot.is_empty() {
                    warn!("[Sequencer] 批次号为空，忽略");
                } else if !self.accepts_lot_code() {
                    warn!("[Sequencer] {} 中不接受批次号 {}，请停机后输入", self.next_state, lot);
                } else {
                    log_operator_action!("批次号 {}", lot);
                    self.lot_code = Some(lot);
                }
            }
            OperatorCommand::Manual(manual) => {
                if let Err(e) = self.execute_manual(manual).await {
                    warn!("[Sequencer] 手动指令 {:?} 未执行: {}", manual, e);
                }
            }
        }
    }

    /// 序列号只在等待扫码，或 IDLE 中尚无序列号时接受，避免写入正在测试的穿梭板记录
    fn accepts_serial(&self) -> bool {
        match self.next_state {
            SequencerState::GetSn => true,
            SequencerState::Idle => self.serial_number.is_none(),
            _ => false,
        }
    }

    /// 批次号只在没有穿梭板在测时接受
    fn accepts_lot_code(&self) -> bool {
        matches!(
            self.next_state,
            SequencerState::Logon | SequencerState::Halt | SequencerState::Init | SequencerState::GetLot
        )
    }

    /// 执行维护模式手动指令
    ///
    /// 非维护模式一律拒绝；硬件失败与自动测试一样置测试台ERROR。
    pub async fn execute_manual(&mut self, command: ManualCommand) -> AppResult<()> {
        if self.mode != OperatingMode::Service {
            return Err(AppError::permission_error(format!(
                "{:?} 仅允许在维护模式下执行，当前为 {}",
                command, self.mode
            )));
        }
        if !self.hardware_open {
            return Err(AppError::validation_error("硬件尚未初始化，请先启动完成 INIT"));
        }

        let result = match command {
            ManualCommand::ShuttleUp => self.actuate(Port::ShuttleValve, Level::Set).await,
            ManualCommand::ShuttleDown => self.actuate(Port::ShuttleValve, Level::Clear).await,
            ManualCommand::PhaseOn => self.actuate(Port::PhaseOn, Level::Set).await,
            ManualCommand::PhaseOff => self.actuate(Port::PhaseOn, Level::Clear).await,
            ManualCommand::PhaseForward => self.actuate(Port::PhaseReverseOff, Level::Set).await,
            ManualCommand::PhaseReverse => self.actuate(Port::PhaseReverseOff, Level::Clear).await,
            ManualCommand::GateOn => self.actuate(Port::GateOn, Level::Set).await,
            ManualCommand::GateOff => self.actuate(Port::GateOn, Level::Clear).await,
            ManualCommand::ReadGate => self.acquire(ChannelGroup::Gate).await.map(|_| ()),
            ManualCommand::ReadPhase => self.acquire(ChannelGroup::Phase).await.map(|_| ()),
            ManualCommand::ReadSource => self.acquire(ChannelGroup::Source).await.map(|_| ()),
        };

        match result {
            Ok(()) => {
                log_operator_action!("手动指令 {:?}", command);
                self.publish_snapshot();
                Ok(())
            }
            Err(e) => {
                self.escalate(&e);
                Err(e)
            }
        }
    }

    // ==================== 各状态处理 ====================

    async fn handle_logon(&mut self) {
        if self.credentials.logon_skipped() {
            self.access_level = AccessLevel::Production;
            self.mode = OperatingMode::Production;
            info!("[Sequencer] 跳过登录，以生产权限运行");
            self.schedule(SequencerState::Halt).await;
            return;
        }

        match self.pending_logon.take() {
            Some((username, password)) => match self.credentials.verify(&username, &password) {
                Ok(level) => {
                    log_operator_action!("用户 {} 登录，权限 {}", username, level);
                    self.access_level = level;
                    if !level.permits(self.mode) {
                        self.mode = OperatingMode::Production;
                    }
                    self.operator = Some(username);
                    self.schedule(SequencerState::Halt).await;
                }
                Err(e) => {
                    warn!("[Sequencer] 登录失败: {}", e);
                    self.schedule(SequencerState::Logon).await;
                }
            },
            None => {
                pause(self.config.halt_poll_ms).await;
                self.schedule(SequencerState::Logon).await;
            }
        }
    }

    async fn handle_halt(&mut self) {
        if self.start_requested {
            self.schedule(SequencerState::Init).await;
        } else {
            pause(self.config.halt_poll_ms).await;
            self.schedule(SequencerState::Halt).await;
        }
    }

    async fn handle_init(&mut self) {
        // 本轮开头（指令处理中）已置ERROR：保留原因，经 HALT 等待操作员
        if self.tester_status == TesterStatus::Error {
            warn!("[Sequencer] 测试台ERROR，跳过初始化");
            self.schedule(SequencerState::Idle).await;
            return;
        }

        self.fault_reason = None;
        self.current_step = None;
        if self.access_level == AccessLevel::Production {
            self.mode = OperatingMode::Production;
        }

        if self.config.require_lot_code && self.lot_code.is_none() {
            info!("[Sequencer] 等待输入批次号");
            self.schedule(SequencerState::GetLot).await;
            return;
        }

        match self.prepare_fixture().await {
            Ok(()) => {
                self.present_count = 0;
                info!("[Sequencer] ✅ 初始化与治具自检完成");
            }
            Err(e) => self.escalate(&e),
        }
        self.schedule(SequencerState::Idle).await;
    }

    async fn handle_get_lot(&mut self) {
        if self.lot_code.is_some() {
            self.schedule(SequencerState::Init).await;
        } else {
            pause(self.config.idle_poll_ms).await;
            self.schedule(SequencerState::GetLot).await;
        }
    }

    async fn handle_idle(&mut self) {
        if self.config.require_serial_number && self.serial_number.is_none() {
            info!("[Sequencer] 等待扫描序列号");
            self.schedule(SequencerState::GetSn).await;
            return;
        }

        match self.hardware.read_port(Port::ShuttleAvailable).await {
            Err(e) => {
                self.escalate(&e);
                self.schedule(SequencerState::Idle).await;
            }
            Ok(level) if level.is_active_low_asserted() => {
                self.present_count += 1;
                if self.present_count < self.config.present_debounce_polls {
                    pause(self.config.present_poll_ms).await;
                    self.schedule(SequencerState::Idle).await;
                    return;
                }

                self.present_count = 0;
                match self.actuate(Port::StopperValve, Level::Set).await {
                    Ok(()) => {
                        info!("[Sequencer] 穿梭板到位，挡停升起");
                        self.schedule(SequencerState::Testing).await;
                    }
                    Err(e) => {
                        self.escalate(&e);
                        self.schedule(SequencerState::Idle).await;
                    }
                }
            }
            Ok(_) => {
                self.present_count = 0;
                pause(self.config.idle_poll_ms).await;
                self.schedule(SequencerState::Idle).await;
            }
        }
    }

    async fn handle_get_sn(&mut self) {
        if self.serial_number.is_some() {
            self.schedule(SequencerState::Idle).await;
        } else {
            pause(self.config.idle_poll_ms).await;
            self.schedule(SequencerState::GetSn).await;
        }
    }

    async fn handle_testing(&mut self) {
        self.begin_shuttle();
        let started = Instant::now();
        info!("[Sequencer] 🚀 开始测试穿梭板 #{}", self.shuttle_number);

        let mut result = self.run_shuttle_steps().await;
        if result.is_ok() {
            result = self.release_shuttle().await;
        }
        self.test_elapsed = started.elapsed();
        self.current_step = None;

        match result {
            Ok(()) => info!(
                "[Sequencer] 穿梭板 #{} 测试完成，用时 {:.2}s",
                self.shuttle_number,
                time_utils::elapsed_secs(self.test_elapsed)
            ),
            Err(e) => {
                self.escalate(&e);
                self.recover_safe_baseline().await;
            }
        }
        self.schedule(SequencerState::Evaluate).await;
    }

    async fn handle_evaluate(&mut self) {
        let codes = self.evaluate_shuttle();

        if let Err(e) = self.append_result(&codes).await {
            error!("[Sequencer] 写入结果记录失败: {}", e);
            self.raise_fault(FaultReason::new(FaultKind::ResultLog, e.to_string()));
        }

        // 序列号只属于这一块板
        self.serial_number = None;
        self.schedule(SequencerState::Idle).await;
    }

    async fn handle_exit(&mut self) {
        info!("[Sequencer] 退出：驱动安全状态并释放硬件");
        if self.hardware_open {
            self.recover_safe_baseline().await;
            if let Err(e) = self.hardware.shutdown().await {
                log_hardware_failure!("释放硬件失败: {}", e);
            }
            self.hardware_open = false;
        }
        self.previous_state = self.current_state;
        self.current_state = SequencerState::Exit;
        self.publish_snapshot();
        self.exit_token.cancel();
    }

    // ==================== 穿梭板测试 ====================

    fn begin_shuttle(&mut self) {
        self.ledger.clear();
        self.device_codes = vec![DeviceFaultCode::NoResult; DEVICES_PER_SHUTTLE];
        self.shuttle_number += 1;
        self.test_elapsed = Duration::ZERO;
    }

    async fn run_shuttle_steps(&mut self) -> AppResult<()> {
        let protocol = self.protocol;
        let settle = self.config.settling_time();
        for step in &protocol.shuttle_steps {
            self.run_step(step, settle).await?;
        }
        Ok(())
    }

    async fn release_shuttle(&mut self) -> AppResult<()> {
        let protocol = self.protocol;
        self.perform_actions(&protocol.release, self.config.settling_time()).await?;
        pause(self.config.shuttle_transit_time_ms).await;
        Ok(())
    }

    /// 打开硬件、驱动安全基线并执行 INIT 自检
    async fn prepare_fixture(&mut self) -> AppResult<()> {
        if !self.hardware_open {
            self.hardware.initialize().await?;
            self.hardware_open = true;
            info!("[Sequencer] 硬件 {} 已打开", self.hardware.service_name());
        }
        if self.tester_status != TesterStatus::Error {
            self.tester_status = TesterStatus::Passed;
        }

        for (port, level) in SAFE_BASELINE {
            self.actuate(port, level).await?;
        }

        let protocol = self.protocol;
        let settle = self.config.init_settling_time();
        for step in &protocol.self_test {
            self.run_step(step, settle).await?;
        }
        self.current_step = None;
        Ok(())
    }

    /// 执行一个协议步骤：前置动作、三组采集与判定、后置动作
    async fn run_step(&mut self, step: &ProtocolStep, settle: Duration) -> AppResult<()> {
        self.current_step = Some(step.name.to_string());
        debug!("[Sequencer] 步骤 {} 开始", step.name);

        self.perform_actions(&step.before, settle).await?;

        for group in ChannelGroup::ALL {
            let values = self.acquire(group).await?;
            let limit = step.limit(group);
            let outcomes = evaluation_engine::evaluate(&values, limit);

            for (position, (value, outcome)) in values.iter().zip(outcomes.iter()).enumerate() {
                debug!(
                    "[Eval] {} {} 位置{} {:.4}V [{}, {}] → {}",
                    step.name, group, position, value, limit.lower_bound, limit.upper_bound, outcome
                );
            }

            if let Some((position, value)) = evaluation_engine::first_fixture_fault(&values, &outcomes) {
                return Err(AppError::fixture_fault(
                    step.name,
                    group.to_string(),
                    position,
                    value,
                    limit.lower_bound,
                    limit.upper_bound,
                ));
            }

            if let Some(diagnostic) = step.diagnostic {
                if step.retains(group) {
                    self.ledger.record(diagnostic, group, &outcomes);
                }
            }

            if self.mode == OperatingMode::Service {
                self.publish_snapshot();
            }
        }

        self.perform_actions(&step.after, settle).await
    }

    async fn perform_actions(&mut self, actions: &[StepAction], settle: Duration) -> AppResult<()> {
        for action in actions {
            match *action {
                StepAction::Set(port, level) => self.actuate(port, level).await?,
                StepAction::Settle(multiple) => {
                    let wait = settle * multiple;
                    if !wait.is_zero() {
                        tokio::time::sleep(wait).await;
                    }
                }
            }
        }
        Ok(())
    }

    /// 写端口；穿梭气缸需等待对应位置传感器到位
    async fn actuate(&mut self, port: Port, level: Level) -> AppResult<()> {
        self.hardware.write_port(port, level).await?;
        trace!("[Sequencer] {} ← {}", port, level);
        if port == Port::ShuttleValve {
            self.wait_for_valve(level).await?;
        }
        Ok(())
    }

    async fn wait_for_valve(&mut self, level: Level) -> AppResult<()> {
        let sensor = match level {
            Level::Set => Port::ShuttleUpperPosition,
            Level::Clear => Port::ShuttleLowerPosition,
        };

        for _ in 0..self.valve_max_ticks {
            if self.hardware.read_port(sensor).await?.is_active_low_asserted() {
                return Ok(());
            }
            if !self.valve_tick.is_zero() {
                tokio::time::sleep(self.valve_tick).await;
            }
        }

        let waited_ms = self.valve_tick.as_millis() as u64 * u64::from(self.valve_max_ticks);
        Err(AppError::actuator_timeout(sensor.to_string(), waited_ms))
    }

    /// 采集并校验一组通道
    async fn acquire(&mut self, group: ChannelGroup) -> AppResult<Vec<f64>> {
        let values = self.hardware.read_channel_group(group).await?;
        validate_channel_values(group, &values)?;
        self.measurements.set(group, values.clone());
        Ok(values)
    }

    /// 尽力把所有执行机构置回安全状态，不等待气缸到位
    async fn recover_safe_baseline(&mut self) {
        for (port, level) in SAFE_BASELINE {
            if let Err(e) = self.hardware.write_port(port, level).await {
                log_hardware_failure!("安全基线 {} ← {} 写入失败: {}", port, level, e);
            }
        }
    }

    // ==================== 评价 ====================

    /// 对当前穿梭板分类、更新统计与历史
    ///
    /// 对同一块穿梭板只生效一次，重复调用返回同样的故障码且不再修改统计和历史。
    pub fn evaluate_shuttle(&mut self) -> Vec<DeviceFaultCode> {
        if self.evaluated_shuttle == Some(self.shuttle_number) {
            debug!("[Sequencer] 穿梭板 #{} 已评价，跳过", self.shuttle_number);
            return self.device_codes.clone();
        }

        let codes = fault_classifier::classify_all(&self.ledger);
        self.statistics.record_shuttle(&codes);

        let depth = self.history.depth();
        for fault in self.history.record(self.shuttle_number, &codes) {
            log_fixture_fault!("位置 {} 连续 {} 次 {}，疑似治具问题", fault.position, depth, fault.code);
            self.raise_fault(FaultReason::repetition(fault.position, fault.code, depth));
        }

        if self.tester_status != TesterStatus::Error {
            self.tester_status = if codes.iter().all(|c| *c == DeviceFaultCode::Passed) {
                TesterStatus::Passed
            } else {
                TesterStatus::Failed
            };
        }

        for (position, code) in codes.iter().enumerate() {
            if *code == DeviceFaultCode::Passed {
                debug!("[Sequencer] 穿梭板 #{} 位置 {}: {}", self.shuttle_number, position, code);
            } else {
                info!("[Sequencer] 穿梭板 #{} 位置 {}: {}", self.shuttle_number, position, code);
            }
        }
        if self.debug_mode {
            info!("[Sequencer] 统计: {:?}", self.statistics);
        }

        self.device_codes = codes.clone();
        self.evaluated_shuttle = Some(self.shuttle_number);
        codes
    }

    async fn append_result(&mut self, codes: &[DeviceFaultCode]) -> AppResult<()> {
        let record = ShuttleRecord {
            session_id: self.session_id,
            shuttle_number: self.shuttle_number,
            timestamp: time_utils::now_local(),
            operator: self.operator.clone(),
            lot_code: self.lot_code.clone(),
            serial_number: self.serial_number.clone(),
            device_codes: codes.to_vec(),
            elapsed_secs: time_utils::elapsed_secs(self.test_elapsed),
        };
        self.result_log.append(&record).await
    }

    // ==================== 故障 ====================

    /// 把错误升级为测试台ERROR
    fn escalate(&mut self, err: &AppError) {
        let reason = FaultReason::from(err);
        match reason.kind {
            FaultKind::FixtureFault => {
                log_fixture_fault!("{}", err);
            }
            _ => {
                log_hardware_failure!("{}", err);
            }
        }
        self.raise_fault(reason);
    }

    /// 置ERROR并保留首个触发原因，直到下一次 INIT
    fn raise_fault(&mut self, reason: FaultReason) {
        self.tester_status = TesterStatus::Error;
        if self.fault_reason.is_none() {
            self.fault_reason = Some(reason);
        }
    }

    // ==================== 快照 ====================

    /// 当前状态的只读副本
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            session_id: self.session_id,
            sequence: self.snapshot_sequence,
            timestamp: time_utils::now_local(),
            measurements: self.measurements.clone(),
            device_codes: self.device_codes.clone(),
            history: self.history.snapshot(),
            tester_status: self.tester_status,
            fault_reason: self.fault_reason.clone(),
            statistics: self.statistics.clone(),
            previous_state: self.previous_state,
            current_state: self.current_state,
            next_state: self.next_state,
            mode: self.mode,
            current_step: self.current_step.clone(),
            lot_code: self.lot_code.clone(),
            serial_number: self.serial_number.clone(),
        }
    }

    fn publish_snapshot(&mut self) {
        self.snapshot_sequence += 1;
        let snapshot = self.snapshot();
        self.publisher.publish(snapshot);
    }
}

async fn pause(ms: u64) {
    if ms > 0 {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::application::logon_service::ConfigCredentialStore;
    use crate::services::infrastructure::hardware::SimulatedFixture;
    use crate::services::infrastructure::result_log::MemoryResultLog;
    use crate::services::infrastructure::snapshot_publisher::snapshot_channel;
    use crate::services::infrastructure::SnapshotReceiver;

    fn test_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.test_config = TestConfig::without_delays();
        config.fixture_config.shuttle_tick_ms = 0;
        config.fixture_config.shuttle_max_ticks = 3;
        config.logon_config.skip_logon = true;
        config
    }

    fn build(config: &AppConfig) -> (TestSequencer, SequencerHandle, SimulatedFixture, SnapshotReceiver) {
        let _ = env_logger::builder().is_test(true).try_init();
        let fixture = SimulatedFixture::new_for_testing();
        let (publisher, receiver) = snapshot_channel(64);
        let services = SequencerServices {
            hardware: Box::new(fixture.clone()),
            credentials: Box::new(ConfigCredentialStore::from_config(&config.logon_config)),
            result_log: Box::new(MemoryResultLog::new()),
        };
        let (sequencer, handle) = TestSequencer::new(config, services, publisher);
        (sequencer, handle, fixture, receiver)
    }

    /// 带一个维护权限用户（tech/pw）的时序器
    fn build_with_service_user(
        config: &AppConfig,
    ) -> (TestSequencer, SequencerHandle, SimulatedFixture, SnapshotReceiver) {
        let _ = env_logger::builder().is_test(true).try_init();
        let fixture = SimulatedFixture::new_for_testing();
        let (publisher, receiver) = snapshot_channel(64);
        let mut store = ConfigCredentialStore::default();
        store.add_user("tech", "pw", AccessLevel::Service, 4).unwrap();
        let services = SequencerServices {
            hardware: Box::new(fixture.clone()),
            credentials: Box::new(store),
            result_log: Box::new(MemoryResultLog::new()),
        };
        let (sequencer, handle) = TestSequencer::new(config, services, publisher);
        (sequencer, handle, fixture, receiver)
    }

    async fn cycle_until(sequencer: &mut TestSequencer, target: SequencerState, max_cycles: usize) {
        for _ in 0..max_cycles {
            if sequencer.next_state() == target {
                return;
            }
            sequencer.run_cycle().await;
        }
        assert_eq!(sequencer.next_state(), target);
    }

    /// 未启动时停在 HALT
    #[tokio::test]
    async fn test_waits_in_halt_until_started() {
        let (mut sequencer, handle, _fixture, _rx) = build(&test_config());
        for _ in 0..5 {
            sequencer.run_cycle().await;
        }
        assert_eq!(sequencer.next_state(), SequencerState::Halt);

        handle.start().unwrap();
        cycle_until(&mut sequencer, SequencerState::Idle, 3).await;
        assert_eq!(sequencer.tester_status(), TesterStatus::Passed);
    }

    /// 生产模式拒绝手动指令
    #[tokio::test]
    async fn test_manual_rejected_in_production() {
        let (mut sequencer, handle, fixture, _rx) = build(&test_config());
        handle.start().unwrap();
        cycle_until(&mut sequencer, SequencerState::Idle, 5).await;

        let err = sequencer.execute_manual(ManualCommand::GateOn).await.unwrap_err();
        assert_eq!(err.error_code(), "PERMISSION_ERROR");
        assert_eq!(fixture.output_level(Port::GateOn), Level::Clear);

        // 生产权限也无法切到维护模式
        handle.set_mode(OperatingMode::Service).unwrap();
        sequencer.run_cycle().await;
        assert_eq!(sequencer.mode(), OperatingMode::Production);
    }

    /// 维护权限用户可以切换模式并手动操作
    #[tokio::test]
    async fn test_manual_allowed_in_service_mode() {
        let mut config = test_config();
        config.logon_config.skip_logon = false;
        let (mut sequencer, handle, fixture, _rx) = build_with_service_user(&config);

        sequencer.run_cycle().await;
        assert_eq!(sequencer.next_state(), SequencerState::Logon);
        handle.logon("tech", "wrong").unwrap();
        sequencer.run_cycle().await;
        assert_eq!(sequencer.next_state(), SequencerState::Logon);

        handle.logon("tech", "pw").unwrap();
        sequencer.run_cycle().await;
        assert_eq!(sequencer.next_state(), SequencerState::Halt);
        assert_eq!(sequencer.access_level(), AccessLevel::Service);

        handle.start().unwrap();
        cycle_until(&mut sequencer, SequencerState::Idle, 5).await;
        handle.set_mode(OperatingMode::Service).unwrap();
        sequencer.run_cycle().await;
        assert_eq!(sequencer.mode(), OperatingMode::Service);

        sequencer.execute_manual(ManualCommand::GateOn).await.unwrap();
        assert_eq!(fixture.output_level(Port::GateOn), Level::Set);
        sequencer.execute_manual(ManualCommand::ReadGate).await.unwrap();
        assert!((sequencer.measurements().gate[0] - 5.75).abs() < 1e-9);
    }

    /// INIT 之前的手动指令失败：ERROR 与原因都保留，经 HALT 等待重新启动
    #[tokio::test]
    async fn test_manual_failure_before_init_is_not_cleared() {
        let mut config = test_config();
        config.logon_config.skip_logon = false;
        let (mut sequencer, handle, fixture, mut rx) = build_with_service_user(&config);

        handle.logon("tech", "pw").unwrap();
        handle.start().unwrap();
        cycle_until(&mut sequencer, SequencerState::Idle, 6).await;
        handle.set_mode(OperatingMode::Service).unwrap();
        sequencer.run_cycle().await;
        assert_eq!(sequencer.mode(), OperatingMode::Service);

        handle.halt().unwrap();
        sequencer.run_cycle().await;
        assert_eq!(sequencer.next_state(), SequencerState::Halt);
        handle.start().unwrap();
        sequencer.run_cycle().await;
        assert_eq!(sequencer.next_state(), SequencerState::Init);

        fixture.inject_channel_fault(ChannelGroup::Gate);
        handle.manual(ManualCommand::ReadGate).unwrap();
        rx.drain_all();
        sequencer.run_cycle().await;

        assert_eq!(sequencer.next_state(), SequencerState::Halt);
        assert_eq!(sequencer.fault_reason().map(|r| r.kind), Some(FaultKind::HardwareIo));
        let published = rx.drain_all();
        assert!(published
            .iter()
            .any(|s| s.tester_status == TesterStatus::Error && s.fault_reason.is_some()));

        // 操作员重新启动后才清除
        fixture.clear_faults();
        handle.start().unwrap();
        cycle_until(&mut sequencer, SequencerState::Idle, 3).await;
        assert!(sequencer.fault_reason().is_none());
        assert_eq!(sequencer.tester_status(), TesterStatus::Passed);
    }

    /// 对同一块穿梭板重复评价不改变故障码、统计和历史
    #[tokio::test]
    async fn test_evaluate_shuttle_is_idempotent() {
        use crate::services::infrastructure::hardware::DutDefect;

        let (mut sequencer, handle, fixture, _rx) = build(&test_config());
        handle.start().unwrap();
        cycle_until(&mut sequencer, SequencerState::Idle, 5).await;

        fixture.set_defect(4, Some(DutDefect::DrainSourceShort));
        fixture.feed_shuttles(1);
        cycle_until(&mut sequencer, SequencerState::Evaluate, 3).await;
        sequencer.run_cycle().await;
        assert_eq!(sequencer.next_state(), SequencerState::Idle);

        let codes = sequencer.device_codes().to_vec();
        let statistics = sequencer.statistics().clone();
        let history = sequencer.history().snapshot();
        assert_eq!(codes[4], DeviceFaultCode::DsShort);
        assert_eq!(statistics.shuttles_tested, 1);

        let again = sequencer.evaluate_shuttle();
        assert_eq!(again, codes);
        assert_eq!(sequencer.statistics(), &statistics);
        assert_eq!(sequencer.history().snapshot(), history);
        assert_eq!(sequencer.tester_status(), TesterStatus::Failed);
    }

    /// 气缸卡滞导致执行机构超时，测试台进入 HALT
    #[tokio::test]
    async fn test_actuator_timeout_escalates() {
        let (mut sequencer, handle, fixture, _rx) = build(&test_config());
        handle.start().unwrap();
        cycle_until(&mut sequencer, SequencerState::Idle, 5).await;

        fixture.feed_shuttles(1);
        sequencer.run_cycle().await;
        assert_eq!(sequencer.next_state(), SequencerState::Testing);

        fixture.set_stuck_valve(true);
        sequencer.run_cycle().await;
        assert_eq!(sequencer.next_state(), SequencerState::Halt);
        assert_eq!(sequencer.fault_reason().map(|r| r.kind), Some(FaultKind::ActuatorTimeout));
        assert_eq!(sequencer.tester_status(), TesterStatus::NoResult);
    }

    /// 结果写入失败置测试台ERROR
    #[tokio::test]
    async fn test_result_log_failure_escalates() {
        use crate::services::infrastructure::result_log::MockResultLog;

        let config = test_config();
        let fixture = SimulatedFixture::new_for_testing();
        let (publisher, _rx) = snapshot_channel(64);
        let mut result_log = MockResultLog::new();
        result_log.expect_log_name().return_const("mock");
        result_log
            .expect_append()
            .times(1)
            .returning(|_| Err(AppError::io_error("磁盘已满", "StorageFull")));
        let services = SequencerServices {
            hardware: Box::new(fixture.clone()),
            credentials: Box::new(ConfigCredentialStore::from_config(&config.logon_config)),
            result_log: Box::new(result_log),
        };
        let (mut sequencer, handle) = TestSequencer::new(&config, services, publisher);

        handle.start().unwrap();
        cycle_until(&mut sequencer, SequencerState::Idle, 5).await;
        fixture.feed_shuttles(1);
        cycle_until(&mut sequencer, SequencerState::Evaluate, 3).await;
        sequencer.run_cycle().await;

        assert_eq!(sequencer.next_state(), SequencerState::Halt);
        assert_eq!(sequencer.fault_reason().map(|r| r.kind), Some(FaultKind::ResultLog));
        // 统计在写入之前已更新
        assert_eq!(sequencer.statistics().shuttles_tested, 1);
    }

    /// 停机请求不打断当前穿梭板，EVALUATE 之后进入 HALT
    #[tokio::test]
    async fn test_halt_during_testing_finishes_shuttle() {
        let (mut sequencer, handle, fixture, _rx) = build(&test_config());
        handle.start().unwrap();
        cycle_until(&mut sequencer, SequencerState::Idle, 5).await;

        fixture.feed_shuttles(1);
        sequencer.run_cycle().await;
        assert_eq!(sequencer.next_state(), SequencerState::Testing);

        handle.halt().unwrap();
        sequencer.run_cycle().await;
        assert_eq!(sequencer.next_state(), SequencerState::Evaluate);
        sequencer.run_cycle().await;
        assert_eq!(sequencer.next_state(), SequencerState::Halt);
        assert_eq!(sequencer.statistics().shuttles_tested, 1);
    }
}
