//! # 模型枚举类型模块
//!
//! 时序器状态、测量判定、故障码、测试台状态、操作模式以及治具端口等枚举。
//! 所有枚举都支持JSON序列化和与字符串的双向转换，状态与判定均使用穷尽匹配。

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// 每个穿梭板上的器件数量
pub const DEVICES_PER_SHUTTLE: usize = 9;

/// 时序器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SequencerState {
    /// 程序入口
    Entry,
    /// 等待操作员登录
    Logon,
    /// 停机，等待操作员启动
    Halt,
    /// 打开硬件、驱动安全基线并自检
    Init,
    /// 等待输入批次号
    GetLot,
    /// 等待穿梭板到位
    Idle,
    /// 等待扫描序列号
    GetSn,
    /// 执行七步测试
    Testing,
    /// 故障分类与历史更新
    Evaluate,
    /// 退出程序
    Exit,
}

impl Default for SequencerState {
    fn default() -> Self {
        Self::Entry
    }
}

impl Display for SequencerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SequencerState::Entry => "ENTRY",
            SequencerState::Logon => "LOGON",
            SequencerState::Halt => "HALT",
            SequencerState::Init => "INIT",
            SequencerState::GetLot => "GETLOT",
            SequencerState::Idle => "IDLE",
            SequencerState::GetSn => "GETSN",
            SequencerState::Testing => "TESTING",
            SequencerState::Evaluate => "EVALUATE",
            SequencerState::Exit => "EXIT",
        };
        write!(f, "{}", s)
    }
}

/// 单个位置在单个步骤单个物理量上的判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepOutcome {
    Passed,
    VoltLow,
    VoltHigh,
    /// 治具自检越限，会升级为测试台ERROR
    FixtureFault,
}

impl Default for StepOutcome {
    fn default() -> Self {
        Self::Passed
    }
}

impl Display for StepOutcome {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StepOutcome::Passed => "PASSED",
            StepOutcome::VoltLow => "VOLT_LOW",
            StepOutcome::VoltHigh => "VOLT_HIGH",
            StepOutcome::FixtureFault => "FIXTURE_FAULT",
        };
        write!(f, "{}", s)
    }
}

/// 器件故障码（每个位置每块穿梭板一个）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceFaultCode {
    Passed,
    NotBonded,
    GsShort,
    DsShort,
    Unknown,
    /// 尚未测试
    NoResult,
}

impl Default for DeviceFaultCode {
    fn default() -> Self {
        Self::NoResult
    }
}

impl DeviceFaultCode {
    /// 是否参与重复故障检测
    pub fn is_repeatable_fault(&self) -> bool {
        !matches!(self, DeviceFaultCode::Passed | DeviceFaultCode::NoResult)
    }
}

impl Display for DeviceFaultCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DeviceFaultCode::Passed => "PASSED",
            DeviceFaultCode::NotBonded => "NOT_BONDED",
            DeviceFaultCode::GsShort => "GS_SHORT",
            DeviceFaultCode::DsShort => "DS_SHORT",
            DeviceFaultCode::Unknown => "UNKNOWN",
            DeviceFaultCode::NoResult => "NO_RESULT",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for DeviceFaultCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PASSED" => Ok(DeviceFaultCode::Passed),
            "NOT_BONDED" => Ok(DeviceFaultCode::NotBonded),
            "GS_SHORT" => Ok(DeviceFaultCode::GsShort),
            "DS_SHORT" => Ok(DeviceFaultCode::DsShort),
            "UNKNOWN" => Ok(DeviceFaultCode::Unknown),
            "NO_RESULT" => Ok(DeviceFaultCode::NoResult),
            _ => Err(format!("Invalid DeviceFaultCode: {}", s)),
        }
    }
}

/// 测试台整体状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TesterStatus {
    NoResult,
    /// 测试台故障，强制进入HALT
    Error,
    Passed,
    /// 最近一块穿梭板存在不合格器件
    Failed,
}

impl Default for TesterStatus {
    fn default() -> Self {
        Self::NoResult
    }
}

impl Display for TesterStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TesterStatus::NoResult => "NO_RESULT",
            TesterStatus::Error => "ERROR",
            TesterStatus::Passed => "PASSED",
            TesterStatus::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// 操作模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperatingMode {
    Production,
    /// 维护模式，允许手动操作执行机构
    Service,
}

impl Default for OperatingMode {
    fn default() -> Self {
        Self::Production
    }
}

impl Display for OperatingMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            OperatingMode::Production => write!(f, "Production"),
            OperatingMode::Service => write!(f, "Service"),
        }
    }
}

impl FromStr for OperatingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "production" => Ok(OperatingMode::Production),
            "service" => Ok(OperatingMode::Service),
            _ => Err(format!("Invalid OperatingMode: {}", s)),
        }
    }
}

/// 用户权限等级，决定允许进入的操作模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessLevel {
    Production,
    Service,
}

impl Default for AccessLevel {
    fn default() -> Self {
        Self::Production
    }
}

impl AccessLevel {
    pub fn permits(&self, mode: OperatingMode) -> bool {
        match (self, mode) {
            (AccessLevel::Service, _) => true,
            (AccessLevel::Production, OperatingMode::Production) => true,
            (AccessLevel::Production, OperatingMode::Service) => false,
        }
    }
}

impl Display for AccessLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessLevel::Production => write!(f, "Production"),
            AccessLevel::Service => write!(f, "Service"),
        }
    }
}

/// 模拟量通道组，同时也是被评价的物理量
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelGroup {
    Gate,
    Phase,
    Source,
}

impl ChannelGroup {
    pub const ALL: [ChannelGroup; 3] = [ChannelGroup::Gate, ChannelGroup::Phase, ChannelGroup::Source];
}

impl Display for ChannelGroup {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChannelGroup::Gate => "Gate",
            ChannelGroup::Phase => "Phase",
            ChannelGroup::Source => "Source",
        };
        write!(f, "{}", s)
    }
}

/// 数字量电平
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Level {
    Clear,
    Set,
}

impl Level {
    /// 低电平有效的传感器是否处于有效状态
    pub fn is_active_low_asserted(&self) -> bool {
        matches!(self, Level::Clear)
    }
}

impl From<bool> for Level {
    fn from(value: bool) -> Self {
        if value {
            Level::Set
        } else {
            Level::Clear
        }
    }
}

impl Display for Level {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Level::Clear => write!(f, "CLEAR"),
            Level::Set => write!(f, "SET"),
        }
    }
}

/// 治具逻辑端口（数字量模块上的DIO编号）
///
/// 传感器类端口（`ShuttleAvailable`、`ShuttleUpperPosition`、`ShuttleLowerPosition`）低电平有效。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Port {
    /// 隔离3V3电源
    Isolated3V3On,
    /// SET为正向相电压，CLEAR为反向
    PhaseReverseOff,
    PhaseOn,
    GateOn,
    BoardAvailableIn,
    BoardAvailableOut,
    ShuttleValve,
    StopperValve,
    ShuttleUpperPosition,
    ShuttleLowerPosition,
    BandMotor,
    ShuttleAvailable,
    ReadyToReceiveIn,
    ReadyToReceiveOut,
}

impl Port {
    /// DIO编号
    pub fn dio_number(&self) -> u8 {
        match self {
            Port::Isolated3V3On => 0,
            Port::PhaseReverseOff => 1,
            Port::PhaseOn => 2,
            Port::GateOn => 3,
            Port::BoardAvailableIn => 4,
            Port::BoardAvailableOut => 5,
            Port::ShuttleValve => 8,
            Port::StopperValve => 9,
            Port::ShuttleUpperPosition => 10,
            Port::ShuttleLowerPosition => 11,
            Port::BandMotor => 12,
            Port::ShuttleAvailable => 13,
            Port::ReadyToReceiveIn => 14,
            Port::ReadyToReceiveOut => 15,
        }
    }

    /// 是否为只读的输入端口
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            Port::ShuttleAvailable
                | Port::ShuttleUpperPosition
                | Port::ShuttleLowerPosition
                | Port::BoardAvailableIn
                | Port::ReadyToReceiveIn
        )
    }
}

impl Display for Port {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Port::Isolated3V3On => "3V3ISO_ON",
            Port::PhaseReverseOff => "VPHASE_REV_OFF",
            Port::PhaseOn => "VPHASE_ON",
            Port::GateOn => "VGATE_ON",
            Port::BoardAvailableIn => "BRDAVLBL_SMEMA_DIN",
            Port::BoardAvailableOut => "BRDAVLBL_SMEMA_DOUT",
            Port::ShuttleValve => "SHUTTLE_VALVE",
            Port::StopperValve => "STOPPER_VALVE",
            Port::ShuttleUpperPosition => "SHUTTLE_VALVE_UPPER_POS",
            Port::ShuttleLowerPosition => "SHUTTLE_VALVE_LOWER_POS",
            Port::BandMotor => "BAND_MOTOR",
            Port::ShuttleAvailable => "SHUTTLE_AVLBL",
            Port::ReadyToReceiveIn => "RDY2RCV_SMEMA_DIN",
            Port::ReadyToReceiveOut => "RDY2RCV_SMEMA_DOUT",
        };
        write!(f, "{}", s)
    }
}

/// 测试台级故障的分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FaultKind {
    FixtureFault,
    HardwareIo,
    ActuatorTimeout,
    /// 同一位置连续出现相同故障码
    RepetitionFault,
    ResultLog,
}

impl Display for FaultKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FaultKind::FixtureFault => "FixtureFault",
            FaultKind::HardwareIo => "HardwareIoError",
            FaultKind::ActuatorTimeout => "ActuatorTimeout",
            FaultKind::RepetitionFault => "RepetitionFault",
            FaultKind::ResultLog => "ResultLogError",
        };
        write!(f, "{}", s)
    }
}

/// 维护模式下的手动指令
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManualCommand {
    ShuttleUp,
    ShuttleDown,
    PhaseOn,
    PhaseOff,
    /// 相电压正向（关闭反向）
    PhaseForward,
    PhaseReverse,
    GateOn,
    GateOff,
    ReadGate,
    ReadPhase,
    ReadSource,
}

impl FromStr for ManualCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "shuttle_up" => Ok(ManualCommand::ShuttleUp),
            "shuttle_down" => Ok(ManualCommand::ShuttleDown),
            "phase_on" => Ok(ManualCommand::PhaseOn),
            "phase_off" => Ok(ManualCommand::PhaseOff),
            "phase_forward" => Ok(ManualCommand::PhaseForward),
            "phase_reverse" => Ok(ManualCommand::PhaseReverse),
            "gate_on" => Ok(ManualCommand::GateOn),
            "gate_off" => Ok(ManualCommand::GateOff),
            "read_gate" => Ok(ManualCommand::ReadGate),
            "read_phase" => Ok(ManualCommand::ReadPhase),
            "read_source" => Ok(ManualCommand::ReadSource),
            _ => Err(format!("Invalid ManualCommand: {}", s)),
        }
    }
}
