use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{
    ChannelGroup, DeviceFaultCode, FaultKind, OperatingMode, SequencerState, StepOutcome,
    TesterStatus, DEVICES_PER_SHUTTLE,
};
use crate::utils::error::AppError;

/// 单个物理量的电压限值
///
/// 上下限均为闭区间：`v < lower_bound` 判为 `code_below`，`v > upper_bound` 判为 `code_above`。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limit {
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub code_below: StepOutcome,
    pub code_above: StepOutcome,
}

impl Limit {
    /// 器件诊断限值，越限分别判为 VOLT_LOW / VOLT_HIGH
    pub const fn device(lower_bound: f64, upper_bound: f64) -> Self {
        Self {
            lower_bound,
            upper_bound,
            code_below: StepOutcome::VoltLow,
            code_above: StepOutcome::VoltHigh,
        }
    }

    /// 治具自检限值，两侧越限均为 FIXTURE_FAULT
    pub const fn fixture(lower_bound: f64, upper_bound: f64) -> Self {
        Self {
            lower_bound,
            upper_bound,
            code_below: StepOutcome::FixtureFault,
            code_above: StepOutcome::FixtureFault,
        }
    }

    /// 以零为中心的对称自检限值
    pub const fn fixture_zero(tolerance: f64) -> Self {
        Self::fixture(-tolerance, tolerance)
    }
}

/// 一次完整采集的三组测量向量（伏）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementSet {
    pub gate: Vec<f64>,
    pub phase: Vec<f64>,
    pub source: Vec<f64>,
}

impl Default for MeasurementSet {
    fn default() -> Self {
        Self {
            gate: vec![0.0; DEVICES_PER_SHUTTLE],
            phase: vec![0.0; DEVICES_PER_SHUTTLE],
            source: vec![0.0; DEVICES_PER_SHUTTLE],
        }
    }
}

impl MeasurementSet {
    pub fn get(&self, group: ChannelGroup) -> &[f64] {
        match group {
            ChannelGroup::Gate => &self.gate,
            ChannelGroup::Phase => &self.phase,
            ChannelGroup::Source => &self.source,
        }
    }

    pub fn set(&mut self, group: ChannelGroup, values: Vec<f64>) {
        match group {
            ChannelGroup::Gate => self.gate = values,
            ChannelGroup::Phase => self.phase = values,
            ChannelGroup::Source => self.source = values,
        }
    }
}

/// 运行统计，仅在 EVALUATE 中更新
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatistics {
    pub total_tested: u64,
    pub passed: u64,
    /// 不合格器件数（NOT_BONDED 不计入）
    pub failed: u64,
    pub gs_short: u64,
    pub not_bonded: u64,
    pub ds_short: u64,
    pub unknown: u64,
    pub shuttles_tested: u64,
}

impl RunStatistics {
    /// 累计一块穿梭板的分类结果
    pub fn record_shuttle(&mut self, codes: &[DeviceFaultCode]) {
        self.shuttles_tested += 1;
        for code in codes {
            match code {
                DeviceFaultCode::NoResult => continue,
                DeviceFaultCode::Passed => self.passed += 1,
                DeviceFaultCode::NotBonded => self.not_bonded += 1,
                DeviceFaultCode::GsShort => {
                    self.gs_short += 1;
                    self.failed += 1;
                }
                DeviceFaultCode::DsShort => {
                    self.ds_short += 1;
                    self.failed += 1;
                }
                DeviceFaultCode::Unknown => {
                    self.unknown += 1;
                    self.failed += 1;
                }
            }
            self.total_tested += 1;
        }
    }

    /// 良率（百分比），尚未测试时为 None
    pub fn yield_percent(&self) -> Option<f64> {
        if self.total_tested == 0 {
            None
        } else {
            Some(self.passed as f64 * 100.0 / self.total_tested as f64)
        }
    }
}

/// 触发测试台ERROR的原因，保留到下一次 INIT 供操作员查看
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultReason {
    pub kind: FaultKind,
    pub message: String,
    pub position: Option<usize>,
    pub timestamp: DateTime<Local>,
}

impl FaultReason {
    pub fn new(kind: FaultKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            position: None,
            timestamp: Local::now(),
        }
    }

    pub fn repetition(position: usize, code: DeviceFaultCode, depth: usize) -> Self {
        Self {
            kind: FaultKind::RepetitionFault,
            message: format!("位置 {} 连续 {} 次出现 {}", position, depth, code),
            position: Some(position),
            timestamp: Local::now(),
        }
    }
}

impl From<&AppError> for FaultReason {
    fn from(err: &AppError) -> Self {
        let (kind, position) = match err {
            AppError::FixtureFault { position, .. } => (FaultKind::FixtureFault, Some(*position)),
            AppError::ActuatorTimeout { .. } => (FaultKind::ActuatorTimeout, None),
            AppError::IoError { .. } | AppError::JsonError { .. } => (FaultKind::ResultLog, None),
            _ => (FaultKind::HardwareIo, None),
        };
        Self {
            kind,
            message: err.to_string(),
            position,
            timestamp: Local::now(),
        }
    }
}

/// 每块穿梭板一条的结果记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShuttleRecord {
    pub session_id: Uuid,
    pub shuttle_number: u64,
    pub timestamp: DateTime<Local>,
    pub operator: Option<String>,
    pub lot_code: Option<String>,
    pub serial_number: Option<String>,
    pub device_codes: Vec<DeviceFaultCode>,
    pub elapsed_secs: f64,
}

/// 发布给展示层的快照，值语义，每次发布都是新的副本
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub session_id: Uuid,
    /// 单调递增的发布序号
    pub sequence: u64,
    pub timestamp: DateTime<Local>,
    pub measurements: MeasurementSet,
    pub device_codes: Vec<DeviceFaultCode>,
    /// 每个位置的历史窗口，最旧在前
    pub history: Vec<Vec<DeviceFaultCode>>,
    pub tester_status: TesterStatus,
    pub fault_reason: Option<FaultReason>,
    pub statistics: RunStatistics,
    pub previous_state: SequencerState,
    pub current_state: SequencerState,
    pub next_state: SequencerState,
    pub mode: OperatingMode,
    pub current_step: Option<String>,
    pub lot_code: Option<String>,
    pub serial_number: Option<String>,
}
