//! 故障分类器
//!
//! 把台账中一个位置的诊断判定融合为一个器件故障码。规则按顺序匹配，先命中者生效：
//! 1. 步骤3相/源、步骤4门、步骤5源、步骤6源全部合格 → PASSED
//! 2. 步骤4门偏低、步骤4源偏高、步骤5门偏低 → GS_SHORT
//! 3. 步骤3相偏低、步骤3源偏高、步骤5源偏低 → NOT_BONDED
//! 4. 步骤6源偏高 → DS_SHORT
//! 5. 其余 → UNKNOWN

use super::step_outcome_ledger::StepOutcomeLedger;
use super::test_protocol::DiagnosticStep::{GateOffPhaseOn, GateOnPhaseOff, GateOnPhaseOn, PhaseReverse};
use crate::models::enums::{ChannelGroup, DeviceFaultCode, StepOutcome, DEVICES_PER_SHUTTLE};

use ChannelGroup::{Gate, Phase, Source};
use StepOutcome::{Passed, VoltHigh, VoltLow};

/// 对单个位置分类；台账不完整时返回 NO_RESULT
pub fn classify(ledger: &StepOutcomeLedger, position: usize) -> DeviceFaultCode {
    if !ledger.is_complete(position) {
        return DeviceFaultCode::NoResult;
    }

    let is = |step, group, expected: StepOutcome| ledger.get(step, group, position) == Some(expected);

    if is(PhaseReverse, Phase, Passed)
        && is(PhaseReverse, Source, Passed)
        && is(GateOnPhaseOff, Gate, Passed)
        && is(GateOnPhaseOn, Source, Passed)
        && is(GateOffPhaseOn, Source, Passed)
    {
        DeviceFaultCode::Passed
    } else if is(GateOnPhaseOff, Gate, VoltLow)
        && is(GateOnPhaseOff, Source, VoltHigh)
        && is(GateOnPhaseOn, Gate, VoltLow)
    {
        DeviceFaultCode::GsShort
    } else if is(PhaseReverse, Phase, VoltLow)
        && is(PhaseReverse, Source, VoltHigh)
        && is(GateOnPhaseOn, Source, VoltLow)
    {
        DeviceFaultCode::NotBonded
    } else if is(GateOffPhaseOn, Source, VoltHigh) {
        DeviceFaultCode::DsShort
    } else {
        DeviceFaultCode::Unknown
    }
}

/// 对整块穿梭板分类
pub fn classify_all(ledger: &StepOutcomeLedger) -> Vec<DeviceFaultCode> {
    (0..DEVICES_PER_SHUTTLE)
        .map(|position| classify(ledger, position))
        .collect()
}
