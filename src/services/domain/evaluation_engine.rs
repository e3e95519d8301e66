//! 评价引擎：把一组测量向量按限值逐位置判定

use crate::models::enums::StepOutcome;
use crate::models::structs::Limit;

/// 按限值判定单个测量值
///
/// 上下限均为闭区间；非有限值在进入评价前已由硬件层拒绝。
pub fn evaluate_value(value: f64, limit: &Limit) -> StepOutcome {
    if value < limit.lower_bound {
        limit.code_below
    } else if value > limit.upper_bound {
        limit.code_above
    } else {
        StepOutcome::Passed
    }
}

/// 按限值判定整组测量向量，返回与输入等长的判定结果
pub fn evaluate(measurements: &[f64], limit: &Limit) -> Vec<StepOutcome> {
    measurements
        .iter()
        .map(|value| evaluate_value(*value, limit))
        .collect()
}

/// 找出第一个治具故障的位置及其测量值
pub fn first_fixture_fault(measurements: &[f64], outcomes: &[StepOutcome]) -> Option<(usize, f64)> {
    outcomes
        .iter()
        .position(|outcome| *outcome == StepOutcome::FixtureFault)
        .map(|position| (position, measurements[position]))
}
