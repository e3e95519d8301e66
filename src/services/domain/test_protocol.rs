//! 七步测试协议与限值表
//!
//! 每个步骤由三部分组成：测量前动作、三组物理量的限值、测量后动作。
//! 步骤1、2、7以及 INIT 自检只做治具自检，越限即 FIXTURE_FAULT；
//! 步骤3~6为器件诊断步骤，其保留的物理量写入判定台账供故障分类使用。

use once_cell::sync::Lazy;

use crate::models::enums::{ChannelGroup, Level, Port};
use crate::models::structs::Limit;

/// 治具空载时的零点容差（伏）
const ZERO_TOLERANCE: f64 = 0.03;

/// 器件诊断步骤，判定台账的键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DiagnosticStep {
    /// 步骤3：相电压反向
    PhaseReverse,
    /// 步骤4：门极开、相电压关
    GateOnPhaseOff,
    /// 步骤5：门极开、相电压正向
    GateOnPhaseOn,
    /// 步骤6：门极关、相电压正向
    GateOffPhaseOn,
}

impl DiagnosticStep {
    pub const ALL: [DiagnosticStep; 4] = [
        DiagnosticStep::PhaseReverse,
        DiagnosticStep::GateOnPhaseOff,
        DiagnosticStep::GateOnPhaseOn,
        DiagnosticStep::GateOffPhaseOn,
    ];

    /// 协议中的步骤编号（1起）
    pub fn number(&self) -> u8 {
        match self {
            DiagnosticStep::PhaseReverse => 3,
            DiagnosticStep::GateOnPhaseOff => 4,
            DiagnosticStep::GateOnPhaseOn => 5,
            DiagnosticStep::GateOffPhaseOn => 6,
        }
    }

    /// 该步骤写入台账的物理量
    pub fn retained(&self) -> &'static [ChannelGroup] {
        match self {
            DiagnosticStep::PhaseReverse => &[ChannelGroup::Phase, ChannelGroup::Source],
            DiagnosticStep::GateOnPhaseOff => &[ChannelGroup::Gate, ChannelGroup::Source],
            DiagnosticStep::GateOnPhaseOn => &[ChannelGroup::Gate, ChannelGroup::Source],
            DiagnosticStep::GateOffPhaseOn => &[ChannelGroup::Source],
        }
    }
}

/// 测量前后的治具动作
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepAction {
    /// 写端口电平；穿梭气缸需等待到位传感器
    Set(Port, Level),
    /// 等待若干倍的基础稳定时间
    Settle(u32),
}

/// 单个测试步骤
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolStep {
    pub name: &'static str,
    pub before: Vec<StepAction>,
    pub gate: Limit,
    pub phase: Limit,
    pub source: Limit,
    pub after: Vec<StepAction>,
    /// 诊断步骤才有，自检步骤为 None
    pub diagnostic: Option<DiagnosticStep>,
}

impl ProtocolStep {
    pub fn limit(&self, group: ChannelGroup) -> &Limit {
        match group {
            ChannelGroup::Gate => &self.gate,
            ChannelGroup::Phase => &self.phase,
            ChannelGroup::Source => &self.source,
        }
    }

    /// 该物理量的判定是否写入台账
    pub fn retains(&self, group: ChannelGroup) -> bool {
        self.diagnostic
            .map(|step| step.retained().contains(&group))
            .unwrap_or(false)
    }
}

/// 完整的测试协议：INIT 自检、七个穿梭板步骤、放行动作
#[derive(Debug, Clone, PartialEq)]
pub struct TestProtocol {
    pub self_test: Vec<ProtocolStep>,
    pub shuttle_steps: Vec<ProtocolStep>,
    pub release: Vec<StepAction>,
}

/// 安全基线：所有激励关闭、气缸与挡停落下
pub const SAFE_BASELINE: [(Port, Level); 6] = [
    (Port::Isolated3V3On, Level::Clear),
    (Port::GateOn, Level::Clear),
    (Port::PhaseOn, Level::Clear),
    (Port::PhaseReverseOff, Level::Clear),
    (Port::ShuttleValve, Level::Clear),
    (Port::StopperValve, Level::Clear),
];

fn fixture_all_zero(name: &'static str, before: Vec<StepAction>) -> ProtocolStep {
    ProtocolStep {
        name,
        before,
        gate: Limit::fixture_zero(ZERO_TOLERANCE),
        phase: Limit::fixture_zero(ZERO_TOLERANCE),
        source: Limit::fixture_zero(ZERO_TOLERANCE),
        after: Vec::new(),
        diagnostic: None,
    }
}

fn build_standard_protocol() -> TestProtocol {
    use StepAction::{Set, Settle};

    let self_test = vec![
        fixture_all_zero("InitSelftestOff", vec![Settle(1)]),
        ProtocolStep {
            name: "InitSelftestGate",
            before: vec![Set(Port::GateOn, Level::Set), Settle(1)],
            gate: Limit::fixture(5.65, 5.85),
            phase: Limit::fixture_zero(ZERO_TOLERANCE),
            source: Limit::fixture_zero(ZERO_TOLERANCE),
            after: vec![Set(Port::GateOn, Level::Clear)],
            diagnostic: None,
        },
        ProtocolStep {
            name: "InitSelftestPhase",
            before: vec![Set(Port::PhaseOn, Level::Set), Settle(1)],
            gate: Limit::fixture_zero(ZERO_TOLERANCE),
            phase: Limit::fixture(-8.0, -7.7),
            source: Limit::fixture_zero(ZERO_TOLERANCE),
            after: vec![Set(Port::PhaseOn, Level::Clear)],
            diagnostic: None,
        },
        fixture_all_zero("InitSelftestOffAgain", vec![Settle(1)]),
    ];

    let shuttle_steps = vec![
        ProtocolStep {
            name: "Selftest1",
            before: vec![
                Set(Port::ShuttleValve, Level::Clear),
                Set(Port::PhaseOn, Level::Clear),
                Set(Port::PhaseReverseOff, Level::Clear),
                Set(Port::GateOn, Level::Set),
                Settle(1),
            ],
            gate: Limit::fixture(5.65, 5.85),
            phase: Limit::fixture_zero(ZERO_TOLERANCE),
            source: Limit::fixture_zero(ZERO_TOLERANCE),
            after: vec![Set(Port::GateOn, Level::Clear)],
            diagnostic: None,
        },
        ProtocolStep {
            name: "Selftest2",
            before: vec![Set(Port::PhaseOn, Level::Set), Settle(1)],
            gate: Limit::fixture_zero(ZERO_TOLERANCE),
            phase: Limit::fixture(-8.0, -7.6),
            source: Limit::fixture_zero(ZERO_TOLERANCE),
            after: vec![Set(Port::PhaseOn, Level::Clear)],
            diagnostic: None,
        },
        ProtocolStep {
            name: "PhaseReverse",
            before: vec![
                Set(Port::ShuttleValve, Level::Set),
                Settle(2),
                Set(Port::PhaseOn, Level::Set),
                Settle(5),
            ],
            gate: Limit::device(-0.200, -0.170),
            phase: Limit::device(-7.6, -7.4),
            source: Limit::device(-0.77, -0.57),
            after: vec![Settle(1), Set(Port::PhaseOn, Level::Clear)],
            diagnostic: Some(DiagnosticStep::PhaseReverse),
        },
        ProtocolStep {
            name: "GateOnPhaseOff",
            before: vec![Set(Port::GateOn, Level::Set), Settle(1)],
            gate: Limit::device(5.1, 5.35),
            phase: Limit::device(0.01, 0.07),
            source: Limit::device(0.06, 0.08),
            after: Vec::new(),
            diagnostic: Some(DiagnosticStep::GateOnPhaseOff),
        },
        ProtocolStep {
            name: "GateOnPhaseOn",
            before: vec![
                Set(Port::PhaseReverseOff, Level::Set),
                Set(Port::PhaseOn, Level::Set),
                Settle(1),
            ],
            gate: Limit::device(5.19, 5.4),
            phase: Limit::device(7.35, 7.65),
            source: Limit::device(0.70, 0.83),
            after: Vec::new(),
            diagnostic: Some(DiagnosticStep::GateOnPhaseOn),
        },
        ProtocolStep {
            name: "GateOffPhaseOn",
            before: vec![Set(Port::GateOn, Level::Clear), Settle(1)],
            gate: Limit::device(0.055, 0.085),
            phase: Limit::device(7.65, 7.9),
            source: Limit::device(0.14, 0.18),
            after: Vec::new(),
            diagnostic: Some(DiagnosticStep::GateOffPhaseOn),
        },
        fixture_all_zero(
            "Selftest7",
            vec![
                Set(Port::PhaseOn, Level::Clear),
                Set(Port::PhaseReverseOff, Level::Clear),
                Settle(1),
            ],
        ),
    ];

    let release = vec![
        Set(Port::GateOn, Level::Clear),
        Set(Port::PhaseOn, Level::Clear),
        Set(Port::PhaseReverseOff, Level::Clear),
        Set(Port::StopperValve, Level::Clear),
        Set(Port::ShuttleValve, Level::Clear),
    ];

    TestProtocol {
        self_test,
        shuttle_steps,
        release,
    }
}

/// 标准测试协议
pub static STANDARD_PROTOCOL: Lazy<TestProtocol> = Lazy::new(build_standard_protocol);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_shape() {
        let protocol = &*STANDARD_PROTOCOL;
        assert_eq!(protocol.self_test.len(), 4);
        assert_eq!(protocol.shuttle_steps.len(), 7);

        let diagnostics: Vec<_> = protocol
            .shuttle_steps
            .iter()
            .filter_map(|s| s.diagnostic)
            .collect();
        assert_eq!(diagnostics, DiagnosticStep::ALL.to_vec());
    }

    /// 自检步骤的所有限值两侧都必须是 FIXTURE_FAULT
    #[test]
    fn test_self_check_limits_are_fixture_faults() {
        let protocol = &*STANDARD_PROTOCOL;
        let self_checks = protocol
            .self_test
            .iter()
            .chain(protocol.shuttle_steps.iter().filter(|s| s.diagnostic.is_none()));
        for step in self_checks {
            for group in ChannelGroup::ALL {
                let limit = step.limit(group);
                assert_eq!(limit.code_below, crate::models::StepOutcome::FixtureFault, "{}", step.name);
                assert_eq!(limit.code_above, crate::models::StepOutcome::FixtureFault, "{}", step.name);
                assert!(limit.lower_bound <= limit.upper_bound);
            }
        }
    }

    #[test]
    fn test_retained_quantities() {
        let protocol = &*STANDARD_PROTOCOL;
        let step3 = &protocol.shuttle_steps[2];
        assert!(step3.retains(ChannelGroup::Phase));
        assert!(step3.retains(ChannelGroup::Source));
        assert!(!step3.retains(ChannelGroup::Gate));

        let step6 = &protocol.shuttle_steps[5];
        assert!(step6.retains(ChannelGroup::Source));
        assert!(!step6.retains(ChannelGroup::Gate));

        assert!(!protocol.shuttle_steps[0].retains(ChannelGroup::Gate));
    }
}
