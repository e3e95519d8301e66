/// 领域服务层模块
/// 包含测试协议、判定、故障分类与时序状态机

/// 测试协议 - 限值表与各步骤的激励配方
pub mod test_protocol;

/// 评价引擎 - 电压与限值比较
pub mod evaluation_engine;

/// 步骤结果台账 - 保存分类所需的步骤结果
pub mod step_outcome_ledger;

/// 故障分类器 - 由台账得出每个位置的故障码
pub mod fault_classifier;

/// 历史跟踪 - 检测同一位置连续重复的故障
pub mod history_tracker;

/// 状态转换表与调度覆盖规则
pub mod state_transition;

/// 测试时序器 - 唯一的状态机任务
pub mod test_sequencer;

// 重新导出常用类型
pub use test_protocol::{DiagnosticStep, ProtocolStep, StepAction, TestProtocol, SAFE_BASELINE, STANDARD_PROTOCOL};
pub use step_outcome_ledger::StepOutcomeLedger;
pub use history_tracker::{HistoryTracker, RepetitionFault};
pub use state_transition::{Transition, TransitionCause, TransitionContext};
pub use test_sequencer::{SequencerServices, TestSequencer};
