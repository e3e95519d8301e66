//! 时序器状态转换表
//!
//! 所有合法的边都在 `is_valid_edge` 中显式列出；`resolve` 在请求的目标状态上
//! 依次施加退出、测试台ERROR、操作员停机三种覆盖。

use crate::models::enums::{SequencerState, TesterStatus};

use SequencerState::*;

/// 解析转换时需要的上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionContext {
    pub exit_requested: bool,
    pub start_requested: bool,
    pub tester_status: TesterStatus,
}

/// 转换发生的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionCause {
    /// 按请求转换
    Requested,
    /// 收到退出信号
    ExitSignal,
    /// 测试台ERROR
    TesterError,
    /// 操作员未启动或已停机
    OperatorHalt,
    /// 请求的边不在转换表中
    InvalidEdge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub next: SequencerState,
    pub cause: TransitionCause,
}

/// 转换表：任意状态都可以去 HALT 或 EXIT，其余边逐一列出
pub fn is_valid_edge(from: SequencerState, to: SequencerState) -> bool {
    match (from, to) {
        (_, Halt) | (_, Exit) => true,
        (Entry, Logon) => true,
        (Logon, Logon) => true,
        (Halt, Init) => true,
        (Init, GetLot) | (GetLot, GetLot) | (GetLot, Init) => true,
        (Init, Idle) => true,
        (Idle, Idle) | (Idle, GetSn) | (GetSn, GetSn) | (GetSn, Idle) => true,
        (Idle, Testing) => true,
        (Testing, Evaluate) => true,
        (Evaluate, Idle) => true,
        _ => false,
    }
}

/// 该目标状态是否需要操作员处于“启动”状态
///
/// EVALUATE 不需要：正在测试的穿梭板总要完成分类。
fn requires_start(state: SequencerState) -> bool {
    match state {
        Init | GetLot | Idle | GetSn | Testing => true,
        Entry | Logon | Halt | Evaluate | Exit => false,
    }
}

/// 计算实际的下一状态
pub fn resolve(current: SequencerState, requested: SequencerState, ctx: TransitionContext) -> Transition {
    if ctx.exit_requested {
        return Transition { next: Exit, cause: TransitionCause::ExitSignal };
    }
    if ctx.tester_status == TesterStatus::Error {
        return Transition { next: Halt, cause: TransitionCause::TesterError };
    }
    if !is_valid_edge(current, requested) {
        return Transition { next: Halt, cause: TransitionCause::InvalidEdge };
    }
    if !ctx.start_requested && requires_start(requested) {
        return Transition { next: Halt, cause: TransitionCause::OperatorHalt };
    }
    Transition { next: requested, cause: TransitionCause::Requested }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running() -> TransitionContext {
        TransitionContext {
            exit_requested: false,
            start_requested: true,
            tester_status: TesterStatus::Passed,
        }
    }

    #[test]
    fn test_normal_cycle() {
        let ctx = running();
        for (from, to) in [
            (Entry, Logon),
            (Logon, Halt),
            (Halt, Init),
            (Init, Idle),
            (Idle, GetSn),
            (GetSn, Idle),
            (Idle, Testing),
            (Testing, Evaluate),
            (Evaluate, Idle),
        ] {
            assert_eq!(resolve(from, to, ctx), Transition { next: to, cause: TransitionCause::Requested });
        }
    }

    /// 退出信号优先于一切
    #[test]
    fn test_exit_wins() {
        let ctx = TransitionContext {
            exit_requested: true,
            start_requested: true,
            tester_status: TesterStatus::Error,
        };
        assert_eq!(resolve(Testing, Evaluate, ctx).next, Exit);
    }

    #[test]
    fn test_error_forces_halt() {
        let ctx = TransitionContext { tester_status: TesterStatus::Error, ..running() };
        let t = resolve(Testing, Evaluate, ctx);
        assert_eq!(t.next, Halt);
        assert_eq!(t.cause, TransitionCause::TesterError);
    }

    /// 停机后当前穿梭板仍可完成 EVALUATE，但不会回到 IDLE
    #[test]
    fn test_operator_halt() {
        let ctx = TransitionContext { start_requested: false, ..running() };
        assert_eq!(resolve(Testing, Evaluate, ctx).next, Evaluate);
        assert_eq!(resolve(Evaluate, Idle, ctx).cause, TransitionCause::OperatorHalt);
        assert_eq!(resolve(Halt, Init, ctx).next, Halt);
        assert_eq!(resolve(Logon, Logon, ctx).next, Logon);
    }

    #[test]
    fn test_invalid_edge() {
        let t = resolve(Idle, Evaluate, running());
        assert_eq!(t.next, Halt);
        assert_eq!(t.cause, TransitionCause::InvalidEdge);
        assert!(!is_valid_edge(Halt, Testing));
        assert!(is_valid_edge(Testing, Halt));
    }
}
