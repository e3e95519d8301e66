//! 判定台账：保存一块穿梭板在诊断步骤上的逐位置判定
//!
//! 只在 TESTING 中写入，在 EVALUATE 中读取；每块穿梭板开始测试时清空。

use std::collections::HashMap;

use super::test_protocol::DiagnosticStep;
use crate::models::enums::{ChannelGroup, StepOutcome, DEVICES_PER_SHUTTLE};

#[derive(Debug, Clone, Default)]
pub struct StepOutcomeLedger {
    entries: HashMap<(DiagnosticStep, ChannelGroup), [Option<StepOutcome>; DEVICES_PER_SHUTTLE]>,
}

impl StepOutcomeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 清空台账，进入新的穿梭板
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// 写入一个步骤一个物理量的整组判定
    ///
    /// 只写入步骤声明保留的物理量，其余忽略。
    pub fn record(&mut self, step: DiagnosticStep, group: ChannelGroup, outcomes: &[StepOutcome]) {
        if !step.retained().contains(&group) {
            log::trace!("[Ledger] 步骤{} 不保留 {}，忽略", step.number(), group);
            return;
        }
        let slot = self
            .entries
            .entry((step, group))
            .or_insert([None; DEVICES_PER_SHUTTLE]);
        for (position, outcome) in outcomes.iter().take(DEVICES_PER_SHUTTLE).enumerate() {
            slot[position] = Some(*outcome);
        }
    }

    pub fn get(&self, step: DiagnosticStep, group: ChannelGroup, position: usize) -> Option<StepOutcome> {
        self.entries
            .get(&(step, group))
            .and_then(|slot| slot.get(position).copied().flatten())
    }

    /// 该位置所有保留项是否都已写入
    pub fn is_complete(&self, position: usize) -> bool {
        DiagnosticStep::ALL.iter().all(|step| {
            step.retained()
                .iter()
                .all(|group| self.get(*step, *group, position).is_some())
        })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
