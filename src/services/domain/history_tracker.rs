//! 历史追踪器
//!
//! 每个位置维护最近 M 块穿梭板的故障码（环形窗口，初始为 NO_RESULT）。
//! 同一位置连续 M 次出现同一故障码（PASSED、NO_RESULT 除外）说明是治具问题而非器件问题，
//! 此时上报重复故障，由时序器把测试台置为 ERROR。

use std::collections::VecDeque;

use crate::models::enums::{DeviceFaultCode, DEVICES_PER_SHUTTLE};

/// 一次重复故障
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepetitionFault {
    pub position: usize,
    pub code: DeviceFaultCode,
}

#[derive(Debug, Clone)]
pub struct HistoryTracker {
    depth: usize,
    windows: Vec<VecDeque<DeviceFaultCode>>,
    /// 最近一次记录的穿梭板序号及其结果，同一块板重复记录时直接返回
    last_recorded: Option<(u64, Vec<RepetitionFault>)>,
}

impl HistoryTracker {
    pub fn new(depth: usize) -> Self {
        let depth = depth.max(2);
        Self {
            depth,
            windows: (0..DEVICES_PER_SHUTTLE)
                .map(|_| std::iter::repeat(DeviceFaultCode::NoResult).take(depth).collect())
                .collect(),
            last_recorded: None,
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// 记录一块穿梭板的故障码并返回检出的重复故障
    ///
    /// 对同一 `shuttle_number` 只生效一次，再次调用返回上次结果而不修改窗口。
    pub fn record(&mut self, shuttle_number: u64, codes: &[DeviceFaultCode]) -> Vec<RepetitionFault> {
        if let Some((recorded, faults)) = &self.last_recorded {
            if *recorded == shuttle_number {
                log::debug!("[History] 穿梭板 #{} 已记录，跳过重复更新", shuttle_number);
                return faults.clone();
            }
        }

        let mut faults = Vec::new();
        for (position, code) in codes.iter().enumerate().take(DEVICES_PER_SHUTTLE) {
            let window = &mut self.windows[position];

            if code.is_repeatable_fault() {
                let matches = window.iter().rev().take(self.depth - 1).filter(|c| *c == code).count();
                if matches == self.depth - 1 {
                    log::warn!(
                        "[History] 位置 {} 连续 {} 次出现 {}",
                        position, self.depth, code
                    );
                    faults.push(RepetitionFault { position, code: *code });
                }
            }

            window.pop_front();
            window.push_back(*code);
        }

        self.last_recorded = Some((shuttle_number, faults.clone()));
        faults
    }

    /// 指定位置的历史窗口，最旧在前
    pub fn window(&self, position: usize) -> Vec<DeviceFaultCode> {
        self.windows
            .get(position)
            .map(|w| w.iter().copied().collect())
            .unwrap_or_default()
    }

    /// 所有位置的历史窗口
    pub fn snapshot(&self) -> Vec<Vec<DeviceFaultCode>> {
        (0..DEVICES_PER_SHUTTLE).map(|p| self.window(p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shuttle_with(position: usize, code: DeviceFaultCode) -> Vec<DeviceFaultCode> {
        let mut codes = vec![DeviceFaultCode::Passed; DEVICES_PER_SHUTTLE];
        codes[position] = code;
        codes
    }

    #[test]
    fn test_windows_prefilled() {
        let tracker = HistoryTracker::new(3);
        for position in 0..DEVICES_PER_SHUTTLE {
            assert_eq!(tracker.window(position), vec![DeviceFaultCode::NoResult; 3]);
        }
    }

    /// 第 M 次连续 DS_SHORT 触发，窗口长度始终为 M
    #[test]
    fn test_repetition_on_mth_occurrence() {
        let mut tracker = HistoryTracker::new(3);
        let codes = shuttle_with(2, DeviceFaultCode::DsShort);

        assert!(tracker.record(1, &codes).is_empty());
        assert!(tracker.record(2, &codes).is_empty());
        let faults = tracker.record(3, &codes);
        assert_eq!(
            faults,
            vec![RepetitionFault { position: 2, code: DeviceFaultCode::DsShort }]
        );
        let faults = tracker.record(4, &codes);
        assert_eq!(faults.len(), 1);

        for position in 0..DEVICES_PER_SHUTTLE {
            assert_eq!(tracker.window(position).len(), 3);
        }
        assert_eq!(tracker.window(2), vec![DeviceFaultCode::DsShort; 3]);
    }

    #[test]
    fn test_passed_never_triggers() {
        let mut tracker = HistoryTracker::new(3);
        let codes = vec![DeviceFaultCode::Passed; DEVICES_PER_SHUTTLE];
        for shuttle in 1..=5 {
            assert!(tracker.record(shuttle, &codes).is_empty());
        }
    }

    /// 故障码中断后重新计数
    #[test]
    fn test_interrupted_sequence_resets() {
        let mut tracker = HistoryTracker::new(3);
        tracker.record(1, &shuttle_with(0, DeviceFaultCode::GsShort));
        tracker.record(2, &shuttle_with(0, DeviceFaultCode::GsShort));
        tracker.record(3, &shuttle_with(0, DeviceFaultCode::DsShort));
        assert!(tracker.record(4, &shuttle_with(0, DeviceFaultCode::GsShort)).is_empty());
    }

    #[test]
    fn test_not_bonded_is_eligible() {
        let mut tracker = HistoryTracker::new(2);
        let codes = shuttle_with(8, DeviceFaultCode::NotBonded);
        assert!(tracker.record(1, &codes).is_empty());
        assert_eq!(tracker.record(2, &codes).len(), 1);
    }

    /// 同一块穿梭板重复记录不改变窗口
    #[test]
    fn test_record_is_idempotent_per_shuttle() {
        let mut tracker = HistoryTracker::new(3);
        let codes = shuttle_with(1, DeviceFaultCode::Unknown);
        tracker.record(1, &codes);
        tracker.record(2, &codes);
        let before = tracker.snapshot();

        let first = tracker.record(3, &codes);
        let again = tracker.record(3, &codes);
        assert_eq!(first, again);
        assert_eq!(first.len(), 1);
        assert_ne!(before, tracker.snapshot());

        let after_once = tracker.snapshot();
        tracker.record(3, &codes);
        assert_eq!(after_once, tracker.snapshot());
    }
}
