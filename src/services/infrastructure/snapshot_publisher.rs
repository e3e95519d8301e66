/// 快照发布器
///
/// 时序器通过有界队列向展示层发布快照。发布端使用 `try_send`，队列满时丢弃新快照并计数，
/// 绝不阻塞时序器；接收端每个节拍取空队列，只保留最新一份。
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

use crate::models::structs::Snapshot;

/// 单次发布的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Queued,
    /// 队列已满，新快照被丢弃
    Dropped,
    /// 接收端已关闭
    Closed,
}

/// 发布端，由时序器独占
#[derive(Debug)]
pub struct SnapshotPublisher {
    sender: mpsc::Sender<Snapshot>,
    published: u64,
    dropped: u64,
    closed_reported: bool,
}

/// 接收端，由展示层持有
#[derive(Debug)]
pub struct SnapshotReceiver {
    receiver: mpsc::Receiver<Snapshot>,
}

/// 创建一对快照发布/接收端
pub fn snapshot_channel(capacity: usize) -> (SnapshotPublisher, SnapshotReceiver) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (
        SnapshotPublisher {
            sender,
            published: 0,
            dropped: 0,
            closed_reported: false,
        },
        SnapshotReceiver { receiver },
    )
}

impl SnapshotPublisher {
    /// 非阻塞发布
    pub fn publish(&mut self, snapshot: Snapshot) -> PublishOutcome {
        match self.sender.try_send(snapshot) {
            Ok(()) => {
                self.published += 1;
                PublishOutcome::Queued
            }
            Err(TrySendError::Full(dropped)) => {
                self.dropped += 1;
                debug!(
                    "[SnapshotPublisher] 队列已满，丢弃快照 #{} (累计丢弃 {})",
                    dropped.sequence, self.dropped
                );
                PublishOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => {
                if !self.closed_reported {
                    warn!("[SnapshotPublisher] 展示层已关闭，后续快照不再投递");
                    self.closed_reported = true;
                }
                PublishOutcome::Closed
            }
        }
    }

    pub fn published_count(&self) -> u64 {
        self.published
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }
}

impl SnapshotReceiver {
    /// 取空队列，返回最新的快照
    pub fn drain_latest(&mut self) -> Option<Snapshot> {
        let mut latest = None;
        loop {
            match self.receiver.try_recv() {
                Ok(snapshot) => latest = Some(snapshot),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        latest
    }

    /// 取空队列，按发布顺序返回全部快照
    pub fn drain_all(&mut self) -> Vec<Snapshot> {
        let mut snapshots = Vec::new();
        while let Ok(snapshot) = self.receiver.try_recv() {
            snapshots.push(snapshot);
        }
        snapshots
    }

    /// 等待下一份快照，发布端关闭后返回 None
    pub async fn recv(&mut self) -> Option<Snapshot> {
        self.receiver.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::{OperatingMode, SequencerState, TesterStatus, DEVICES_PER_SHUTTLE};
    use crate::models::structs::{MeasurementSet, RunStatistics};
    use crate::models::DeviceFaultCode;
    use uuid::Uuid;

    fn snapshot(sequence: u64) -> Snapshot {
        Snapshot {
            session_id: Uuid::nil(),
            sequence,
            timestamp: chrono::Local::now(),
            measurements: MeasurementSet::default(),
            device_codes: vec![DeviceFaultCode::NoResult; DEVICES_PER_SHUTTLE],
            history: Vec::new(),
            tester_status: TesterStatus::NoResult,
            fault_reason: None,
            statistics: RunStatistics::default(),
            previous_state: SequencerState::Entry,
            current_state: SequencerState::Entry,
            next_state: SequencerState::Logon,
            mode: OperatingMode::Production,
            current_step: None,
            lot_code: None,
            serial_number: None,
        }
    }

    /// 队列满时丢弃新快照且立即返回
    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (mut publisher, mut receiver) = snapshot_channel(20);
        for sequence in 0..20 {
            assert_eq!(publisher.publish(snapshot(sequence)), PublishOutcome::Queued);
        }
        assert_eq!(publisher.publish(snapshot(20)), PublishOutcome::Dropped);
        assert_eq!(publisher.dropped_count(), 1);
        assert_eq!(publisher.published_count(), 20);

        // 被丢弃的是新快照，队尾仍是第20份
        let latest = receiver.drain_latest().unwrap();
        assert_eq!(latest.sequence, 19);
        assert!(receiver.drain_latest().is_none());
    }

    #[test]
    fn test_drain_all_preserves_order() {
        let (mut publisher, mut receiver) = snapshot_channel(4);
        for sequence in 0..3 {
            publisher.publish(snapshot(sequence));
        }
        let sequences: Vec<u64> = receiver.drain_all().iter().map(|s| s.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);
    }

    #[test]
    fn test_closed_receiver() {
        let (mut publisher, receiver) = snapshot_channel(2);
        drop(receiver);
        assert_eq!(publisher.publish(snapshot(0)), PublishOutcome::Closed);
        assert_eq!(publisher.publish(snapshot(1)), PublishOutcome::Closed);
    }
}
