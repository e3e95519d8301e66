/// 基础设施层服务模块
/// 负责与外部系统的交互：治具硬件、展示层快照队列、结果文件

/// 治具硬件相关模块
pub mod hardware;

/// 快照发布器
pub mod snapshot_publisher;

/// 结果记录
pub mod result_log;

// 重新导出常用接口和实现
pub use hardware::*;
pub use snapshot_publisher::{snapshot_channel, PublishOutcome, SnapshotPublisher, SnapshotReceiver};
pub use result_log::{JsonLinesResultLog, MemoryResultLog, ResultLog};
