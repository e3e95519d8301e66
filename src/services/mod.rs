/// 服务层模块
///
/// 按照清洁架构原则组织：
/// - Application Layer: 操作员接口与展示
/// - Domain Layer: 测试协议、判定、分类与时序状态机
/// - Infrastructure Layer: 治具硬件、快照队列、结果记录

/// 应用层服务模块
pub mod application;

/// 领域层服务模块
pub mod domain;

/// 基础设施层服务模块
pub mod infrastructure;

/// 服务层基础trait定义
pub mod traits;

// 重新导出基础trait
pub use traits::BaseService;

// 重新导出应用层服务
pub use application::{ConfigCredentialStore, ConsolePresenter, CredentialVerifier, OperatorCommand, SequencerHandle};

// 重新导出领域层服务
pub use domain::{SequencerServices, TestSequencer};

// 重新导出基础设施层的主要类型
pub use infrastructure::{
    snapshot_channel, HardwareInterface, JsonLinesResultLog, MemoryResultLog, ResultLog, SimulatedFixture,
    SnapshotPublisher, SnapshotReceiver,
};
