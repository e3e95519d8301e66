/// 治具硬件相关模块

/// 硬件接口定义
pub mod hardware_interface;

/// 模拟治具实现（用于演示运行和测试）
pub mod simulated_fixture;


// 重新导出主要接口和类型
pub use hardware_interface::*;
pub use simulated_fixture::*;
