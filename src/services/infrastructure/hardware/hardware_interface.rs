/// 治具硬件接口定义及相关数据结构

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::enums::{ChannelGroup, Level, Port, DEVICES_PER_SHUTTLE};
use crate::services::traits::BaseService;
use crate::utils::error::{AppError, AppResult};

/// 硬件通信统计信息
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HardwareStats {
    /// 成功读取次数（端口与通道组合计）
    pub successful_reads: u64,
    /// 失败读取次数
    pub failed_reads: u64,
    /// 成功写入次数
    pub successful_writes: u64,
    /// 失败写入次数
    pub failed_writes: u64,
    /// 最后一次通信时间
    pub last_communication_time: Option<chrono::DateTime<chrono::Local>>,
}

/// 治具硬件接口
///
/// 一个数字量模块（执行机构与传感器）加三个模拟量模块（门极、相、源极各一组，每组9路）。
/// `initialize` 打开全部模块，`shutdown` 释放句柄。任何调用出错都由时序器当作测试台故障处理，
/// 实现内部不做重试。
#[async_trait]
pub trait HardwareInterface: BaseService {
    /// 写数字量端口
    async fn write_port(&self, port: Port, level: Level) -> AppResult<()>;

    /// 读数字量端口
    async fn read_port(&self, port: Port) -> AppResult<Level>;

    /// 读一组模拟量通道，返回每个位置的电压
    async fn read_channel_group(&self, group: ChannelGroup) -> AppResult<Vec<f64>>;

    /// 模块是否已打开
    fn is_open(&self) -> bool;

    /// 获取通信统计信息
    fn get_stats(&self) -> HardwareStats;
}

/// 校验通道组读数：个数必须等于位置数且全部为有限值
pub fn validate_channel_values(group: ChannelGroup, values: &[f64]) -> AppResult<()> {
    if values.len() != DEVICES_PER_SHUTTLE {
        return Err(AppError::hardware_io_error(format!(
            "通道组 {} 返回 {} 个值，应为 {}",
            group,
            values.len(),
            DEVICES_PER_SHUTTLE
        )));
    }
    if let Some(position) = values.iter().position(|v| !v.is_finite()) {
        return Err(AppError::hardware_io_error(format!(
            "通道组 {} 位置 {} 读数无效: {}",
            group, position, values[position]
        )));
    }
    Ok(())
}
