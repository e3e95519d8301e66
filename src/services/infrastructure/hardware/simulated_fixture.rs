/// 模拟治具实现
/// 按执行机构的当前状态计算每个位置的门极/相/源极电压，支持器件缺陷与通信故障注入。
/// 既用于无硬件时的演示运行，也作为测试替身使用。

use async_trait::async_trait;
use chrono::Local;
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::hardware_interface::{HardwareInterface, HardwareStats};
use crate::models::enums::{ChannelGroup, Level, Port, DEVICES_PER_SHUTTLE};
use crate::services::traits::BaseService;
use crate::utils::config::FixtureConfig;
use crate::utils::error::{AppError, AppResult};

/// 可注入的器件缺陷
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DutDefect {
    /// 门极-源极短路
    GateSourceShort,
    /// 漏极-源极短路
    DrainSourceShort,
    /// 引线未键合
    NotBonded,
    /// 探针未接触，所有读数为零
    OpenContact,
}

/// 写入操作记录
/// 用于测试验证执行机构动作顺序
#[derive(Debug, Clone)]
pub struct PortWrite {
    pub timestamp: chrono::DateTime<Local>,
    pub port: Port,
    pub level: Level,
}

#[derive(Debug)]
struct FixtureState {
    open: bool,
    outputs: HashMap<Port, Level>,
    defects: [Option<DutDefect>; DEVICES_PER_SHUTTLE],
    /// 排队等待测试的穿梭板数量，队首即当前到位的板
    pending_shuttles: u64,
    /// 接下来若干次到位检测读为“无板”，模拟传感器抖动
    absent_reads: u32,
    stuck_valve: bool,
    fail_open: bool,
    failing_ports: HashSet<Port>,
    failing_groups: HashSet<ChannelGroup>,
    channel_overrides: HashMap<ChannelGroup, Vec<f64>>,
}

impl Default for FixtureState {
    fn default() -> Self {
        Self {
            open: false,
            outputs: HashMap::new(),
            defects: [None; DEVICES_PER_SHUTTLE],
            pending_shuttles: 0,
            absent_reads: 0,
            stuck_valve: false,
            fail_open: false,
            failing_ports: HashSet::new(),
            failing_groups: HashSet::new(),
            channel_overrides: HashMap::new(),
        }
    }
}

impl FixtureState {
    fn output(&self, port: Port) -> Level {
        self.outputs.get(&port).copied().unwrap_or(Level::Clear)
    }

    fn contacted(&self) -> bool {
        self.output(Port::ShuttleValve) == Level::Set && self.pending_shuttles > 0
    }

    /// 单个位置在当前激励下的 (门极, 相, 源极) 电压
    fn response(&self, position: usize) -> (f64, f64, f64) {
        let gate_on = self.output(Port::GateOn) == Level::Set;
        let phase_on = self.output(Port::PhaseOn) == Level::Set;
        let forward = self.output(Port::PhaseReverseOff) == Level::Set;

        if !self.contacted() {
            // 治具空载，仅驱动电源本身
            let gate = if gate_on { 5.75 } else { 0.0 };
            let phase = match (phase_on, forward) {
                (false, _) => 0.0,
                (true, true) => 7.8,
                (true, false) => -7.85,
            };
            return (gate, phase, 0.0);
        }

        let defect = self.defects[position];
        if defect == Some(DutDefect::OpenContact) {
            return (0.0, 0.0, 0.0);
        }

        match (gate_on, phase_on, forward) {
            // 相电压反向
            (false, true, false) => match defect {
                Some(DutDefect::NotBonded) => (-0.185, -7.7, -0.5),
                _ => (-0.185, -7.5, -0.67),
            },
            // 门极开、相电压关
            (true, false, _) => match defect {
                Some(DutDefect::GateSourceShort) => (4.0, 0.04, 0.09),
                _ => (5.22, 0.04, 0.07),
            },
            // 门极开、相电压正向
            (true, true, true) => match defect {
                Some(DutDefect::GateSourceShort) => (4.0, 7.5, 0.765),
                Some(DutDefect::NotBonded) => (5.3, 7.5, 0.5),
                _ => (5.3, 7.5, 0.765),
            },
            // 门极关、相电压正向
            (false, true, true) => match defect {
                Some(DutDefect::DrainSourceShort) => (0.07, 7.78, 0.3),
                _ => (0.07, 7.78, 0.16),
            },
            (true, true, false) => (5.3, -7.5, -0.6),
            (false, false, _) => (0.0, 0.0, 0.0),
        }
    }
}

/// 模拟治具
/// 克隆出的实例共享同一份内部状态，测试可以在时序器运行时继续注入故障
#[derive(Debug, Clone)]
pub struct SimulatedFixture {
    module_serials: Vec<String>,
    noise_volts: f64,
    state: Arc<Mutex<FixtureState>>,
    write_log: Arc<Mutex<Vec<PortWrite>>>,
    stats: Arc<Mutex<HardwareStats>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimulatedFixture {
    /// 按配置创建模拟治具
    pub fn new(config: &FixtureConfig) -> Self {
        Self {
            module_serials: config.module_serials.clone(),
            noise_volts: config.simulated_noise_volts.abs(),
            state: Arc::new(Mutex::new(FixtureState::default())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            stats: Arc::new(Mutex::new(HardwareStats::default())),
        }
    }

    /// 创建用于测试的模拟治具，无测量噪声
    pub fn new_for_testing() -> Self {
        let config = FixtureConfig {
            simulated_noise_volts: 0.0,
            ..FixtureConfig::default()
        };
        Self::new(&config)
    }

    /// 追加待测穿梭板
    pub fn feed_shuttles(&self, count: u64) {
        let mut state = lock(&self.state);
        state.pending_shuttles = state.pending_shuttles.saturating_add(count);
    }

    pub fn pending_shuttles(&self) -> u64 {
        lock(&self.state).pending_shuttles
    }

    /// 设置指定位置的器件缺陷，None 表示良品
    pub fn set_defect(&self, position: usize, defect: Option<DutDefect>) {
        if let Some(slot) = lock(&self.state).defects.get_mut(position) {
            *slot = defect;
        }
    }

    pub fn clear_defects(&self) {
        lock(&self.state).defects = [None; DEVICES_PER_SHUTTLE];
    }

    /// 接下来 `count` 次到位检测读为无板
    pub fn inject_absent_reads(&self, count: u32) {
        lock(&self.state).absent_reads = count;
    }

    /// 穿梭气缸卡滞，位置传感器永不到位
    pub fn set_stuck_valve(&self, stuck: bool) {
        lock(&self.state).stuck_valve = stuck;
    }

    /// 打开模块时失败
    pub fn set_open_failure(&self, fail: bool) {
        lock(&self.state).fail_open = fail;
    }

    /// 注入端口通信故障
    pub fn inject_port_fault(&self, port: Port) {
        lock(&self.state).failing_ports.insert(port);
    }

    /// 注入通道组读取故障
    pub fn inject_channel_fault(&self, group: ChannelGroup) {
        lock(&self.state).failing_groups.insert(group);
    }

    /// 用固定读数覆盖通道组（可以是错误长度或非有限值）
    pub fn override_channel(&self, group: ChannelGroup, values: Vec<f64>) {
        lock(&self.state).channel_overrides.insert(group, values);
    }

    /// 清除所有注入的通信故障与读数覆盖
    pub fn clear_faults(&self) {
        let mut state = lock(&self.state);
        state.failing_ports.clear();
        state.failing_groups.clear();
        state.channel_overrides.clear();
        state.absent_reads = 0;
        state.stuck_valve = false;
        state.fail_open = false;
    }

    /// 端口当前输出电平
    pub fn output_level(&self, port: Port) -> Level {
        lock(&self.state).output(port)
    }

    /// 获取写入日志
    pub fn get_write_log(&self) -> Vec<PortWrite> {
        lock(&self.write_log).clone()
    }

    /// 清空写入日志
    pub fn clear_write_log(&self) {
        lock(&self.write_log).clear();
    }

    /// 检查是否写入过指定端口
    pub fn was_port_written(&self, port: Port) -> bool {
        lock(&self.write_log).iter().any(|op| op.port == port)
    }

    fn update_stats<F>(&self, updater: F)
    where
        F: FnOnce(&mut HardwareStats),
    {
        let mut stats = lock(&self.stats);
        updater(&mut stats);
        stats.last_communication_time = Some(Local::now());
    }

    fn ensure_open(state: &FixtureState) -> AppResult<()> {
        if state.open {
            Ok(())
        } else {
            Err(AppError::hardware_io_error("采集模块未打开"))
        }
    }

    fn noise(&self) -> f64 {
        if self.noise_volts > 0.0 {
            rand::thread_rng().gen_range(-self.noise_volts..=self.noise_volts)
        } else {
            0.0
        }
    }
}

#[async_trait]
impl BaseService for SimulatedFixture {
    fn service_name(&self) -> &'static str {
        "SimulatedFixture"
    }

    async fn initialize(&mut self) -> AppResult<()> {
        let mut state = lock(&self.state);
        if state.fail_open {
            return Err(AppError::hardware_io_error(format!(
                "无法打开采集模块: {}",
                self.module_serials.join(", ")
            )));
        }
        state.open = true;
        log::info!("[Fixture] 已打开采集模块: {}", self.module_serials.join(", "));
        Ok(())
    }

    async fn shutdown(&mut self) -> AppResult<()> {
        lock(&self.state).open = false;
        log::info!("[Fixture] 已释放采集模块");
        Ok(())
    }

    async fn health_check(&self) -> AppResult<()> {
        Self::ensure_open(&lock(&self.state))
    }
}

#[async_trait]
impl HardwareInterface for SimulatedFixture {
    async fn write_port(&self, port: Port, level: Level) -> AppResult<()> {
        let result = {
            let mut state = lock(&self.state);
            Self::ensure_open(&state).and_then(|_| {
                if port.is_input() {
                    return Err(AppError::hardware_io_error(format!("端口 {} 为输入，不能写入", port)));
                }
                if state.failing_ports.contains(&port) {
                    return Err(AppError::hardware_io_error(format!("写端口 {} 失败", port)));
                }
                // 挡停落下时当前穿梭板离开
                if port == Port::StopperValve
                    && level == Level::Clear
                    && state.output(Port::StopperValve) == Level::Set
                    && state.pending_shuttles > 0
                {
                    state.pending_shuttles -= 1;
                }
                state.outputs.insert(port, level);
                Ok(())
            })
        };

        match &result {
            Ok(()) => {
                lock(&self.write_log).push(PortWrite {
                    timestamp: Local::now(),
                    port,
                    level,
                });
                self.update_stats(|stats| stats.successful_writes += 1);
            }
            Err(_) => self.update_stats(|stats| stats.failed_writes += 1),
        }
        result
    }

    async fn read_port(&self, port: Port) -> AppResult<Level> {
        let result = {
            let mut state = lock(&self.state);
            Self::ensure_open(&state).and_then(|_| {
                if state.failing_ports.contains(&port) {
                    return Err(AppError::hardware_io_error(format!("读端口 {} 失败", port)));
                }
                let valve = state.output(Port::ShuttleValve);
                // 传感器低电平有效
                let level = match port {
                    Port::ShuttleAvailable if state.absent_reads > 0 => {
                        state.absent_reads -= 1;
                        Level::Set
                    }
                    Port::ShuttleAvailable => Level::from(state.pending_shuttles == 0),
                    Port::ShuttleUpperPosition => {
                        Level::from(state.stuck_valve || valve != Level::Set)
                    }
                    Port::ShuttleLowerPosition => {
                        Level::from(state.stuck_valve || valve != Level::Clear)
                    }
                    other => state.output(other),
                };
                Ok(level)
            })
        };

        match &result {
            Ok(_) => self.update_stats(|stats| stats.successful_reads += 1),
            Err(_) => self.update_stats(|stats| stats.failed_reads += 1),
        }
        result
    }

    async fn read_channel_group(&self, group: ChannelGroup) -> AppResult<Vec<f64>> {
        let result = {
            let state = lock(&self.state);
            Self::ensure_open(&state).and_then(|_| {
                if state.failing_groups.contains(&group) {
                    return Err(AppError::hardware_io_error(format!("读取通道组 {} 失败", group)));
                }
                if let Some(values) = state.channel_overrides.get(&group) {
                    return Ok(values.clone());
                }
                let values = (0..DEVICES_PER_SHUTTLE)
                    .map(|position| {
                        let (gate, phase, source) = state.response(position);
                        let value = match group {
                            ChannelGroup::Gate => gate,
                            ChannelGroup::Phase => phase,
                            ChannelGroup::Source => source,
                        };
                        value + self.noise()
                    })
                    .collect();
                Ok(values)
            })
        };

        match &result {
            Ok(_) => self.update_stats(|stats| stats.successful_reads += 1),
            Err(_) => self.update_stats(|stats| stats.failed_reads += 1),
        }
        result
    }

    fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    fn get_stats(&self) -> HardwareStats {
        lock(&self.stats).clone()
    }
}
