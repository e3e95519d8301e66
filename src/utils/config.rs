use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::models::enums::AccessLevel;
use crate::utils::error::{AppError, AppResult};

/// 测试台主配置结构
/// 包含运行时序器、硬件接口、登录、日志与结果记录所需的全部配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 应用程序基本设置
    #[serde(default)]
    pub app_settings: AppSettings,
    /// 治具/硬件接口配置
    #[serde(default)]
    pub fixture_config: FixtureConfig,
    /// 测试时序配置
    #[serde(default)]
    pub test_config: TestConfig,
    /// 登录配置
    #[serde(default)]
    pub logon_config: LogonConfig,
    /// 日志配置
    #[serde(default)]
    pub logging_config: LoggingConfig,
    /// 结果记录配置
    #[serde(default)]
    pub persistence_config: PersistenceConfig,
}

/// 应用程序基本设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// 应用程序名称
    pub app_name: String,
    /// 应用程序版本
    pub app_version: String,
    /// 运行环境 (development, testing, production)
    pub environment: String,
    /// 是否启用调试模式（调试模式下每个班次结束记录统计）
    pub debug_mode: bool,
}

/// 治具/硬件接口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureConfig {
    /// 接口类型，目前仅支持 simulated
    pub interface_type: String,
    /// 采集模块序列号（数字量模块在前，三个模拟量模块在后）
    pub module_serials: Vec<String>,
    /// 穿梭气缸到位检测节拍（毫秒）
    pub shuttle_tick_ms: u64,
    /// 穿梭气缸到位检测最大节拍数
    pub shuttle_max_ticks: u32,
    /// 模拟治具的测量噪声幅值（伏）
    pub simulated_noise_volts: f64,
}

/// 测试时序配置
///
/// 所有等待时间都集中在这里，测试中可以整体置零
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestConfig {
    /// 每个测试步骤的基础稳定时间（毫秒）
    pub settling_time_ms: u64,
    /// INIT 自检稳定时间（毫秒）
    pub init_settling_time_ms: u64,
    /// 穿梭板放行后的运输时间（毫秒）
    pub shuttle_transit_time_ms: u64,
    /// 主循环每轮的间隔（毫秒）
    pub cycle_delay_ms: u64,
    /// HALT/LOGON 状态的轮询间隔（毫秒）
    pub halt_poll_ms: u64,
    /// IDLE 无板时的轮询间隔（毫秒）
    pub idle_poll_ms: u64,
    /// IDLE 检测到板时的去抖轮询间隔（毫秒）
    pub present_poll_ms: u64,
    /// 到位信号需连续有效的次数
    pub present_debounce_polls: u32,
    /// 是否需要扫描序列号
    pub require_serial_number: bool,
    /// 是否需要输入批次号
    pub require_lot_code: bool,
    /// 历史窗口深度（连续出现该次数的同一故障码视为治具故障）
    pub history_depth: usize,
    /// 快照队列容量
    pub snapshot_queue_capacity: usize,
}

/// 单个用户账户
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAccount {
    pub username: String,
    /// bcrypt 哈希
    pub password_hash: String,
    pub access_level: AccessLevel,
}

/// 登录配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogonConfig {
    /// 跳过密码验证，直接以生产权限进入
    pub skip_logon: bool,
    pub users: Vec<UserAccount>,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 日志文件路径
    pub log_file_path: Option<PathBuf>,
    /// 是否启用控制台输出
    pub console_output: bool,
    /// 是否启用文件输出
    pub file_output: bool,
}

/// 结果记录配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// 结果文件目录，每天一个 JSON Lines 文件
    pub result_log_dir: PathBuf,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            app_name: "InlineTester".to_string(),
            app_version: "1.0.0".to_string(),
            environment: "production".to_string(),
            debug_mode: false,
        }
    }
}

impl Default for FixtureConfig {
    fn default() -> Self {
        Self {
            interface_type: "simulated".to_string(),
            module_serials: vec![
                "470011540".to_string(),
                "470019120".to_string(),
                "470019105".to_string(),
                "470019066".to_string(),
            ],
            shuttle_tick_ms: 50,
            shuttle_max_ticks: 50,
            simulated_noise_volts: 0.002,
        }
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            settling_time_ms: 300,
            init_settling_time_ms: 500,
            shuttle_transit_time_ms: 500,
            cycle_delay_ms: 100,
            halt_poll_ms: 1000,
            idle_poll_ms: 500,
            present_poll_ms: 100,
            present_debounce_polls: 1,
            require_serial_number: false,
            require_lot_code: false,
            history_depth: 3,
            snapshot_queue_capacity: 20,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_file_path: Some(PathBuf::from("logs/inline_tester.log")),
            console_output: true,
            file_output: false,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            result_log_dir: PathBuf::from("results"),
        }
    }
}

impl TestConfig {
    /// 所有延时为零的配置，用于单元测试和集成测试
    pub fn without_delays() -> Self {
        Self {
            settling_time_ms: 0,
            init_settling_time_ms: 0,
            shuttle_transit_time_ms: 0,
            cycle_delay_ms: 0,
            halt_poll_ms: 0,
            idle_poll_ms: 0,
            present_poll_ms: 0,
            ..Self::default()
        }
    }

    pub fn settling_time(&self) -> Duration {
        Duration::from_millis(self.settling_time_ms)
    }

    pub fn init_settling_time(&self) -> Duration {
        Duration::from_millis(self.init_settling_time_ms)
    }
}

/// 配置管理器
/// 负责加载、保存和校验测试台配置
pub struct ConfigManager {
    config: AppConfig,
    config_file_path: PathBuf,
}

impl ConfigManager {
    /// 创建新的配置管理器
    pub fn new(config_file_path: PathBuf) -> Self {
        Self {
            config: AppConfig::default(),
            config_file_path,
        }
    }

    /// 从文件加载配置
    ///
    /// 文件不存在时写出默认配置。缺失的字段按默认值补齐。
    pub async fn load_from_file(&mut self) -> AppResult<()> {
        if !self.config_file_path.exists() {
            log::info!("[Config] 配置文件不存在，写出默认配置: {:?}", self.config_file_path);
            self.save_to_file().await?;
            return Ok(());
        }

        let path = self.config_file_path.clone();
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_path()).format(config::FileFormat::Json))
            .build()?;

        self.config = settings.try_deserialize().map_err(|e| {
            AppError::configuration_error(format!("解析配置文件失败: {}", e))
        })?;

        log::info!("[Config] 已加载配置文件: {:?}", self.config_file_path);
        Ok(())
    }

    /// 将配置保存到文件
    pub async fn save_to_file(&self) -> AppResult<()> {
        if let Some(parent) = self.config_file_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await.map_err(|e| {
                    AppError::io_error(format!("创建配置目录失败: {}", e), e.kind().to_string())
                })?;
            }
        }

        let content = serde_json::to_string_pretty(&self.config)
            .map_err(|e| AppError::json_error(format!("序列化配置失败: {}", e)))?;

        tokio::fs::write(&self.config_file_path, content)
            .await
            .map_err(|e| AppError::io_error(format!("写入配置文件失败: {}", e), e.kind().to_string()))?;

        Ok(())
    }

    /// 从环境变量覆盖配置
    pub fn override_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("INLINE_LOG_LEVEL") {
            self.config.logging_config.log_level = log_level.to_lowercase();
        }
        if let Ok(flag) = std::env::var("INLINE_REQUIRE_SN") {
            self.config.test_config.require_serial_number = parse_flag(&flag);
        }
        if let Ok(flag) = std::env::var("INLINE_REQUIRE_LOT") {
            self.config.test_config.require_lot_code = parse_flag(&flag);
        }
        if let Ok(flag) = std::env::var("INLINE_SKIP_LOGON") {
            self.config.logon_config.skip_logon = parse_flag(&flag);
        }
        if let Ok(dir) = std::env::var("INLINE_RESULT_DIR") {
            self.config.persistence_config.result_log_dir = PathBuf::from(dir);
        }
    }

    /// 获取配置的只读引用
    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    /// 获取配置的可变引用
    pub fn get_config_mut(&mut self) -> &mut AppConfig {
        &mut self.config
    }

    /// 验证配置的有效性
    pub fn validate_config(&self) -> AppResult<()> {
        let test = &self.config.test_config;

        if test.history_depth < 2 {
            return Err(AppError::configuration_error(format!(
                "历史窗口深度至少为2，当前为 {}",
                test.history_depth
            )));
        }

        if test.snapshot_queue_capacity == 0 {
            return Err(AppError::configuration_error("快照队列容量不能为0"));
        }

        if test.present_debounce_polls == 0 {
            return Err(AppError::configuration_error("到位去抖次数不能为0"));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.config.logging_config.log_level.as_str()) {
            return Err(AppError::configuration_error(format!(
                "无效的日志级别: {}，有效值: {:?}",
                self.config.logging_config.log_level, valid_log_levels
            )));
        }

        let valid_interfaces = ["simulated"];
        if !valid_interfaces.contains(&self.config.fixture_config.interface_type.as_str()) {
            return Err(AppError::configuration_error(format!(
                "无效的硬件接口类型: {}，有效值: {:?}",
                self.config.fixture_config.interface_type, valid_interfaces
            )));
        }

        if self.config.fixture_config.shuttle_max_ticks == 0 {
            return Err(AppError::configuration_error("穿梭气缸最大节拍数不能为0"));
        }

        if !self.config.logon_config.skip_logon && self.config.logon_config.users.is_empty() {
            crate::log_config_warning!("未配置任何用户且未启用跳过登录，时序器将停留在 LOGON");
        }

        Ok(())
    }

    /// 重置为默认配置
    pub fn reset_to_default(&mut self) {
        self.config = AppConfig::default();
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}
