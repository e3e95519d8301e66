/// 在线键合缺陷测试台 - 测试时序器核心库
pub mod error;
pub mod logging;
pub mod models;
pub mod services;
pub mod utils;

use std::time::Duration;

use log::info;

// 重新导出常用类型，方便使用
pub use models::*;
pub use services::*;
pub use utils::{AppConfig, AppError, AppResult};

/// 控制台状态刷新周期
const CONSOLE_REFRESH: Duration = Duration::from_millis(500);

/// 按配置组装治具、时序器与控制台并运行到退出
///
/// 返回本次会话的统计。Ctrl-C 与控制台 `exit` 指令等价。
pub async fn run(config: AppConfig) -> AppResult<RunStatistics> {
    let hardware: Box<dyn HardwareInterface> = match config.fixture_config.interface_type.as_str() {
        "simulated" => {
            let fixture = SimulatedFixture::new(&config.fixture_config);
            // 演示运行：穿梭板源源不断地到达
            fixture.feed_shuttles(u64::MAX);
            Box::new(fixture)
        }
        other => {
            return Err(AppError::configuration_error(format!("不支持的治具接口类型: {}", other)));
        }
    };

    let (publisher, receiver) = snapshot_channel(config.test_config.snapshot_queue_capacity);
    let services = SequencerServices {
        hardware,
        credentials: Box::new(ConfigCredentialStore::from_config(&config.logon_config)),
        result_log: Box::new(JsonLinesResultLog::new(config.persistence_config.result_log_dir.clone())),
    };
    let (sequencer, handle) = TestSequencer::new(&config, services, publisher);

    info!(
        "[App] {} v{} 启动 ({})",
        config.app_settings.app_name, config.app_settings.app_version, config.app_settings.environment
    );

    let signal_handle = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("[App] 收到 Ctrl-C，请求退出");
            signal_handle.exit();
        }
    });

    let sequencer_task = tokio::spawn(sequencer.run());
    ConsolePresenter::new(handle, receiver, CONSOLE_REFRESH).run().await?;

    sequencer_task
        .await
        .map_err(|e| AppError::concurrency_error(format!("时序器任务异常结束: {}", e)))?
}
