use std::path::PathBuf;

use inline_tester::logging::init_logging;
use inline_tester::utils::ConfigManager;

/// 默认配置文件路径，可用 INLINE_CONFIG 覆盖
const DEFAULT_CONFIG_PATH: &str = "config/inline_tester.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("INLINE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    let mut config_manager = ConfigManager::new(config_path);
    config_manager.load_from_file().await?;
    config_manager.override_from_env();

    init_logging(&config_manager.get_config().logging_config)?;
    config_manager.validate_config()?;

    let statistics = inline_tester::run(config_manager.get_config().clone()).await?;
    log::info!(
        "[App] 退出。穿梭板 {} 块，器件 {} 个，合格 {}，不合格 {}，未键合 {}",
        statistics.shuttles_tested,
        statistics.total_tested,
        statistics.passed,
        statistics.failed,
        statistics.not_bonded
    );
    Ok(())
}
