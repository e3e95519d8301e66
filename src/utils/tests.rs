#[cfg(test)]
mod tests {
    use crate::models::enums::AccessLevel;
    use crate::utils::config::{AppConfig, ConfigManager, UserAccount};
    use crate::utils::error::{AppError, AppResult};
    use crate::utils::time_utils;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::tempdir;

    /// 测试AppError的创建和错误代码
    #[test]
    fn test_app_error_creation() {
        let error = AppError::generic("测试错误");
        assert_eq!(error.error_code(), "GENERIC");
        assert!(error.to_string().contains("测试错误"));

        let hw_error = AppError::hardware_io_error("模拟量模块断开");
        assert_eq!(hw_error.error_code(), "HARDWARE_IO_ERROR");
        assert!(hw_error.to_string().contains("模拟量模块断开"));

        let timeout = AppError::actuator_timeout("SHUTTLE_VALVE", 2500);
        assert_eq!(timeout.error_code(), "ACTUATOR_TIMEOUT");
        assert!(timeout.to_string().contains("2500ms"));

        let permission = AppError::permission_error("生产模式不允许手动操作");
        assert_eq!(permission.error_code(), "PERMISSION_ERROR");
    }

    /// 治具故障错误信息包含步骤、位置和限值
    #[test]
    fn test_fixture_fault_message() {
        let error = AppError::fixture_fault("Selftest1", "Gate", 4, 5.2, 5.65, 5.85);
        assert_eq!(error.error_code(), "FIXTURE_FAULT");
        let text = error.to_string();
        assert!(text.contains("Selftest1"));
        assert!(text.contains("位置 4"));
        assert!(text.contains("5.200V"));
    }

    /// 测试错误转换 (From trait)
    #[test]
    fn test_error_conversion() {
        let string_error: AppError = String::from("字符串错误").into();
        assert_eq!(string_error.error_code(), "GENERIC");

        let str_error: AppError = "字符串错误".into();
        assert_eq!(str_error.error_code(), "GENERIC");

        let json_error: Result<serde_json::Value, serde_json::Error> =
            serde_json::from_str("{invalid json}");
        match json_error {
            Err(e) => {
                let app_error: AppError = e.into();
                assert_eq!(app_error.error_code(), "JSON_ERROR");
            }
            Ok(_) => panic!("应该产生JSON错误"),
        }

        let io_error: AppError = std::io::Error::new(std::io::ErrorKind::NotFound, "缺失").into();
        assert_eq!(io_error.error_code(), "IO_ERROR");
    }

    /// 测试状态转换错误
    #[test]
    fn test_state_transition_error() {
        let error = AppError::state_transition_error("IDLE", "EVALUATE", "跳过了 TESTING");
        assert_eq!(error.error_code(), "STATE_TRANSITION_ERROR");
        assert!(error.to_string().contains("从 IDLE 到 EVALUATE"));
    }

    /// 测试配置默认值
    #[test]
    fn test_app_config_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.app_settings.app_name, "InlineTester");
        assert_eq!(config.fixture_config.interface_type, "simulated");
        assert_eq!(config.fixture_config.module_serials.len(), 4);
        assert_eq!(config.fixture_config.shuttle_tick_ms, 50);
        assert_eq!(config.fixture_config.shuttle_max_ticks, 50);

        assert_eq!(config.test_config.settling_time_ms, 300);
        assert_eq!(config.test_config.init_settling_time_ms, 500);
        assert_eq!(config.test_config.history_depth, 3);
        assert_eq!(config.test_config.snapshot_queue_capacity, 20);
        assert_eq!(config.test_config.present_debounce_polls, 1);
        assert!(!config.test_config.require_serial_number);

        assert!(!config.logon_config.skip_logon);
        assert_eq!(config.logging_config.log_level, "info");
    }

    /// 部分字段缺失的配置文件按默认值补齐
    #[tokio::test]
    async fn test_partial_config_file_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("partial.json");
        tokio::fs::write(
            &config_path,
            r#"{ "test_config": { "settling_time_ms": 10, "init_settling_time_ms": 20,
                 "shuttle_transit_time_ms": 0, "cycle_delay_ms": 0, "halt_poll_ms": 0,
                 "idle_poll_ms": 0, "present_poll_ms": 0, "present_debounce_polls": 5,
                 "require_serial_number": true, "require_lot_code": false,
                 "history_depth": 4, "snapshot_queue_capacity": 8 } }"#,
        )
        .await
        .unwrap();

        let mut manager = ConfigManager::new(config_path);
        manager.load_from_file().await.unwrap();

        let config = manager.get_config();
        assert_eq!(config.test_config.settling_time_ms, 10);
        assert_eq!(config.test_config.present_debounce_polls, 5);
        assert_eq!(config.test_config.history_depth, 4);
        assert!(config.test_config.require_serial_number);
        assert_eq!(config.fixture_config.interface_type, "simulated");
        assert!(manager.validate_config().is_ok());
    }

    /// 测试配置管理器保存与加载
    #[tokio::test]
    async fn test_config_manager_basic_operations() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("config").join("inline_tester.json");

        // 文件不存在时写出默认配置
        let mut manager = ConfigManager::new(config_path.clone());
        manager.load_from_file().await.unwrap();
        assert!(config_path.exists());

        manager.get_config_mut().app_settings.app_name = "测试台A".to_string();
        manager.get_config_mut().logon_config.users.push(UserAccount {
            username: "service".to_string(),
            password_hash: "$2b$04$placeholderplaceholderplaceholderplace".to_string(),
            access_level: AccessLevel::Service,
        });
        manager.save_to_file().await.unwrap();

        let mut new_manager = ConfigManager::new(config_path);
        new_manager.load_from_file().await.unwrap();

        assert_eq!(new_manager.get_config().app_settings.app_name, "测试台A");
        assert_eq!(new_manager.get_config().logon_config.users.len(), 1);
        assert_eq!(
            new_manager.get_config().logon_config.users[0].access_level,
            AccessLevel::Service
        );
    }

    /// 测试配置验证
    #[test]
    fn test_config_validation() {
        let mut manager = ConfigManager::new(PathBuf::from("unused.json"));
        assert!(manager.validate_config().is_ok());

        manager.get_config_mut().test_config.history_depth = 1;
        assert!(manager.validate_config().is_err());

        manager.reset_to_default();
        manager.get_config_mut().test_config.snapshot_queue_capacity = 0;
        assert!(manager.validate_config().is_err());

        manager.reset_to_default();
        manager.get_config_mut().test_config.present_debounce_polls = 0;
        assert!(manager.validate_config().is_err());

        manager.reset_to_default();
        manager.get_config_mut().logging_config.log_level = "verbose".to_string();
        assert!(manager.validate_config().is_err());

        manager.reset_to_default();
        manager.get_config_mut().fixture_config.interface_type = "modbus".to_string();
        assert!(manager.validate_config().is_err());
    }

    /// 测试环境变量覆盖
    #[test]
    fn test_env_override() {
        std::env::set_var("INLINE_LOG_LEVEL", "DEBUG");
        std::env::set_var("INLINE_REQUIRE_SN", "true");
        std::env::set_var("INLINE_REQUIRE_LOT", "1");
        std::env::set_var("INLINE_SKIP_LOGON", "yes");
        std::env::set_var("INLINE_RESULT_DIR", "/tmp/inline_results");

        let mut manager = ConfigManager::new(PathBuf::from("unused.json"));
        manager.override_from_env();

        let config = manager.get_config();
        assert_eq!(config.logging_config.log_level, "debug");
        assert!(config.test_config.require_serial_number);
        assert!(config.test_config.require_lot_code);
        assert!(config.logon_config.skip_logon);
        assert_eq!(
            config.persistence_config.result_log_dir,
            PathBuf::from("/tmp/inline_results")
        );

        std::env::remove_var("INLINE_LOG_LEVEL");
        std::env::remove_var("INLINE_REQUIRE_SN");
        std::env::remove_var("INLINE_REQUIRE_LOT");
        std::env::remove_var("INLINE_SKIP_LOGON");
        std::env::remove_var("INLINE_RESULT_DIR");
    }

    /// 测试AppResult类型别名
    #[test]
    fn test_app_result() {
        let error: AppResult<String> = Err(AppError::validation_error("批次号为空"));
        match error {
            Err(e) => assert_eq!(e.error_code(), "VALIDATION_ERROR"),
            Ok(_) => panic!("应该是错误"),
        }
    }

    #[test]
    fn test_time_utils() {
        assert_eq!(time_utils::elapsed_secs(Duration::from_millis(12_345)), 12.345);
        let stamp = time_utils::day_stamp(&time_utils::now_local());
        assert_eq!(stamp.len(), 10);
    }
}
