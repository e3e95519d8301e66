/// 控制台 + 文件双输出的 Logger 实现

use super::*;
use chrono::Local;
use log::{Log, Metadata, Record};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write as IoWrite};
use std::sync::{Arc, Mutex};

use crate::utils::error::{AppError, AppResult};
use crate::utils::time_utils::TIMESTAMP_FORMAT;

/// 简化版Logger - 实现log::Log trait
pub struct SimpleLogger {
    config: LoggerConfig,
    file_writer: Arc<Mutex<Option<BufWriter<std::fs::File>>>>,
}

impl SimpleLogger {
    pub fn new(config: LoggerConfig) -> Self {
        Self {
            config,
            file_writer: Arc::new(Mutex::new(None)),
        }
    }

    /// 打开日志文件并注册为全局 logger
    pub fn init(self) -> AppResult<()> {
        for target in &self.config.targets {
            if let LogTarget::File { path } = target {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }

                let file = OpenOptions::new().create(true).append(true).open(path)?;

                let mut writer_guard = self
                    .file_writer
                    .lock()
                    .map_err(|_| AppError::concurrency_error("文件写入器锁定失败"))?;
                *writer_guard = Some(BufWriter::new(file));
                break; // 只处理第一个文件目标
            }
        }

        let level = self.config.level;
        log::set_boxed_logger(Box::new(self))
            .map_err(|e| AppError::configuration_error(format!("注册日志器失败: {}", e)))?;
        log::set_max_level(level.into());

        Ok(())
    }

    fn write_to_console(&self, record: &Record) {
        let message = format!(
            "[{}] [{}] {}",
            Local::now().format(TIMESTAMP_FORMAT),
            record.level(),
            record.args()
        );

        match record.level() {
            log::Level::Error => {
                eprintln!("\x1b[31m{}\x1b[0m", message);
                let _ = std::io::stderr().flush();
            }
            log::Level::Warn => {
                eprintln!("\x1b[33m{}\x1b[0m", message);
                let _ = std::io::stderr().flush();
            }
            _ => {
                println!("{}", message);
                let _ = std::io::stdout().flush();
            }
        }
    }

    fn format_file_line(&self, record: &Record) -> String {
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        match self.config.format {
            LogFormat::Plain => format!(
                "[{}] [{}] [{}] - {}\n",
                timestamp,
                record.level(),
                record.target(),
                record.args()
            ),
            LogFormat::Json => {
                let line = serde_json::json!({
                    "timestamp": timestamp,
                    "level": record.level().to_string(),
                    "target": record.target(),
                    "message": record.args().to_string(),
                });
                format!("{}\n", line)
            }
        }
    }

    fn write_to_file(&self, record: &Record) {
        if let Ok(mut writer_guard) = self.file_writer.lock() {
            if let Some(writer) = writer_guard.as_mut() {
                let message = self.format_file_line(record);
                if let Err(e) = writer.write_all(message.as_bytes()) {
                    eprintln!("写入日志文件失败: {}", e);
                } else {
                    let _ = writer.flush();
                }
            }
        }
    }
}

impl Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        for target in &self.config.targets {
            match target {
                LogTarget::Console => self.write_to_console(record),
                LogTarget::File { .. } => self.write_to_file(record),
            }
        }
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();

        if let Ok(mut writer_guard) = self.file_writer.lock() {
            if let Some(writer) = writer_guard.as_mut() {
                let _ = writer.flush();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_file_line() {
        let logger = SimpleLogger::new(LoggerConfig {
            level: LogLevel::Debug,
            targets: Vec::new(),
            format: LogFormat::Json,
        });
        let line = logger.format_file_line(
            &Record::builder()
                .args(format_args!("位置 {} 判定 {}", 3, "VOLT_LOW"))
                .level(log::Level::Debug)
                .target("inline_tester::sequencer")
                .build(),
        );
        let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["level"], "DEBUG");
        assert_eq!(value["message"], "位置 3 判定 VOLT_LOW");
    }
}
