/// 结果记录服务
/// 每块穿梭板追加一条记录，按天切分为 JSON Lines 文件

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::io::AsyncWriteExt;

use crate::models::structs::ShuttleRecord;
use crate::utils::error::{AppError, AppResult};
use crate::utils::time_utils;

/// 结果记录接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResultLog: Send + Sync {
    /// 记录名称，用于日志
    fn log_name(&self) -> &'static str;

    /// 追加一条记录，调用顺序即写入顺序
    async fn append(&self, record: &ShuttleRecord) -> AppResult<()>;
}

/// JSON Lines 文件结果记录
#[derive(Debug, Clone)]
pub struct JsonLinesResultLog {
    result_dir: PathBuf,
}

impl JsonLinesResultLog {
    pub fn new(result_dir: impl Into<PathBuf>) -> Self {
        Self {
            result_dir: result_dir.into(),
        }
    }

    /// 记录所在的日文件路径
    pub fn file_path_for(&self, record: &ShuttleRecord) -> PathBuf {
        self.result_dir
            .join(format!("{}_shuttles.jsonl", time_utils::day_stamp(&record.timestamp)))
    }

    async fn ensure_directory_exists(dir: &Path) -> AppResult<()> {
        if !dir.exists() {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                AppError::io_error(format!("创建目录 {:?} 失败: {}", dir, e), e.kind().to_string())
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl ResultLog for JsonLinesResultLog {
    fn log_name(&self) -> &'static str {
        "JsonLinesResultLog"
    }

    async fn append(&self, record: &ShuttleRecord) -> AppResult<()> {
        Self::ensure_directory_exists(&self.result_dir).await?;

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let path = self.file_path_for(record);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| AppError::io_error(format!("打开结果文件 {:?} 失败: {}", path, e), e.kind().to_string()))?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        log::debug!("[ResultLog] 穿梭板 #{} 已写入 {:?}", record.shuttle_number, path);
        Ok(())
    }
}

/// 内存结果记录
/// 克隆出的实例共享同一份记录，便于测试读取
#[derive(Debug, Clone, Default)]
pub struct MemoryResultLog {
    records: Arc<Mutex<Vec<ShuttleRecord>>>,
}

impl MemoryResultLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ShuttleRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ResultLog for MemoryResultLog {
    fn log_name(&self) -> &'static str {
        "MemoryResultLog"
    }

    async fn append(&self, record: &ShuttleRecord) -> AppResult<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::{DeviceFaultCode, DEVICES_PER_SHUTTLE};
    use tempfile::tempdir;
    use uuid::Uuid;

    fn record(shuttle_number: u64) -> ShuttleRecord {
        let mut codes = vec![DeviceFaultCode::Passed; DEVICES_PER_SHUTTLE];
        codes[4] = DeviceFaultCode::DsShort;
        ShuttleRecord {
            session_id: Uuid::new_v4(),
            shuttle_number,
            timestamp: chrono::Local::now(),
            operator: Some("op1".to_string()),
            lot_code: Some("LOT-42".to_string()),
            serial_number: Some(format!("SN{:04}", shuttle_number)),
            device_codes: codes,
            elapsed_secs: 12.5,
        }
    }

    /// 记录按调用顺序逐行追加
    #[tokio::test]
    async fn test_json_lines_append_in_order() {
        let temp_dir = tempdir().unwrap();
        let log = JsonLinesResultLog::new(temp_dir.path().join("results"));

        let first = record(1);
        let second = record(2);
        log.append(&first).await.unwrap();
        log.append(&second).await.unwrap();

        let content = tokio::fs::read_to_string(log.file_path_for(&first)).await.unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: ShuttleRecord = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.shuttle_number, 2);
        assert_eq!(parsed.lot_code.as_deref(), Some("LOT-42"));
        assert_eq!(parsed.device_codes[4], DeviceFaultCode::DsShort);
    }

    #[tokio::test]
    async fn test_memory_log_shared_between_clones() {
        let log = MemoryResultLog::new();
        let reader = log.clone();
        log.append(&record(7)).await.unwrap();
        assert_eq!(reader.records().len(), 1);
        assert_eq!(reader.records()[0].shuttle_number, 7);
    }
}
