use chrono::{DateTime, Local};
use std::time::Duration;

/// 日志与结果记录使用的时间戳格式
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// 当前本地时间
#[inline]
pub fn now_local() -> DateTime<Local> {
    Local::now()
}

/// 结果文件按天切分使用的日期戳，例如 `2026-10-19`
#[inline]
pub fn day_stamp(dt: &DateTime<Local>) -> String {
    dt.format("%Y-%m-%d").to_string()
}

/// 将时长转换为秒（保留毫秒精度）
#[inline]
pub fn elapsed_secs(elapsed: Duration) -> f64 {
    (elapsed.as_millis() as f64) / 1000.0
}
