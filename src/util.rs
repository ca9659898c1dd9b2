use chrono::{Duration as DayOffset, NaiveDate};
use rand::Rng;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::time::Duration;
use crate::errors::{Result, DataHubError};

pub const MIN_WINDOW_DAYS: u32 = 1;
pub const MAX_WINDOW_DAYS: u32 = 14;
pub const DEFAULT_WINDOW_DAYS: u32 = 7;

// 日期工具
pub fn parse_start_date(start: Option<&str>, today: NaiveDate) -> Result<NaiveDate> {
    match start.map(str::trim) {
        None | Some("") => Ok(today),
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
            DataHubError::ConfigError(format!("Invalid start date format: {}. Expected YYYY-MM-DD.", s))
        }),
    }
}

pub fn clamp_days(days: i64) -> u32 {
    days.clamp(MIN_WINDOW_DAYS as i64, MAX_WINDOW_DAYS as i64) as u32
}

pub fn date_sequence(start: NaiveDate, days: u32) -> Vec<NaiveDate> {
    (0..days as i64).map(|offset| start + DayOffset::days(offset)).collect()
}

/// 将各种格式的数值（"91.3B"、"12,345"、数字）解析为f64
///
/// 无法解析时返回None，不会报错
pub fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|f| f.is_finite()),
        Value::String(s) => parse_number_str(s),
        _ => None,
    }
}

pub fn parse_number_str(raw: &str) -> Option<f64> {
    let cleaned = raw.trim().replace(',', "");
    let last = cleaned.chars().last()?;

    let multiplier = match last.to_ascii_uppercase() {
        'K' => Some(1e3),
        'M' => Some(1e6),
        'B' => Some(1e9),
        'T' => Some(1e12),
        _ => None,
    };

    let parsed = match multiplier {
        Some(m) => cleaned[..cleaned.len() - 1].trim().parse::<f64>().ok().map(|v| v * m),
        None => cleaned.parse::<f64>().ok(),
    };
    parsed.filter(|v| v.is_finite())
}

/// 在[min, max]区间内随机选择一个等待时间
pub fn random_delay(range: (Duration, Duration)) -> Duration {
    let lo = range.0.min(range.1).as_millis() as u64;
    let hi = range.0.max(range.1).as_millis() as u64;
    if lo == hi {
        return Duration::from_millis(lo);
    }
    Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
}

/// 先写临时文件再重命名，避免读到写了一半的文件
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| DataHubError::DataError(format!("Invalid file path: {}", path.display())))?;
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    fs::write(&tmp_path, contents)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
