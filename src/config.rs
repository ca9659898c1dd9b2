use crate::errors::{DataHubError, Result};
use chrono::Duration as TtlDuration;
use chrono_tz::Tz;
use std::path::PathBuf;
use std::time::Duration;

pub const CALENDAR_KEY_ENV: &str = "FINNHUB_API_KEY";
pub const QUOTE_KEY_ENV: &str = "RAPIDAPI_KEY";

pub struct Config {
    pub cache_dir: PathBuf,
    pub output_path: PathBuf,
    pub timezone: Tz,
    pub cache_ttl: TtlDuration,
    pub enrich_ttl: TtlDuration,
    pub max_retries: u32,
    pub backoff_unit: Duration,
    pub day_delay: (Duration, Duration),
    pub quote_delay: (Duration, Duration),
    pub max_concurrency: usize,
    pub request_timeout: Duration,
    pub calendar_api_key: Option<String>,
    pub quote_api_key: Option<String>,
}

impl Config {
    pub fn new() -> Self {
        Self {
            cache_dir: PathBuf::from("cache"),
            output_path: PathBuf::from("data/earnings_data.json"),
            timezone: chrono_tz::Asia::Singapore,
            cache_ttl: TtlDuration::hours(24),
            enrich_ttl: TtlDuration::hours(24),
            max_retries: 3,
            backoff_unit: Duration::from_secs(1),
            day_delay: (Duration::from_millis(1200), Duration::from_millis(2000)),
            quote_delay: (Duration::from_millis(300), Duration::from_millis(600)),
            max_concurrency: 3,
            request_timeout: Duration::from_secs(30),
            calendar_api_key: None,
            quote_api_key: None,
        }
    }

    /// 从环境变量读取API密钥，其余保持默认值
    pub fn from_env() -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());
        Self {
            calendar_api_key: read(CALENDAR_KEY_ENV),
            quote_api_key: read(QUOTE_KEY_ENV),
            ..Self::new()
        }
    }

    pub fn with_cache_dir(mut self, dir: &str) -> Self {
        self.cache_dir = PathBuf::from(dir);
        self
    }

    pub fn with_output_path(mut self, path: &str) -> Self {
        self.output_path = PathBuf::from(path);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: TtlDuration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries.max(1);
        self
    }

    pub fn with_backoff_unit(mut self, unit: Duration) -> Self {
        self.backoff_unit = unit;
        self
    }

    pub fn with_day_delay(mut self, min: Duration, max: Duration) -> Self {
        self.day_delay = (min, max);
        self
    }

    pub fn with_quote_delay(mut self, min: Duration, max: Duration) -> Self {
        self.quote_delay = (min, max);
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    pub fn with_calendar_api_key(mut self, key: Option<String>) -> Self {
        if key.is_some() {
            self.calendar_api_key = key;
        }
        self
    }

    pub fn with_quote_api_key(mut self, key: Option<String>) -> Self {
        if key.is_some() {
            self.quote_api_key = key;
        }
        self
    }

    /// 测试和本地调试用：关闭所有等待时间
    pub fn without_delays(self) -> Self {
        self.with_backoff_unit(Duration::ZERO)
            .with_day_delay(Duration::ZERO, Duration::ZERO)
            .with_quote_delay(Duration::ZERO, Duration::ZERO)
    }

    pub fn require_calendar_key(&self) -> Result<&str> {
        Self::require(self.calendar_api_key.as_deref(), CALENDAR_KEY_ENV, "--calendar-key")
    }

    pub fn require_quote_key(&self) -> Result<&str> {
        Self::require(self.quote_api_key.as_deref(), QUOTE_KEY_ENV, "--quote-key")
    }

    fn require<'a>(key: Option<&'a str>, env: &str, flag: &str) -> Result<&'a str> {
        match key.map(str::trim) {
            Some(k) if !k.is_empty() => Ok(k),
            _ => Err(DataHubError::ConfigError(format!(
                "API key missing. Set {} or use {}.",
                env, flag
            ))),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
