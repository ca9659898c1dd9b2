use crate::config::Config;
use crate::errors::Result;
use crate::models::earnings::{DateWindow, DayResult, EarningsRow, NO_ROWS_MESSAGE, TIME_NOT_SUPPLIED};
use crate::scrapers::base::{CalendarSource, RawEarningsEntry};
use crate::util;
use chrono::NaiveDate;
use log::{info, warn};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// 单日抓取的状态
enum AttemptState {
    Attempting(u32),
    Success(Vec<RawEarningsEntry>),
    NoData,
    Exhausted(String),
}

/// 逐日抓取财报日历，带重试和指数退避
pub struct DayFetcher {
    source: Arc<dyn CalendarSource>,
    max_retries: u32,
    backoff_unit: Duration,
    day_delay: (Duration, Duration),
}

impl DayFetcher {
    pub fn new(source: Arc<dyn CalendarSource>, config: &Config) -> Self {
        Self {
            source,
            max_retries: config.max_retries.max(1),
            backoff_unit: config.backoff_unit,
            day_delay: config.day_delay,
        }
    }

    pub fn source_label(&self) -> &'static str {
        self.source.source_label()
    }

    /// 第 attempt 次失败后的等待时间：unit * 2^(attempt-1)
    fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_unit * 2u32.saturating_pow(attempt.saturating_sub(1))
    }

    /// 抓取一天的数据，不会返回错误：失败信息写入 DayResult.error
    pub async fn fetch_day(&self, day: NaiveDate) -> DayResult {
        let url = self.source.day_url(&day);
        let mut state = AttemptState::Attempting(1);

        loop {
            state = match state {
                AttemptState::Attempting(attempt) => match self.source.query_day(&day).await {
                    Ok(page) if page.entries.is_empty() => AttemptState::NoData,
                    Ok(page) => AttemptState::Success(page.entries),
                    Err(e) if attempt >= self.max_retries => {
                        warn!(
                            "Error fetching {} (attempt {}/{}): {}. Giving up",
                            day, attempt, self.max_retries, e
                        );
                        AttemptState::Exhausted(e.to_string())
                    }
                    Err(e) => {
                        let wait = self.backoff(attempt);
                        warn!(
                            "Error fetching {} (attempt {}/{}): {}. Retrying in {:?}",
                            day, attempt, self.max_retries, e, wait
                        );
                        tokio::time::sleep(wait).await;
                        AttemptState::Attempting(attempt + 1)
                    }
                },
                AttemptState::Success(entries) => {
                    let base_url = self.source.base_url();
                    let rows: Vec<EarningsRow> =
                        entries.into_iter().map(|e| build_row(e, base_url)).collect();
                    info!("Fetched {} rows for {}", rows.len(), day);
                    return DayResult::success(day, url, rows);
                }
                AttemptState::NoData => {
                    warn!("No rows found for {}", day);
                    return DayResult::failed(day, url, NO_ROWS_MESSAGE.to_string());
                }
                AttemptState::Exhausted(message) => {
                    return DayResult::failed(day, url, message);
                }
            };
        }
    }

    /// 按日期升序逐日抓取整个窗口
    ///
    /// 只有数据源初始化失败才返回错误，单日失败记录在对应的 DayResult 中。
    pub async fn fetch_window(&self, window: &DateWindow) -> Result<Vec<DayResult>> {
        self.source.connect().await?;

        let dates = window.dates();
        let mut results = Vec::with_capacity(dates.len());

        for (index, day) in dates.iter().enumerate() {
            results.push(self.fetch_day(*day).await);

            // 两天之间随机间隔，降低对数据源的压力
            if index + 1 < dates.len() {
                tokio::time::sleep(util::random_delay(self.day_delay)).await;
            }
        }

        Ok(results)
    }
}

fn clean_text(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn clean_value(value: Option<Value>) -> Option<Value> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => clean_text(Some(s)).map(Value::String),
        other => other,
    }
}

/// 把原始记录转换成标准行
pub fn build_row(entry: RawEarningsEntry, base_url: &str) -> EarningsRow {
    let time_label = clean_text(entry.time_label)
        .map(|label| {
            label
                .replace("Before Market Open", "Before Open")
                .replace("After Market Close", "After Close")
        })
        .unwrap_or_else(|| TIME_NOT_SUPPLIED.to_string());

    let quote_url = clean_text(entry.quote_link).and_then(|link| {
        if link.starts_with("http://") || link.starts_with("https://") {
            Some(link)
        } else if link.starts_with('/') {
            Some(format!("{}{}", base_url.trim_end_matches('/'), link))
        } else {
            None
        }
    });

    EarningsRow {
        symbol: clean_text(entry.symbol).map(|s| s.to_uppercase()),
        company: clean_text(entry.company),
        eps_estimate: clean_value(entry.eps_estimate),
        eps_reported: clean_value(entry.eps_reported),
        surprise_pct: clean_value(entry.surprise_pct),
        time_label,
        quote_url,
        extra: entry.extra,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DataHubError;
    use crate::scrapers::base::DayPage;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 前 failures 次调用失败，之后返回 entries
    struct FlakySource {
        failures: usize,
        entries: Vec<RawEarningsEntry>,
        calls: AtomicUsize,
        connect_ok: bool,
    }

    impl FlakySource {
        fn new(failures: usize, entries: Vec<RawEarningsEntry>) -> Self {
            Self {
                failures,
                entries,
                calls: AtomicUsize::new(0),
                connect_ok: true,
            }
        }
    }

    #[async_trait]
    impl CalendarSource for FlakySource {
        fn source_label(&self) -> &'static str {
            "flaky"
        }

        fn base_url(&self) -> &str {
            "https://finance.example.com/"
        }

        fn day_url(&self, day: &NaiveDate) -> String {
            format!("https://calendar.example.com/?day={}", day)
        }

        async fn connect(&self) -> Result<()> {
            if self.connect_ok {
                Ok(())
            } else {
                Err(DataHubError::SourceUnavailable("browser did not start".to_string()))
            }
        }

        async fn query_day(&self, _day: &NaiveDate) -> Result<DayPage> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err(DataHubError::FetchError(format!("timeout #{}", call + 1)));
            }
            Ok(DayPage { entries: self.entries.clone() })
        }
    }

    fn entry(symbol: &str) -> RawEarningsEntry {
        RawEarningsEntry {
            symbol: Some(format!(" {} ", symbol.to_lowercase())),
            company: Some("Example Corp".to_string()),
            eps_estimate: Some(json!("1.10")),
            time_label: Some("Before Market Open".to_string()),
            quote_link: Some(format!("/quote/{}", symbol)),
            ..Default::default()
        }
    }

    fn fetcher(source: Arc<FlakySource>) -> DayFetcher {
        let config = Config::new().without_delays();
        DayFetcher::new(source, &config)
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 2).unwrap()
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let source = Arc::new(FlakySource::new(2, vec![entry("AAPL")]));
        let result = fetcher(source.clone()).fetch_day(day()).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert_eq!(result.error, None);
        assert_eq!(result.row_count, 1);
        assert_eq!(result.rows[0].symbol.as_deref(), Some("AAPL"));
        assert_eq!(result.source_url, "https://calendar.example.com/?day=2025-01-02");
    }

    #[tokio::test]
    async fn test_exhausted_retries() {
        let source = Arc::new(FlakySource::new(10, vec![entry("AAPL")]));
        let result = fetcher(source.clone()).fetch_day(day()).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
        assert!(result.rows.is_empty());
        assert_eq!(result.row_count, 0);
        assert!(result.error.as_deref().unwrap().contains("timeout #3"));
        assert!(result.is_failure());
    }

    #[tokio::test]
    async fn test_no_data_is_not_retried() {
        let source = Arc::new(FlakySource::new(0, vec![]));
        let result = fetcher(source.clone()).fetch_day(day()).await;

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.error.as_deref(), Some(NO_ROWS_MESSAGE));
        assert!(!result.is_failure());
    }

    #[tokio::test]
    async fn test_window_in_date_order() {
        let source = Arc::new(FlakySource::new(0, vec![entry("MSFT")]));
        let window = DateWindow::from_start_and_days(day(), 3).unwrap();
        let days = fetcher(source.clone()).fetch_window(&window).await.unwrap();

        let dates: Vec<NaiveDate> = days.iter().map(|d| d.day).collect();
        assert_eq!(dates, window.dates());
        assert_eq!(source.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_window_connect_failure() {
        let mut source = FlakySource::new(0, vec![]);
        source.connect_ok = false;
        let source = Arc::new(source);
        let window = DateWindow::from_start_and_days(day(), 2).unwrap();

        let result = fetcher(source.clone()).fetch_window(&window).await;
        assert!(matches!(result, Err(DataHubError::SourceUnavailable(_))));
        assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_build_row_normalizes_fields() {
        let row = build_row(entry("nvda"), "https://finance.example.com/");
        assert_eq!(row.symbol.as_deref(), Some("NVDA"));
        assert_eq!(row.time_label, "Before Open");
        assert_eq!(row.quote_url.as_deref(), Some("https://finance.example.com/quote/nvda"));
        assert_eq!(row.eps_estimate, Some(json!("1.10")));
        assert_eq!(row.stock_price, None);

        let bare = build_row(
            RawEarningsEntry {
                symbol: Some("   ".to_string()),
                eps_estimate: Some(json!("  ")),
                time_label: Some(String::new()),
                quote_link: Some("javascript:void(0)".to_string()),
                ..Default::default()
            },
            "https://finance.example.com",
        );
        assert_eq!(bare.symbol, None);
        assert_eq!(bare.eps_estimate, None);
        assert_eq!(bare.time_label, TIME_NOT_SUPPLIED);
        assert_eq!(bare.quote_url, None);

        let after = build_row(
            RawEarningsEntry {
                time_label: Some("After Market Close".to_string()),
                ..Default::default()
            },
            "",
        );
        assert_eq!(after.time_label, "After Close");
    }

    #[test]
    fn test_backoff_doubles() {
        let source = Arc::new(FlakySource::new(0, vec![]));
        let config = Config::new();
        let fetcher = DayFetcher::new(source, &config);
        assert_eq!(fetcher.backoff(1), Duration::from_secs(1));
        assert_eq!(fetcher.backoff(2), Duration::from_secs(2));
        assert_eq!(fetcher.backoff(3), Duration::from_secs(4));
    }
}
