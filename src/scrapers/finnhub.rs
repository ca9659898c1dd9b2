use crate::errors::{DataHubError, Result};
use crate::scrapers::base::{CalendarSource, DayPage, RawEarningsEntry};
use async_trait::async_trait;
use chrono::NaiveDate;
use log::{debug, info};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const CALENDAR_URL: &str = "https://finnhub.io/api/v1/calendar/earnings";
const QUOTE_BASE_URL: &str = "https://finance.yahoo.com";

#[derive(Debug, Deserialize)]
struct CalendarResponse {
    #[serde(rename = "earningsCalendar", default)]
    earnings: Vec<CalendarItem>,
}

#[derive(Debug, Deserialize)]
struct CalendarItem {
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    hour: Option<String>,
    #[serde(rename = "epsEstimate", default)]
    eps_estimate: Option<f64>,
    #[serde(rename = "epsActual", default)]
    eps_actual: Option<f64>,
    #[serde(rename = "revenueEstimate", default)]
    revenue_estimate: Option<f64>,
    #[serde(rename = "revenueActual", default)]
    revenue_actual: Option<f64>,
    #[serde(default)]
    quarter: Option<i64>,
    #[serde(default)]
    year: Option<i64>,
}

/// Finnhub 财报日历数据源
pub struct FinnhubCalendar {
    client: Client,
    api_key: String,
    last_request: Mutex<Option<Instant>>,
}

impl FinnhubCalendar {
    pub fn new(api_key: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DataHubError::RequestError)?;

        Ok(Self {
            client,
            api_key: api_key.trim().to_string(),
            last_request: Mutex::new(None),
        })
    }

    /// 等待请求频率限制
    async fn wait_for_rate_limit(&self) {
        const MIN_INTERVAL: Duration = Duration::from_millis(500);

        let now = Instant::now();
        let should_wait = match self.last_request.lock() {
            Ok(mut last) => {
                let wait = last
                    .map(|instant| instant.elapsed())
                    .filter(|elapsed| *elapsed < MIN_INTERVAL)
                    .map(|elapsed| MIN_INTERVAL - elapsed);
                *last = Some(now);
                wait
            }
            Err(_) => None,
        };

        if let Some(wait_time) = should_wait {
            debug!("等待 {:?} 以遵守频率限制", wait_time);
            tokio::time::sleep(wait_time).await;
        }
    }

    fn to_entry(item: CalendarItem) -> RawEarningsEntry {
        let time_label = match item.hour.as_deref().map(str::trim) {
            Some("bmo") => Some("Before Market Open".to_string()),
            Some("amc") => Some("After Market Close".to_string()),
            Some("dmh") => Some("During Market Hours".to_string()),
            _ => None,
        };

        let surprise_pct = match (item.eps_actual, item.eps_estimate) {
            (Some(actual), Some(estimate)) if estimate != 0.0 => {
                let pct = (actual - estimate) / estimate.abs() * 100.0;
                Some(json!((pct * 100.0).round() / 100.0))
            }
            _ => None,
        };

        let mut extra = Map::new();
        let mut keep = |key: &str, value: Option<Value>| {
            if let Some(v) = value {
                extra.insert(key.to_string(), v);
            }
        };
        keep("revenue_estimate", item.revenue_estimate.map(|v| json!(v)));
        keep("revenue_reported", item.revenue_actual.map(|v| json!(v)));
        keep("fiscal_quarter", item.quarter.map(|v| json!(v)));
        keep("fiscal_year", item.year.map(|v| json!(v)));

        let quote_link = item
            .symbol
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("/quote/{}", s.to_uppercase()));

        RawEarningsEntry {
            symbol: item.symbol,
            company: None,
            eps_estimate: item.eps_estimate.map(|v| json!(v)),
            eps_reported: item.eps_actual.map(|v| json!(v)),
            surprise_pct,
            time_label,
            quote_link,
            extra,
        }
    }
}

#[async_trait]
impl CalendarSource for FinnhubCalendar {
    fn source_label(&self) -> &'static str {
        "Finnhub earnings calendar"
    }

    fn base_url(&self) -> &str {
        QUOTE_BASE_URL
    }

    fn day_url(&self, day: &NaiveDate) -> String {
        // 不把 token 写进缓存
        let iso = day.format("%Y-%m-%d");
        format!("{}?from={}&to={}", CALENDAR_URL, iso, iso)
    }

    async fn connect(&self) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(DataHubError::SourceUnavailable("Finnhub API key is empty".to_string()));
        }
        Ok(())
    }

    async fn query_day(&self, day: &NaiveDate) -> Result<DayPage> {
        let iso = day.format("%Y-%m-%d").to_string();
        info!("获取 {} 财报日历", iso);

        // 限制请求频率
        self.wait_for_rate_limit().await;

        let response = self
            .client
            .get(CALENDAR_URL)
            .query(&[("from", iso.as_str()), ("to", iso.as_str()), ("token", self.api_key.as_str())])
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| DataHubError::FetchError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DataHubError::FetchError(format!("HTTP status {}", status)));
        }

        let body: CalendarResponse = response
            .json()
            .await
            .map_err(|e| DataHubError::FetchError(e.to_string()))?;

        let entries: Vec<RawEarningsEntry> = body
            .earnings
            .into_iter()
            .filter(|item| item.date.as_deref().map_or(true, |d| d == iso))
            .map(Self::to_entry)
            .collect();

        debug!("{} 共 {} 条记录", iso, entries.len());
        Ok(DayPage { entries })
    }
}
