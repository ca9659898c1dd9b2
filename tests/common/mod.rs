#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use earnings_datahub::cache::{Cache, FixedClock, MemoryStore};
use earnings_datahub::config::Config;
use earnings_datahub::errors::{DataHubError, Result};
use earnings_datahub::models::metrics::{EnrichmentRecord, Metrics, TickerMap};
use earnings_datahub::scrapers::base::{CalendarSource, DayPage, QuoteSource, RawEarningsEntry};
use earnings_datahub::services::day_fetcher::DayFetcher;
use earnings_datahub::services::pipeline::Pipeline;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 2025-01-06 10:00 新加坡时间
pub fn start_time() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 6, 2, 0, 0).unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub struct Harness {
    pub clock: Arc<FixedClock>,
    pub store: Arc<MemoryStore>,
    pub cache: Cache,
}

impl Harness {
    pub fn new() -> Self {
        let clock = Arc::new(FixedClock::new(start_time()));
        let store = Arc::new(MemoryStore::new(clock.clone()));
        let cache = Cache::new(store.clone(), clock.clone(), chrono_tz::Asia::Singapore);
        Self { clock, store, cache }
    }

    pub fn pipeline(&self, source: Arc<StubCalendar>) -> Pipeline {
        self.pipeline_with(source, Config::new().without_delays())
    }

    pub fn pipeline_with(&self, source: Arc<StubCalendar>, config: Config) -> Pipeline {
        let fetcher = DayFetcher::new(source, &config);
        Pipeline::new(self.cache.clone(), fetcher, config.cache_ttl)
    }

    pub fn write_enrichment(&self, symbol: &str, metrics: Metrics) {
        let mut tickers = TickerMap::new();
        tickers.insert(symbol.to_string(), metrics);
        let record = EnrichmentRecord {
            updated_at: self.cache.timestamp(),
            source: "Stub quotes".to_string(),
            tickers,
        };
        self.cache.write_enrichment(self.cache.today(), &record).unwrap();
    }
}

pub fn raw_entry(symbol: &str, eps: &str) -> RawEarningsEntry {
    RawEarningsEntry {
        symbol: Some(symbol.to_string()),
        company: Some(format!("{} Holdings", symbol)),
        eps_estimate: Some(json!(eps)),
        time_label: Some("After Market Close".to_string()),
        quote_link: Some(format!("/quote/{}", symbol.trim().to_uppercase())),
        ..Default::default()
    }
}

/// 每天返回同样的条目，可以切换连接失败
pub struct StubCalendar {
    entries: Vec<RawEarningsEntry>,
    pub connect_ok: AtomicBool,
    pub connects: AtomicUsize,
    pub queries: AtomicUsize,
}

impl StubCalendar {
    pub fn new(entries: Vec<RawEarningsEntry>) -> Self {
        Self {
            entries,
            connect_ok: AtomicBool::new(true),
            connects: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
        }
    }

    pub fn set_connect_ok(&self, ok: bool) {
        self.connect_ok.store(ok, Ordering::SeqCst);
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CalendarSource for StubCalendar {
    fn source_label(&self) -> &'static str {
        "Stub calendar"
    }

    fn base_url(&self) -> &str {
        "https://finance.example.com"
    }

    fn day_url(&self, day: &NaiveDate) -> String {
        format!("https://calendar.example.com/?day={}", day)
    }

    async fn connect(&self) -> Result<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.connect_ok.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DataHubError::SourceUnavailable("calendar offline".to_string()))
        }
    }

    async fn query_day(&self, _day: &NaiveDate) -> Result<DayPage> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(DayPage {
            entries: self.entries.clone(),
        })
    }
}

/// 行情源桩：记录调用次数和同时在途的最大请求数
pub struct StubQuotes {
    payloads: HashMap<String, Value>,
    failing: HashSet<String>,
    latency: Duration,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub peak: AtomicUsize,
}

impl StubQuotes {
    pub fn new() -> Self {
        Self {
            payloads: HashMap::new(),
            failing: HashSet::new(),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_payload(mut self, symbol: &str, payload: Value) -> Self {
        self.payloads.insert(symbol.to_string(), payload);
        self
    }

    pub fn with_failure(mut self, symbol: &str) -> Self {
        self.failing.insert(symbol.to_string());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QuoteSource for StubQuotes {
    fn source_label(&self) -> &'static str {
        "Stub quotes"
    }

    async fn quote(&self, symbol: &str) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing.contains(symbol) {
            return Err(DataHubError::FetchError(format!("quote lookup failed for {}", symbol)));
        }
        Ok(self.payloads.get(symbol).cloned().unwrap_or_else(|| json!({})))
    }
}
