use crate::cache::Cache;
use crate::config::Config;
use crate::errors::{DataHubError, Result};
use crate::metrics::extract_metrics;
use crate::models::metrics::{EnrichmentRecord, Metrics, TickerMap};
use crate::scrapers::base::QuoteSource;
use crate::services::output;
use crate::util;
use chrono::Duration as TtlDuration;
use log::{error, info, warn};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// 一次补全任务的结果
#[derive(Debug, Clone)]
pub struct EnrichmentOutcome {
    pub record: EnrichmentRecord,
    /// 直接复用了未过期的缓存，没有发出任何请求
    pub reused: bool,
    /// 请求失败、以空指标记录的股票
    pub failed: Vec<String>,
}

impl EnrichmentOutcome {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// 从行情源获取每只股票的指标并保存为按日期命名的缓存
pub struct EnrichmentJob {
    cache: Cache,
    quotes: Arc<dyn QuoteSource>,
    output_path: PathBuf,
    max_concurrency: usize,
    quote_delay: (Duration, Duration),
}

impl EnrichmentJob {
    pub fn new(cache: Cache, quotes: Arc<dyn QuoteSource>, config: &Config) -> Self {
        Self {
            cache,
            quotes,
            output_path: config.output_path.clone(),
            max_concurrency: config.max_concurrency.max(1),
            quote_delay: config.quote_delay,
        }
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// 收集所有财报缓存和前端文件中出现过的股票代码
    pub fn discover_tickers(&self) -> Result<BTreeSet<String>> {
        let mut tickers = BTreeSet::new();

        if let Some(value) = read_json(&self.output_path) {
            collect_symbols(&value, &mut tickers);
        }

        for id in self.cache.earnings_ids()? {
            if let Some(value) = self.cache.load_raw(&id) {
                collect_symbols(&value, &mut tickers);
            }
        }

        Ok(tickers)
    }

    pub async fn enrich(&self, tickers: &BTreeSet<String>, ttl: TtlDuration, force: bool) -> Result<EnrichmentOutcome> {
        if tickers.is_empty() {
            return Err(DataHubError::DataError("No tickers found in earnings cache.".to_string()));
        }

        if !force {
            if let Some(record) = self.fresh_record(ttl)? {
                self.propagate(&record.tickers);
                return Ok(EnrichmentOutcome {
                    record,
                    reused: true,
                    failed: Vec::new(),
                });
            }
        }

        let (results, failed) = self.fetch_all(tickers).await;

        let record = EnrichmentRecord {
            updated_at: self.cache.timestamp(),
            source: self.quotes.source_label().to_string(),
            tickers: results,
        };
        self.cache.write_enrichment(self.cache.today(), &record)?;
        self.propagate(&record.tickers);

        Ok(EnrichmentOutcome {
            record,
            reused: false,
            failed,
        })
    }

    /// 对缓存中发现的所有股票执行补全；没有任何股票时只记录警告，返回None
    pub async fn enrich_discovered(&self, ttl: TtlDuration, force: bool) -> Result<Option<EnrichmentOutcome>> {
        let tickers = self.discover_tickers()?;
        if tickers.is_empty() {
            warn!("No tickers discovered in earnings cache; nothing to enrich.");
            return Ok(None);
        }

        info!("Discovered {} tickers", tickers.len());
        self.enrich(&tickers, ttl, force).await.map(Some)
    }

    fn fresh_record(&self, ttl: TtlDuration) -> Result<Option<EnrichmentRecord>> {
        let id = match self.cache.latest_enrichment_id()? {
            Some(id) => id,
            None => return Ok(None),
        };
        if !self.cache.is_fresh(&id, ttl) {
            return Ok(None);
        }

        let record = self.cache.latest_enrichment();
        if record.is_some() {
            info!("Latest enrichment cache is fresh: {}", id);
        }
        Ok(record)
    }

    /// 并发获取行情，同时在途的请求不超过 max_concurrency
    async fn fetch_all(&self, tickers: &BTreeSet<String>) -> (TickerMap, Vec<String>) {
        let total = tickers.len();
        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let completed = Arc::new(AtomicUsize::new(0));
        let mut tasks = JoinSet::new();

        info!(
            "Starting enrichment for {} tickers (max concurrency {})",
            total, self.max_concurrency
        );

        for symbol in tickers.iter().cloned() {
            let semaphore = semaphore.clone();
            let completed = completed.clone();
            let quotes = self.quotes.clone();
            let delay = self.quote_delay;

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                // 随机间隔，避免触发上游限流
                tokio::time::sleep(util::random_delay(delay)).await;
                let result = quotes.quote(&symbol).await.map(|record| extract_metrics(&record));
                let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                (symbol, result, done)
            });
        }

        let mut results = TickerMap::new();
        let mut failed = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((symbol, Ok(metrics), done)) => {
                    info!("Enriched {}/{} ticker {}", done, total, symbol);
                    results.insert(symbol, metrics);
                }
                Ok((symbol, Err(e), done)) => {
                    warn!("Failed to fetch quote for {} ({}/{}): {}", symbol, done, total, e);
                    results.insert(symbol.clone(), Metrics::default());
                    failed.push(symbol);
                }
                Err(e) => error!("Enrichment task aborted: {}", e),
            }
        }

        // 任务异常退出的股票也要有一条空记录
        for symbol in tickers {
            if !results.contains_key(symbol) {
                results.insert(symbol.clone(), Metrics::default());
                failed.push(symbol.clone());
            }
        }

        failed.sort();
        (results, failed)
    }

    fn propagate(&self, tickers: &TickerMap) {
        if let Err(e) = output::propagate_enrichment(&self.output_path, tickers, self.cache.timestamp()) {
            warn!("Failed to update {}: {}", self.output_path.display(), e);
        }
    }
}

fn read_json(path: &Path) -> Option<Value> {
    if !path.exists() {
        return None;
    }
    let text = fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}

/// 从 {"days": [{"rows": [...]}]} 结构中提取股票代码
fn collect_symbols(value: &Value, tickers: &mut BTreeSet<String>) {
    let days = value.get("days").and_then(Value::as_array);
    for day in days.into_iter().flatten() {
        let rows = day.get("rows").and_then(Value::as_array);
        for row in rows.into_iter().flatten() {
            let symbol = row
                .get("symbol")
                .and_then(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .or_else(|| row.get("ticker").and_then(Value::as_str));
            if let Some(symbol) = symbol.map(|s| s.trim().to_uppercase()).filter(|s| !s.is_empty()) {
                tickers.insert(symbol);
            }
        }
    }
}
