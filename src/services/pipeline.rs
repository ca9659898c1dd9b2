use crate::cache::Cache;
use crate::errors::Result;
use crate::models::earnings::{CacheEntry, DateWindow, DayResult};
use crate::models::metrics::TickerMap;
use crate::services::day_fetcher::DayFetcher;
use chrono::Duration as TtlDuration;
use log::{info, warn};

/// 把行情数据合并进所有行
///
/// 优先级：行情数据 > 行内原始文本解析 > 空
pub fn merge_enrichment(days: &mut [DayResult], tickers: &TickerMap) {
    for day in days.iter_mut() {
        for row in day.rows.iter_mut() {
            if let Some(metrics) = row.resolved_symbol().and_then(|s| tickers.get(&s)) {
                row.apply_metrics(metrics);
            }
            row.backfill_from_raw();
        }
    }
}

/// 财报数据的获取流程：缓存 -> 抓取 -> 合并行情 -> 写回缓存
pub struct Pipeline {
    cache: Cache,
    fetcher: DayFetcher,
    ttl: TtlDuration,
}

impl Pipeline {
    pub fn new(cache: Cache, fetcher: DayFetcher, ttl: TtlDuration) -> Self {
        Self { cache, fetcher, ttl }
    }

    /// 获取窗口内的财报数据
    ///
    /// 缓存新鲜时直接使用缓存；否则重新抓取。抓取整体失败时退回旧缓存，
    /// 没有旧缓存才返回错误。
    pub async fn build_payload(&self, window: &DateWindow) -> Result<CacheEntry> {
        let tickers = self
            .cache
            .latest_enrichment()
            .map(|record| record.tickers)
            .unwrap_or_default();

        let id = self.cache.path_for(window);
        let cached = self.cache.load(&id);

        if let Some(mut entry) = cached.clone() {
            if self.cache.is_fresh(&id, self.ttl) {
                info!("Cache hit for {} -> {}", window.start, window.end);
                merge_enrichment(&mut entry.days, &tickers);
                entry.updated_at = self.cache.timestamp();
                entry.stale = false;
                self.cache.write(&id, &entry)?;
                return Ok(entry);
            }
        }

        info!("Cache miss for {} -> {}. Fetching...", window.start, window.end);
        match self.fetch_and_store(window, &tickers).await {
            Ok(entry) => Ok(entry),
            Err(e) => match cached {
                Some(mut fallback) => {
                    warn!("Fetch failed, using cached data for {}: {}", id, e);
                    merge_enrichment(&mut fallback.days, &tickers);
                    fallback.updated_at = self.cache.timestamp();
                    fallback.stale = true;
                    Ok(fallback)
                }
                None => Err(e),
            },
        }
    }

    async fn fetch_and_store(&self, window: &DateWindow, tickers: &TickerMap) -> Result<CacheEntry> {
        let mut days = self.fetcher.fetch_window(window).await?;
        merge_enrichment(&mut days, tickers);

        let entry = CacheEntry {
            params: window.as_params(),
            updated_at: self.cache.timestamp(),
            source: self.fetcher.source_label().to_string(),
            days,
            stale: false,
        };

        let id = self.cache.path_for(window);
        self.cache.write(&id, &entry)?;
        info!("Earnings cache updated: {}", entry.summary());
        Ok(entry)
    }
}
