use chrono::{DateTime, Duration as TtlDuration, FixedOffset, NaiveDate, Utc};
use chrono_tz::Tz;
use log::{debug, info, warn};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::errors::Result;
use crate::models::earnings::{CacheEntry, DateWindow};
use crate::models::metrics::EnrichmentRecord;

pub mod fs_store;
pub mod memory;

pub use fs_store::FsStore;
pub use memory::{FixedClock, MemoryStore};

pub const EARNINGS_PREFIX: &str = "earnings_";
pub const ENRICH_PREFIX: &str = "enriched_";

/// 缓存条目的标识，同时也是文件名
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CacheId(String);

impl CacheId {
    pub fn new(id: impl Into<String>) -> Self {
        CacheId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 时钟，测试时可以替换为固定时间
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 底层存储：只负责整体读写和修改时间，不包含任何新鲜度逻辑
pub trait Store: Send + Sync {
    fn read(&self, id: &CacheId) -> Result<Option<String>>;

    /// 整体覆盖写入
    fn write(&self, id: &CacheId, contents: &str) -> Result<()>;

    fn modified_at(&self, id: &CacheId) -> Result<Option<DateTime<Utc>>>;

    /// 返回以 prefix 开头的所有条目，按名称升序
    fn list(&self, prefix: &str) -> Result<Vec<CacheId>>;
}

/// 财报窗口缓存和行情补全缓存
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    tz: Tz,
}

impl Cache {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, tz: Tz) -> Self {
        Self { store, clock, tz }
    }

    pub fn now(&self) -> DateTime<Tz> {
        self.clock.now().with_timezone(&self.tz)
    }

    /// 写入JSON时使用的带时区时间戳
    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.now().fixed_offset()
    }

    pub fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }

    pub fn path_for(&self, window: &DateWindow) -> CacheId {
        CacheId(format!(
            "{}{}_{}.json",
            EARNINGS_PREFIX,
            window.start.format("%Y%m%d"),
            window.end.format("%Y%m%d")
        ))
    }

    pub fn enrichment_id_for(&self, day: NaiveDate) -> CacheId {
        CacheId(format!("{}{}.json", ENRICH_PREFIX, day.format("%Y-%m-%d")))
    }

    /// 距离上次写入的时间，条目不存在时返回None
    pub fn age(&self, id: &CacheId) -> Option<TtlDuration> {
        match self.store.modified_at(id) {
            Ok(Some(modified)) => Some(self.now() - modified.with_timezone(&self.tz)),
            Ok(None) => None,
            Err(e) => {
                warn!("Failed to read modification time of {}: {}", id, e);
                None
            }
        }
    }

    pub fn is_fresh(&self, id: &CacheId, ttl: TtlDuration) -> bool {
        self.age(id).map(|age| age < ttl).unwrap_or(false)
    }

    /// 读取缓存条目；文件损坏时按未命中处理
    pub fn load(&self, id: &CacheId) -> Option<CacheEntry> {
        let text = self.read_text(id)?;
        match serde_json::from_str(&text) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Ignoring corrupt cache {}: {}", id, e);
                None
            }
        }
    }

    /// 不做结构校验的读取，用于从各种历史文件中收集股票代码
    pub fn load_raw(&self, id: &CacheId) -> Option<Value> {
        let text = self.read_text(id)?;
        serde_json::from_str(&text)
            .map_err(|e| debug!("Skipping unreadable {}: {}", id, e))
            .ok()
    }

    pub fn write(&self, id: &CacheId, entry: &CacheEntry) -> Result<()> {
        let json = serde_json::to_string_pretty(entry)?;
        self.store.write(id, &json)?;
        debug!("Wrote cache {} ({} days)", id, entry.days.len());
        Ok(())
    }

    pub fn earnings_ids(&self) -> Result<Vec<CacheId>> {
        self.store.list(EARNINGS_PREFIX)
    }

    /// 文件名中嵌入了ISO日期，字典序最大的即为最新
    pub fn latest_earnings_id(&self) -> Result<Option<CacheId>> {
        Ok(self.earnings_ids()?.into_iter().max())
    }

    pub fn latest_enrichment_id(&self) -> Result<Option<CacheId>> {
        Ok(self.store.list(ENRICH_PREFIX)?.into_iter().max())
    }

    pub fn latest_enrichment(&self) -> Option<EnrichmentRecord> {
        let id = match self.latest_enrichment_id() {
            Ok(Some(id)) => id,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to list enrichment caches: {}", e);
                return None;
            }
        };

        let text = self.read_text(&id)?;
        match serde_json::from_str(&text) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Ignoring corrupt enrichment cache {}: {}", id, e);
                None
            }
        }
    }

    pub fn write_enrichment(&self, day: NaiveDate, record: &EnrichmentRecord) -> Result<CacheId> {
        let id = self.enrichment_id_for(day);
        let json = serde_json::to_string_pretty(record)?;
        self.store.write(&id, &json)?;
        info!("Enrichment written to {} ({} tickers)", id, record.tickers.len());
        Ok(id)
    }

    fn read_text(&self, id: &CacheId) -> Option<String> {
        match self.store.read(id) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to read cache {}: {}", id, e);
                None
            }
        }
    }
}
