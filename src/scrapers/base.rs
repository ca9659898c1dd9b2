use crate::errors::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde_json::{Map, Value};

/// 数据源返回的一条原始财报记录，字段尚未规范化
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEarningsEntry {
    pub symbol: Option<String>,
    pub company: Option<String>,
    pub eps_estimate: Option<Value>,
    pub eps_reported: Option<Value>,
    pub surprise_pct: Option<Value>,
    pub time_label: Option<String>,
    /// 绝对URL，或者以 /quote/ 开头的站内路径
    pub quote_link: Option<String>,
    /// 数据源提供的其他原始字段（例如营收预期），原样写入行内
    pub extra: Map<String, Value>,
}

/// 单日查询结果；entries 为空表示当天没有财报
#[derive(Debug, Clone, Default)]
pub struct DayPage {
    pub entries: Vec<RawEarningsEntry>,
}

/// Primary earnings calendar source, queried one calendar day at a time
#[async_trait]
pub trait CalendarSource: Send + Sync {
    /// Label written into the cache entry's `source` field
    fn source_label(&self) -> &'static str;

    /// Base URL used to resolve relative quote links
    fn base_url(&self) -> &str;

    /// Human-facing URL for the given day, recorded even when the fetch fails
    fn day_url(&self, day: &NaiveDate) -> String;

    /// Prepare the source for a window fetch; failure aborts the whole window
    async fn connect(&self) -> Result<()>;

    /// Fetch raw entries for one day; errors are treated as transient
    async fn query_day(&self, day: &NaiveDate) -> Result<DayPage>;
}

/// Secondary quote source used for enrichment
#[async_trait]
pub trait QuoteSource: Send + Sync {
    fn source_label(&self) -> &'static str;

    /// Raw nested quote record for the symbol
    async fn quote(&self, symbol: &str) -> Result<Value>;
}
