use chrono::{DateTime, Duration as DayOffset, FixedOffset, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{DataHubError, Result};
use crate::models::metrics::Metrics;
use crate::util;

pub const TIME_NOT_SUPPLIED: &str = "Time Not Supplied";
pub const NO_ROWS_MESSAGE: &str = "No rows available";

/// 查询的日期窗口 [start, end]，两端都包含
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// 调用方需要先用 `util::clamp_days` 限制天数
    pub fn from_start_and_days(start: NaiveDate, days: u32) -> Result<Self> {
        if days == 0 {
            return Err(DataHubError::ConfigError("Window must cover at least one day".to_string()));
        }
        Ok(Self {
            start,
            end: start + DayOffset::days(days as i64 - 1),
        })
    }

    pub fn days(&self) -> u32 {
        ((self.end - self.start).num_days() + 1) as u32
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        util::date_sequence(self.start, self.days())
    }

    pub fn as_params(&self) -> WindowParams {
        WindowParams {
            start_day: self.start.format("%Y-%m-%d").to_string(),
            end_day: self.end.format("%Y-%m-%d").to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowParams {
    pub start_day: String,
    pub end_day: String,
}

/// Canonical earnings row shared by fetch output and enriched output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningsRow {
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub eps_estimate: Option<Value>,
    #[serde(default)]
    pub eps_reported: Option<Value>,
    #[serde(default)]
    pub surprise_pct: Option<Value>,
    #[serde(rename = "time", default = "default_time_label")]
    pub time_label: String,
    #[serde(default)]
    pub quote_url: Option<String>,

    // 以下字段由行情补全填充，字段名与前端保持一致
    #[serde(rename = "stockPrice", default)]
    pub stock_price: Option<f64>,
    #[serde(rename = "epsEstimate", default)]
    pub eps_estimate_curr_q: Option<f64>,
    #[serde(rename = "revenueEstimate", default)]
    pub revenue_estimate_curr_q: Option<f64>,
    #[serde(rename = "tradingVolume", default)]
    pub trading_volume: Option<f64>,
    #[serde(rename = "marketCap", default)]
    pub market_cap: Option<f64>,
    #[serde(rename = "peRatio", default)]
    pub pe_ratio: Option<f64>,
    #[serde(rename = "yearHigh", default)]
    pub year_high: Option<f64>,
    #[serde(rename = "yearLow", default)]
    pub year_low: Option<f64>,

    /// 其他工具写入的未知字段，原样保留
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_time_label() -> String {
    TIME_NOT_SUPPLIED.to_string()
}

impl Default for EarningsRow {
    fn default() -> Self {
        Self {
            symbol: None,
            company: None,
            eps_estimate: None,
            eps_reported: None,
            surprise_pct: None,
            time_label: default_time_label(),
            quote_url: None,
            stock_price: None,
            eps_estimate_curr_q: None,
            revenue_estimate_curr_q: None,
            trading_volume: None,
            market_cap: None,
            pe_ratio: None,
            year_high: None,
            year_low: None,
            extra: Map::new(),
        }
    }
}

impl EarningsRow {
    /// 合并时使用的股票代码：去空格、大写；没有 symbol 时退回 ticker 字段
    pub fn resolved_symbol(&self) -> Option<String> {
        let normalize = |raw: &str| Some(raw.trim().to_uppercase()).filter(|s| !s.is_empty());
        self.symbol
            .as_deref()
            .and_then(normalize)
            .or_else(|| self.extra.get("ticker").and_then(Value::as_str).and_then(normalize))
    }

    /// 行情数据中非空的字段直接覆盖行内字段
    pub fn apply_metrics(&mut self, metrics: &Metrics) {
        let pairs = [
            (&mut self.stock_price, metrics.price),
            (&mut self.eps_estimate_curr_q, metrics.eps_estimate_curr_q),
            (&mut self.revenue_estimate_curr_q, metrics.revenue_estimate_curr_q),
            (&mut self.trading_volume, metrics.volume),
            (&mut self.market_cap, metrics.market_cap),
            (&mut self.pe_ratio, metrics.pe_ratio),
            (&mut self.year_high, metrics.year_high),
            (&mut self.year_low, metrics.year_low),
        ];
        for (field, value) in pairs {
            if value.is_some() {
                *field = value;
            }
        }
    }

    /// 用行内原始文本补齐仍为空的数值字段
    pub fn backfill_from_raw(&mut self) {
        if self.eps_estimate_curr_q.is_none() {
            self.eps_estimate_curr_q = self.eps_estimate.as_ref().and_then(util::parse_number);
        }

        let extra = &self.extra;
        let raw = |keys: &[&str]| keys.iter().find_map(|k| extra.get(*k).and_then(util::parse_number));

        let fills = [
            (raw(&["stock_price", "price"]), &mut self.stock_price),
            (raw(&["revenue_estimate"]), &mut self.revenue_estimate_curr_q),
            (raw(&["volume", "trading_volume"]), &mut self.trading_volume),
            (raw(&["market_cap"]), &mut self.market_cap),
            (raw(&["pe_ratio"]), &mut self.pe_ratio),
            (raw(&["year_high"]), &mut self.year_high),
            (raw(&["year_low"]), &mut self.year_low),
        ];
        for (value, field) in fills {
            if field.is_none() {
                *field = value;
            }
        }
    }
}

/// 单日抓取结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayResult {
    pub day: NaiveDate,
    #[serde(rename = "url")]
    pub source_url: String,
    #[serde(rename = "count")]
    pub row_count: usize,
    #[serde(default)]
    pub rows: Vec<EarningsRow>,
    #[serde(default)]
    pub error: Option<String>,
}

impl DayResult {
    pub fn success(day: NaiveDate, source_url: String, rows: Vec<EarningsRow>) -> Self {
        Self {
            day,
            source_url,
            row_count: rows.len(),
            rows,
            error: None,
        }
    }

    pub fn failed(day: NaiveDate, source_url: String, error: String) -> Self {
        Self {
            day,
            source_url,
            row_count: 0,
            rows: Vec::new(),
            error: Some(error),
        }
    }

    /// 是否为真正的抓取失败（没有财报的日期不算）
    pub fn is_failure(&self) -> bool {
        matches!(self.error.as_deref(), Some(e) if e != NO_ROWS_MESSAGE)
    }
}

/// 磁盘上的缓存单元，文件名由窗口起止日期决定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub params: WindowParams,
    pub updated_at: DateTime<FixedOffset>,
    pub source: String,
    #[serde(default)]
    pub days: Vec<DayResult>,
    /// 抓取失败时返回的旧缓存会被标记为stale
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub stale: bool,
}

impl CacheEntry {
    pub fn total_rows(&self) -> usize {
        self.days.iter().map(|d| d.row_count).sum()
    }

    pub fn failed_days(&self) -> usize {
        self.days.iter().filter(|d| d.is_failure()).count()
    }

    pub fn is_partial(&self) -> bool {
        self.stale || self.failed_days() > 0
    }

    pub fn summary(&self) -> String {
        format!("{} rows across {} day(s)", self.total_rows(), self.days.len())
    }
}

/// 给前端使用的汇总文件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputArtifact {
    #[serde(flatten)]
    pub entry: CacheEntry,
    pub generated_at: DateTime<FixedOffset>,
}
