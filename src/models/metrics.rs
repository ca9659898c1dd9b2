use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// 单只股票的行情指标，每个字段都可能缺失
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub eps_estimate_curr_q: Option<f64>,
    #[serde(default)]
    pub revenue_estimate_curr_q: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(default)]
    pub pe_ratio: Option<f64>,
    #[serde(default)]
    pub year_high: Option<f64>,
    #[serde(default)]
    pub year_low: Option<f64>,
}

impl Metrics {
    pub fn is_empty(&self) -> bool {
        *self == Metrics::default()
    }
}

pub type TickerMap = BTreeMap<String, Metrics>;

/// 一次补全任务的结果，按日期保存，最新的一份为 "latest"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRecord {
    pub updated_at: DateTime<FixedOffset>,
    pub source: String,
    #[serde(default)]
    pub tickers: TickerMap,
}
