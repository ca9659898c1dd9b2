//! 从任意嵌套的行情数据中提取标准指标
//!
//! 上游接口的字段名随供应商和版本变化，这里先把结构展平成 (key, value)
//! 序列，再按固定顺序的匹配规则逐个认领。

use serde_json::{Map, Value};

use crate::models::metrics::Metrics;
use crate::util::parse_number;

/// 深度优先展平：对象的每个键先输出自身，再递归其值；数组递归每个元素
pub fn flatten(value: &Value) -> Vec<(&str, &Value)> {
    let mut out = Vec::new();
    flatten_into(value, &mut out);
    out
}

fn flatten_into<'a>(value: &'a Value, out: &mut Vec<(&'a str, &'a Value)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                out.push((key.as_str(), child));
                flatten_into(child, out);
            }
        }
        Value::Array(items) => {
            for item in items {
                flatten_into(item, out);
            }
        }
        _ => {}
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Price,
    Eps,
    Revenue,
    Volume,
    MarketCap,
    PeRatio,
    YearHigh,
    YearLow,
}

struct Matcher {
    field: Field,
    exact: &'static [&'static str],
    loose: fn(&str) -> bool,
}

// 顺序即优先级
const MATCHERS: &[Matcher] = &[
    Matcher {
        field: Field::Price,
        exact: &["regularmarketprice", "marketprice", "lastprice", "price", "regularmarketpreviousclose"],
        loose: |k| k.contains("price"),
    },
    Matcher {
        field: Field::Eps,
        exact: &["epsestimate", "epsforward", "eps", "earningsestimate", "epsquarterly", "epssurprise"],
        loose: |k| k.contains("eps"),
    },
    Matcher {
        field: Field::Revenue,
        exact: &["revenuestimate", "revenueforecast", "totalrevenue", "revenue"],
        loose: |k| k.contains("revenue"),
    },
    Matcher {
        field: Field::Volume,
        exact: &["volume", "regularmarketvolume", "totalvolume", "sharestraded"],
        loose: |k| k.contains("volume"),
    },
    Matcher {
        field: Field::MarketCap,
        exact: &["marketcap", "marketcapitalization", "marketcapitalest", "marketcapital"],
        loose: |k| k.contains("marketcap"),
    },
    Matcher {
        field: Field::PeRatio,
        exact: &["peratio", "trailingpe", "forwardpe", "pe"],
        loose: |k| k.contains("pe") && !k.contains("peg"),
    },
    Matcher {
        field: Field::YearHigh,
        exact: &["fiftytwo_weekhigh", "52weekhigh", "week52high", "fiftytwo_weekhi"],
        loose: |k| k.contains("52") && k.contains("high"),
    },
    Matcher {
        field: Field::YearLow,
        exact: &["fiftytwo_weeklow", "52weeklow", "week52low", "fiftytwo_weeklo"],
        loose: |k| k.contains("52") && k.contains("low"),
    },
];

fn slot(metrics: &mut Metrics, field: Field) -> &mut Option<f64> {
    match field {
        Field::Price => &mut metrics.price,
        Field::Eps => &mut metrics.eps_estimate_curr_q,
        Field::Revenue => &mut metrics.revenue_estimate_curr_q,
        Field::Volume => &mut metrics.volume,
        Field::MarketCap => &mut metrics.market_cap,
        Field::PeRatio => &mut metrics.pe_ratio,
        Field::YearHigh => &mut metrics.year_high,
        Field::YearLow => &mut metrics.year_low,
    }
}

/// 提取8个标准指标，没有匹配到的字段保持None
///
/// 每个键最多被一个指标认领；指标一旦取到数值就不再变化。
pub fn extract_metrics(record: &Value) -> Metrics {
    let mut metrics = Metrics::default();

    for (key, value) in flatten(record) {
        let normalized = key.to_lowercase();
        let claimed = MATCHERS.iter().find(|m| {
            slot(&mut metrics, m.field).is_none()
                && (m.exact.contains(&normalized.as_str()) || (m.loose)(&normalized))
        });

        if let Some(matcher) = claimed {
            *slot(&mut metrics, matcher.field) = parse_number(value);
        }
    }

    metrics
}

/// 从供应商的响应信封中选出指定股票的那条记录
pub fn select_entry(symbol: &str, payload: &Value) -> Value {
    let mut candidates: Vec<&Value> = Vec::new();

    match payload {
        Value::Object(map) => {
            for key in ["data", "result", "quotes", "response", "items"] {
                match map.get(key) {
                    Some(Value::Array(items)) => candidates.extend(items.iter()),
                    Some(Value::Object(inner)) => candidates.extend(inner.values()),
                    _ => {}
                }
            }
            if candidates.is_empty() {
                candidates.push(payload);
            }
        }
        Value::Array(items) => candidates.extend(items.iter()),
        _ => {}
    }

    let upper = symbol.trim().to_uppercase();
    let matched = candidates.iter().find(|item| {
        ["symbol", "ticker", "instrument"]
            .iter()
            .find_map(|k| item.get(*k).and_then(Value::as_str))
            .map(|s| s.trim().to_uppercase() == upper)
            .unwrap_or(false)
    });

    match matched.or_else(|| candidates.first()) {
        Some(item) if item.is_object() => (*item).clone(),
        _ => Value::Object(Map::new()),
    }
}
