use crate::cache::Cache;
use crate::errors::{DataHubError, Result};
use crate::models::earnings::OutputArtifact;
use crate::models::metrics::TickerMap;
use crate::services::pipeline::merge_enrichment;
use crate::util;
use chrono::{DateTime, FixedOffset};
use log::{error, info, warn};
use std::fs;
use std::path::Path;

pub const OUTPUT_SOURCE: &str = "Earnings calendar (consolidated)";

/// 用最新的财报缓存和最新的行情数据生成前端文件
pub fn build_output(cache: &Cache) -> Result<OutputArtifact> {
    let id = cache.latest_earnings_id()?.ok_or_else(|| {
        DataHubError::DataError("No earnings cache files found. Run `refresh` first.".to_string())
    })?;

    let mut entry = cache
        .load(&id)
        .ok_or_else(|| DataHubError::DataError(format!("Failed to load earnings cache: {}", id)))?;

    let tickers = cache
        .latest_enrichment()
        .map(|record| record.tickers)
        .unwrap_or_default();
    merge_enrichment(&mut entry.days, &tickers);
    entry.source = OUTPUT_SOURCE.to_string();

    Ok(OutputArtifact {
        entry,
        generated_at: cache.timestamp(),
    })
}

pub fn write_output(path: &Path, artifact: &OutputArtifact) -> Result<()> {
    let json = serde_json::to_string_pretty(artifact)?;
    util::write_atomic(path, &json)?;
    info!("Wrote {}", path.display());
    Ok(())
}

pub fn load_output(path: &Path) -> Option<OutputArtifact> {
    if !path.exists() {
        return None;
    }
    let text = fs::read_to_string(path)
        .map_err(|e| warn!("Failed to read {}: {}", path.display(), e))
        .ok()?;
    serde_json::from_str(&text)
        .map_err(|e| error!("Failed to parse {}: {}", path.display(), e))
        .ok()
}

/// 把行情数据同步到已经生成的前端文件中
///
/// 文件不存在或无法解析时跳过，返回是否写入了文件。
pub fn propagate_enrichment(path: &Path, tickers: &TickerMap, now: DateTime<FixedOffset>) -> Result<bool> {
    if !path.exists() {
        warn!("Output {} does not exist; skipping update.", path.display());
        return Ok(false);
    }

    let mut artifact = match load_output(path) {
        Some(artifact) => artifact,
        None => return Ok(false),
    };

    for row in artifact.entry.days.iter_mut().flat_map(|d| d.rows.iter_mut()) {
        if let Some(metrics) = row.resolved_symbol().and_then(|s| tickers.get(&s)) {
            row.apply_metrics(metrics);
        }
    }
    artifact.entry.updated_at = now;

    write_output(path, &artifact)?;
    info!("Updated output with enrichment data: {}", path.display());
    Ok(true)
}
