mod common;

use chrono::Duration as TtlDuration;
use common::{date, raw_entry, Harness, StubCalendar};
use earnings_datahub::cache::{CacheId, Store};
use earnings_datahub::config::Config;
use earnings_datahub::errors::DataHubError;
use earnings_datahub::models::earnings::{DateWindow, NO_ROWS_MESSAGE};
use earnings_datahub::models::metrics::Metrics;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn window() -> DateWindow {
    DateWindow::from_start_and_days(date(2025, 1, 6), 3).unwrap()
}

#[tokio::test]
async fn test_second_build_within_ttl_is_cache_hit() {
    let harness = Harness::new();
    let source = Arc::new(StubCalendar::new(vec![raw_entry("aapl", "2.35")]));
    let pipeline = harness.pipeline(source.clone());

    let first = pipeline.build_payload(&window()).await.unwrap();
    harness.clock.advance(TtlDuration::hours(1));
    let second = pipeline.build_payload(&window()).await.unwrap();

    assert_eq!(source.query_count(), 3);
    assert_eq!(source.connects.load(Ordering::SeqCst), 1);
    assert_eq!(first.days, second.days);
    assert_eq!(first.params.start_day, "2025-01-06");
    assert_eq!(first.params.end_day, "2025-01-08");
    assert_eq!(first.source, "Stub calendar");
    assert!(!second.stale);
}

#[tokio::test]
async fn test_rows_are_normalized_and_stored() {
    let harness = Harness::new();
    let source = Arc::new(StubCalendar::new(vec![raw_entry(" msft ", "3.10")]));
    let pipeline = harness.pipeline(source);

    let entry = pipeline.build_payload(&window()).await.unwrap();
    let row = &entry.days[0].rows[0];
    assert_eq!(row.symbol.as_deref(), Some("MSFT"));
    assert_eq!(row.time_label, "After Close");
    assert_eq!(row.quote_url.as_deref(), Some("https://finance.example.com/quote/MSFT"));
    assert_eq!(row.eps_estimate_curr_q, Some(3.10));

    let id = harness.cache.path_for(&window());
    assert_eq!(id.as_str(), "earnings_20250106_20250108.json");
    assert_eq!(harness.cache.load(&id), Some(entry));
}

#[tokio::test]
async fn test_expired_cache_is_refetched() {
    let harness = Harness::new();
    let source = Arc::new(StubCalendar::new(vec![raw_entry("AAPL", "2.35")]));
    let pipeline = harness.pipeline(source.clone());

    pipeline.build_payload(&window()).await.unwrap();
    harness.clock.advance(TtlDuration::hours(25));
    pipeline.build_payload(&window()).await.unwrap();

    assert_eq!(source.query_count(), 6);
}

#[tokio::test]
async fn test_connect_failure_without_cache_is_error() {
    let harness = Harness::new();
    let source = Arc::new(StubCalendar::new(vec![raw_entry("AAPL", "2.35")]));
    source.set_connect_ok(false);
    let pipeline = harness.pipeline(source.clone());

    let result = pipeline.build_payload(&window()).await;
    assert!(matches!(result, Err(DataHubError::SourceUnavailable(_))));
    assert_eq!(source.query_count(), 0);
    assert!(harness.store.is_empty());
}

#[tokio::test]
async fn test_connect_failure_falls_back_to_stale_cache() {
    let harness = Harness::new();
    let source = Arc::new(StubCalendar::new(vec![raw_entry("AAPL", "2.35")]));
    let pipeline = harness.pipeline(source.clone());

    let original = pipeline.build_payload(&window()).await.unwrap();
    harness.clock.advance(TtlDuration::hours(30));
    source.set_connect_ok(false);

    let fallback = pipeline.build_payload(&window()).await.unwrap();
    assert!(fallback.stale);
    assert!(fallback.is_partial());
    assert_eq!(fallback.days, original.days);
    assert!(fallback.updated_at > original.updated_at);

    // 旧缓存本身不会被改写
    let stored = harness.cache.load(&harness.cache.path_for(&window())).unwrap();
    assert!(!stored.stale);
    assert_eq!(stored.updated_at, original.updated_at);
}

#[tokio::test]
async fn test_fallback_merges_enrichment_written_after_fetch() {
    let harness = Harness::new();
    let source = Arc::new(StubCalendar::new(vec![raw_entry("AAPL", "2.35")]));
    let pipeline = harness.pipeline(source.clone());

    let original = pipeline.build_payload(&window()).await.unwrap();
    assert_eq!(original.days[0].rows[0].stock_price, None);

    harness.clock.advance(TtlDuration::hours(30));
    harness.write_enrichment(
        "AAPL",
        Metrics {
            price: Some(42.0),
            ..Default::default()
        },
    );
    source.set_connect_ok(false);

    let fallback = pipeline.build_payload(&window()).await.unwrap();
    assert!(fallback.stale);
    assert!(fallback.days.iter().all(|d| d.rows[0].stock_price == Some(42.0)));
    assert_eq!(fallback.days[0].rows[0].eps_estimate_curr_q, Some(2.35));

    let stored = harness.cache.load(&harness.cache.path_for(&window())).unwrap();
    assert_eq!(stored.days[0].rows[0].stock_price, None);
}

#[tokio::test]
async fn test_zero_ttl_always_refetches() {
    let harness = Harness::new();
    let source = Arc::new(StubCalendar::new(vec![raw_entry("AAPL", "2.35")]));
    let config = Config::new()
        .without_delays()
        .with_cache_ttl(TtlDuration::zero());
    let pipeline = harness.pipeline_with(source.clone(), config);

    pipeline.build_payload(&window()).await.unwrap();
    pipeline.build_payload(&window()).await.unwrap();
    assert_eq!(source.query_count(), 6);

    // 即使不使用缓存，抓取失败时依然退回旧数据
    source.set_connect_ok(false);
    let fallback = pipeline.build_payload(&window()).await.unwrap();
    assert!(fallback.stale);
    assert_eq!(fallback.total_rows(), 3);
}

#[tokio::test]
async fn test_corrupt_cache_is_a_miss() {
    let harness = Harness::new();
    let id: CacheId = harness.cache.path_for(&window());
    harness.store.write(&id, "{\"params\": [").unwrap();

    let source = Arc::new(StubCalendar::new(vec![raw_entry("AAPL", "2.35")]));
    let pipeline = harness.pipeline(source.clone());
    let entry = pipeline.build_payload(&window()).await.unwrap();

    assert_eq!(source.query_count(), 3);
    assert_eq!(entry.total_rows(), 3);
    assert!(harness.cache.load(&id).is_some());
}

#[tokio::test]
async fn test_no_data_days_are_not_failures() {
    let harness = Harness::new();
    let source = Arc::new(StubCalendar::new(vec![]));
    let pipeline = harness.pipeline(source.clone());

    let entry = pipeline.build_payload(&window()).await.unwrap();
    assert_eq!(source.query_count(), 3);
    assert!(entry
        .days
        .iter()
        .all(|d| d.error.as_deref() == Some(NO_ROWS_MESSAGE) && d.row_count == 0));
    assert!(!entry.is_partial());
    assert_eq!(entry.summary(), "0 rows across 3 day(s)");
}

#[tokio::test]
async fn test_latest_enrichment_is_merged() {
    let harness = Harness::new();
    harness.write_enrichment(
        "AAPL",
        Metrics {
            price: Some(190.5),
            eps_estimate_curr_q: Some(2.4),
            ..Default::default()
        },
    );

    let source = Arc::new(StubCalendar::new(vec![raw_entry("aapl", "2.35"), raw_entry("MSFT", "3.10")]));
    let pipeline = harness.pipeline(source);
    let entry = pipeline.build_payload(&window()).await.unwrap();

    let rows = &entry.days[0].rows;
    assert_eq!(rows[0].stock_price, Some(190.5));
    assert_eq!(rows[0].eps_estimate_curr_q, Some(2.4));
    assert_eq!(rows[1].stock_price, None);
    assert_eq!(rows[1].eps_estimate_curr_q, Some(3.10));
}
