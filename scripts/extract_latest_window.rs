use anyhow::{anyhow, Context, Result};
use earnings_datahub::cache::{Cache, FsStore, SystemClock};
use earnings_datahub::config::Config;
use std::path::Path;
use std::sync::Arc;

fn main() -> Result<()> {
    let config = Config::new();
    let cache_dir = std::env::args().nth(1).unwrap_or_else(|| "cache".to_string());

    // 检查缓存目录是否存在
    if !Path::new(&cache_dir).exists() {
        return Err(anyhow!(
            "缓存目录不存在，请先运行 'cargo run --bin earnings_datahub -- refresh'"
        ));
    }

    let store = FsStore::new(&cache_dir).with_context(|| format!("无法打开缓存目录 {}", cache_dir))?;
    let cache = Cache::new(Arc::new(store), Arc::new(SystemClock), config.timezone);

    let id = match cache.latest_earnings_id()? {
        Some(id) => id,
        None => {
            println!("未找到财报缓存");
            return Ok(());
        }
    };

    let entry = cache
        .load(&id)
        .ok_or_else(|| anyhow!("缓存文件无法解析: {}", id))?;

    println!("最新窗口: {} -> {}", entry.params.start_day, entry.params.end_day);
    println!("缓存文件: {}", id);
    println!("更新时间: {}", entry.updated_at);
    if let Some(age) = cache.age(&id) {
        println!("缓存时长: {}h {}m", age.num_hours(), age.num_minutes() % 60);
    }
    println!("数据来源: {}", entry.source);
    println!("汇总: {}", entry.summary());

    for day in &entry.days {
        match &day.error {
            Some(error) => println!("  {}  {:>4}  ({})", day.day, day.row_count, error),
            None => println!("  {}  {:>4}", day.day, day.row_count),
        }
    }

    match cache.latest_enrichment_id()? {
        Some(enriched) => println!("最新行情补全: {}", enriched),
        None => println!("尚无行情补全数据"),
    }

    Ok(())
}
