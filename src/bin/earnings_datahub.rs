use earnings_datahub::cache::{Cache, FsStore, SystemClock};
use earnings_datahub::config::Config;
use earnings_datahub::models::earnings::DateWindow;
use earnings_datahub::scrapers::finnhub::FinnhubCalendar;
use earnings_datahub::scrapers::rapidapi::RapidApiQuotes;
use earnings_datahub::services::day_fetcher::DayFetcher;
use earnings_datahub::services::enrichment::{EnrichmentJob, EnrichmentOutcome};
use earnings_datahub::services::output;
use earnings_datahub::services::pipeline::Pipeline;
use earnings_datahub::util;

use chrono::Duration as TtlDuration;
use clap::{App, Arg, ArgMatches, SubCommand};
use log::{info, warn};
use std::error::Error;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let default_days = util::DEFAULT_WINDOW_DAYS.to_string();

    let concurrency_arg = Arg::with_name("max-concurrency")
        .long("max-concurrency")
        .value_name("K")
        .help("Max concurrent quote requests for enrichment")
        .takes_value(true)
        .default_value("3");

    let app = App::new("Earnings DataHub")
        .version(env!("CARGO_PKG_VERSION"))
        .author("DataHub Team")
        .about("Earnings calendar fetch, cache and enrichment pipeline")
        .arg(
            Arg::with_name("cache-dir")
                .long("cache-dir")
                .value_name("DIR")
                .help("Directory holding the earnings and enrichment caches")
                .takes_value(true)
                .global(true)
                .default_value("cache"),
        )
        .arg(
            Arg::with_name("calendar-key")
                .long("calendar-key")
                .value_name("KEY")
                .help("Finnhub API key (default: FINNHUB_API_KEY env)")
                .takes_value(true)
                .global(true),
        )
        .arg(
            Arg::with_name("quote-key")
                .long("quote-key")
                .value_name("KEY")
                .help("RapidAPI key (default: RAPIDAPI_KEY env)")
                .takes_value(true)
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("refresh")
                .about("Refresh the earnings cache for a date window")
                .arg(
                    Arg::with_name("start")
                        .long("start")
                        .value_name("DATE")
                        .help("Start date YYYY-MM-DD (default: today SGT)")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("days")
                        .long("days")
                        .value_name("N")
                        .help("Window length (1-14 days)")
                        .takes_value(true)
                        .allow_hyphen_values(true)
                        .default_value(&default_days),
                )
                .arg(
                    Arg::with_name("enrich")
                        .long("enrich")
                        .help("Also refresh ticker enrichment cache")
                        .takes_value(false),
                )
                .arg(
                    Arg::with_name("force")
                        .short('f')
                        .long("force")
                        .help("Fetch again even if the earnings cache is fresh")
                        .takes_value(false),
                )
                .arg(concurrency_arg.clone()),
        )
        .subcommand(
            SubCommand::with_name("enrich")
                .about("Fetch quote metrics for every cached ticker")
                .arg(
                    Arg::with_name("force")
                        .short('f')
                        .long("force")
                        .help("Force refresh even if cache is fresh")
                        .takes_value(false),
                )
                .arg(concurrency_arg),
        )
        .subcommand(
            SubCommand::with_name("generate")
                .about("Generate the consolidated earnings JSON")
                .arg(
                    Arg::with_name("output")
                        .short('o')
                        .long("output")
                        .value_name("PATH")
                        .help("Path to write JSON")
                        .takes_value(true)
                        .default_value("data/earnings_data.json"),
                ),
        );

    let matches = app.get_matches();

    let config = Config::from_env()
        .with_cache_dir(matches.value_of("cache-dir").unwrap_or("cache"))
        .with_calendar_api_key(matches.value_of("calendar-key").map(str::to_string))
        .with_quote_api_key(matches.value_of("quote-key").map(str::to_string));

    if let Some(matches) = matches.subcommand_matches("refresh") {
        run_refresh(config, matches).await?;
    } else if let Some(matches) = matches.subcommand_matches("enrich") {
        let config = config.with_max_concurrency(parse_concurrency(matches)?);
        run_enrich(config, matches.is_present("force")).await?;
    } else if let Some(matches) = matches.subcommand_matches("generate") {
        let config = config.with_output_path(matches.value_of("output").unwrap_or("data/earnings_data.json"));
        run_generate(config)?;
    } else {
        info!("No command specified. Use --help for usage information.");
    }

    Ok(())
}

fn open_cache(config: &Config) -> Result<Cache, Box<dyn Error>> {
    let store = FsStore::new(&config.cache_dir)?;
    Ok(Cache::new(Arc::new(store), Arc::new(SystemClock), config.timezone))
}

fn parse_concurrency(matches: &ArgMatches) -> Result<usize, Box<dyn Error>> {
    let raw = matches.value_of("max-concurrency").unwrap_or("3");
    raw.parse::<usize>()
        .map_err(|_| format!("Invalid --max-concurrency: {}", raw).into())
}

async fn run_refresh(config: Config, matches: &ArgMatches) -> Result<(), Box<dyn Error>> {
    let mut config = config.with_max_concurrency(parse_concurrency(matches)?);
    if matches.is_present("force") {
        // TTL为零：缓存永远不新鲜，但抓取失败时仍可退回旧缓存
        config = config.with_cache_ttl(TtlDuration::zero());
    }
    let cache = open_cache(&config)?;

    // 所有参数在发出任何请求之前校验
    let start = util::parse_start_date(matches.value_of("start"), cache.today())?;
    let raw_days = matches.value_of("days").unwrap_or("7");
    let days = raw_days
        .parse::<i64>()
        .map_err(|_| format!("Invalid --days: {}", raw_days))?;
    let window = DateWindow::from_start_and_days(start, util::clamp_days(days))?;

    let calendar_key = config.require_calendar_key()?;
    let do_enrich = matches.is_present("enrich");
    if do_enrich {
        config.require_quote_key()?;
    }

    info!(
        "Refreshing earnings window {} -> {} (days={})",
        window.start,
        window.end,
        window.days()
    );

    let source = Arc::new(FinnhubCalendar::new(calendar_key, config.request_timeout)?);
    let fetcher = DayFetcher::new(source, &config);
    let pipeline = Pipeline::new(cache.clone(), fetcher, config.cache_ttl);

    let entry = pipeline.build_payload(&window).await?;
    if entry.is_partial() {
        warn!(
            "Refresh partial: {} ({} failed day(s){})",
            entry.summary(),
            entry.failed_days(),
            if entry.stale { ", served from stale cache" } else { "" }
        );
    } else {
        info!("Refresh complete: {}", entry.summary());
    }

    if do_enrich {
        // refresh 之后的补全总是强制刷新
        let job = build_enrichment_job(&config, cache)?;
        if let Some(outcome) = job.enrich_discovered(config.enrich_ttl, true).await? {
            report_enrichment(&outcome);
        }
    }

    Ok(())
}

fn build_enrichment_job(config: &Config, cache: Cache) -> Result<EnrichmentJob, Box<dyn Error>> {
    let quotes = RapidApiQuotes::new(config.require_quote_key()?, config.request_timeout)?;
    Ok(EnrichmentJob::new(cache, Arc::new(quotes), config))
}

async fn run_enrich(config: Config, force: bool) -> Result<(), Box<dyn Error>> {
    config.require_quote_key()?;
    let cache = open_cache(&config)?;
    let job = build_enrichment_job(&config, cache)?;

    if let Some(outcome) = job.enrich_discovered(config.enrich_ttl, force).await? {
        report_enrichment(&outcome);
    }
    Ok(())
}

fn report_enrichment(outcome: &EnrichmentOutcome) {
    let total = outcome.record.tickers.len();
    if outcome.reused {
        info!("Enrichment complete: reused fresh cache with {} tickers", total);
    } else if outcome.is_partial() {
        warn!(
            "Enrichment partial: {}/{} tickers failed ({})",
            outcome.failed.len(),
            total,
            outcome.failed.join(", ")
        );
    } else {
        info!("Enrichment complete: {} tickers", total);
    }
}

fn run_generate(config: Config) -> Result<(), Box<dyn Error>> {
    let cache = open_cache(&config)?;
    let artifact = output::build_output(&cache)?;
    output::write_output(&config.output_path, &artifact)?;

    if artifact.entry.is_partial() {
        warn!(
            "Generated partial output: {} ({} failed day(s))",
            artifact.entry.summary(),
            artifact.entry.failed_days()
        );
    } else {
        info!("Generated output: {}", artifact.entry.summary());
    }
    Ok(())
}
