pub mod day_fetcher;
pub mod enrichment;
pub mod output;
pub mod pipeline;
