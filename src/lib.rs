// 公开导出的模块，供外部使用
pub mod cache;
pub mod errors;
pub mod metrics;
pub mod models;

// 为了支持主程序和脚本，这些模块保持公开
// 但在库使用场景中，这些应该是内部模块
#[doc(hidden)]
pub mod scrapers;
#[doc(hidden)]
pub mod config;
#[doc(hidden)]
pub mod services;
#[doc(hidden)]
pub mod util;

// 重新导出常用类型，方便使用
pub use cache::{Cache, CacheId, Clock, FsStore, Store, SystemClock};
pub use config::Config;
pub use errors::{DataHubError, Result};
pub use models::earnings::{CacheEntry, DateWindow, DayResult, EarningsRow, OutputArtifact};
pub use models::metrics::{EnrichmentRecord, Metrics, TickerMap};
pub use services::enrichment::{EnrichmentJob, EnrichmentOutcome};
pub use services::pipeline::{merge_enrichment, Pipeline};
