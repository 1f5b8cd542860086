pub mod loader;
pub mod schema;

pub use loader::{build_scrape_config, load_scrape_config, DbArgs, ScrapeArgs};
pub use schema::{
    AdType, AssetSink, CaptureSettings, DbSettings, OrderBy, RetryPolicy, ScrapeConfig,
    Selection, PRIMARY_VARIANT_ID,
};
