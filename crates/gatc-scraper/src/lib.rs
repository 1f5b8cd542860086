pub mod auth;
pub mod capture;
pub mod config;
pub mod db;
pub mod error;
pub mod hashing;
pub mod logging;
pub mod metadata;
pub mod metrics;
pub mod ocr;
pub mod pipeline;
pub mod source;
pub mod storage;
pub mod urls;
pub mod versioning;

pub use capture::{CapturedVariant, CreativeRenderer, HttpRenderer, RenderOutcome, TerminalStatus};
pub use config::{load_scrape_config, AdType, ScrapeConfig};
pub use db::{AdStatus, DatabaseError, Recorder};
pub use error::{
    AuthError, CaptureError, ConfigError, ImageError, OcrError, Result, ScraperError, SourceError,
    StorageError,
};
pub use pipeline::{AdOutcome, PipelineConfig, PipelineContext, RunSummary};
pub use source::{AdCatalog, AdTarget, TargetPages};
pub use storage::{LocalObjectStore, ObjectStore};
