pub mod config;
pub mod context;
pub mod error;
pub mod monitor;
pub mod processor;
pub mod producer;
pub mod runner;
pub mod worker;

pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use error::PipelineError;
pub use monitor::MONITOR_INTERVAL;
pub use processor::{finalize_capture, process_ad, AdOutcome};
pub use producer::produce;
pub use runner::{run, RunSummary};
