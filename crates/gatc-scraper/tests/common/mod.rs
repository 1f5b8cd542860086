//! Shared test utilities for gatc-scraper integration tests.
//!
//! This module provides:
//! - `TestHarness` wiring a pipeline to an in-memory database and a temp bucket
//! - Scripted stand-ins for the renderer and the BigQuery catalog
//! - Builders for pipeline configuration and creative fixtures

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
