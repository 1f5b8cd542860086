//! Test harness for isolated pipeline runs.
//!
//! Each harness owns a temp directory that stands in for the bucket and a
//! fresh in-memory database with the full schema applied.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sea_orm::DatabaseConnection;
use tempfile::TempDir;

use gatc_scraper::config::DbSettings;
use gatc_scraper::db::{self, ad_repo, entities::ad};
use gatc_scraper::ocr::OcrProcessor;
use gatc_scraper::storage::LocalObjectStore;
use gatc_scraper::{AdCatalog, CreativeRenderer, PipelineConfig, PipelineContext, Recorder};

use super::builders::TEST_BUCKET;

/// Isolated environment for pipeline tests.
pub struct TestHarness {
    temp_dir: TempDir,
    db: DatabaseConnection,
}

impl TestHarness {
    /// Creates a harness with a migrated in-memory database.
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = db::connect(&in_memory_settings())
            .await
            .expect("Failed to open in-memory database");
        db::init_database(&db)
            .await
            .expect("Failed to migrate database");
        Self { temp_dir, db }
    }

    /// Root of the local bucket mirror.
    pub fn bucket_root(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Writes a file under the temp directory and returns its path.
    pub fn write_file(&self, name: &str, content: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        std::fs::write(&path, content).expect("Failed to write test file");
        path
    }

    /// Wires a pipeline context around the harness database and bucket.
    /// OCR stays disabled so no Tesseract install is needed.
    pub fn context(
        &self,
        config: PipelineConfig,
        renderer: Arc<dyn CreativeRenderer>,
        catalog: Arc<dyn AdCatalog>,
    ) -> PipelineContext {
        let dry_run = config.dry_run;
        PipelineContext {
            store: Arc::new(LocalObjectStore::new(self.bucket_root(), TEST_BUCKET)),
            config: Arc::new(config),
            recorder: Recorder::new(self.db.clone(), dry_run),
            catalog,
            renderer,
            ocr: OcrProcessor::new(&[], true),
        }
    }

    /// Loads one ad row.
    pub async fn ad(&self, ad_id: &str, variant_id: &str) -> Option<ad::Model> {
        ad_repo::find(&self.db, ad_id, variant_id)
            .await
            .expect("Failed to query ad")
    }

    /// Object names written to the test bucket, sorted.
    pub fn stored_objects(&self) -> Vec<String> {
        let bucket = self.bucket_root().join(TEST_BUCKET);
        let mut found = Vec::new();
        collect_files(&bucket, &bucket, &mut found);
        found.sort();
        found
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect_files(root, &path, out);
        } else if let Ok(rel) = path.strip_prefix(root) {
            out.push(rel.to_string_lossy().replace('\\', "/"));
        }
    }
}

fn in_memory_settings() -> DbSettings {
    DbSettings {
        database_url: Some("sqlite::memory:".to_string()),
        name: "adsdb".to_string(),
        user: "postgres".to_string(),
        password: None,
        host: None,
        port: 5432,
        sslmode: "disable".to_string(),
        sql_conn: String::new(),
        connect_timeout: Duration::from_secs(5),
    }
}
