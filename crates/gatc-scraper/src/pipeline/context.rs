use std::sync::Arc;

use crate::capture::CreativeRenderer;
use crate::db::Recorder;
use crate::ocr::OcrProcessor;
use crate::source::AdCatalog;
use crate::storage::ObjectStore;

use super::config::PipelineConfig;

/// Everything a worker needs, shared across the run.
#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<PipelineConfig>,
    pub recorder: Recorder,
    pub store: Arc<dyn ObjectStore>,
    pub catalog: Arc<dyn AdCatalog>,
    pub renderer: Arc<dyn CreativeRenderer>,
    pub ocr: OcrProcessor,
}
