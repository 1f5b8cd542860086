use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScraperError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Image error: {0}")]
    Image(#[from] ImageError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("OCR error: {0}")]
    Ocr(#[from] OcrError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable {name}")]
    MissingEnv { name: &'static str },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("HTTP request to '{url}' failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected HTTP status {status} from '{url}'")]
    Status { url: String, status: u16 },

    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Image not found in frame '{0}'")]
    ImageNotFound(String),

    #[error("Renderer must be restarted: {0}")]
    RestartRequired(String),
}

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Image is empty after trimming")]
    Empty,
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Asset path '{path}' is outside bucket '{bucket}'")]
    InvalidPath { path: String, bucket: String },

    #[error("Upload of '{path}' failed: {reason}")]
    Upload { path: String, reason: String },
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read manifest '{path}': {source}")]
    ReadManifest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Manifest line {line} is invalid: {reason}")]
    InvalidManifestRow { line: usize, reason: String },

    #[error("Could not determine advertiser/creative ids for '{0}'")]
    UnresolvedTarget(String),

    #[error("BigQuery request failed: {0}")]
    BigQuery(String),
}

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("Failed to initialize Tesseract: {0}")]
    Init(String),

    #[error("Failed to set image for OCR: {0}")]
    SetImage(String),

    #[error("OCR failed: {0}")]
    Recognize(String),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("No access token source available: {0}")]
    Unavailable(String),

    #[error("Failed to run '{command}': {source}")]
    Command {
        command: &'static str,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ScraperError>;
