use thiserror::Error;

/// Failure while storing one captured variant.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Image(#[from] crate::error::ImageError),

    #[error("{0}")]
    Storage(#[from] crate::error::StorageError),

    #[error("{0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Image dimensions {width}x{height} out of range")]
    Dimensions { width: u32, height: u32 },
}
