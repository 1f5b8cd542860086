//! Content-addressed asset storage.
//!
//! Assets live at `gs://<bucket>/assets/<image|text>/<sha[0..2]>/<sha>.png`.
//! The path is a pure function of the normalized PNG's SHA-256, so writes
//! are idempotent and identical creatives share one object.

pub mod filesystem;
pub mod gcs;

use async_trait::async_trait;

use crate::config::AdType;
use crate::error::StorageError;
use crate::metadata::AssetMetadata;

pub use filesystem::LocalObjectStore;
pub use gcs::GcsObjectStore;

/// `Cache-Control` of every uploaded asset.
pub const ASSET_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Canonical storage path of an asset.
pub fn canonical_asset_path(bucket: &str, ad_type: AdType, sha256: &str) -> String {
    let prefix = sha256.get(..2).unwrap_or(sha256);
    format!(
        "gs://{}/assets/{}/{}/{}.png",
        bucket,
        ad_type.script(),
        prefix,
        sha256
    )
}

/// Splits `gs://<bucket>/<object>` into its object name, checking the bucket.
pub fn object_name<'a>(bucket: &str, path: &'a str) -> Result<&'a str, StorageError> {
    path.strip_prefix("gs://")
        .and_then(|rest| rest.strip_prefix(bucket))
        .and_then(|rest| rest.strip_prefix('/'))
        .filter(|name| !name.is_empty())
        .ok_or_else(|| StorageError::InvalidPath {
            path: path.to_string(),
            bucket: bucket.to_string(),
        })
}

/// Where an asset ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    pub gcs_path: String,
    /// Filesystem copy, when the store keeps one.
    pub local_path: Option<String>,
}

/// Destination for normalized PNG assets.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Bucket the store writes into.
    fn bucket(&self) -> &str;

    /// Stores `png` under `object`. Re-storing an existing object is a no-op.
    async fn put_png(
        &self,
        object: &str,
        png: &[u8],
        metadata: &AssetMetadata,
    ) -> Result<Option<String>, StorageError>;
}

/// Uploads an asset at its canonical path, or only logs it on a dry run.
pub async fn upload_asset(
    store: &dyn ObjectStore,
    path: &str,
    png: &[u8],
    metadata: &AssetMetadata,
    dry_run: bool,
) -> Result<StoredAsset, StorageError> {
    let object = object_name(store.bucket(), path)?;

    if dry_run {
        tracing::info!(event = "dry_run_upload", path = path);
        return Ok(StoredAsset {
            gcs_path: path.to_string(),
            local_path: None,
        });
    }

    let local_path = store.put_png(object, png, metadata).await?;
    tracing::debug!(event = "asset_uploaded", path = path, bytes = png.len());
    Ok(StoredAsset {
        gcs_path: path.to_string(),
        local_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_paths() {
        let sha = "a".repeat(64);
        assert_eq!(
            canonical_asset_path("bucket", AdType::Image, &sha),
            format!("gs://bucket/assets/image/aa/{}.png", sha)
        );
        assert_eq!(
            canonical_asset_path("bucket", AdType::Text, &sha),
            format!("gs://bucket/assets/text/aa/{}.png", sha)
        );
    }

    #[test]
    fn test_object_name() {
        assert_eq!(
            object_name("b", "gs://b/assets/image/aa/x.png").unwrap(),
            "assets/image/aa/x.png"
        );
        assert!(matches!(
            object_name("b", "gs://other/assets/x.png"),
            Err(StorageError::InvalidPath { .. })
        ));
        assert!(object_name("b", "gs://bb/assets/x.png").is_err());
        assert!(object_name("b", "/tmp/x.png").is_err());
    }
}
