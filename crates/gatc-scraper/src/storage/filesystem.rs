use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::error::StorageError;
use crate::metadata::AssetMetadata;
use crate::storage::ObjectStore;

/// Mirrors the bucket layout under a local directory:
/// `gs://<bucket>/<object>` is written to `<root>/<bucket>/<object>`, with a
/// `.json` metadata sidecar next to the PNG.
pub struct LocalObjectStore {
    root: PathBuf,
    bucket: String,
}

impl LocalObjectStore {
    pub fn new<P: AsRef<Path>>(root: P, bucket: impl Into<String>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            bucket: bucket.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Filesystem location of `object`.
    pub fn local_path(&self, object: &str) -> PathBuf {
        let mut path = self.root.join(&self.bucket);
        for segment in object.split('/').filter(|s| !s.is_empty() && *s != "..") {
            path.push(segment);
        }
        path
    }

    async fn ensure_directory(&self, path: &Path) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(path)
            .await
            .map_err(|e| StorageError::CreateDirectory {
                path: path.to_path_buf(),
                source: e,
            })
    }
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Hidden sibling of `path` used while its content is being written.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let seq = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{}.{}-{}.partial", name, std::process::id(), seq))
}

/// Writes `content` to a temp file next to `path` and renames it into
/// place, so readers only ever see a complete file.
async fn write_atomic(path: &Path, content: &[u8]) -> Result<(), StorageError> {
    let write_error = |e: std::io::Error| StorageError::WriteFile {
        path: path.to_path_buf(),
        source: e,
    };
    let temp = temp_sibling(path);
    let written = match tokio::fs::write(&temp, content).await {
        Ok(()) => tokio::fs::rename(&temp, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        let _ = tokio::fs::remove_file(&temp).await;
        return Err(write_error(e));
    }
    Ok(())
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_png(
        &self,
        object: &str,
        png: &[u8],
        metadata: &AssetMetadata,
    ) -> Result<Option<String>, StorageError> {
        let path = self.local_path(object);
        if let Some(parent) = path.parent() {
            self.ensure_directory(parent).await?;
        }

        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StorageError::WriteFile {
                path: path.clone(),
                source: e,
            })?;
        if !exists {
            // Sidecar first: a PNG on disk always has its metadata.
            let json = serde_json::to_vec_pretty(&metadata.to_json()).unwrap_or_default();
            write_atomic(&path.with_extension("json"), &json).await?;
            write_atomic(&path, png).await?;
        }

        Ok(Some(path.to_string_lossy().into_owned()))
    }
}
