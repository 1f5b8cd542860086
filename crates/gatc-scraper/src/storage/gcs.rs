use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::auth::{authorized, TokenProvider};
use crate::error::StorageError;
use crate::metadata::AssetMetadata;
use crate::storage::{ObjectStore, ASSET_CACHE_CONTROL};

const UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1/b";
const BOUNDARY: &str = "gatc_asset_boundary_7c1f";

/// Uploads assets through the Cloud Storage JSON API.
pub struct GcsObjectStore {
    bucket: String,
    http: reqwest::Client,
    tokens: Arc<TokenProvider>,
}

impl GcsObjectStore {
    pub fn new(bucket: impl Into<String>, http: reqwest::Client, tokens: Arc<TokenProvider>) -> Self {
        Self {
            bucket: bucket.into(),
            http,
            tokens,
        }
    }
}

/// Builds a `multipart/related` body of object resource JSON plus media.
fn multipart_body(resource: &serde_json::Value, png: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(png.len() + 1024);
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{json}\r\n--{b}\r\nContent-Type: image/png\r\n\r\n",
            b = BOUNDARY,
            json = resource
        )
        .as_bytes(),
    );
    body.extend_from_slice(png);
    body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn object_resource(object: &str, metadata: &AssetMetadata) -> serde_json::Value {
    serde_json::json!({
        "name": object,
        "contentType": "image/png",
        "cacheControl": ASSET_CACHE_CONTROL,
        "metadata": metadata.to_json(),
    })
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_png(
        &self,
        object: &str,
        png: &[u8],
        metadata: &AssetMetadata,
    ) -> Result<Option<String>, StorageError> {
        let url = format!("{}/{}/o", UPLOAD_BASE, self.bucket);
        let body = multipart_body(&object_resource(object, metadata), png);

        let request = self
            .http
            .post(&url)
            // Objects are content addressed; an existing object already holds these bytes.
            .query(&[("uploadType", "multipart"), ("ifGenerationMatch", "0")])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={}", BOUNDARY),
            )
            .timeout(Duration::from_secs(60))
            .body(body);
        let request = authorized(&self.tokens, request)
            .await
            .map_err(|e| StorageError::Upload {
                path: object.to_string(),
                reason: e.to_string(),
            })?;

        let resp = request.send().await.map_err(|e| StorageError::Upload {
            path: object.to_string(),
            reason: e.to_string(),
        })?;

        match resp.status() {
            s if s.is_success() => Ok(None),
            StatusCode::PRECONDITION_FAILED => {
                tracing::debug!(event = "asset_exists", object = object);
                Ok(None)
            }
            status => {
                let text = resp.text().await.unwrap_or_default();
                Err(StorageError::Upload {
                    path: object.to_string(),
                    reason: format!("HTTP {}: {}", status.as_u16(), text),
                })
            }
        }
    }
}
