//! OAuth access tokens for Google Cloud REST APIs.
//!
//! Sources, in order: `GOOGLE_OAUTH_ACCESS_TOKEN`, the GCE/Cloud Run
//! metadata server, then the `gcloud` CLI (which honours
//! `GOOGLE_APPLICATION_CREDENTIALS`).

use std::time::{Duration, Instant};

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::error::AuthError;

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Tokens are refreshed this long before they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// Assumed lifetime of tokens printed by `gcloud`.
const GCLOUD_TOKEN_TTL: Duration = Duration::from_secs(45 * 60);

struct CachedToken {
    token: SecretString,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct MetadataToken {
    access_token: String,
    expires_in: u64,
}

/// Caching access token resolver shared by the GCS and BigQuery clients.
pub struct TokenProvider {
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            cached: Mutex::new(None),
        }
    }

    /// Returns a bearer token, refreshing it when close to expiry.
    pub async fn access_token(&self) -> Result<SecretString, AuthError> {
        if let Ok(token) = std::env::var("GOOGLE_OAUTH_ACCESS_TOKEN") {
            if !token.trim().is_empty() {
                return Ok(SecretString::from(token.trim().to_string()));
            }
        }

        let mut cached = self.cached.lock().await;
        if let Some(entry) = cached.as_ref() {
            if entry.expires_at > Instant::now() + REFRESH_MARGIN {
                return Ok(SecretString::from(entry.token.expose_secret().to_string()));
            }
        }

        let fresh = match self.from_metadata_server().await {
            Ok(token) => token,
            Err(e) => {
                tracing::debug!(event = "metadata_token_unavailable", error = %e);
                self.from_gcloud().await?
            }
        };
        let token = SecretString::from(fresh.token.expose_secret().to_string());
        *cached = Some(fresh);
        Ok(token)
    }

    async fn from_metadata_server(&self) -> Result<CachedToken, AuthError> {
        let resp = self
            .http
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .timeout(Duration::from_secs(2))
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(format!("metadata server: {}", e)))?;
        if !resp.status().is_success() {
            return Err(AuthError::Unavailable(format!(
                "metadata server returned {}",
                resp.status()
            )));
        }
        let body: MetadataToken = resp
            .json()
            .await
            .map_err(|e| AuthError::Unavailable(format!("metadata token body: {}", e)))?;
        Ok(CachedToken {
            token: SecretString::from(body.access_token),
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        })
    }

    async fn from_gcloud(&self) -> Result<CachedToken, AuthError> {
        let args: &[&str] = if std::env::var_os("GOOGLE_APPLICATION_CREDENTIALS").is_some() {
            &["auth", "application-default", "print-access-token"]
        } else {
            &["auth", "print-access-token"]
        };
        let output = tokio::process::Command::new("gcloud")
            .args(args)
            .output()
            .await
            .map_err(|e| AuthError::Command {
                command: "gcloud",
                source: e,
            })?;
        if !output.status.success() {
            return Err(AuthError::Unavailable(format!(
                "gcloud exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if token.is_empty() {
            return Err(AuthError::Unavailable("gcloud printed no token".to_string()));
        }
        Ok(CachedToken {
            token: SecretString::from(token),
            expires_at: Instant::now() + GCLOUD_TOKEN_TTL,
        })
    }
}

/// Adds the bearer token to a request.
pub async fn authorized(
    tokens: &TokenProvider,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::RequestBuilder, AuthError> {
    let token = tokens.access_token().await?;
    Ok(request.bearer_auth(token.expose_secret()))
}
