//! Persistent state for the scraper.
//!
//! Ad rows, content-addressed asset rows and the reporting views live in
//! PostgreSQL in production. Everything goes through SeaORM so the same
//! code runs against an in-memory SQLite database in tests.

use std::time::Duration;

use reqwest::Url;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use secrecy::{ExposeSecret, SecretString};

use crate::config::DbSettings;

pub mod ad_repo;
pub mod asset_repo;
pub mod entities;
pub mod error;
pub mod migrations;
pub mod recorder;
pub mod stats_repo;
pub mod status;

pub use error::DatabaseError;
pub use migrations::Migrator;
pub use recorder::Recorder;
pub use status::AdStatus;

/// Builds the connection URL from settings.
///
/// An explicit URL wins. Without a host the connection goes through the
/// Cloud SQL unix socket at `/cloudsql/<instance>`.
pub fn connection_url(settings: &DbSettings) -> Result<SecretString, DatabaseError> {
    if let Some(url) = &settings.database_url {
        return Ok(SecretString::from(url.clone()));
    }

    let mut url = Url::parse("postgres://localhost/")
        .map_err(|e| DatabaseError::Connection(e.to_string()))?;
    let invalid = |what: &str| DatabaseError::Connection(format!("cannot set {} on URL", what));

    match &settings.host {
        Some(host) => {
            url.set_host(Some(host))
                .map_err(|e| DatabaseError::Connection(format!("host '{}': {}", host, e)))?;
            url.set_port(Some(settings.port)).map_err(|_| invalid("port"))?;
        }
        None => {
            url.query_pairs_mut()
                .append_pair("host", &format!("/cloudsql/{}", settings.sql_conn));
        }
    }
    url.set_username(&settings.user).map_err(|_| invalid("user"))?;
    if let Some(password) = &settings.password {
        url.set_password(Some(password.expose_secret()))
            .map_err(|_| invalid("password"))?;
    }
    url.set_path(&settings.name);
    url.query_pairs_mut().append_pair("sslmode", &settings.sslmode);

    Ok(SecretString::from(url.to_string()))
}

/// Connection target with the password removed, for logs.
pub fn redacted_target(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("***"));
            }
            parsed.to_string()
        }
        Err(_) => "<unparseable database url>".to_string(),
    }
}

/// Opens a connection pool.
pub async fn connect(settings: &DbSettings) -> Result<DatabaseConnection, DatabaseError> {
    let url = connection_url(settings)?;
    let url = url.expose_secret();

    let mut opts = ConnectOptions::new(url.to_string());
    opts.connect_timeout(settings.connect_timeout)
        .acquire_timeout(settings.connect_timeout.max(Duration::from_secs(10)))
        .sqlx_logging(false);
    // Every pooled connection to `sqlite::memory:` would be its own database.
    if url.starts_with("sqlite::memory:") {
        opts.max_connections(1);
    }

    let db = Database::connect(opts).await?;
    tracing::info!(event = "db_connected", target = %redacted_target(url));
    Ok(db)
}

/// Applies pending migrations.
pub async fn init_database(db: &DatabaseConnection) -> Result<(), DatabaseError> {
    Migrator::up(db, None).await?;
    tracing::info!(event = "db_migrated");
    Ok(())
}

/// Connects and migrates in one step.
pub async fn open(settings: &DbSettings) -> Result<DatabaseConnection, DatabaseError> {
    let db = connect(settings).await?;
    init_database(&db).await?;
    Ok(db)
}

/// Fresh in-memory database with the full schema.
#[cfg(test)]
pub(crate) async fn open_in_memory() -> DatabaseConnection {
    let mut opts = ConnectOptions::new("sqlite::memory:");
    opts.max_connections(1).sqlx_logging(false);
    let db = Database::connect(opts).await.unwrap();
    init_database(&db).await.unwrap();
    db
}
