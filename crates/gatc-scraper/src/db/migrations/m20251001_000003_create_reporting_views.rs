//! Read-only reporting views over `ads`.
//!
//! Every view produces text days and integer counts on both backends so
//! the same `FromQueryResult` rows decode against PostgreSQL and SQLite.

use sea_orm::{ConnectionTrait, DbBackend};
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

pub(crate) const VIEW_NAMES: [&str; 6] = [
    "v_ads_status_counts",
    "v_ads_renderer_counts",
    "v_ads_daily_throughput",
    "v_ads_error_counts",
    "v_renderer_by_year",
    "v_variation_unavailable",
];

const POSTGRES_VIEWS: [&str; 6] = [
    "CREATE OR REPLACE VIEW v_ads_status_counts AS
     SELECT status, COUNT(*) AS count
       FROM ads
      GROUP BY status",
    "CREATE OR REPLACE VIEW v_ads_renderer_counts AS
     SELECT COALESCE(render_method, '(null)') AS render_method, COUNT(*) AS count
       FROM ads
      WHERE status = 'done'
      GROUP BY COALESCE(render_method, '(null)')",
    "CREATE OR REPLACE VIEW v_ads_daily_throughput AS
     SELECT to_char(date_trunc('day', updated_at), 'YYYY-MM-DD') AS day,
            COUNT(*) AS total,
            SUM(CASE WHEN status = 'done' THEN 1 ELSE 0 END) AS done,
            SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END) AS errors
       FROM ads
      GROUP BY to_char(date_trunc('day', updated_at), 'YYYY-MM-DD')",
    "CREATE OR REPLACE VIEW v_ads_error_counts AS
     SELECT COALESCE(last_error, '(null)') AS last_error, COUNT(*) AS count
       FROM ads
      WHERE status = 'error'
      GROUP BY COALESCE(last_error, '(null)')",
    "CREATE OR REPLACE VIEW v_renderer_by_year AS
     SELECT CAST(EXTRACT(YEAR FROM scraped_at) AS INTEGER) AS year,
            COALESCE(render_method, '(null)') AS render_method,
            COUNT(*) AS count
       FROM ads
      WHERE status = 'done' AND scraped_at IS NOT NULL
      GROUP BY 1, 2",
    "CREATE OR REPLACE VIEW v_variation_unavailable AS
     SELECT COUNT(*) AS count
       FROM ads
      WHERE status = 'error' AND last_error = 'variation_unavailable'",
];

const SQLITE_VIEWS: [&str; 6] = [
    "CREATE VIEW IF NOT EXISTS v_ads_status_counts AS
     SELECT status, COUNT(*) AS count
       FROM ads
      GROUP BY status",
    "CREATE VIEW IF NOT EXISTS v_ads_renderer_counts AS
     SELECT COALESCE(render_method, '(null)') AS render_method, COUNT(*) AS count
       FROM ads
      WHERE status = 'done'
      GROUP BY COALESCE(render_method, '(null)')",
    "CREATE VIEW IF NOT EXISTS v_ads_daily_throughput AS
     SELECT date(updated_at) AS day,
            COUNT(*) AS total,
            SUM(CASE WHEN status = 'done' THEN 1 ELSE 0 END) AS done,
            SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END) AS errors
       FROM ads
      GROUP BY date(updated_at)",
    "CREATE VIEW IF NOT EXISTS v_ads_error_counts AS
     SELECT COALESCE(last_error, '(null)') AS last_error, COUNT(*) AS count
       FROM ads
      WHERE status = 'error'
      GROUP BY COALESCE(last_error, '(null)')",
    "CREATE VIEW IF NOT EXISTS v_renderer_by_year AS
     SELECT CAST(strftime('%Y', scraped_at) AS INTEGER) AS year,
            COALESCE(render_method, '(null)') AS render_method,
            COUNT(*) AS count
       FROM ads
      WHERE status = 'done' AND scraped_at IS NOT NULL
      GROUP BY 1, 2",
    "CREATE VIEW IF NOT EXISTS v_variation_unavailable AS
     SELECT COUNT(*) AS count
       FROM ads
      WHERE status = 'error' AND last_error = 'variation_unavailable'",
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let statements = match manager.get_database_backend() {
            DbBackend::Postgres => POSTGRES_VIEWS,
            DbBackend::Sqlite => SQLITE_VIEWS,
            other => {
                return Err(DbErr::Migration(format!(
                    "reporting views are not defined for {:?}",
                    other
                )))
            }
        };

        let conn = manager.get_connection();
        for sql in statements {
            conn.execute_unprepared(sql).await?;
        }
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let conn = manager.get_connection();
        for view in VIEW_NAMES.iter().rev() {
            conn.execute_unprepared(&format!("DROP VIEW IF EXISTS {}", view))
                .await?;
        }
        Ok(())
    }
}
