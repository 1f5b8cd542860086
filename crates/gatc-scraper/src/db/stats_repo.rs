//! Reads over the reporting views.

use chrono::NaiveDate;
use sea_orm::sea_query::{Alias, Expr, Order, Query, SelectStatement};
use sea_orm::{ConnectionTrait, DatabaseConnection, FromQueryResult};

use super::DatabaseError;

#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult)]
pub struct RendererCount {
    pub render_method: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult)]
pub struct ErrorCount {
    pub last_error: String,
    pub count: i64,
}

/// One day of `v_ads_daily_throughput`. `day` is `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult)]
pub struct DailyThroughput {
    pub day: String,
    pub total: i64,
    pub done: i64,
    pub errors: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, FromQueryResult)]
pub struct RendererByYear {
    pub year: i32,
    pub render_method: String,
    pub count: i64,
}

#[derive(Debug, FromQueryResult)]
struct CountRow {
    count: i64,
}

fn view(name: &str, columns: &[&str]) -> SelectStatement {
    Query::select()
        .columns(columns.iter().map(|c| Alias::new(*c)))
        .from(Alias::new(name))
        .to_owned()
}

async fn fetch<T: FromQueryResult>(
    db: &DatabaseConnection,
    query: &SelectStatement,
) -> Result<Vec<T>, DatabaseError> {
    let stmt = db.get_database_backend().build(query);
    Ok(T::find_by_statement(stmt).all(db).await?)
}

/// Rows per status, largest first.
pub async fn status_counts(db: &DatabaseConnection) -> Result<Vec<StatusCount>, DatabaseError> {
    let query = view("v_ads_status_counts", &["status", "count"])
        .order_by(Alias::new("count"), Order::Desc)
        .order_by(Alias::new("status"), Order::Asc)
        .to_owned();
    fetch(db, &query).await
}

/// Done rows per render method, largest first.
pub async fn renderer_counts(
    db: &DatabaseConnection,
) -> Result<Vec<RendererCount>, DatabaseError> {
    let query = view("v_ads_renderer_counts", &["render_method", "count"])
        .order_by(Alias::new("count"), Order::Desc)
        .order_by(Alias::new("render_method"), Order::Asc)
        .to_owned();
    fetch(db, &query).await
}

/// Most frequent `last_error` values of rows in `error`.
pub async fn error_counts(
    db: &DatabaseConnection,
    limit: u64,
) -> Result<Vec<ErrorCount>, DatabaseError> {
    let query = view("v_ads_error_counts", &["last_error", "count"])
        .order_by(Alias::new("count"), Order::Desc)
        .order_by(Alias::new("last_error"), Order::Asc)
        .limit(limit)
        .to_owned();
    fetch(db, &query).await
}

/// Throughput for days on or after `since`, newest first.
pub async fn daily_throughput(
    db: &DatabaseConnection,
    since: NaiveDate,
) -> Result<Vec<DailyThroughput>, DatabaseError> {
    let query = view("v_ads_daily_throughput", &["day", "total", "done", "errors"])
        .and_where(Expr::col(Alias::new("day")).gte(since.format("%Y-%m-%d").to_string()))
        .order_by(Alias::new("day"), Order::Desc)
        .to_owned();
    fetch(db, &query).await
}

pub async fn renderer_by_year(
    db: &DatabaseConnection,
) -> Result<Vec<RendererByYear>, DatabaseError> {
    let query = view("v_renderer_by_year", &["year", "render_method", "count"])
        .order_by(Alias::new("year"), Order::Desc)
        .order_by(Alias::new("count"), Order::Desc)
        .to_owned();
    fetch(db, &query).await
}

/// Number of variants recorded as unavailable.
pub async fn variation_unavailable(db: &DatabaseConnection) -> Result<i64, DatabaseError> {
    let rows: Vec<CountRow> = fetch(db, &view("v_variation_unavailable", &["count"])).await?;
    Ok(rows.first().map(|r| r.count).unwrap_or(0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdType;
    use crate::db::ad_repo::{self, sample_link, AdRef};
    use crate::db::asset_repo::{ensure_asset_row, AssetRecord};
    use crate::db::entities::ad;
    use crate::db::status::{AdStatus, VARIATION_UNAVAILABLE};
    use crate::db::open_in_memory;
    use chrono::Utc;
    use sea_orm::{EntityTrait, PaginatorTrait};

    fn key(id: &'static str, variant: &'static str) -> AdRef<'static> {
        AdRef {
            ad_id: id,
            variant_id: variant,
            advertiser_id: "AR1",
        }
    }

    /// 2 done (one per renderer), 3 errors (2 variation), 1 not_found, 1 pending.
    async fn seeded() -> DatabaseConnection {
        let db = open_in_memory().await;
        let rows = [
            key("CR1", "v1"),
            key("CR2", "v1"),
            key("CR3", "v1"),
            key("CR3", "v2"),
            key("CR3", "v3"),
            key("CR4", ""),
            key("CR5", ""),
        ];
        for row in rows {
            ad_repo::upsert_pending(&db, AdType::Image, row, None, "image:1").await.unwrap();
        }

        let mut first = sample_link(&"1".repeat(64));
        first.render_method = "sadbundle".into();
        let mut second = sample_link(&"2".repeat(64));
        second.render_method = "image".into();
        for (row, link) in [(rows[0], first), (rows[1], second)] {
            ensure_asset_row(&db, &AssetRecord::from_link(&link)).await.unwrap();
            ad_repo::link_asset_success(&db, row, &link).await.unwrap();
        }

        ad_repo::record_error(&db, rows[2], "timeout").await.unwrap();
        ad_repo::record_error(&db, rows[3], VARIATION_UNAVAILABLE).await.unwrap();
        ad_repo::record_error(&db, rows[4], VARIATION_UNAVAILABLE).await.unwrap();
        ad_repo::record_status(&db, rows[5], AdStatus::NotFound, None).await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_status_counts_total_matches_row_count() {
        let db = seeded().await;
        let counts = status_counts(&db).await.unwrap();
        let total: i64 = counts.iter().map(|c| c.count).sum();
        assert_eq!(total as u64, ad::Entity::find().count(&db).await.unwrap());
        assert_eq!(
            counts[0],
            StatusCount {
                status: "error".into(),
                count: 3
            }
        );
    }

    #[tokio::test]
    async fn test_variation_unavailable_tally() {
        let db = seeded().await;
        assert_eq!(variation_unavailable(&db).await.unwrap(), 2);

        let empty = open_in_memory().await;
        assert_eq!(variation_unavailable(&empty).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_renderer_and_error_views() {
        let db = seeded().await;

        let renderers = renderer_counts(&db).await.unwrap();
        assert_eq!(renderers.len(), 2);
        assert!(renderers.iter().all(|r| r.count == 1));

        let errors = error_counts(&db, 10).await.unwrap();
        assert_eq!(errors[0].last_error, VARIATION_UNAVAILABLE);
        assert_eq!(errors[0].count, 2);
        assert_eq!(error_counts(&db, 1).await.unwrap().len(), 1);

        let by_year = renderer_by_year(&db).await.unwrap();
        let total: i64 = by_year.iter().map(|r| r.count).sum();
        assert_eq!(total, 2);
        assert!(by_year.iter().all(|r| r.year >= 2024));
    }

    #[tokio::test]
    async fn test_daily_throughput_today() {
        let db = seeded().await;
        let today = Utc::now().date_naive();
        let days = daily_throughput(&db, today.pred_opt().unwrap()).await.unwrap();
        let total: i64 = days.iter().map(|d| d.total).sum();
        let done: i64 = days.iter().map(|d| d.done).sum();
        let errors: i64 = days.iter().map(|d| d.errors).sum();
        assert_eq!((total, done, errors), (7, 2, 3));

        let future = today.succ_opt().unwrap().succ_opt().unwrap();
        assert!(daily_throughput(&db, future).await.unwrap().is_empty());
    }
}
