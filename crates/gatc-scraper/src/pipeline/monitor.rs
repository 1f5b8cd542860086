use std::time::Duration;

use sea_orm::DatabaseConnection;
use serde_json::{Map, Value};
use tokio::sync::oneshot;

use crate::db::stats_repo;

/// Interval between progress summaries.
pub const MONITOR_INTERVAL: Duration = Duration::from_secs(60);

fn tally<I: IntoIterator<Item = (String, i64)>>(rows: I) -> String {
    let map: Map<String, Value> = rows.into_iter().map(|(k, v)| (k, Value::from(v))).collect();
    Value::Object(map).to_string()
}

/// Logs `status_summary` and `renderer_summary` from the reporting views.
pub async fn log_summaries(db: &DatabaseConnection) {
    match stats_repo::status_counts(db).await {
        Ok(rows) => tracing::info!(
            event = "status_summary",
            counts = %tally(rows.into_iter().map(|r| (r.status, r.count))),
        ),
        Err(e) => tracing::warn!(event = "status_summary_error", error = %e),
    }
    match stats_repo::renderer_counts(db).await {
        Ok(rows) => tracing::info!(
            event = "renderer_summary",
            counts = %tally(rows.into_iter().map(|r| (r.render_method, r.count))),
        ),
        Err(e) => tracing::warn!(event = "renderer_summary_error", error = %e),
    }
}

/// Logs summaries every `every` until `stop` fires or its sender is dropped.
pub async fn run_monitor(db: DatabaseConnection, every: Duration, mut stop: oneshot::Receiver<()>) {
    let mut ticker = tokio::time::interval(every);
    // The first tick completes immediately.
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => log_summaries(&db).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tally_is_json_object() {
        let s = tally(vec![("done".to_string(), 3), ("error".to_string(), 1)]);
        let v: Value = serde_json::from_str(&s).unwrap();
        assert_eq!(v["done"], 3);
        assert_eq!(v["error"], 1);
    }

    #[tokio::test]
    async fn test_monitor_stops_on_signal() {
        let db = crate::db::open_in_memory().await;
        let (tx, rx) = oneshot::channel();
        let handle = tokio::spawn(run_monitor(db.clone(), Duration::from_millis(10), rx));
        log_summaries(&db).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
