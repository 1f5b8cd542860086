//! Plain-text report over the reporting views.

use std::fmt::Write;

use chrono::NaiveDate;
use sea_orm::DatabaseConnection;

use crate::db::{stats_repo, DatabaseError};

/// Rows shown in the error section.
pub const DEFAULT_ERROR_LIMIT: u64 = 20;

/// Renders one titled section with left-aligned columns.
pub fn render_table(title: &str, headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut out = format!("== {} ==\n", title);
    if rows.is_empty() {
        out.push_str("(no rows)\n");
        return out;
    }

    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let _ = writeln!(out, "{}", format_row(headers.iter().copied(), &widths));
    let _ = writeln!(
        out,
        "{}",
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  ")
    );
    for row in rows {
        let _ = writeln!(out, "{}", format_row(row.iter().map(String::as_str), &widths));
    }
    out
}

fn format_row<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let padded: Vec<String> = cells
        .zip(widths)
        .map(|(c, w)| format!("{:<width$}", c, width = *w))
        .collect();
    padded.join("  ").trim_end().to_string()
}

fn section(
    title: &str,
    headers: &[&str],
    rows: Result<Vec<Vec<String>>, DatabaseError>,
) -> String {
    match rows {
        Ok(rows) => render_table(title, headers, &rows),
        Err(e) => format!("== {} ==\nERROR: {}\n", title, e),
    }
}

/// All six sections, separated by blank lines. A failing view only
/// affects its own section.
pub async fn render_report(
    db: &DatabaseConnection,
    since: NaiveDate,
    error_limit: u64,
) -> String {
    let mut sections = Vec::with_capacity(6);

    sections.push(section(
        "Status counts",
        &["status", "count"],
        stats_repo::status_counts(db)
            .await
            .map(|rows| rows.into_iter().map(|r| vec![r.status, r.count.to_string()]).collect()),
    ));

    sections.push(section(
        "Renderer counts (done)",
        &["render_method", "count"],
        stats_repo::renderer_counts(db).await.map(|rows| {
            rows.into_iter()
                .map(|r| vec![r.render_method, r.count.to_string()])
                .collect()
        }),
    ));

    sections.push(section(
        "Top errors",
        &["last_error", "count"],
        stats_repo::error_counts(db, error_limit).await.map(|rows| {
            rows.into_iter()
                .map(|r| vec![r.last_error, r.count.to_string()])
                .collect()
        }),
    ));

    sections.push(section(
        &format!("Daily throughput since {}", since),
        &["day", "total", "done", "errors"],
        stats_repo::daily_throughput(db, since).await.map(|rows| {
            rows.into_iter()
                .map(|r| {
                    vec![
                        r.day,
                        r.total.to_string(),
                        r.done.to_string(),
                        r.errors.to_string(),
                    ]
                })
                .collect()
        }),
    ));

    sections.push(section(
        "Renderer by year",
        &["year", "render_method", "count"],
        stats_repo::renderer_by_year(db).await.map(|rows| {
            rows.into_iter()
                .map(|r| vec![r.year.to_string(), r.render_method, r.count.to_string()])
                .collect()
        }),
    ));

    sections.push(section(
        "Variation unavailable",
        &["count"],
        stats_repo::variation_unavailable(db)
            .await
            .map(|n| vec![vec![n.to_string()]]),
    ));

    sections.join("\n")
}
