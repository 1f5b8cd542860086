//! Streaming reads of `creative_stats` through the BigQuery REST API.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{AdCatalog, AdTarget, StreamQuery, TargetPages};
use crate::auth::{authorized, TokenProvider};
use crate::config::{AdType, OrderBy};
use crate::error::SourceError;

pub const CREATIVE_STATS_TABLE: &str = "bigquery-public-data.google_political_ads.creative_stats";

const API_BASE: &str = "https://bigquery.googleapis.com/bigquery/v2/projects";
const QUERY_TIMEOUT_MS: u64 = 60_000;

/// Streaming query over US creatives of one type.
pub fn build_stream_sql(query: &StreamQuery) -> String {
    let mut filters = vec![
        format!("Ad_Type='{}'", query.ad_type.as_str()),
        r"REGEXP_CONTAINS(Regions, r'\bUS\b')".to_string(),
    ];
    if let Some(start) = query.start_date {
        filters.push(format!("date_range_start >= '{}'", start.format("%Y-%m-%d")));
    }
    if let Some(end) = query.end_date {
        filters.push(format!("date_range_start <= '{}'", end.format("%Y-%m-%d")));
    }

    let mut sql = format!(
        "SELECT Ad_ID, Ad_URL, Advertiser_ID\n  FROM `{}`\n WHERE {}",
        CREATIVE_STATS_TABLE,
        filters.join(" AND ")
    );
    match query.order_by {
        OrderBy::None => {}
        OrderBy::DateAsc => sql.push_str("\n ORDER BY date_range_start ASC"),
        OrderBy::DateDesc => sql.push_str("\n ORDER BY date_range_start DESC"),
        OrderBy::Advertiser => sql.push_str("\n ORDER BY Advertiser_ID ASC"),
    }
    if let Some(limit) = query.sql_limit.filter(|l| *l > 0) {
        sql.push_str(&format!("\n LIMIT {}", limit));
    }
    sql
}

/// Single-creative lookup; binds `@ad_id`.
pub fn build_lookup_sql(ad_type: AdType) -> String {
    format!(
        "SELECT Ad_ID, Ad_URL, Advertiser_ID\n  FROM `{}`\n WHERE Ad_ID = @ad_id AND Ad_Type='{}' AND REGEXP_CONTAINS(Regions, r'\\bUS\\b')\n LIMIT 1",
        CREATIVE_STATS_TABLE,
        ad_type.as_str()
    )
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    job_complete: bool,
    job_reference: Option<JobReference>,
    schema: Option<Schema>,
    #[serde(default)]
    rows: Vec<Row>,
    page_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JobReference {
    project_id: String,
    job_id: String,
    location: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Schema {
    fields: Vec<Field>,
}

#[derive(Debug, Clone, Deserialize)]
struct Field {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Row {
    f: Vec<Cell>,
}

#[derive(Debug, Deserialize)]
struct Cell {
    v: Value,
}

/// Column positions of the three fields a target needs.
#[derive(Debug, Clone, Copy)]
struct Columns {
    ad_id: usize,
    ad_url: usize,
    advertiser_id: usize,
}

impl Columns {
    fn from_schema(schema: &Schema) -> Result<Self, SourceError> {
        let find = |name: &str| {
            schema
                .fields
                .iter()
                .position(|f| f.name.eq_ignore_ascii_case(name))
                .ok_or_else(|| SourceError::BigQuery(format!("result has no column {}", name)))
        };
        Ok(Self {
            ad_id: find("Ad_ID")?,
            ad_url: find("Ad_URL")?,
            advertiser_id: find("Advertiser_ID")?,
        })
    }

    fn target(&self, row: &Row) -> Option<AdTarget> {
        let cell = |i: usize| match row.f.get(i).map(|c| &c.v) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        Some(AdTarget::new(
            cell(self.ad_id)?,
            cell(self.ad_url)?,
            cell(self.advertiser_id)?,
        ))
    }
}

/// `creative_stats` reader authenticated with [`TokenProvider`].
#[derive(Clone)]
pub struct BigQueryCatalog {
    inner: Arc<CatalogInner>,
}

struct CatalogInner {
    project_id: String,
    location: Option<String>,
    http: reqwest::Client,
    tokens: Arc<TokenProvider>,
}

impl BigQueryCatalog {
    pub fn new(
        project_id: impl Into<String>,
        location: Option<String>,
        http: reqwest::Client,
        tokens: Arc<TokenProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(CatalogInner {
                project_id: project_id.into(),
                location,
                http,
                tokens,
            }),
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<QueryResponse, SourceError> {
        let request = authorized(&self.inner.tokens, request)
            .await
            .map_err(|e| SourceError::BigQuery(e.to_string()))?;
        let resp = request
            .timeout(Duration::from_millis(QUERY_TIMEOUT_MS + 30_000))
            .send()
            .await
            .map_err(|e| SourceError::BigQuery(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceError::BigQuery(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }
        resp.json()
            .await
            .map_err(|e| SourceError::BigQuery(format!("invalid response: {}", e)))
    }

    async fn start_query(
        &self,
        sql: &str,
        parameters: Option<Value>,
        page_size: u64,
    ) -> Result<QueryResponse, SourceError> {
        let mut body = json!({
            "query": sql,
            "useLegacySql": false,
            "maxResults": page_size,
            "timeoutMs": QUERY_TIMEOUT_MS,
        });
        if let Some(location) = &self.inner.location {
            body["location"] = json!(location);
        }
        if let Some(parameters) = parameters {
            body["parameterMode"] = json!("NAMED");
            body["queryParameters"] = parameters;
        }

        let url = format!("{}/{}/queries", API_BASE, self.inner.project_id);
        self.send(self.inner.http.post(url).json(&body)).await
    }

    async fn fetch_results(
        &self,
        job: &JobReference,
        page_token: Option<&str>,
        page_size: u64,
    ) -> Result<QueryResponse, SourceError> {
        let url = format!("{}/{}/queries/{}", API_BASE, job.project_id, job.job_id);
        let mut params = vec![
            ("maxResults", page_size.to_string()),
            ("timeoutMs", QUERY_TIMEOUT_MS.to_string()),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token.to_string()));
        }
        if let Some(location) = job.location.as_ref().or(self.inner.location.as_ref()) {
            params.push(("location", location.clone()));
        }
        self.send(self.inner.http.get(url).query(&params)).await
    }

    /// Runs `sql` and waits until the first page is available.
    async fn run_query(
        &self,
        sql: &str,
        parameters: Option<Value>,
        page_size: u64,
    ) -> Result<QueryPages, SourceError> {
        let mut response = self.start_query(sql, parameters, page_size).await?;
        let job = response
            .job_reference
            .clone()
            .ok_or_else(|| SourceError::BigQuery("response without jobReference".to_string()))?;

        while !response.job_complete {
            tracing::debug!(event = "bq_wait", job_id = %job.job_id);
            response = self.fetch_results(&job, None, page_size).await?;
        }

        let schema = response
            .schema
            .as_ref()
            .ok_or_else(|| SourceError::BigQuery("completed query without schema".to_string()))?;
        let columns = Columns::from_schema(schema)?;

        Ok(QueryPages {
            catalog: self.clone(),
            job,
            columns,
            page_size,
            pending: Some(std::mem::take(&mut response.rows)),
            page_token: response.page_token.take(),
        })
    }
}

/// Cursor over the pages of a completed query.
struct QueryPages {
    catalog: BigQueryCatalog,
    job: JobReference,
    columns: Columns,
    page_size: u64,
    /// Rows delivered with the last response, not yet handed out.
    pending: Option<Vec<Row>>,
    page_token: Option<String>,
}

#[async_trait]
impl TargetPages for QueryPages {
    async fn next_page(&mut self) -> Result<Option<Vec<AdTarget>>, SourceError> {
        let rows = match self.pending.take() {
            Some(rows) => rows,
            None => {
                let Some(token) = self.page_token.take() else {
                    return Ok(None);
                };
                let mut response = self
                    .catalog
                    .fetch_results(&self.job, Some(&token), self.page_size)
                    .await?;
                self.page_token = response.page_token.take();
                response.rows
            }
        };
        if rows.is_empty() && self.page_token.is_none() {
            return Ok(None);
        }
        Ok(Some(rows.iter().filter_map(|r| self.columns.target(r)).collect()))
    }
}

#[async_trait]
impl AdCatalog for BigQueryCatalog {
    async fn find_ad(&self, ad_type: AdType, ad_id: &str) -> Result<Option<AdTarget>, SourceError> {
        let sql = build_lookup_sql(ad_type);
        let parameters = json!([{
            "name": "ad_id",
            "parameterType": {"type": "STRING"},
            "parameterValue": {"value": ad_id},
        }]);
        let mut pages = self.run_query(&sql, Some(parameters), 1).await?;
        Ok(pages
            .next_page()
            .await?
            .and_then(|rows| rows.into_iter().next()))
    }

    async fn stream(&self, query: &StreamQuery) -> Result<Box<dyn TargetPages>, SourceError> {
        let sql = build_stream_sql(query);
        tracing::info!(event = "bq_query", sql = %sql);
        let pages = self.run_query(&sql, None, query.page_size).await?;
        Ok(Box::new(pages))
    }
}
