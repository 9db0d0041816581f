//! HTTP surface: the DataTables-style table endpoint plus the summary,
//! options, and range lookups.
//!
//! Query-string parsing is deliberately fail-open: every parameter is read
//! as an optional string and malformed values fall back to documented
//! defaults, so the endpoints always answer with a well-formed page.

use crate::error::Error;
use axum::{
    extract::{Query, State},
    response::Html,
    routing::get,
    Json, Router,
};
use domain::column::{Column, SortDir};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use serve::{
    query::{TablePage, TableQuery, DEFAULT_PAGE_LENGTH},
    ToxStore,
};

#[derive(Clone)]
pub struct AppState {
    pub store: ToxStore,
}

pub fn build_app(store: ToxStore) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/api/tox", get(api_tox))
        .route("/api/summary", get(api_summary))
        .route("/api/options", get(api_options))
        .route("/api/ranges", get(api_ranges))
        .with_state(AppState { store })
}

/// Raw table-endpoint parameters. Everything is an optional string so that
/// deserialization itself can never reject a request.
#[derive(Debug, Default, Deserialize)]
pub struct TableParams {
    draw: Option<String>,
    start: Option<String>,
    length: Option<String>,

    #[serde(rename = "search[value]")]
    search_value: Option<String>,

    chemical_name: Option<String>,
    class_of_chemical: Option<String>,
    exposure_time: Option<String>,
    media_used: Option<String>,
    hardware: Option<String>,
    source: Option<String>,

    lc50_min: Option<String>,
    lc50_max: Option<String>,

    #[serde(rename = "order[0][column]")]
    order_column: Option<String>,
    #[serde(rename = "order[0][dir]")]
    order_dir: Option<String>,
}

impl TableParams {
    /// Normalize into a validated [`TableQuery`]. Malformed integers fall
    /// back to defaults, the sort index is whitelisted through
    /// [`Column::from_index`], and the range applies only when both bounds
    /// parse.
    fn into_query(self) -> TableQuery {
        let start = parse_or(self.start, 0);
        let length = parse_or(self.length, DEFAULT_PAGE_LENGTH);

        let lc50_range = match (self.lc50_min.as_deref(), self.lc50_max.as_deref()) {
            (Some(lo), Some(hi)) => match (lo.trim().parse::<f64>(), hi.trim().parse::<f64>()) {
                (Ok(lo), Ok(hi)) => Some((lo, hi)),
                _ => None, // unparsable bounds are silently ignored
            },
            _ => None,
        };

        let sort_index = self
            .order_column
            .as_deref()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let sort_dir = self
            .order_dir
            .as_deref()
            .map(SortDir::from_param)
            .unwrap_or_default();

        let filters = vec![
            (Column::ChemicalName, self.chemical_name.unwrap_or_default()),
            (
                Column::ClassOfChemical,
                self.class_of_chemical.unwrap_or_default(),
            ),
            (Column::ExposureTime, self.exposure_time.unwrap_or_default()),
            (Column::MediaUsed, self.media_used.unwrap_or_default()),
            (Column::Hardware, self.hardware.unwrap_or_default()),
            (Column::Source, self.source.unwrap_or_default()),
        ];

        TableQuery {
            draw: self.draw.unwrap_or_else(|| "1".to_string()),
            start,
            length,
            search: self.search_value,
            filters,
            lc50_range,
            sort_column: Column::from_index(sort_index),
            sort_dir,
        }
    }
}

fn parse_or(raw: Option<String>, default: i64) -> i64 {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .unwrap_or(default)
}

#[derive(Debug, Serialize)]
pub struct TableResponse {
    draw: String,
    #[serde(rename = "recordsTotal")]
    records_total: i64,
    #[serde(rename = "recordsFiltered")]
    records_filtered: i64,
    data: Vec<Vec<Value>>,
}

impl From<TablePage> for TableResponse {
    fn from(page: TablePage) -> Self {
        Self {
            draw: page.draw,
            records_total: page.records_total,
            records_filtered: page.records_filtered,
            data: page.data,
        }
    }
}

#[tracing::instrument(skip_all)]
async fn api_tox(
    State(state): State<AppState>,
    Query(params): Query<TableParams>,
) -> Result<Json<TableResponse>, Error> {
    let page = state.store.fetch_page(&params.into_query()).await?;
    Ok(Json(page.into()))
}

#[tracing::instrument(skip_all)]
async fn api_summary(State(state): State<AppState>) -> Result<Json<serve::summary::Summary>, Error> {
    Ok(Json(state.store.summary().await?))
}

#[tracing::instrument(skip_all)]
async fn api_options(State(state): State<AppState>) -> Result<Json<Value>, Error> {
    let mut options = Map::new();
    for column in Column::OPTIONS {
        let values = state.store.distinct_values(column).await?;
        options.insert(column.as_str().to_string(), Value::from(values));
    }
    Ok(Json(Value::Object(options)))
}

#[tracing::instrument(skip_all)]
async fn api_ranges(State(state): State<AppState>) -> Result<Json<Value>, Error> {
    let (min, max) = state.store.lc50_range().await?;
    Ok(Json(json!({ "lc50_mm": { "min": min, "max": max } })))
}

async fn home() -> Html<&'static str> {
    Html(INDEX_HTML)
}

// Placeholder landing page; the real table UI is served separately.
const INDEX_HTML: &str = "<!doctype html>
<html>
  <head><title>toxserve</title></head>
  <body>
    <h1>toxserve</h1>
    <p>Endpoints: /api/tox, /api/summary, /api/options, /api/ranges</p>
  </body>
</html>
";
