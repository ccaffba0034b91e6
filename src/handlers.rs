use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse},
    Json,
};
use std::sync::Arc;

use crate::config::Config;
use crate::error::ApiError;
use crate::metrics::{render_text, MetricsCollector};
use crate::records::{Record, RecordStore, StoreRequest};
use crate::response::{InfoResponse, INDEX_PAGE};
use crate::system::ResourceSampler;

/// Shared application state
pub type SharedState = Arc<AppState>;

/// Everything a request handler needs, built once at startup
pub struct AppState {
    pub config: Arc<Config>,
    pub records: Arc<RecordStore>,
    pub metrics: Arc<MetricsCollector>,
    pub sampler: Arc<dyn ResourceSampler>,
}

impl AppState {
    pub fn new(
        config: Config,
        records: RecordStore,
        sampler: Arc<dyn ResourceSampler>,
    ) -> SharedState {
        let metrics = MetricsCollector::new(sampler.physical_cores(), sampler.logical_cores());
        Arc::new(Self {
            config: Arc::new(config),
            records: Arc::new(records),
            metrics: Arc::new(metrics),
            sampler,
        })
    }
}

/// Store a key-value pair and its reverse mapping
pub async fn store_record(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let request: StoreRequest = serde_json::from_slice(&body)?;

    // No timeout here: a stalled backend call holds this request until it returns.
    let records = state.records.clone();
    tokio::task::spawn_blocking(move || {
        records.store(&request.key, request.value(), request.sha())
    })
    .await??;

    Ok(StatusCode::OK)
}

/// Fetch the value stored under a key (or a derived value)
pub async fn fetch_record(
    State(state): State<SharedState>,
    Path(key): Path<String>,
) -> Result<Json<Record>, ApiError> {
    let records = state.records.clone();
    let record = tokio::task::spawn_blocking(move || records.fetch(&key)).await??;
    Ok(Json(record))
}

/// Build and version information
pub async fn info() -> Json<InfoResponse> {
    Json(InfoResponse::current())
}

pub async fn index() -> Html<&'static str> {
    Html(INDEX_PAGE)
}

/// Metrics in text exposition format
pub async fn metrics(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let text = tokio::task::spawn_blocking(move || {
        render_text(&state.metrics.snapshot(state.sampler.as_ref()))
    })
    .await?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        text,
    ))
}
