use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use indexmap::IndexMap;
use prism_contracts::predictions::{GenerateResponse, PredictionHandle, StatusReport};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use crate::error::ProxyError;
use crate::submit::Submitter;
use crate::upstream::MAX_WAIT_SECS;

/// Shared handler state. Holds no per-request data.
#[derive(Clone)]
pub struct AppState {
    pub submitter: Submitter,
    pub replicate_configured: bool,
    pub openai_configured: bool,
}

#[derive(Debug, Deserialize)]
struct ModelRequest {
    #[serde(rename = "modelKey")]
    model_key: String,
    #[serde(default)]
    input: Value,
}

#[derive(Debug, Default, Deserialize)]
struct StatusQuery {
    wait: Option<String>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    replicate: bool,
    openai: bool,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/predict", post(predict_handler))
        .route("/status/{id}", get(status_handler))
        .route("/generate", post(generate_handler))
        .route("/models", get(models_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state);
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("shutdown requested");
    }
}

async fn predict_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ModelRequest>, JsonRejection>,
) -> Result<Json<PredictionHandle>, ProxyError> {
    let Json(request) = body.map_err(malformed)?;
    let handle = run_blocking(move || state.submitter.submit(&request.model_key, &request.input))
        .await?;
    Ok(Json(handle))
}

async fn status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusReport>, ProxyError> {
    let wait = query.wait.as_deref().and_then(parse_wait);
    let report = run_blocking(move || state.submitter.status(&id, wait)).await?;
    Ok(Json(report))
}

async fn generate_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ModelRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ProxyError> {
    let Json(request) = body.map_err(malformed)?;
    let response =
        run_blocking(move || state.submitter.generate(&request.model_key, &request.input)).await?;
    Ok(Json(response))
}

async fn models_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let registry = state.submitter.registry();
    let categories: IndexMap<&str, Vec<&str>> = registry
        .list_by_category()
        .into_iter()
        .map(|(label, models)| (label, models.into_iter().map(|model| model.key).collect()))
        .collect();
    let models: Vec<_> = registry.list().collect();
    Json(json!({ "models": models, "categories": categories }))
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        replicate: state.replicate_configured,
        openai: state.openai_configured,
    })
}

/// Out-of-range values clamp to 1..=60; non-numeric ones are ignored.
fn parse_wait(raw: &str) -> Option<u32> {
    let seconds = raw.trim().parse::<f64>().ok().filter(|value| value.is_finite())?;
    Some(seconds.round().clamp(1.0, f64::from(MAX_WAIT_SECS)) as u32)
}

fn malformed(rejection: JsonRejection) -> ProxyError {
    ProxyError::MalformedRequest(rejection.body_text())
}

/// Upstream clients block; keep them off the async workers.
async fn run_blocking<T, F>(job: F) -> Result<T, ProxyError>
where
    F: FnOnce() -> Result<T, ProxyError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|err| ProxyError::Transport(format!("request worker failed: {err}")))?
}
