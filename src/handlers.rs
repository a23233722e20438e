use crate::config::Config;
use crate::context::DiscoveryContext;
use crate::engine::DiscoveryEngine;
use crate::errors::AppError;
use crate::models::*;
use crate::scheduler::{DiscoveryScheduler, JobRunReport, NewJob};
use crate::scoring::recalculate_weights;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Discovery pipeline (sources, enrichment, scoring).
    pub engine: Arc<DiscoveryEngine>,
    /// Saved jobs and their runner.
    pub scheduler: Arc<DiscoveryScheduler>,
}

/// Health check endpoint.
///
/// Returns the service status and which discovery sources have credentials.
pub async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "rust-lead-discovery",
            "version": env!("CARGO_PKG_VERSION"),
            "sources_configured": state.engine.registry().configured(),
        })),
    )
}

fn request_context(state: &AppState, headers: &HeaderMap) -> DiscoveryContext {
    let ctx = DiscoveryContext::with_timeout(state.config.discovery_deadline());
    match headers.get("x-tenant-id").and_then(|v| v.to_str().ok()) {
        Some(tenant) if !tenant.trim().is_empty() => ctx.with_tenant(tenant.trim()),
        _ => ctx,
    }
}

/// POST /api/v1/discover
///
/// Runs one discovery call. The response is returned even when every
/// source failed; `errors` and `all_sources_failed` tell "no leads" apart
/// from "sources down".
pub async fn discover(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<DiscoveryRequest>,
) -> Result<Json<DiscoveryOutcome>, AppError> {
    tracing::info!(
        "POST /discover - industry: {}, location: {}, multi: {:?}",
        request.industry,
        request.location,
        request.multi_location
    );

    let ctx = request_context(&state, &headers);
    let outcome = state.engine.discover(&ctx, &request).await?;

    tracing::info!(
        "Discovery returned {} leads from {:?} ({} errors)",
        outcome.leads.len(),
        outcome.sources_used,
        outcome.errors.len()
    );
    Ok(Json(outcome))
}

#[derive(Debug, Deserialize)]
pub struct StrategyQuery {
    pub industry: String,
    #[serde(default)]
    pub location: String,
    pub max_results: Option<usize>,
}

/// GET /api/v1/strategy
///
/// Shows the strategy a discovery call for this industry would use.
pub async fn get_strategy(Query(params): Query<StrategyQuery>) -> Result<Json<Strategy>, AppError> {
    if params.industry.trim().is_empty() {
        return Err(AppError::BadRequest("industry is required".to_string()));
    }
    Ok(Json(DiscoveryEngine::strategy_for(
        &params.industry,
        &params.location,
        params.max_results,
        &StrategyOverrides::default(),
    )))
}

/// GET /api/v1/jobs
pub async fn list_jobs(State(state): State<Arc<AppState>>) -> Json<Vec<DiscoveryJob>> {
    Json(state.scheduler.jobs().list().await)
}

/// POST /api/v1/jobs
pub async fn create_job(
    State(state): State<Arc<AppState>>,
    Json(new_job): Json<NewJob>,
) -> Result<(StatusCode, Json<DiscoveryJob>), AppError> {
    let job = state.scheduler.jobs().create(new_job, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// POST /api/v1/jobs/:id/run
pub async fn run_job(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobRunReport>, AppError> {
    tracing::info!("POST /jobs/{}/run", id);
    let report = state.scheduler.run_now(id).await?;
    Ok(Json(report))
}

/// POST /api/v1/outcomes
///
/// Records an outreach result for scoring history and weight recalculation.
pub async fn record_outcome(
    State(state): State<Arc<AppState>>,
    Json(outcome): Json<Outcome>,
) -> Result<StatusCode, AppError> {
    if outcome.industry.trim().is_empty() {
        return Err(AppError::BadRequest("industry is required".to_string()));
    }
    if outcome.response_hours.is_some_and(|h| h < 0.0 || !h.is_finite()) {
        return Err(AppError::BadRequest("response_hours must be a non-negative number".to_string()));
    }
    state.engine.scoring().history().record(outcome).await;
    Ok(StatusCode::ACCEPTED)
}

/// POST /api/v1/weights/recalculate
///
/// Batch recompute of per-industry weights from every recorded outcome.
/// The new snapshot replaces the old one atomically.
pub async fn recalculate(State(state): State<Arc<AppState>>) -> Json<Vec<ScoringWeights>> {
    let scoring = state.engine.scoring();
    let outcomes = scoring.history().outcomes().await;
    let weights = recalculate_weights(&outcomes, Utc::now());
    tracing::info!(
        "Recalculated weights for {} industries from {} outcomes",
        weights.len(),
        outcomes.len()
    );
    scoring.weights().apply(weights.clone());
    Json(weights)
}

/// GET /api/v1/weights/:industry
pub async fn get_weights(
    State(state): State<Arc<AppState>>,
    Path(industry): Path<String>,
) -> Json<ScoringWeights> {
    let weights = state.engine.scoring().weights().get(&industry);
    Json((*weights).clone())
}
