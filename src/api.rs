//! HTTP surface: submit research batches, inspect runs, generate reports.

use std::sync::Arc;

use shuttle_axum::axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::analyze::report::{
    DigestReport, MetricsDocument, MetricsRequest, ReportBatch, ReportGenerator,
};
use crate::ingest::config::clean_list;
use crate::notify::DigestNotifier;
use crate::research::{BatchReport, CompetitorListDocument, CompetitorRecord, ResearchPipeline};
use crate::store::{RawResearchRecord, ResearchStore};

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<ResearchPipeline>,
    pub reports: Arc<ReportGenerator>,
    pub store: Arc<dyn ResearchStore>,
    pub notifier: Option<Arc<dyn DigestNotifier>>,
}

impl From<&crate::ai_bootstrap::AppRuntime> for AppState {
    fn from(rt: &crate::ai_bootstrap::AppRuntime) -> Self {
        Self {
            pipeline: rt.pipeline.clone(),
            reports: rt.reports.clone(),
            store: rt.store.clone(),
            notifier: rt.notifier.clone(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/research", post(submit_research))
        .route("/runs/{run_id}", get(get_run))
        .route("/runs/{run_id}/raw", get(get_raw))
        .route(
            "/runs/{run_id}/reports",
            get(list_reports).post(generate_reports),
        )
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/* ----------------------------
Errors
---------------------------- */

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, msg) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Internal(e) => {
                tracing::error!(error = ?e, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{e:#}"))
            }
        };
        (status, Json(json!({ "error": msg }))).into_response()
    }
}

/* ----------------------------
Handlers
---------------------------- */

#[derive(Debug, Deserialize)]
struct ResearchReq {
    company_name: String,
    #[serde(default)]
    competitors: Vec<CompetitorRecord>,
    #[serde(default)]
    focus_area: Option<String>,
}

async fn submit_research(
    State(state): State<AppState>,
    Json(body): Json<ResearchReq>,
) -> Result<Json<BatchReport>, ApiError> {
    let competitors = clean_list(body.competitors);
    if competitors.is_empty() {
        return Err(ApiError::BadRequest(
            "at least one competitor with a name and website is required".into(),
        ));
    }
    let report = state
        .pipeline
        .submit(
            body.company_name.trim(),
            competitors,
            body.focus_area.as_deref().unwrap_or_default(),
            state.store.as_ref(),
        )
        .await?;
    Ok(Json(report))
}

async fn load_run(state: &AppState, run_id: Uuid) -> Result<CompetitorListDocument, ApiError> {
    state
        .store
        .get_run(run_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("unknown research run {run_id}")))
}

async fn get_run(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<CompetitorListDocument>, ApiError> {
    Ok(Json(load_run(&state, run_id).await?))
}

async fn get_raw(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<Vec<RawResearchRecord>>, ApiError> {
    load_run(&state, run_id).await?;
    Ok(Json(state.store.list_raw(run_id).await?))
}

#[derive(Debug, Default, Deserialize)]
struct ReportsReq {
    #[serde(default)]
    competitors: Vec<String>,
    #[serde(default)]
    metrics: Vec<String>,
    #[serde(default)]
    email: bool,
}

async fn generate_reports(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
    Json(body): Json<ReportsReq>,
) -> Result<Json<ReportBatch>, ApiError> {
    load_run(&state, run_id).await?;
    let notifier = match (body.email, state.notifier.as_deref()) {
        (false, _) => None,
        (true, Some(n)) => Some(n),
        (true, None) => {
            return Err(ApiError::BadRequest(
                "email requested but SMTP is not configured".into(),
            ))
        }
    };
    let request = MetricsRequest::from_display_names(&body.metrics);
    let batch = state
        .reports
        .generate(
            run_id,
            &body.competitors,
            &request,
            state.store.as_ref(),
            notifier,
        )
        .await?;
    Ok(Json(batch))
}

/// Latest stored digest and metrics for one competitor of a run.
#[derive(Debug, Serialize)]
struct StoredReport {
    competitor_name: String,
    digest: Option<DigestReport>,
    metrics: Option<MetricsDocument>,
}

fn entry<'a>(out: &'a mut Vec<StoredReport>, name: &str) -> &'a mut StoredReport {
    let idx = match out.iter().position(|r| r.competitor_name == name) {
        Some(i) => i,
        None => {
            out.push(StoredReport {
                competitor_name: name.to_string(),
                digest: None,
                metrics: None,
            });
            out.len() - 1
        }
    };
    &mut out[idx]
}

async fn list_reports(
    State(state): State<AppState>,
    Path(run_id): Path<Uuid>,
) -> Result<Json<Vec<StoredReport>>, ApiError> {
    load_run(&state, run_id).await?;
    // both lists are oldest first, so later documents win
    let mut out = Vec::new();
    for digest in state.store.list_digests(run_id).await? {
        let name = digest.competitor_name.clone();
        entry(&mut out, &name).digest = Some(digest);
    }
    for metrics in state.store.list_metrics(run_id).await? {
        let name = metrics.competitor_name.clone();
        entry(&mut out, &name).metrics = Some(metrics);
    }
    Ok(Json(out))
}
