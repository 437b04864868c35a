use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use tower_http::trace::TraceLayer;
use venuedesk_core::reconcile::{JobPhase, ReconcileSummary, ReconciliationJob};
use venuedesk_core::services::StoreService;

use crate::auth::verify_trigger_secret;
use crate::config::ApiConfig;
use crate::error::AppError;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ApiConfig>,
    job: Arc<ReconciliationJob>,
    store: StoreService,
}

impl AppState {
    pub fn new(config: Arc<ApiConfig>, job: ReconciliationJob, store: StoreService) -> Self {
        Self {
            config,
            job: Arc::new(job),
            store,
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/reconcile", post(reconcile))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_trigger_secret,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", protected_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    phase: JobPhase,
    last_run: Option<ReconcileSummary>,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let last_run = match state.store.recent_runs(1).await {
        Ok(mut runs) => runs.pop(),
        Err(error) => {
            tracing::warn!("Failed to load last reconciliation run: {error}");
            None
        }
    };

    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        phase: state.job.phase(),
        last_run,
    })
}

async fn require_trigger_secret(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    verify_trigger_secret(request.headers(), &state.config.trigger_secret)?;
    Ok(next.run(request).await)
}

async fn reconcile(State(state): State<AppState>) -> Result<Json<ReconcileSummary>, AppError> {
    let summary = state.job.run().await?;
    tracing::info!(
        endpoint = "reconcile",
        run_id = %summary.run_id,
        clean = summary.is_clean(),
        "Triggered reconciliation finished"
    );
    Ok(Json(summary))
}
