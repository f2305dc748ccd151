//! roc-server: HTTP microservice host for the regenerator optimization core.
//!
//! Routes:
//!
//! - `GET /health` — service status plus a numerics self-check
//! - `POST /optimize` — run one optimization; 200 carries the result envelope
//!   even for infeasible-but-completed runs, 422 for validation failures,
//!   500 for optimizer/internal failures
//! - `GET /jobs/{id}` — poll the latest job snapshot (progress while the run
//!   is in flight, the full record afterwards)
//!
//! The job id of a `POST /optimize` run is returned in the `x-roc-job-id`
//! response header so clients can poll progress concurrently.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use dashmap::DashMap;
use roc_core::job::{CancelToken, JobRunner, ProgressSink, ResultSink};
use roc_core::models::{Job, JobStatus, OptimizationRequest, ProgressUpdate};
use roc_core::SolveError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Clone)]
struct AppState {
    jobs: Arc<DashMap<Uuid, Job>>,
    numerics_available: bool,
}

#[derive(Serialize, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
    numerics_backend_available: bool,
}

#[derive(Serialize, Deserialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn validation(message: String) -> Self {
        ApiError {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            body: ErrorResponse {
                error: "validation_error".to_string(),
                message,
                details: None,
            },
        }
    }

    fn optimization(message: String) -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorResponse {
                error: "optimization_error".to_string(),
                message,
                details: None,
            },
        }
    }

    fn internal(message: String) -> Self {
        ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: ErrorResponse {
                error: "internal_server_error".to_string(),
                message,
                details: None,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Progress sink that mirrors run state into the shared job store so
/// `GET /jobs/{id}` can serve live snapshots.
struct StoreProgressSink {
    jobs: Arc<DashMap<Uuid, Job>>,
}

impl ProgressSink for StoreProgressSink {
    fn record(&self, job_id: Uuid, update: &ProgressUpdate) {
        if let Some(mut entry) = self.jobs.get_mut(&job_id) {
            // The runner moved the job to Running before the first
            // evaluation; mirror that in the read model.
            entry.status = JobStatus::Running;
            entry.current_iteration = update.record.index;
            entry.progress_percentage = update.progress_percentage;
            entry.estimated_completion_at = update.estimated_completion_at;
            entry.iteration_log.push(update.record.clone());
        }
    }
}

struct StoreResultSink {
    jobs: Arc<DashMap<Uuid, Job>>,
}

impl ResultSink for StoreResultSink {
    fn commit(&self, job: &Job) {
        self.jobs.insert(job.id, job.clone());
    }
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/optimize", post(optimize))
        .route("/jobs/{id}", get(job_status))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let status = if state.numerics_available {
        "healthy"
    } else {
        "degraded"
    };
    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        numerics_backend_available: state.numerics_available,
    })
}

async fn optimize(
    State(state): State<AppState>,
    Json(request): Json<OptimizationRequest>,
) -> Result<Response, ApiError> {
    log::info!(
        "optimization request: objective={:?}, algorithm={}",
        request.objective,
        request.algorithm
    );

    let job = Job::new();
    let job_id = job.id;
    state.jobs.insert(job_id, job.clone());

    let runner = JobRunner::new(
        Arc::new(StoreProgressSink {
            jobs: state.jobs.clone(),
        }),
        Arc::new(StoreResultSink {
            jobs: state.jobs.clone(),
        }),
    );

    let outcome = tokio::task::spawn_blocking(move || {
        runner.run_job(job, &request, CancelToken::new())
    })
    .await
    .map_err(|e| ApiError::internal(format!("optimization task panicked: {e}")))?;

    match outcome {
        Ok(final_job) => {
            state.jobs.insert(job_id, final_job.clone());
            match final_job.status {
                JobStatus::Completed => {
                    let result = final_job
                        .result
                        .ok_or_else(|| ApiError::internal("completed job carries no result".to_string()))?;
                    Ok((
                        StatusCode::OK,
                        [("x-roc-job-id", job_id.to_string())],
                        Json(result),
                    )
                        .into_response())
                }
                JobStatus::Failed => Err(ApiError::optimization(
                    final_job
                        .error_message
                        .unwrap_or_else(|| "optimization failed".to_string()),
                )),
                other => Err(ApiError::internal(format!(
                    "unexpected terminal job status: {other}"
                ))),
            }
        }
        Err(SolveError::Validation(message)) => {
            state.jobs.remove(&job_id);
            Err(ApiError::validation(message))
        }
        Err(error) => {
            state.jobs.remove(&job_id);
            Err(ApiError::internal(error.to_string()))
        }
    }
}

async fn job_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Job>, ApiError> {
    match state.jobs.get(&id) {
        Some(job) => Ok(Json(job.clone())),
        None => Err(ApiError {
            status: StatusCode::NOT_FOUND,
            body: ErrorResponse {
                error: "not_found".to_string(),
                message: format!("no job with id {id}"),
                details: None,
            },
        }),
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let numerics_available = roc_core::optimizer::self_check();
    if !numerics_available {
        log::error!("numerics self-check failed; reporting degraded health");
    }

    let state = AppState {
        jobs: Arc::new(DashMap::new()),
        numerics_available,
    };

    let addr = "0.0.0.0:7000";
    log::info!("roc-server listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind listen address");
    axum::serve(listener, router(state))
        .await
        .expect("server error");
}
