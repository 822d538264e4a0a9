// src/web/handlers/worker_handlers.rs
use super::body_error;
use crate::auth::WorkerCaller;
use crate::dispatch::DispatchRequest;
use crate::web::types::{ApiError, ApiResult, RunAccepted};
use crate::web::WorkerDispatcher;
use rocket::http::Status;
use rocket::serde::json::{self, Json};
use rocket::State;
use tracing::{error, info};

/// Start a run dispatched by a remote orchestrator.
pub async fn start_run_handler(
    _worker: WorkerCaller,
    body: Result<Json<DispatchRequest>, json::Error<'_>>,
    worker: &State<WorkerDispatcher>,
) -> ApiResult<(Status, Json<RunAccepted>)> {
    let request = body.map_err(body_error)?.into_inner();
    let application_id = request.data.application_id.clone();
    info!(
        application_id = %application_id,
        job_url = %request.data.job_url,
        workflow = %request.workflow.name,
        "Run received from orchestrator"
    );

    worker.0.dispatch(request).await.map_err(|e| {
        error!(application_id = %application_id, "Failed to start run: {}", e);
        ApiError::new(Status::InternalServerError, e.to_string(), "DISPATCH_ERROR")
    })?;

    Ok((
        Status::Accepted,
        Json(RunAccepted {
            accepted: true,
            application_id,
        }),
    ))
}
