// src/web/handlers/application_handlers.rs
use super::body_error;
use crate::auth::Caller;
use crate::database::{ApplicationRepository, DatabaseConfig, JobRepository};
use crate::orchestrator::{SubmissionAccepted, SubmissionOrchestrator, SubmissionRequest};
use crate::web::types::{ApiError, ApiResult, ApplicationView};
use rocket::http::Status;
use rocket::serde::json::{self, Json};
use rocket::State;
use tracing::{error, info, warn};

pub async fn submit_application_handler(
    body: Result<Json<SubmissionRequest>, json::Error<'_>>,
    caller: Caller,
    orchestrator: &State<SubmissionOrchestrator>,
) -> ApiResult<(Status, Json<SubmissionAccepted>)> {
    let request = body.map_err(body_error)?.into_inner();

    match orchestrator.submit(&caller, request).await {
        Ok(accepted) => {
            info!(
                application_id = %accepted.job_id,
                user = %caller.external_id,
                "Application submission accepted"
            );
            Ok((Status::Accepted, Json(accepted)))
        }
        Err(e) => {
            warn!(user = %caller.external_id, "Application submission rejected: {}", e);
            Err(ApiError::from(e))
        }
    }
}

pub async fn get_application_handler(
    id: &str,
    caller: Caller,
    db_config: &State<DatabaseConfig>,
) -> ApiResult<Json<ApplicationView>> {
    let pool = db_config.pool().map_err(|e| {
        error!("Database connection failed: {}", e);
        ApiError::internal("Database connection failed")
    })?;

    let applications = ApplicationRepository::new(pool);
    let application = applications
        .find_owned(id, &caller.external_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Application not found: {id}")))?;

    let job = JobRepository::new(pool).find(&application.job_id).await?;
    let events = applications.events(&application.id).await?;

    Ok(Json(ApplicationView {
        application,
        job,
        events,
    }))
}
