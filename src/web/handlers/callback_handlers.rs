// src/web/handlers/callback_handlers.rs
use super::body_error;
use crate::auth::AutomationCaller;
use crate::database::{ApplicationRepository, DatabaseConfig};
use crate::error::PersistenceError;
use crate::web::types::{
    ApiError, ApiResult, StatusCallbackRequest, StatusCallbackResponse,
};
use rocket::serde::json::{self, Json};
use rocket::State;
use tracing::{error, info, warn};

/// Record one status update reported by a run. Every update lands in the
/// event log; the response carries the status the application ends up in.
pub async fn status_callback_handler(
    id: &str,
    _automation: AutomationCaller,
    body: Result<Json<StatusCallbackRequest>, json::Error<'_>>,
    db_config: &State<DatabaseConfig>,
) -> ApiResult<Json<StatusCallbackResponse>> {
    let update = body.map_err(body_error)?.into_inner().into_update()?;

    let pool = db_config.pool().map_err(|e| {
        error!("Database connection failed: {}", e);
        ApiError::internal("Database connection failed")
    })?;

    match ApplicationRepository::new(pool).apply_status(id, &update).await {
        Ok(application) => {
            info!(
                application_id = %application.id,
                status = %application.status,
                "Application status updated"
            );
            Ok(Json(StatusCallbackResponse {
                success: true,
                application_id: application.id,
                status: application.status,
            }))
        }
        Err(e @ PersistenceError::NotFound { .. }) => {
            warn!(application_id = %id, "Status update for unknown application");
            Err(ApiError::from(e))
        }
        Err(e) => {
            error!(application_id = %id, "Failed to store status update: {}", e);
            Err(ApiError::from(e))
        }
    }
}
