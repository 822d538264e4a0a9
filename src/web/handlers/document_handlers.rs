// src/web/handlers/document_handlers.rs
use crate::auth::Caller;
use crate::core::ResumeStore;
use crate::web::types::{ApiError, ApiResult, PdfResponse};
use rocket::State;
use tracing::{error, info, warn};

pub async fn download_resume_handler(
    id: &str,
    caller: Caller,
    store: &State<ResumeStore>,
) -> ApiResult<PdfResponse> {
    if ResumeStore::validate_id(id).is_err() {
        warn!(user = %caller.external_id, "Rejected résumé id with unsupported characters");
        return Err(ApiError::not_found("Resume not found"));
    }

    match store.read(id).await {
        Ok(Some(document)) => {
            info!(
                user = %caller.external_id,
                "Serving résumé {} ({} bytes)", document.file_name, document.bytes.len()
            );
            Ok(PdfResponse { document })
        }
        Ok(None) => Err(ApiError::not_found("Resume not found")),
        Err(e) => {
            error!("Failed to read résumé {}: {:#}", id, e);
            Err(ApiError::internal("Failed to read resume file"))
        }
    }
}
