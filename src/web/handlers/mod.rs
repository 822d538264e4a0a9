pub mod application_handlers;
pub mod callback_handlers;
pub mod document_handlers;
pub mod system_handlers;
pub mod worker_handlers;

pub use application_handlers::*;
pub use callback_handlers::*;
pub use document_handlers::*;
pub use system_handlers::*;
pub use worker_handlers::*;

use crate::error::ValidationError;
use crate::web::types::ApiError;
use rocket::serde::json;

/// Malformed or unreadable JSON bodies are a 400, never a 422.
pub(crate) fn body_error(e: json::Error<'_>) -> ApiError {
    ApiError::from(ValidationError::MalformedBody(e.to_string()))
}
