// src/web/types.rs
use crate::core::Document;
use chrono::{DateTime, Utc};
use crate::database::{Application, ApplicationEvent, Job, StatusUpdate};
use crate::error::{PersistenceError, SubmissionError, ValidationError};
use rocket::http::{ContentType, Status};
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::serde::{Deserialize, Serialize};
use rocket::{Request, Response};

pub struct PdfResponse {
    pub document: Document,
}

impl<'r> Responder<'r, 'static> for PdfResponse {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        let Document {
            bytes,
            file_name,
            mime_type,
        } = self.document;
        let content_type = ContentType::parse_flexible(&mime_type).unwrap_or(ContentType::PDF);

        Response::build()
            .header(content_type)
            .raw_header(
                "Content-Disposition",
                format!("attachment; filename=\"{}\"", file_name),
            )
            .sized_body(bytes.len(), std::io::Cursor::new(bytes))
            .ok()
    }
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde", rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, error_code: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
            error_code: error_code.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }
}

/// An error body with the HTTP status it belongs to.
#[derive(Debug)]
pub struct ApiError {
    pub status: Status,
    pub body: ErrorResponse,
}

impl ApiError {
    pub fn new(status: Status, error: impl Into<String>, code: &str) -> Self {
        Self {
            status,
            body: ErrorResponse::new(error, code),
        }
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(Status::BadRequest, error, "BAD_REQUEST")
    }

    pub fn not_found(error: impl Into<String>) -> Self {
        Self::new(Status::NotFound, error, "NOT_FOUND")
    }

    pub fn internal(error: impl Into<String>) -> Self {
        Self::new(Status::InternalServerError, error, "INTERNAL_ERROR")
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'static> {
        (self.status, Json(self.body)).respond_to(req)
    }
}

impl From<SubmissionError> for ApiError {
    fn from(e: SubmissionError) -> Self {
        Self::new(e.status(), e.to_string(), e.code())
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        Self::bad_request(e.to_string())
    }
}

impl From<PersistenceError> for ApiError {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::NotFound { .. } => Self::not_found(e.to_string()),
            PersistenceError::Database(_) => {
                Self::new(Status::InternalServerError, e.to_string(), "DATABASE_ERROR")
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Body of a status callback from a run.
#[derive(Debug, Default, Deserialize)]
#[serde(crate = "rocket::serde", rename_all = "camelCase")]
pub struct StatusCallbackRequest {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub job_title: Option<String>,
    #[serde(default)]
    pub job_company: Option<String>,
    #[serde(default)]
    pub job_location: Option<String>,
    #[serde(default)]
    pub emitted_at: Option<DateTime<Utc>>,
}

impl StatusCallbackRequest {
    pub fn into_update(self) -> Result<StatusUpdate, ValidationError> {
        let status = self
            .status
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ValidationError::MissingFields(vec!["status"]))?;

        Ok(StatusUpdate {
            status,
            message: self.message,
            error: self.error,
            emitted_at: self.emitted_at,
            job_title: self.job_title,
            job_company: self.job_company,
            job_location: self.job_location,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde", rename_all = "camelCase")]
pub struct StatusCallbackResponse {
    pub success: bool,
    pub application_id: String,
    pub status: String,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde", rename_all = "camelCase")]
pub struct ApplicationView {
    pub application: Application,
    pub job: Option<Job>,
    pub events: Vec<ApplicationEvent>,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde", rename_all = "camelCase")]
pub struct RunAccepted {
    pub accepted: bool,
    pub application_id: String,
}

#[derive(Debug, Serialize)]
#[serde(crate = "rocket::serde")]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}
