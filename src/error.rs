// src/error.rs
//! Error taxonomy shared by the orchestrator, the channels and the web layer.

use rocket::http::Status;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Required secret {0} is not set in the environment")]
    MissingSecret(&'static str),

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Authorization header missing")]
    MissingToken,
    #[error("Authorization header must use the Bearer scheme")]
    InvalidScheme,
    #[error("Token has expired")]
    Expired,
    #[error("Token signature verification failed")]
    InvalidSignature,
    #[error("Invalid token: missing 'sub' claim")]
    MissingSubject,
    #[error("Invalid token: {0}")]
    Invalid(String),
    #[error("Incorrect or missing X-Automation-Secret header")]
    AutomationSecretMismatch,
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::MissingToken | AuthError::InvalidScheme => "MISSING_TOKEN",
            AuthError::Expired => "TOKEN_EXPIRED",
            AuthError::InvalidSignature | AuthError::Invalid(_) | AuthError::MissingSubject => {
                "INVALID_TOKEN"
            }
            AuthError::AutomationSecretMismatch => "INVALID_AUTOMATION_SECRET",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Invalid request body: {0}")]
    MalformedBody(String),
    #[error("Missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("Invalid job URL: {0}")]
    InvalidUrl(String),
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),
}

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Automation backend unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),
    #[error("Automation backend rejected the run with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Failure delivering something over the Status or Document channel.
/// Never fatal to a run by itself; each call site decides.
#[derive(Debug, Error)]
pub enum ChannelDeliveryError {
    #[error("Network error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Receiver responded with {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Errors surfaced synchronously to the submitter of an application.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

impl SubmissionError {
    pub fn status(&self) -> Status {
        match self {
            SubmissionError::Auth(_) => Status::Unauthorized,
            SubmissionError::Validation(_) => Status::BadRequest,
            SubmissionError::Persistence(PersistenceError::NotFound { .. }) => Status::NotFound,
            SubmissionError::Persistence(_) => Status::InternalServerError,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            SubmissionError::Auth(e) => e.code(),
            SubmissionError::Validation(_) => "BAD_REQUEST",
            SubmissionError::Persistence(PersistenceError::NotFound { .. }) => "NOT_FOUND",
            SubmissionError::Persistence(_) => "DATABASE_ERROR",
        }
    }
}

impl From<sqlx::Error> for SubmissionError {
    fn from(e: sqlx::Error) -> Self {
        SubmissionError::Persistence(PersistenceError::Database(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_errors_map_to_http_statuses() {
        assert_eq!(
            SubmissionError::from(AuthError::Expired).status(),
            Status::Unauthorized
        );
        assert_eq!(
            SubmissionError::from(ValidationError::MissingFields(vec!["jobUrl"])).status(),
            Status::BadRequest
        );
        assert_eq!(
            SubmissionError::from(sqlx::Error::PoolClosed).status(),
            Status::InternalServerError
        );
    }

    #[test]
    fn missing_fields_are_listed() {
        let e = ValidationError::MissingFields(vec!["jobUrl", "resumeId"]);
        assert_eq!(e.to_string(), "Missing required fields: jobUrl, resumeId");
    }
}
