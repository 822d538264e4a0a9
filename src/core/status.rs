// src/core/status.rs
//! Status Channel: one-way, secret-authenticated stage updates posted to the
//! record-keeper's callback endpoint.

use crate::auth::AUTOMATION_SECRET_HEADER;
use crate::error::ChannelDeliveryError;
use crate::secret::Secret;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Documented status vocabulary. Terminal codes map one-to-one onto run outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageStatus {
    RunStarted,
    LoggingIn,
    CredentialsSubmitted,
    ConfirmingLogin,
    LoginSuccessful,
    NavigatingToJob,
    JobPageLoaded,
    DetectingApplyPath,
    EasyApplyDetected,
    FillingProfile,
    ProfileFilled,
    UploadingResume,
    ResumeUploaded,
    AnsweringQuestions,
    QuestionsAnswered,
    Submitting,
    SubmitClicked,
    ConfirmingSubmission,
    // terminal
    LoginFailed,
    LoginChallenged,
    NavigationFailed,
    UnsupportedApplyPath,
    FormFillFailed,
    SubmissionFailed,
    SubmissionUnconfirmed,
    SubmissionSuccess,
    ScriptError,
}

impl StageStatus {
    pub const ALL: [StageStatus; 27] = [
        StageStatus::RunStarted,
        StageStatus::LoggingIn,
        StageStatus::CredentialsSubmitted,
        StageStatus::ConfirmingLogin,
        StageStatus::LoginSuccessful,
        StageStatus::NavigatingToJob,
        StageStatus::JobPageLoaded,
        StageStatus::DetectingApplyPath,
        StageStatus::EasyApplyDetected,
        StageStatus::FillingProfile,
        StageStatus::ProfileFilled,
        StageStatus::UploadingResume,
        StageStatus::ResumeUploaded,
        StageStatus::AnsweringQuestions,
        StageStatus::QuestionsAnswered,
        StageStatus::Submitting,
        StageStatus::SubmitClicked,
        StageStatus::ConfirmingSubmission,
        StageStatus::LoginFailed,
        StageStatus::LoginChallenged,
        StageStatus::NavigationFailed,
        StageStatus::UnsupportedApplyPath,
        StageStatus::FormFillFailed,
        StageStatus::SubmissionFailed,
        StageStatus::SubmissionUnconfirmed,
        StageStatus::SubmissionSuccess,
        StageStatus::ScriptError,
    ];

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == code)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::RunStarted => "RUN_STARTED",
            StageStatus::LoggingIn => "LOGGING_IN",
            StageStatus::CredentialsSubmitted => "CREDENTIALS_SUBMITTED",
            StageStatus::ConfirmingLogin => "CONFIRMING_LOGIN",
            StageStatus::LoginSuccessful => "LOGIN_SUCCESSFUL",
            StageStatus::NavigatingToJob => "NAVIGATING_TO_JOB",
            StageStatus::JobPageLoaded => "JOB_PAGE_LOADED",
            StageStatus::DetectingApplyPath => "DETECTING_APPLY_PATH",
            StageStatus::EasyApplyDetected => "EASY_APPLY_DETECTED",
            StageStatus::FillingProfile => "FILLING_PROFILE",
            StageStatus::ProfileFilled => "PROFILE_FILLED",
            StageStatus::UploadingResume => "UPLOADING_RESUME",
            StageStatus::ResumeUploaded => "RESUME_UPLOADED",
            StageStatus::AnsweringQuestions => "ANSWERING_QUESTIONS",
            StageStatus::QuestionsAnswered => "QUESTIONS_ANSWERED",
            StageStatus::Submitting => "SUBMITTING",
            StageStatus::SubmitClicked => "SUBMIT_CLICKED",
            StageStatus::ConfirmingSubmission => "CONFIRMING_SUBMISSION",
            StageStatus::LoginFailed => "LOGIN_FAILED",
            StageStatus::LoginChallenged => "LOGIN_CHALLENGED",
            StageStatus::NavigationFailed => "NAVIGATION_FAILED",
            StageStatus::UnsupportedApplyPath => "UNSUPPORTED_APPLY_PATH",
            StageStatus::FormFillFailed => "FORM_FILL_FAILED",
            StageStatus::SubmissionFailed => "SUBMISSION_FAILED",
            StageStatus::SubmissionUnconfirmed => "SUBMISSION_UNCONFIRMED",
            StageStatus::SubmissionSuccess => "SUBMISSION_SUCCESS",
            StageStatus::ScriptError => "SCRIPT_ERROR",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageStatus::LoginFailed
                | StageStatus::LoginChallenged
                | StageStatus::NavigationFailed
                | StageStatus::UnsupportedApplyPath
                | StageStatus::FormFillFailed
                | StageStatus::SubmissionFailed
                | StageStatus::SubmissionUnconfirmed
                | StageStatus::SubmissionSuccess
                | StageStatus::ScriptError
        )
    }
}

/// Job metadata scraped from the job page, attached to `JOB_PAGE_LOADED`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobDetails {
    pub title: String,
    pub company: String,
    pub location: Option<String>,
}

/// Immutable, timestamped record of one status transition.
#[derive(Debug, Clone, PartialEq)]
pub struct StageEvent {
    pub status: StageStatus,
    pub message: Option<String>,
    pub error: Option<String>,
    pub job: Option<JobDetails>,
    pub emitted_at: DateTime<Utc>,
}

impl StageEvent {
    pub fn new(status: StageStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
            error: None,
            job: None,
            emitted_at: Utc::now(),
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_job(mut self, job: JobDetails) -> Self {
        self.job = Some(job);
        self
    }
}

/// Callback body. Optional fields are omitted rather than sent as null.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusPayload<'a> {
    status: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_company: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    job_location: Option<&'a str>,
    emitted_at: DateTime<Utc>,
}

impl<'a> From<&'a StageEvent> for StatusPayload<'a> {
    fn from(event: &'a StageEvent) -> Self {
        let job = event.job.as_ref();
        Self {
            status: event.status.as_str(),
            message: event.message.as_deref(),
            error: event.error.as_deref(),
            job_title: job.map(|j| j.title.as_str()).filter(|t| !t.is_empty()),
            job_company: job.map(|j| j.company.as_str()).filter(|c| !c.is_empty()),
            job_location: job.and_then(|j| j.location.as_deref()),
            emitted_at: event.emitted_at,
        }
    }
}

#[async_trait]
pub trait StatusChannel: Send + Sync {
    /// Post one update. No retry: callers decide whether a lost update matters.
    async fn report(&self, job_id: &str, event: &StageEvent) -> Result<(), ChannelDeliveryError>;
}

/// Posts to the run's callback URL, which arrives with the job id already in it.
pub struct HttpStatusChannel {
    client: reqwest::Client,
    callback_url: String,
    secret: Secret,
}

impl HttpStatusChannel {
    pub fn new(callback_url: String, secret: Secret, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            callback_url,
            secret,
        })
    }
}

#[async_trait]
impl StatusChannel for HttpStatusChannel {
    async fn report(&self, job_id: &str, event: &StageEvent) -> Result<(), ChannelDeliveryError> {
        debug!(application_id = %job_id, status = event.status.as_str(), "Sending status update");

        let response = self
            .client
            .post(&self.callback_url)
            .header(AUTOMATION_SECRET_HEADER, self.secret.expose())
            .json(&StatusPayload::from(event))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(application_id = %job_id, "Status update sent successfully");
            Ok(())
        } else {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            warn!(
                application_id = %job_id,
                "Failed to send status update. API responded with {}: {}", status, body
            );
            Err(ChannelDeliveryError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}
