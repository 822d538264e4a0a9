// src/orchestrator.rs
//! Submission Orchestrator: validates a submission, records the attempt and
//! hands the run to the automation backend without waiting for it.

use crate::auth::Caller;
use crate::automation::{ApplicantProfile, WorkflowDefinition};
use crate::core::{IdentityResolver, ResolvedIdentity};
use crate::database::{ApplicationRepository, User, INITIAL_STATUS};
use crate::dispatch::{DispatchContext, DispatchData, DispatchRequest, Dispatcher};
use crate::error::{SubmissionError, ValidationError};
use crate::secret::Secret;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{error, info};

const PLACEHOLDER_EMAIL_DOMAIN: &str = "@placeholder.email";

/// Body of `POST /api/v1/applications`. Every field is optional at the wire
/// level so a missing one is reported by name instead of as a parse error.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
    #[serde(default)]
    pub job_url: Option<String>,
    #[serde(default, alias = "applyrightResumeId")]
    pub resume_id: Option<String>,
    #[serde(default)]
    pub cover_letter_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionAccepted {
    pub job_id: String,
    pub status: String,
    pub message: String,
}

struct ValidSubmission {
    job_url: String,
    resume_id: String,
    cover_letter_id: Option<String>,
}

impl SubmissionRequest {
    fn validate(self) -> Result<ValidSubmission, ValidationError> {
        fn present(value: Option<String>) -> Option<String> {
            value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
        }

        let job_url = present(self.job_url);
        let resume_id = present(self.resume_id);

        let mut missing = Vec::new();
        if job_url.is_none() {
            missing.push("jobUrl");
        }
        if resume_id.is_none() {
            missing.push("resumeId");
        }

        match (job_url, resume_id) {
            (Some(job_url), Some(resume_id)) => Ok(ValidSubmission {
                job_url,
                resume_id,
                cover_letter_id: present(self.cover_letter_id),
            }),
            _ => Err(ValidationError::MissingFields(missing)),
        }
    }
}

/// Where runs report back to, and what they execute.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Callback URL template containing `{appId}`.
    pub callback_url: String,
    pub callback_secret: Secret,
    pub workflow: Arc<WorkflowDefinition>,
}

pub struct SubmissionOrchestrator {
    pool: SqlitePool,
    resolver: IdentityResolver,
    dispatcher: Arc<dyn Dispatcher>,
    settings: DispatchSettings,
}

impl SubmissionOrchestrator {
    pub fn new(
        pool: SqlitePool,
        resolver: IdentityResolver,
        dispatcher: Arc<dyn Dispatcher>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            pool,
            resolver,
            dispatcher,
            settings,
        }
    }

    pub async fn submit(
        &self,
        caller: &Caller,
        request: SubmissionRequest,
    ) -> Result<SubmissionAccepted, SubmissionError> {
        let submission = request.validate()?;
        info!(
            user = %caller.external_id,
            job_url = %submission.job_url,
            resume_id = %submission.resume_id,
            "Received application submission"
        );

        let identity = self
            .resolver
            .resolve(caller, &submission.job_url, &submission.resume_id)
            .await?;

        let application = ApplicationRepository::new(&self.pool)
            .create(
                &identity.user.id,
                &identity.job.id,
                &identity.resume.id,
                submission.cover_letter_id.as_deref(),
            )
            .await?;

        let request = self.dispatch_request(caller, &identity, &application.id, &submission);
        if let Err(e) = self.dispatcher.dispatch(request).await {
            // The record exists; it stays pending until someone notices.
            error!(
                application_id = %application.id,
                "Failed to dispatch automation run: {}", e
            );
        }

        Ok(SubmissionAccepted {
            job_id: application.id,
            status: INITIAL_STATUS.to_string(),
            message: "Application submission accepted and is being processed.".to_string(),
        })
    }

    fn dispatch_request(
        &self,
        caller: &Caller,
        identity: &ResolvedIdentity,
        application_id: &str,
        submission: &ValidSubmission,
    ) -> DispatchRequest {
        DispatchRequest {
            workflow: self.settings.workflow.as_ref().clone(),
            context: DispatchContext {
                auth_token: Some(caller.token.clone()),
                site_username: identity.credentials.username.clone(),
                site_password: identity.credentials.password.clone(),
                callback_url: self.settings.callback_url.replace("{appId}", application_id),
                callback_secret: self.settings.callback_secret.clone(),
                profile: profile_of(&identity.user),
            },
            data: DispatchData {
                application_id: application_id.to_string(),
                user_id: identity.user.id.clone(),
                job_url: submission.job_url.clone(),
                resume_id: submission.resume_id.clone(),
                cover_letter_id: submission.cover_letter_id.clone(),
            },
        }
    }
}

fn profile_of(user: &User) -> ApplicantProfile {
    ApplicantProfile {
        email: Some(user.email.clone()).filter(|e| !e.ends_with(PLACEHOLDER_EMAIL_DOMAIN)),
        phone: user.phone.clone().filter(|p| !p.trim().is_empty()),
    }
}
