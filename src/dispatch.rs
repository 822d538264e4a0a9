// src/dispatch.rs
//! Handing a run to the automation backend. The wire payload keeps secrets
//! in `context` and plain identifiers in `data`, so `data` can be logged as is.

use crate::automation::{spawn_run, ApplicantProfile, RunParams, RunServices, WorkflowDefinition};
use crate::browser::SessionFactory;
use crate::core::{DocumentChannel, HttpStatusChannel, SiteCredentials};
use crate::error::DispatchError;
use crate::secret::Secret;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub const RUNS_PATH: &str = "/api/v1/automation/runs";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    #[serde(alias = "code")]
    pub workflow: WorkflowDefinition,
    pub context: DispatchContext,
    pub data: DispatchData,
}

/// Secret-bearing half. Never logged.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchContext {
    #[serde(default)]
    pub auth_token: Option<Secret>,
    #[serde(default, alias = "linkedinUsername")]
    pub site_username: Option<String>,
    #[serde(default, alias = "linkedinPassword")]
    pub site_password: Option<Secret>,
    /// Concrete callback endpoint for this application.
    pub callback_url: String,
    pub callback_secret: Secret,
    #[serde(default)]
    pub profile: ApplicantProfile,
}

/// Identifier half.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchData {
    pub application_id: String,
    pub user_id: String,
    pub job_url: String,
    pub resume_id: String,
    #[serde(default)]
    pub cover_letter_id: Option<String>,
}

impl DispatchRequest {
    pub fn run_params(&self) -> RunParams {
        RunParams {
            application_id: self.data.application_id.clone(),
            job_url: self.data.job_url.clone(),
            resume_id: self.data.resume_id.clone(),
            credentials: SiteCredentials {
                username: self.context.site_username.clone(),
                password: self.context.site_password.clone(),
            },
            bearer: self.context.auth_token.clone(),
            profile: self.context.profile.clone(),
        }
    }
}

#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Start the run. Returns once the backend has accepted it, never waits
    /// for the run itself.
    async fn dispatch(&self, request: DispatchRequest) -> Result<(), DispatchError>;
}

// ===== In-process =====

/// Runs the workflow inside this process against a WebDriver endpoint.
pub struct InProcessDispatcher {
    browsers: Arc<dyn SessionFactory>,
    documents: Arc<dyn DocumentChannel>,
    timeout: Duration,
}

impl InProcessDispatcher {
    pub fn new(browsers: Arc<dyn SessionFactory>, documents: Arc<dyn DocumentChannel>, timeout: Duration) -> Self {
        Self {
            browsers,
            documents,
            timeout,
        }
    }
}

#[async_trait]
impl Dispatcher for InProcessDispatcher {
    async fn dispatch(&self, request: DispatchRequest) -> Result<(), DispatchError> {
        let status = HttpStatusChannel::new(
            request.context.callback_url.clone(),
            request.context.callback_secret.clone(),
            self.timeout,
        )?;
        let params = request.run_params();
        let application_id = params.application_id.clone();

        let services = RunServices {
            browsers: self.browsers.clone(),
            documents: self.documents.clone(),
            status: Arc::new(status),
        };
        let run = spawn_run(Arc::new(request.workflow), params, services);

        info!(application_id = %application_id, "Run dispatched in-process");
        tokio::spawn(async move {
            match run.await {
                Ok(report) => info!(
                    application_id = %application_id,
                    success = report.success,
                    "Run ended: {}", report.message
                ),
                Err(e) => error!(application_id = %application_id, "Run supervisor failed: {}", e),
            }
        });
        Ok(())
    }
}

// ===== Remote =====

/// Posts the run to another instance's worker endpoint.
pub struct RemoteDispatcher {
    client: reqwest::Client,
    runs_url: String,
    token: Secret,
}

impl RemoteDispatcher {
    pub fn new(backend_url: &str, token: Secret, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            runs_url: format!("{}{}", backend_url.trim_end_matches('/'), RUNS_PATH),
            token,
        })
    }
}

#[async_trait]
impl Dispatcher for RemoteDispatcher {
    async fn dispatch(&self, request: DispatchRequest) -> Result<(), DispatchError> {
        info!(
            application_id = %request.data.application_id,
            job_url = %request.data.job_url,
            "Dispatching run to {}", self.runs_url
        );

        let response = self
            .client
            .post(&self.runs_url)
            .bearer_auth(self.token.expose())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        warn!(
            application_id = %request.data.application_id,
            "Automation backend responded with {}: {}", status, body
        );
        Err(DispatchError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
