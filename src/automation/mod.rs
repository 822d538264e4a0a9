// src/automation/mod.rs
//! Automation State Machine: drives one browser session through the apply
//! pipeline and reports every transition on the status channel.

pub mod engine;
pub mod questions;
pub mod race;
pub mod stage;
pub mod workflow;

use crate::core::{SiteCredentials, StageStatus};
use crate::secret::{Redactor, Secret};
use serde::{Deserialize, Serialize};

pub use engine::{spawn_run, RunServices};
pub use stage::{Stage, Transition, Verdict};
pub use workflow::WorkflowDefinition;

/// Terminal classification of a run. Exactly one per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    LoginFailed,
    Challenged,
    NavigationFailed,
    UnsupportedApplyPath,
    FormFillFailed,
    SubmissionFailed,
    SubmissionUnconfirmed,
    SubmissionSucceeded,
    ScriptError,
}

impl Outcome {
    pub fn status(&self) -> StageStatus {
        match self {
            Outcome::LoginFailed => StageStatus::LoginFailed,
            Outcome::Challenged => StageStatus::LoginChallenged,
            Outcome::NavigationFailed => StageStatus::NavigationFailed,
            Outcome::UnsupportedApplyPath => StageStatus::UnsupportedApplyPath,
            Outcome::FormFillFailed => StageStatus::FormFillFailed,
            Outcome::SubmissionFailed => StageStatus::SubmissionFailed,
            Outcome::SubmissionUnconfirmed => StageStatus::SubmissionUnconfirmed,
            Outcome::SubmissionSucceeded => StageStatus::SubmissionSuccess,
            Outcome::ScriptError => StageStatus::ScriptError,
        }
    }

    /// Whether the script completed its defined scope. Stopping cleanly at a
    /// non-Easy-Apply job counts.
    pub fn is_script_success(&self) -> bool {
        matches!(self, Outcome::SubmissionSucceeded | Outcome::UnsupportedApplyPath)
    }
}

/// Contact details used for the profile step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicantProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Everything one run needs. Lives only in memory, owned by the run.
#[derive(Debug, Clone)]
pub struct RunParams {
    pub application_id: String,
    pub job_url: String,
    pub resume_id: String,
    pub credentials: SiteCredentials,
    /// The submitting caller's own bearer token, used for document retrieval.
    pub bearer: Option<Secret>,
    pub profile: ApplicantProfile,
}

impl RunParams {
    pub fn redactor(&self) -> Redactor {
        Redactor::new()
            .with(self.credentials.password.as_ref())
            .with(self.bearer.as_ref())
    }
}

/// Script-level result of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub outcome: Outcome,
}

impl From<Verdict> for RunReport {
    fn from(verdict: Verdict) -> Self {
        Self {
            success: verdict.outcome.is_script_success(),
            message: verdict.message,
            error: verdict.error,
            outcome: verdict.outcome,
        }
    }
}
