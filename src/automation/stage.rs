// src/automation/stage.rs
//! The "run a stage with isolation" combinator and the sealed reporter that
//! every status update of a run goes through.

use super::Outcome;
use crate::core::{JobDetails, StageEvent, StageStatus, StatusChannel};
use crate::secret::Redactor;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info, warn};

// ===== Stages =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Login,
    ConfirmIdentity,
    NavigateToJob,
    DetectApplyPath,
    FillProfile,
    UploadResume,
    AnswerQuestions,
    Submit,
    DetectOutcome,
}

impl Stage {
    pub const PIPELINE: [Stage; 9] = [
        Stage::Login,
        Stage::ConfirmIdentity,
        Stage::NavigateToJob,
        Stage::DetectApplyPath,
        Stage::FillProfile,
        Stage::UploadResume,
        Stage::AnswerQuestions,
        Stage::Submit,
        Stage::DetectOutcome,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Login => "login",
            Stage::ConfirmIdentity => "identity confirmation",
            Stage::NavigateToJob => "job navigation",
            Stage::DetectApplyPath => "apply-path detection",
            Stage::FillProfile => "profile fields",
            Stage::UploadResume => "résumé upload",
            Stage::AnswerQuestions => "screening questions",
            Stage::Submit => "review and submit",
            Stage::DetectOutcome => "outcome detection",
        }
    }

    fn started(&self) -> (StageStatus, &'static str) {
        match self {
            Stage::Login => (StageStatus::LoggingIn, "Logging in to the job site."),
            Stage::ConfirmIdentity => (StageStatus::ConfirmingLogin, "Confirming login."),
            Stage::NavigateToJob => (StageStatus::NavigatingToJob, "Navigating to the job page."),
            Stage::DetectApplyPath => (StageStatus::DetectingApplyPath, "Looking for Easy Apply."),
            Stage::FillProfile => (StageStatus::FillingProfile, "Filling contact details."),
            Stage::UploadResume => (StageStatus::UploadingResume, "Uploading résumé."),
            Stage::AnswerQuestions => (StageStatus::AnsweringQuestions, "Answering screening questions."),
            Stage::Submit => (StageStatus::Submitting, "Submitting application."),
            Stage::DetectOutcome => (StageStatus::ConfirmingSubmission, "Waiting for submission result."),
        }
    }

    /// `None` for the last stage, which always ends the run.
    fn succeeded(&self) -> Option<(StageStatus, &'static str)> {
        match self {
            Stage::Login => Some((StageStatus::CredentialsSubmitted, "Credentials submitted.")),
            Stage::ConfirmIdentity => Some((StageStatus::LoginSuccessful, "Login successful.")),
            Stage::NavigateToJob => Some((StageStatus::JobPageLoaded, "Job page loaded.")),
            Stage::DetectApplyPath => Some((StageStatus::EasyApplyDetected, "Easy Apply detected.")),
            Stage::FillProfile => Some((StageStatus::ProfileFilled, "Contact details filled.")),
            Stage::UploadResume => Some((StageStatus::ResumeUploaded, "Résumé uploaded.")),
            Stage::AnswerQuestions => Some((StageStatus::QuestionsAnswered, "Screening questions answered.")),
            Stage::Submit => Some((StageStatus::SubmitClicked, "Submit clicked.")),
            Stage::DetectOutcome => None,
        }
    }
}

// ===== Transitions =====

/// Extra detail a stage attaches to its success report.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    pub message: Option<String>,
    pub job: Option<JobDetails>,
}

#[derive(Debug, Clone)]
pub struct Verdict {
    pub outcome: Outcome,
    pub message: String,
    pub error: Option<String>,
}

impl Verdict {
    pub fn new(outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            outcome,
            message: message.into(),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

#[derive(Debug)]
pub enum Transition {
    Advance(Progress),
    Finish(Verdict),
}

impl Transition {
    pub fn advance() -> Self {
        Transition::Advance(Progress::default())
    }

    pub fn advance_with(message: impl Into<String>) -> Self {
        Transition::Advance(Progress {
            message: Some(message.into()),
            job: None,
        })
    }

    pub fn finish(outcome: Outcome, message: impl Into<String>) -> Self {
        Transition::Finish(Verdict::new(outcome, message))
    }

    pub fn fail(outcome: Outcome, message: impl Into<String>, error: impl ToString) -> Self {
        Transition::Finish(Verdict::new(outcome, message).with_error(error))
    }
}

// ===== Reporter =====

/// Emits a run's status updates in order. Every message and error passes the
/// redactor here and nowhere else. After the terminal report the reporter is
/// sealed and drops anything further.
pub struct RunReporter {
    application_id: String,
    channel: Arc<dyn StatusChannel>,
    redactor: Redactor,
    sealed: AtomicBool,
}

impl RunReporter {
    pub fn new(application_id: String, channel: Arc<dyn StatusChannel>, redactor: Redactor) -> Self {
        Self {
            application_id,
            channel,
            redactor,
            sealed: AtomicBool::new(false),
        }
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    pub fn redact(&self, text: &str) -> String {
        self.redactor.redact(text)
    }

    pub async fn progress(&self, event: StageEvent) {
        if self.is_sealed() {
            warn!(
                application_id = %self.application_id,
                "Dropping {} reported after the terminal outcome", event.status.as_str()
            );
            return;
        }
        self.send(event).await;
    }

    /// Report the terminal outcome. Returns `false` if one was already reported.
    pub async fn finish(&self, verdict: &Verdict) -> bool {
        if self.sealed.swap(true, Ordering::SeqCst) {
            warn!(
                application_id = %self.application_id,
                "Dropping second terminal outcome {}", verdict.outcome.status().as_str()
            );
            return false;
        }

        let mut event = StageEvent::new(verdict.outcome.status(), verdict.message.clone());
        event.error = verdict.error.clone();
        self.send(event).await;
        true
    }

    async fn send(&self, mut event: StageEvent) {
        event.message = event.message.map(|m| self.redactor.redact(&m));
        event.error = event.error.map(|e| self.redactor.redact(&e));

        match (&event.error, event.status.is_terminal()) {
            (Some(err), true) => warn!(
                application_id = %self.application_id,
                status = event.status.as_str(),
                "{} ({})", event.message.as_deref().unwrap_or_default(), err
            ),
            _ => info!(
                application_id = %self.application_id,
                status = event.status.as_str(),
                "{}", event.message.as_deref().unwrap_or_default()
            ),
        }

        if let Err(e) = self.channel.report(&self.application_id, &event).await {
            // Losing an update beats aborting a run that may still succeed.
            error!(
                application_id = %self.application_id,
                "Status update {} not delivered: {}", event.status.as_str(), e
            );
        }
    }
}

// ===== Combinator =====

/// Report the stage start, drive `body`, report success or turn any fault into
/// a `ScriptError` verdict. Terminal verdicts are returned, not reported; the
/// run reports exactly one at its outer boundary.
pub async fn run_stage<Fut>(reporter: &RunReporter, stage: Stage, body: Fut) -> Transition
where
    Fut: Future<Output = anyhow::Result<Transition>>,
{
    let started = Instant::now();
    let (status, message) = stage.started();
    reporter.progress(StageEvent::new(status, message)).await;

    match body.await {
        Ok(Transition::Advance(progress)) => {
            info!(
                application_id = %reporter.application_id(),
                "Stage '{}' completed in {:?}", stage.name(), started.elapsed()
            );
            if let Some((status, default_message)) = stage.succeeded() {
                let mut event = StageEvent::new(
                    status,
                    progress.message.clone().unwrap_or_else(|| default_message.to_string()),
                );
                event.job = progress.job.clone();
                reporter.progress(event).await;
            }
            Transition::Advance(progress)
        }
        Ok(Transition::Finish(verdict)) => {
            info!(
                application_id = %reporter.application_id(),
                "Stage '{}' ended the run with {:?} after {:?}",
                stage.name(),
                verdict.outcome,
                started.elapsed()
            );
            Transition::Finish(verdict)
        }
        Err(e) => Transition::fail(
            Outcome::ScriptError,
            format!("Unexpected error during {}.", stage.name()),
            format!("{e:#}"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automation::testing::RecordingChannel;
    use crate::secret::Secret;

    fn reporter(channel: Arc<RecordingChannel>) -> RunReporter {
        let password = Secret::new("hunter2-secret");
        RunReporter::new("app-1".into(), channel, Redactor::new().with(Some(&password)))
    }

    #[tokio::test]
    async fn advancing_stage_reports_start_then_success() {
        let channel = Arc::new(RecordingChannel::default());
        let reporter = reporter(channel.clone());

        let transition = run_stage(&reporter, Stage::Submit, async {
            Ok::<_, anyhow::Error>(Transition::advance())
        })
        .await;

        assert!(matches!(transition, Transition::Advance(_)));
        assert_eq!(
            channel.statuses(),
            vec![StageStatus::Submitting, StageStatus::SubmitClicked]
        );
    }

    #[tokio::test]
    async fn faults_become_redacted_script_errors() {
        let channel = Arc::new(RecordingChannel::default());
        let reporter = reporter(channel.clone());

        let transition = run_stage(&reporter, Stage::Login, async {
            Err::<Transition, _>(anyhow::anyhow!("typing hunter2-secret into #password failed"))
        })
        .await;

        let Transition::Finish(verdict) = transition else {
            panic!("fault must end the run");
        };
        assert_eq!(verdict.outcome, Outcome::ScriptError);

        assert!(reporter.finish(&verdict).await);
        let last = channel.events().pop().unwrap();
        assert_eq!(last.status, StageStatus::ScriptError);
        let error = last.error.unwrap();
        assert!(!error.contains("hunter2-secret"));
        assert!(error.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn nothing_follows_the_terminal_report() {
        let channel = Arc::new(RecordingChannel::default());
        let reporter = reporter(channel.clone());

        assert!(reporter.finish(&Verdict::new(Outcome::LoginFailed, "Login failed.")).await);
        assert!(!reporter.finish(&Verdict::new(Outcome::ScriptError, "late")).await);
        reporter
            .progress(StageEvent::new(StageStatus::NavigatingToJob, "late"))
            .await;

        assert_eq!(channel.statuses(), vec![StageStatus::LoginFailed]);
    }
}
