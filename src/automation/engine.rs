// src/automation/engine.rs
//! One run of the apply pipeline: stages in fixed order over a single browser
//! session, exactly one terminal report, session closed whatever happens.

use super::questions::{answer_visible_questions, QuestionTally};
use super::race::{first_signal, Probe};
use super::stage::{run_stage, Progress, RunReporter, Stage, Transition, Verdict};
use super::workflow::{ms, FieldControl, FieldRule, ProfileField, WorkflowDefinition};
use super::{Outcome, RunParams, RunReport};
use crate::browser::{
    wait_gone, wait_present, wait_url, wait_visible, wait_visible_any, wait_visible_first,
    BrowserError, BrowserSession, ElementRef, SessionFactory,
};
use crate::core::job_page::extract_job_details;
use crate::core::{DocumentChannel, JobDetails, StageEvent, StageStatus, StatusChannel};
use anyhow::{Context, Result};
use futures::FutureExt;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, warn};

/// Collaborators a run talks to besides the page itself.
#[derive(Clone)]
pub struct RunServices {
    pub browsers: Arc<dyn SessionFactory>,
    pub documents: Arc<dyn DocumentChannel>,
    pub status: Arc<dyn StatusChannel>,
}

struct RunContext<'a> {
    workflow: &'a WorkflowDefinition,
    params: &'a RunParams,
    session: &'a dyn BrowserSession,
    documents: &'a dyn DocumentChannel,
}

#[derive(Default)]
struct RunState {
    apply_button: Option<ElementRef>,
}

/// Start a run in its own task. The handle always resolves to a report: a
/// panic inside a stage is caught here and reported as `SCRIPT_ERROR`.
pub fn spawn_run(
    workflow: Arc<WorkflowDefinition>,
    params: RunParams,
    services: RunServices,
) -> JoinHandle<RunReport> {
    tokio::spawn(supervise(workflow, params, services))
}

async fn supervise(workflow: Arc<WorkflowDefinition>, params: RunParams, services: RunServices) -> RunReport {
    let application_id = params.application_id.clone();
    let reporter = Arc::new(RunReporter::new(
        application_id.clone(),
        services.status.clone(),
        params.redactor(),
    ));

    info!(
        application_id = %application_id,
        workflow = %workflow.name,
        "Starting automation run"
    );
    reporter
        .progress(StageEvent::new(StageStatus::RunStarted, "Automation run started."))
        .await;

    let mut verdict = match services.browsers.open().await {
        Err(e) => Verdict::new(Outcome::ScriptError, "Could not start a browser session.").with_error(e),
        Ok(session) => {
            let pipeline = tokio::spawn({
                let workflow = workflow.clone();
                let session = session.clone();
                let documents = services.documents.clone();
                let reporter = reporter.clone();
                async move {
                    let ctx = RunContext {
                        workflow: &workflow,
                        params: &params,
                        session: session.as_ref(),
                        documents: documents.as_ref(),
                    };
                    run_pipeline(&ctx, &reporter).await
                }
            });

            let verdict = match pipeline.await {
                Ok(verdict) => verdict,
                Err(e) => Verdict::new(Outcome::ScriptError, "The automation run crashed.")
                    .with_error(join_failure(e)),
            };

            if let Err(e) = session.close().await {
                warn!(application_id = %application_id, "Browser session not closed cleanly: {}", e);
            }
            verdict
        }
    };

    verdict.message = reporter.redact(&verdict.message);
    verdict.error = verdict.error.map(|e| reporter.redact(&e));
    reporter.finish(&verdict).await;

    info!(
        application_id = %application_id,
        "Automation run finished: {:?}", verdict.outcome
    );
    RunReport::from(verdict)
}

fn join_failure(error: JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let payload = error.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "panic without message".to_string())
}

async fn run_pipeline(ctx: &RunContext<'_>, reporter: &RunReporter) -> Verdict {
    let mut state = RunState::default();

    for stage in Stage::PIPELINE {
        let body = execute(ctx, &mut state, stage);
        if let Transition::Finish(verdict) = run_stage(reporter, stage, body).await {
            return verdict;
        }
    }
    Verdict::new(Outcome::ScriptError, "Pipeline ended without an outcome.")
}

async fn execute(ctx: &RunContext<'_>, state: &mut RunState, stage: Stage) -> Result<Transition> {
    match stage {
        Stage::Login => login(ctx).await,
        Stage::ConfirmIdentity => confirm_identity(ctx).await,
        Stage::NavigateToJob => navigate_to_job(ctx).await,
        Stage::DetectApplyPath => detect_apply_path(ctx, state).await,
        Stage::FillProfile => fill_profile(ctx, state).await,
        Stage::UploadResume => upload_resume(ctx).await,
        Stage::AnswerQuestions => answer_questions(ctx).await,
        Stage::Submit => submit(ctx).await,
        Stage::DetectOutcome => detect_outcome(ctx).await,
    }
}

// ===== Login =====

async fn login(ctx: &RunContext<'_>) -> Result<Transition> {
    let credentials = &ctx.params.credentials;
    let username = credentials.username.as_deref().filter(|u| !u.trim().is_empty());
    let password = credentials.password.as_ref().filter(|p| !p.is_empty());
    let (Some(username), Some(password)) = (username, password) else {
        return Ok(Transition::finish(
            Outcome::LoginFailed,
            "Login failed: site credentials are missing.",
        ));
    };

    let surface = &ctx.workflow.login;
    let timeouts = &ctx.workflow.timeouts;
    let session = ctx.session;

    if let Err(e) = session.goto(&surface.url).await {
        return Ok(Transition::fail(
            Outcome::LoginFailed,
            "Login failed: the login page could not be opened.",
            e,
        ));
    }

    let Some(username_field) = wait_visible_any(session, &surface.username, ms(timeouts.login_form_ms)).await
    else {
        return Ok(Transition::finish(Outcome::LoginFailed, "Login failed: login form not found."));
    };
    session.fill(&username_field, username).await?;

    let Some(password_field) = wait_visible_any(session, &surface.password, ms(timeouts.field_ms)).await else {
        return Ok(Transition::finish(Outcome::LoginFailed, "Login failed: password field not found."));
    };
    session.fill(&password_field, password.expose()).await?;

    let Some(sign_in) = wait_visible_any(session, &surface.submit, ms(timeouts.field_ms)).await else {
        return Ok(Transition::finish(Outcome::LoginFailed, "Login failed: sign-in button not found."));
    };
    session.click(&sign_in).await?;

    Ok(Transition::advance())
}

enum LoginSignal {
    SuccessUrl,
    SignedIn,
    Challenge,
}

async fn confirm_identity(ctx: &RunContext<'_>) -> Result<Transition> {
    let session = ctx.session;
    let confirmation = &ctx.workflow.confirmation;
    let timeouts = &ctx.workflow.timeouts;
    let (url_limit, landmark_limit, challenge_limit) = (
        ms(timeouts.login_url_ms),
        ms(timeouts.signed_in_ms),
        ms(timeouts.challenge_ms),
    );

    let signal = first_signal(vec![
        Probe::new(
            "success url",
            url_limit,
            async move {
                wait_url(session, &confirmation.success_urls, url_limit)
                    .await
                    .then_some(LoginSignal::SuccessUrl)
            }
            .boxed(),
        ),
        Probe::new(
            "signed-in landmark",
            landmark_limit,
            async move {
                wait_visible_any(session, &confirmation.signed_in, landmark_limit)
                    .await
                    .map(|_| LoginSignal::SignedIn)
            }
            .boxed(),
        ),
        Probe::new(
            "challenge landmark",
            challenge_limit,
            async move {
                wait_visible_any(session, &confirmation.challenge, challenge_limit)
                    .await
                    .map(|_| LoginSignal::Challenge)
            }
            .boxed(),
        ),
        Probe::new(
            "challenge url",
            challenge_limit,
            async move {
                wait_url(session, &confirmation.challenge_urls, challenge_limit)
                    .await
                    .then_some(LoginSignal::Challenge)
            }
            .boxed(),
        ),
    ])
    .await;

    match signal {
        Some(LoginSignal::SuccessUrl) | Some(LoginSignal::SignedIn) => Ok(Transition::advance()),
        Some(LoginSignal::Challenge) => Ok(Transition::finish(
            Outcome::Challenged,
            "Login requires human verification (challenge screen).",
        )),
        None => {
            match wait_visible_any(session, &confirmation.errors, ms(timeouts.login_error_ms)).await {
                Some(message) => {
                    let text = session.text(&message).await.unwrap_or_default();
                    Ok(Transition::fail(
                        Outcome::LoginFailed,
                        "Login failed: the site rejected the credentials.",
                        text.trim(),
                    ))
                }
                None => Ok(Transition::fail(
                    Outcome::LoginFailed,
                    "Login failed: login could not be confirmed.",
                    "no success or challenge signal before timeout",
                )),
            }
        }
    }
}

// ===== Job page =====

async fn navigate_to_job(ctx: &RunContext<'_>) -> Result<Transition> {
    let session = ctx.session;
    let probes = &ctx.workflow.job_page;

    if let Err(e) = session.goto(&ctx.params.job_url).await {
        return Ok(Transition::fail(
            Outcome::NavigationFailed,
            "Navigation failed: the job page could not be opened.",
            e,
        ));
    }

    if let Some(notice) = wait_visible_any(session, &probes.unavailable, ms(ctx.workflow.timeouts.unavailable_ms)).await {
        let text = session.text(&notice).await.unwrap_or_default();
        return Ok(Transition::fail(
            Outcome::NavigationFailed,
            "Navigation failed: the job page is unavailable.",
            text.trim(),
        ));
    }

    let job = match session.page_source().await {
        Ok(html) => extract_job_details(&html),
        Err(e) => {
            warn!("Could not read the job page source: {}", e);
            None
        }
    };

    Ok(Transition::Advance(Progress {
        message: job.as_ref().map(describe_job),
        job,
    }))
}

fn describe_job(job: &JobDetails) -> String {
    if job.company.is_empty() {
        format!("Job page loaded: {}.", job.title)
    } else {
        format!("Job page loaded: {} at {}.", job.title, job.company)
    }
}

async fn detect_apply_path(ctx: &RunContext<'_>, state: &mut RunState) -> Result<Transition> {
    let limit = ms(ctx.workflow.timeouts.apply_path_ms);

    // Absence is the common case and means "slow path", not an error.
    match wait_visible_any(ctx.session, &ctx.workflow.job_page.easy_apply, limit).await {
        Some(button) => {
            state.apply_button = Some(button);
            Ok(Transition::advance())
        }
        None => Ok(Transition::finish(
            Outcome::UnsupportedApplyPath,
            "No Easy Apply on this job; it uses an external application. Nothing was submitted.",
        )),
    }
}

// ===== Form =====

enum Advanced {
    Clicked,
    AtSubmit,
    NotFound,
}

/// Click the visible continue/review button, unless the submit button is
/// already showing.
async fn advance(ctx: &RunContext<'_>) -> Result<Advanced, BrowserError> {
    let form = &ctx.workflow.form;
    let candidates: Vec<_> = form.submit.iter().chain(&form.advance).cloned().collect();

    match wait_visible_first(ctx.session, &candidates, ms(ctx.workflow.timeouts.advance_ms)).await {
        None => Ok(Advanced::NotFound),
        Some((index, _)) if index < form.submit.len() => Ok(Advanced::AtSubmit),
        Some((_, button)) => {
            ctx.session.click(&button).await?;
            Ok(Advanced::Clicked)
        }
    }
}

async fn fill_field(ctx: &RunContext<'_>, rule: &FieldRule) -> Result<bool> {
    let profile = &ctx.params.profile;
    let value = match rule.field {
        ProfileField::Email => profile.email.as_deref(),
        ProfileField::Phone => profile.phone.as_deref(),
    };
    let Some(value) = value.filter(|v| !v.trim().is_empty()) else {
        warn!("No {:?} on file; leaving the field as the site filled it", rule.field);
        return Ok(false);
    };

    let Some(field) = wait_visible_any(ctx.session, &rule.locators, ms(ctx.workflow.timeouts.field_ms)).await else {
        warn!("{:?} field not found on the form", rule.field);
        return Ok(false);
    };

    match rule.control {
        FieldControl::Text => ctx.session.fill(&field, value).await?,
        FieldControl::Select => ctx.session.select_option(&field, value).await?,
    }
    Ok(true)
}

async fn fill_profile(ctx: &RunContext<'_>, state: &mut RunState) -> Result<Transition> {
    let form = &ctx.workflow.form;
    let button = state
        .apply_button
        .take()
        .context("apply button was not recorded by apply-path detection")?;

    if let Err(e) = ctx.session.click(&button).await {
        return Ok(Transition::fail(
            Outcome::FormFillFailed,
            "Form fill failed: the Easy Apply form could not be opened.",
            e,
        ));
    }
    if wait_visible(ctx.session, &form.modal, ms(ctx.workflow.timeouts.form_open_ms))
        .await
        .is_none()
    {
        return Ok(Transition::finish(
            Outcome::FormFillFailed,
            "Form fill failed: the Easy Apply form did not open.",
        ));
    }

    let mut filled = 0;
    for rule in &form.profile_fields {
        match fill_field(ctx, rule).await {
            Ok(true) => filled += 1,
            Ok(false) => {}
            Err(e) => warn!("Could not fill {:?}: {:#}", rule.field, e),
        }
    }

    match advance(ctx).await {
        Ok(Advanced::Clicked) | Ok(Advanced::AtSubmit) => {}
        Ok(Advanced::NotFound) => {
            return Ok(Transition::finish(
                Outcome::FormFillFailed,
                "Form fill failed: no continue button after contact details.",
            ))
        }
        Err(e) => {
            return Ok(Transition::fail(
                Outcome::FormFillFailed,
                "Form fill failed: could not continue past contact details.",
                e,
            ))
        }
    }

    Ok(Transition::advance_with(format!(
        "Contact details filled ({} of {} fields).",
        filled,
        form.profile_fields.len()
    )))
}

async fn upload_resume(ctx: &RunContext<'_>) -> Result<Transition> {
    let Some(bearer) = ctx.params.bearer.as_ref().filter(|b| !b.is_empty()) else {
        return Ok(Transition::finish(
            Outcome::FormFillFailed,
            "Résumé upload failed: missing credential for document retrieval.",
        ));
    };

    let document = match ctx.documents.fetch(&ctx.params.resume_id, bearer).await {
        Ok(document) => document,
        Err(e) => {
            return Ok(Transition::fail(
                Outcome::FormFillFailed,
                "Résumé upload failed: the résumé could not be fetched.",
                e,
            ))
        }
    };

    let form = &ctx.workflow.form;
    let Some(input) = wait_present(ctx.session, &form.file_input, ms(ctx.workflow.timeouts.file_input_ms)).await else {
        return Ok(Transition::finish(
            Outcome::FormFillFailed,
            "Résumé upload failed: no file input on the form.",
        ));
    };

    if let Err(e) = ctx.session.set_input_file(&input, &document).await {
        return Ok(Transition::fail(
            Outcome::FormFillFailed,
            "Résumé upload failed: the file could not be attached.",
            e,
        ));
    }

    if let Err(e) = advance(ctx).await {
        return Ok(Transition::fail(
            Outcome::FormFillFailed,
            "Form fill failed: could not continue past the résumé step.",
            e,
        ));
    }

    Ok(Transition::advance_with(format!("Résumé uploaded ({}).", document.file_name)))
}

async fn answer_questions(ctx: &RunContext<'_>) -> Result<Transition> {
    let catalog = &ctx.workflow.questions;
    let scan = ms(ctx.workflow.timeouts.question_scan_ms);
    let mut tally = QuestionTally::default();

    for page in 1..=catalog.max_pages.max(1) {
        tally.add(answer_visible_questions(ctx.session, catalog, scan).await);

        match advance(ctx).await {
            Ok(Advanced::Clicked) => debug!("Left question page {}", page),
            Ok(Advanced::AtSubmit) | Ok(Advanced::NotFound) => break,
            Err(e) => {
                return Ok(Transition::fail(
                    Outcome::FormFillFailed,
                    "Form fill failed: could not continue past the screening questions.",
                    e,
                ))
            }
        }
    }

    Ok(Transition::advance_with(format!(
        "Answered {} of {} screening questions.",
        tally.answered, tally.seen
    )))
}

// ===== Submit =====

async fn submit(ctx: &RunContext<'_>) -> Result<Transition> {
    let form = &ctx.workflow.form;
    let Some(button) = wait_visible_any(ctx.session, &form.submit, ms(ctx.workflow.timeouts.submit_ms)).await else {
        return Ok(Transition::finish(
            Outcome::SubmissionFailed,
            "Submission failed: submit button not found.",
        ));
    };

    if let Err(e) = ctx.session.click(&button).await {
        return Ok(Transition::fail(
            Outcome::SubmissionFailed,
            "Submission failed: the submit click did not go through.",
            e,
        ));
    }
    Ok(Transition::advance())
}

enum SubmissionSignal {
    SuccessMessage,
    FormClosed,
    ErrorShown(String),
}

async fn detect_outcome(ctx: &RunContext<'_>) -> Result<Transition> {
    let session = ctx.session;
    let form = &ctx.workflow.form;
    let timeouts = &ctx.workflow.timeouts;
    let (success_limit, closed_limit, error_limit) = (
        ms(timeouts.outcome_success_ms),
        ms(timeouts.outcome_closed_ms),
        ms(timeouts.outcome_error_ms),
    );

    let signal = first_signal(vec![
        Probe::new(
            "success message",
            success_limit,
            async move {
                wait_visible_any(session, &form.success, success_limit)
                    .await
                    .map(|_| SubmissionSignal::SuccessMessage)
            }
            .boxed(),
        ),
        Probe::new(
            "form closed",
            closed_limit,
            async move {
                wait_gone(session, &form.modal, closed_limit)
                    .await
                    .then_some(SubmissionSignal::FormClosed)
            }
            .boxed(),
        ),
        Probe::new(
            "error indicator",
            error_limit,
            async move {
                let indicator = wait_visible_any(session, &form.errors, error_limit).await?;
                let text = session.text(&indicator).await.unwrap_or_default();
                Some(SubmissionSignal::ErrorShown(text.trim().to_string()))
            }
            .boxed(),
        ),
    ])
    .await;

    Ok(match signal {
        Some(SubmissionSignal::SuccessMessage) => Transition::finish(
            Outcome::SubmissionSucceeded,
            "Application submitted successfully.",
        ),
        Some(SubmissionSignal::FormClosed) => Transition::finish(
            Outcome::SubmissionSucceeded,
            "Application submitted; the form closed after submit.",
        ),
        Some(SubmissionSignal::ErrorShown(text)) => Transition::fail(
            Outcome::SubmissionFailed,
            "Submission failed: the site reported an error.",
            text,
        ),
        // Unknown is reported as unknown, never assumed either way.
        None => Transition::finish(
            Outcome::SubmissionUnconfirmed,
            "Submission could not be confirmed; the outcome is unknown.",
        ),
    })
}
