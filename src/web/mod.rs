// src/web/mod.rs
//! Rocket surface: submission intake, status callbacks, polling, résumé
//! download and the optional automation worker endpoint.

pub mod handlers;
pub mod types;


pub use types::*;

use crate::auth::{AuthConfig, AuthFailure, AutomationCaller, Caller, WorkerCaller};
use crate::browser::WebDriverFactory;
use crate::config::{AppConfig, DispatchMode};
use crate::core::{HttpDocumentChannel, IdentityResolver, ResumeStore, UnsealedCipher};
use crate::database::DatabaseConfig;
use crate::dispatch::{DispatchRequest, Dispatcher, InProcessDispatcher, RemoteDispatcher};
use crate::orchestrator::{DispatchSettings, SubmissionAccepted, SubmissionOrchestrator, SubmissionRequest};
use anyhow::{Context, Result};
use rocket::figment::Figment;
use rocket::http::Status;
use rocket::serde::json::{self, Json};
use rocket::{catch, catchers, get, post, routes, Build, Request, Rocket, State};
use std::sync::Arc;
use tracing::{error, info};

/// Dispatcher behind the worker endpoint. Only managed when the endpoint is on.
pub struct WorkerDispatcher(pub Arc<dyn Dispatcher>);

/// Everything the routes read from managed state.
pub struct AppState {
    pub auth: AuthConfig,
    pub database: DatabaseConfig,
    pub orchestrator: SubmissionOrchestrator,
    pub resumes: ResumeStore,
    pub worker: Option<Arc<dyn Dispatcher>>,
}

// ===== Routes =====

#[post("/applications", data = "<body>")]
pub async fn submit_application(
    body: Result<Json<SubmissionRequest>, json::Error<'_>>,
    caller: Caller,
    orchestrator: &State<SubmissionOrchestrator>,
) -> ApiResult<(Status, Json<SubmissionAccepted>)> {
    handlers::submit_application_handler(body, caller, orchestrator).await
}

#[get("/applications/<id>")]
pub async fn get_application(
    id: &str,
    caller: Caller,
    db_config: &State<DatabaseConfig>,
) -> ApiResult<Json<ApplicationView>> {
    handlers::get_application_handler(id, caller, db_config).await
}

#[post("/applications/<id>/status", data = "<body>")]
pub async fn status_callback(
    id: &str,
    automation: AutomationCaller,
    body: Result<Json<StatusCallbackRequest>, json::Error<'_>>,
    db_config: &State<DatabaseConfig>,
) -> ApiResult<Json<StatusCallbackResponse>> {
    handlers::status_callback_handler(id, automation, body, db_config).await
}

#[get("/apply-right/download/<id>")]
pub async fn download_resume(
    id: &str,
    caller: Caller,
    store: &State<ResumeStore>,
) -> ApiResult<PdfResponse> {
    handlers::download_resume_handler(id, caller, store).await
}

#[post("/automation/runs", data = "<body>")]
pub async fn start_run(
    worker: WorkerCaller,
    body: Result<Json<DispatchRequest>, json::Error<'_>>,
    dispatcher: &State<WorkerDispatcher>,
) -> ApiResult<(Status, Json<RunAccepted>)> {
    handlers::start_run_handler(worker, body, dispatcher).await
}

#[get("/health")]
pub async fn health() -> Json<HealthResponse> {
    handlers::health_handler().await
}

// ===== Catchers =====

#[catch(400)]
pub fn bad_request() -> Json<ErrorResponse> {
    Json(
        ErrorResponse::new("Invalid request format", "BAD_REQUEST")
            .with_suggestion("Check your request JSON format"),
    )
}

#[catch(401)]
pub fn unauthorized(req: &Request<'_>) -> Json<ErrorResponse> {
    let failure = req.local_cache(|| AuthFailure(None));
    let body = match &failure.0 {
        Some(e) => ErrorResponse::new(e.to_string(), e.code()),
        None => ErrorResponse::new("Authentication required", "UNAUTHORIZED"),
    };
    Json(body)
}

#[catch(404)]
pub fn not_found() -> Json<ErrorResponse> {
    Json(ErrorResponse::new("Resource not found", "NOT_FOUND"))
}

#[catch(422)]
pub fn unprocessable() -> Json<ErrorResponse> {
    Json(
        ErrorResponse::new("Request body could not be processed", "UNPROCESSABLE_ENTITY")
            .with_suggestion("Verify all required fields are present"),
    )
}

#[catch(500)]
pub fn internal_error() -> Json<ErrorResponse> {
    Json(
        ErrorResponse::new("Internal server error", "INTERNAL_ERROR")
            .with_suggestion("Try again in a few moments"),
    )
}

// ===== Assembly =====

/// Attach state, routes and catchers to a Rocket instance.
pub fn assemble(rocket: Rocket<Build>, state: AppState) -> Rocket<Build> {
    let AppState {
        auth,
        database,
        orchestrator,
        resumes,
        worker,
    } = state;

    let mut v1_routes = routes![submit_application, get_application, status_callback];
    let rocket = match worker {
        Some(dispatcher) => {
            info!("Automation worker endpoint enabled");
            v1_routes.extend(routes![start_run]);
            rocket.manage(WorkerDispatcher(dispatcher))
        }
        None => rocket,
    };

    rocket
        .manage(auth)
        .manage(database)
        .manage(orchestrator)
        .manage(resumes)
        .register(
            "/",
            catchers![bad_request, unauthorized, not_found, unprocessable, internal_error],
        )
        .mount("/api", routes![health, download_resume])
        .mount("/api/v1", v1_routes)
}

/// Wire every collaborator from configuration.
pub async fn build_state(config: &AppConfig) -> Result<AppState> {
    let env = &config.environment;
    let automation = &env.automation;
    let timeout = automation.request_timeout();

    let mut database = DatabaseConfig::new(env.database_path.clone());
    if let Err(e) = database.init_pool().await {
        error!("Failed to initialize database: {}", e);
        return Err(e);
    }
    if let Err(e) = database.migrate().await {
        error!("Failed to run database migrations: {}", e);
        return Err(e);
    }
    let pool = database.pool()?.clone();

    let in_process = || -> Result<Arc<dyn Dispatcher>> {
        let browsers = WebDriverFactory::new(&automation.webdriver_url, automation.headless, timeout)
            .context("Failed to build WebDriver client")?;
        let documents = HttpDocumentChannel::new(env.document_base_url.clone(), timeout)
            .context("Failed to build document client")?;
        Ok(Arc::new(InProcessDispatcher::new(
            Arc::new(browsers),
            Arc::new(documents),
            timeout,
        )))
    };

    let dispatcher: Arc<dyn Dispatcher> = match automation.mode {
        DispatchMode::Local => {
            info!("Runs execute in-process against {}", automation.webdriver_url);
            in_process()?
        }
        DispatchMode::Remote => {
            let backend_url = automation
                .backend_url
                .as_deref()
                .context("automation.backend_url is required for remote dispatch")?;
            let token = config
                .secrets
                .backend_token
                .clone()
                .context("Backend token is required for remote dispatch")?;
            info!("Runs are dispatched to {}", backend_url);
            Arc::new(
                RemoteDispatcher::new(backend_url, token, timeout)
                    .context("Failed to build dispatch client")?,
            )
        }
    };

    let worker = if automation.worker_endpoint {
        match automation.mode {
            DispatchMode::Local => Some(dispatcher.clone()),
            DispatchMode::Remote => Some(in_process()?),
        }
    } else {
        None
    };

    let resolver = IdentityResolver::new(pool.clone(), Arc::new(UnsealedCipher));
    let orchestrator = SubmissionOrchestrator::new(
        pool,
        resolver,
        dispatcher,
        DispatchSettings {
            callback_url: env.callback_url.clone(),
            callback_secret: config.secrets.callback_secret.clone(),
            workflow: Arc::new(config.workflow.clone()),
        },
    );

    Ok(AppState {
        auth: AuthConfig::new(
            config.secrets.auth_secret.clone(),
            Some(config.secrets.callback_secret.clone()),
            config.secrets.backend_token.clone(),
        ),
        database,
        orchestrator,
        resumes: ResumeStore::new(env.resume_storage_path.clone()),
        worker,
    })
}

pub async fn start_web_server(config: AppConfig) -> Result<()> {
    config.ensure_directories().await?;
    let state = build_state(&config).await?;

    let env = &config.environment;
    let figment: Figment = rocket::Config::figment()
        .merge(("address", env.address.clone()))
        .merge(("port", env.port));

    info!("Starting auto-apply API server on {}:{}", env.address, env.port);
    info!("Database: {}", env.database_path.display());
    info!("Workflow: {}", config.workflow.name);

    let _rocket = assemble(rocket::custom(figment), state)
        .launch()
        .await
        .context("Rocket server failed")?;

    Ok(())
}
