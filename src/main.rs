// src/main.rs
use anyhow::{Context, Result};
use auto_apply::cli::{handle_offline_command, Cli, Command};
use auto_apply::core::UnsealedCipher;
use auto_apply::{start_web_server, AppConfig};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "auto_apply=info,rocket::server=off";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

fn startup_subscriber<W>(writer: W) -> impl tracing::Subscriber + Send + Sync + 'static
where
    W: for<'w> fmt::MakeWriter<'w> + Send + Sync + 'static,
{
    fmt().with_env_filter(env_filter()).with_writer(writer).finish()
}

/// The log file is only known once configuration is read, so loading logs
/// through a stdout subscriber of its own.
fn load_config() -> Result<AppConfig> {
    let config = tracing::subscriber::with_default(startup_subscriber(std::io::stdout), AppConfig::load)?;
    Ok(config)
}

fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            Some(
                fmt::layer()
                    .json()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_current_span(false)
                    .with_span_list(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let config = load_config()?;
            init_tracing(config.environment.log_file.as_deref())?;

            info!("Starting auto-apply service");
            info!(
                "Environment: {}",
                std::env::var("AUTOAPPLY_ENV").unwrap_or_else(|_| "local".to_string())
            );
            info!("Dispatch mode: {:?}", config.environment.automation.mode);

            start_web_server(config).await
        }
        command => {
            init_tracing(None)?;
            handle_offline_command(command, cli.database_path, &UnsealedCipher).await
        }
    }
}
