// src/cli.rs
use crate::automation::WorkflowDefinition;
use crate::core::CredentialCipher;
use crate::database::{DatabaseConfig, UserRepository};
use crate::secret::Secret;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::SqlitePool;
use std::io::Read;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "autoapply")]
#[command(about = "Automated job application service")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Database used by the offline commands. `serve` reads it from config.yaml.
    #[arg(long, global = true, default_value = "data/autoapply.db")]
    pub database_path: PathBuf,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Create or upgrade the database schema
    Migrate,
    /// Manage stored target-site credentials
    Credentials {
        #[command(subcommand)]
        action: CredentialsCommand,
    },
    /// Inspect the automation workflow
    Workflow {
        #[command(subcommand)]
        action: WorkflowCommand,
    },
}

#[derive(Subcommand)]
pub enum CredentialsCommand {
    /// Store credentials for one user
    Set {
        /// External identity id (the `sub` of the user's token)
        #[arg(long)]
        user: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        phone: Option<String>,
    },
    /// Import `external_id,username,password[,phone]` rows from a CSV file with a header
    Import { csv_file: PathBuf },
}

#[derive(Subcommand)]
pub enum WorkflowCommand {
    /// Print the built-in workflow as YAML
    Dump,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

async fn open_database(path: PathBuf) -> Result<DatabaseConfig> {
    let mut db_config = DatabaseConfig::new(path);
    db_config.init_pool().await?;
    db_config.migrate().await?;
    Ok(db_config)
}

pub async fn handle_offline_command(
    command: Command,
    database_path: PathBuf,
    cipher: &dyn CredentialCipher,
) -> Result<()> {
    match command {
        Command::Serve => anyhow::bail!("serve is handled by the binary entry point"),

        Command::Migrate => {
            let db_config = open_database(database_path).await?;
            info!("Database ready at {}", db_config.database_path.display());
        }

        Command::Credentials { action } => {
            let db_config = open_database(database_path).await?;
            let pool = db_config.pool()?;
            match action {
                CredentialsCommand::Set {
                    user,
                    username,
                    password,
                    phone,
                } => {
                    store_credentials(pool, cipher, &user, &username, &Secret::new(password), phone.as_deref())
                        .await?;
                    info!("Stored credentials for user {}", user);
                }
                CredentialsCommand::Import { csv_file } => {
                    let file = std::fs::File::open(&csv_file)
                        .with_context(|| format!("CSV file not found: {}", csv_file.display()))?;
                    let summary = import_credentials(pool, cipher, file).await?;
                    info!(
                        "Import completed: {} imported, {} skipped",
                        summary.imported, summary.skipped
                    );
                }
            }
        }

        Command::Workflow {
            action: WorkflowCommand::Dump,
        } => {
            let yaml = serde_yaml::to_string(&WorkflowDefinition::linkedin())
                .context("Failed to serialize workflow")?;
            print!("{yaml}");
        }
    }

    Ok(())
}

async fn store_credentials(
    pool: &SqlitePool,
    cipher: &dyn CredentialCipher,
    external_id: &str,
    username: &str,
    password: &Secret,
    phone: Option<&str>,
) -> Result<()> {
    let sealed = cipher.seal(password)?;
    UserRepository::new(pool)
        .set_site_credentials(external_id, username, &sealed, phone)
        .await?;
    Ok(())
}

/// Bulk import. Rows with an empty id, username or password are skipped.
pub async fn import_credentials(
    pool: &SqlitePool,
    cipher: &dyn CredentialCipher,
    source: impl Read,
) -> Result<ImportSummary> {
    let mut reader = csv::Reader::from_reader(source);
    let mut summary = ImportSummary::default();

    for (line, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping unreadable row {}: {}", line + 2, e);
                summary.skipped += 1;
                continue;
            }
        };

        let field = |i: usize| record.get(i).map(str::trim).unwrap_or("");
        let (external_id, username, password) = (field(0), field(1), field(2));
        let phone = Some(field(3)).filter(|p| !p.is_empty());

        if external_id.is_empty() || username.is_empty() || password.is_empty() {
            warn!("Skipping row {}: missing user, username or password", line + 2);
            summary.skipped += 1;
            continue;
        }

        store_credentials(pool, cipher, external_id, username, &Secret::new(password), phone).await?;
        summary.imported += 1;
    }

    Ok(summary)
}
