// src/database.rs
//! Durable records: users, jobs, résumé references, applications and their
//! status event log.

use crate::core::StageStatus;
use crate::error::PersistenceError;
use crate::secret::Secret;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

pub const INITIAL_STATUS: &str = "pending";
pub const SUCCESS_STATUS: &str = "SUBMISSION_SUCCESS";

// ===== Models =====

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub external_id: String,
    pub email: String,
    pub phone: Option<String>,
    pub site_username: Option<String>,
    /// Target-site secret as stored (sealed by a `CredentialCipher`).
    pub site_secret_sealed: Option<Secret>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub url: String,
    pub platform: String,
    pub platform_job_id: String,
    pub title: String,
    pub company: String,
    pub location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Resume {
    pub id: String,
    pub external_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: String,
    pub user_id: String,
    pub job_id: String,
    pub resume_id: String,
    pub cover_letter_id: Option<String>,
    pub status: String,
    pub status_message: Option<String>,
    pub error_message: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationEvent {
    pub id: i64,
    pub application_id: String,
    pub status: String,
    pub message: Option<String>,
    pub error: Option<String>,
    pub emitted_at: Option<DateTime<Utc>>,
    pub received_at: DateTime<Utc>,
}

/// Status update as received from the Status Channel.
#[derive(Debug, Clone, Default)]
pub struct StatusUpdate {
    pub status: String,
    pub message: Option<String>,
    pub error: Option<String>,
    /// When the run produced the update. Orders updates that arrive out of order.
    pub emitted_at: Option<DateTime<Utc>>,
    pub job_title: Option<String>,
    pub job_company: Option<String>,
    pub job_location: Option<String>,
}

// ===== Connection management =====

#[derive(Debug)]
pub struct DatabaseConfig {
    pub database_path: PathBuf,
    pub pool: Option<SqlitePool>,
}

impl DatabaseConfig {
    pub fn new(database_path: PathBuf) -> Self {
        Self {
            database_path,
            pool: None,
        }
    }

    /// Initialize the database connection pool
    pub async fn init_pool(&mut self) -> Result<()> {
        if let Some(parent) = self.database_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create database directory")?;
        }

        let database_url = format!("sqlite:{}?mode=rwc", self.database_path.display());
        let pool = SqlitePool::connect(&database_url)
            .await
            .context("Failed to connect to SQLite database")?;
        self.pool = Some(pool);

        info!("Database connection pool initialized: {}", database_url);
        Ok(())
    }

    /// Single-connection in-memory database, used by tests.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;
        let config = Self {
            database_path: PathBuf::from(":memory:"),
            pool: Some(pool),
        };
        config.migrate().await?;
        Ok(config)
    }

    /// Get the database pool
    pub fn pool(&self) -> Result<&SqlitePool> {
        self.pool.as_ref().ok_or_else(|| {
            anyhow::anyhow!("Database pool not initialized. Call init_pool() first.")
        })
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        let pool = self.pool()?;

        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                external_id TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL,
                phone TEXT,
                site_username TEXT,
                site_secret_sealed TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                url TEXT NOT NULL UNIQUE,
                platform TEXT NOT NULL,
                platform_job_id TEXT NOT NULL,
                title TEXT NOT NULL,
                company TEXT NOT NULL,
                location TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS resumes (
                id TEXT PRIMARY KEY,
                external_id TEXT NOT NULL UNIQUE,
                user_id TEXT NOT NULL REFERENCES users(id),
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS applications (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id),
                job_id TEXT NOT NULL REFERENCES jobs(id),
                resume_id TEXT NOT NULL REFERENCES resumes(id),
                cover_letter_id TEXT,
                status TEXT NOT NULL,
                status_message TEXT,
                error_message TEXT,
                submitted_at TEXT,
                status_emitted_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS application_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                application_id TEXT NOT NULL REFERENCES applications(id),
                status TEXT NOT NULL,
                message TEXT,
                error TEXT,
                emitted_at TEXT,
                received_at TEXT NOT NULL
            );
            "#,
            "CREATE INDEX IF NOT EXISTS idx_applications_user ON applications(user_id);",
            "CREATE INDEX IF NOT EXISTS idx_events_application ON application_events(application_id);",
        ];

        for statement in statements {
            sqlx::query(statement).execute(pool).await?;
        }

        // Columns added after the first schema.
        add_column_if_missing(pool, "applications", "status_emitted_at", "TEXT").await?;
        add_column_if_missing(pool, "application_events", "emitted_at", "TEXT").await?;

        info!("Database migrations completed successfully");
        Ok(())
    }
}

async fn add_column_if_missing(
    pool: &SqlitePool,
    table: &str,
    column: &str,
    definition: &str,
) -> Result<()> {
    let present: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_one(pool)
            .await?;
    if present == 0 {
        sqlx::query(&format!("ALTER TABLE {table} ADD COLUMN {column} {definition}"))
            .execute(pool)
            .await?;
        info!("Added column {}.{}", table, column);
    }
    Ok(())
}

fn is_terminal(status: &str) -> bool {
    StageStatus::from_code(status).is_some_and(|s| s.is_terminal())
}

// ===== Repositories =====

const USER_COLUMNS: &str =
    "id, external_id, email, phone, site_username, site_secret_sealed, created_at, updated_at";
const JOB_COLUMNS: &str =
    "id, url, platform, platform_job_id, title, company, location, created_at, updated_at";
const APPLICATION_COLUMNS: &str = "id, user_id, job_id, resume_id, cover_letter_id, status, \
     status_message, error_message, submitted_at, created_at, updated_at";

pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Idempotent upsert keyed by the external identity id. The email is only
    /// overwritten when the caller supplies one.
    pub async fn upsert(
        &self,
        external_id: &str,
        email: Option<&str>,
    ) -> Result<User, PersistenceError> {
        let now = Utc::now();
        let create_email = email
            .map(str::to_string)
            .unwrap_or_else(|| format!("{external_id}@placeholder.email"));

        let user = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (id, external_id, email, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(external_id) DO UPDATE SET
                email = COALESCE(?, users.email),
                updated_at = excluded.updated_at
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(external_id)
        .bind(create_email)
        .bind(now)
        .bind(now)
        .bind(email)
        .fetch_one(self.pool)
        .await?;

        Ok(user)
    }

    pub async fn find_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<User>, PersistenceError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE external_id = ?"
        ))
        .bind(external_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(user)
    }

    /// Store target-site credentials (already sealed) and optional phone.
    pub async fn set_site_credentials(
        &self,
        external_id: &str,
        username: &str,
        sealed_secret: &Secret,
        phone: Option<&str>,
    ) -> Result<(), PersistenceError> {
        self.upsert(external_id, None).await?;
        sqlx::query(
            r#"
            UPDATE users
            SET site_username = ?, site_secret_sealed = ?, phone = COALESCE(?, phone), updated_at = ?
            WHERE external_id = ?
            "#,
        )
        .bind(username)
        .bind(sealed_secret)
        .bind(phone)
        .bind(Utc::now())
        .bind(external_id)
        .execute(self.pool)
        .await?;

        info!("Stored site credentials for user {}", external_id);
        Ok(())
    }
}

pub struct JobRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> JobRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Idempotent upsert keyed by normalized URL; an existing record is left untouched.
    pub async fn upsert(
        &self,
        url: &str,
        platform: &str,
        platform_job_id: &str,
    ) -> Result<Job, PersistenceError> {
        let now = Utc::now();
        let job = sqlx::query_as::<_, Job>(&format!(
            r#"
            INSERT INTO jobs (id, url, platform, platform_job_id, title, company, created_at, updated_at)
            VALUES (?, ?, ?, ?, 'Job Title TBD', 'Company TBD', ?, ?)
            ON CONFLICT(url) DO UPDATE SET updated_at = jobs.updated_at
            RETURNING {JOB_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4().to_string())
        .bind(url)
        .bind(platform)
        .bind(platform_job_id)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool)
        .await?;
        Ok(job)
    }

    pub async fn find(&self, id: &str) -> Result<Option<Job>, PersistenceError> {
        let job = sqlx::query_as::<_, Job>(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?"))
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(job)
    }
}

pub struct ResumeRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ResumeRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Idempotent upsert keyed by the external résumé id, re-linked to `user_id`.
    pub async fn upsert(&self, external_id: &str, user_id: &str) -> Result<Resume, PersistenceError> {
        let now = Utc::now();
        let resume = sqlx::query_as::<_, Resume>(
            r#"
            INSERT INTO resumes (id, external_id, user_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(external_id) DO UPDATE SET
                user_id = excluded.user_id,
                updated_at = excluded.updated_at
            RETURNING id, external_id, user_id, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(external_id)
        .bind(user_id)
        .bind(now)
        .bind(now)
        .fetch_one(self.pool)
        .await?;
        Ok(resume)
    }
}

pub struct ApplicationRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ApplicationRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Always inserts: every submission is a new attempt.
    pub async fn create(
        &self,
        user_id: &str,
        job_id: &str,
        resume_id: &str,
        cover_letter_id: Option<&str>,
    ) -> Result<Application, PersistenceError> {
        let now = Utc::now();
        let application = Application {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            job_id: job_id.to_string(),
            resume_id: resume_id.to_string(),
            cover_letter_id: cover_letter_id.map(str::to_string),
            status: INITIAL_STATUS.to_string(),
            status_message: None,
            error_message: None,
            submitted_at: None,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO applications
                (id, user_id, job_id, resume_id, cover_letter_id, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&application.id)
        .bind(&application.user_id)
        .bind(&application.job_id)
        .bind(&application.resume_id)
        .bind(&application.cover_letter_id)
        .bind(&application.status)
        .bind(now)
        .bind(now)
        .execute(self.pool)
        .await?;

        info!("Created application {} in status {}", application.id, INITIAL_STATUS);
        Ok(application)
    }

    pub async fn find(&self, id: &str) -> Result<Option<Application>, PersistenceError> {
        let application = sqlx::query_as::<_, Application>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(self.pool)
        .await?;
        Ok(application)
    }

    /// Find an application only if it belongs to the given external identity.
    pub async fn find_owned(
        &self,
        id: &str,
        external_user_id: &str,
    ) -> Result<Option<Application>, PersistenceError> {
        let application = sqlx::query_as::<_, Application>(
            r#"
            SELECT a.id, a.user_id, a.job_id, a.resume_id, a.cover_letter_id, a.status,
                   a.status_message, a.error_message, a.submitted_at, a.created_at, a.updated_at
            FROM applications a
            JOIN users u ON u.id = a.user_id
            WHERE a.id = ? AND u.external_id = ?
            "#,
        )
        .bind(id)
        .bind(external_user_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(application)
    }

    /// Apply a Status Channel update. Every update is appended to the event
    /// log; the application status only moves forward in emission order and
    /// never leaves a terminal status.
    pub async fn apply_status(
        &self,
        id: &str,
        update: &StatusUpdate,
    ) -> Result<Application, PersistenceError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        let current: Option<(String, Option<DateTime<Utc>>)> =
            sqlx::query_as("SELECT status, status_emitted_at FROM applications WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some((current_status, last_emitted_at)) = current else {
            tx.rollback().await?;
            return Err(PersistenceError::NotFound {
                entity: "Application",
                id: id.to_string(),
            });
        };

        let stale = match (update.emitted_at, last_emitted_at) {
            (Some(incoming), Some(last)) => incoming < last,
            _ => false,
        };
        if is_terminal(&current_status) || stale {
            info!(
                application_id = %id,
                "Keeping status {} over late update {}", current_status, update.status
            );
        } else {
            let submitted = update.status == SUCCESS_STATUS;
            sqlx::query(
                r#"
                UPDATE applications
                SET status = ?,
                    status_message = ?,
                    error_message = ?,
                    submitted_at = CASE WHEN ? THEN ? ELSE submitted_at END,
                    status_emitted_at = COALESCE(?, status_emitted_at),
                    updated_at = ?
                WHERE id = ?
                "#,
            )
            .bind(&update.status)
            .bind(&update.message)
            .bind(&update.error)
            .bind(submitted)
            .bind(now)
            .bind(update.emitted_at)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO application_events (application_id, status, message, error, emitted_at, received_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(id)
        .bind(&update.status)
        .bind(&update.message)
        .bind(&update.error)
        .bind(update.emitted_at)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if update.job_title.is_some() || update.job_company.is_some() || update.job_location.is_some()
        {
            sqlx::query(
                r#"
                UPDATE jobs
                SET title = COALESCE(?, title),
                    company = COALESCE(?, company),
                    location = COALESCE(?, location),
                    updated_at = ?
                WHERE id = (SELECT job_id FROM applications WHERE id = ?)
                "#,
            )
            .bind(&update.job_title)
            .bind(&update.job_company)
            .bind(&update.job_location)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }

        let application = sqlx::query_as::<_, Application>(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = ?"
        ))
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(application)
    }

    pub async fn events(&self, id: &str) -> Result<Vec<ApplicationEvent>, PersistenceError> {
        let events = sqlx::query_as::<_, ApplicationEvent>(
            r#"
            SELECT id, application_id, status, message, error, emitted_at, received_at
            FROM application_events
            WHERE application_id = ?
            ORDER BY id ASC
            "#,
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;
        Ok(events)
    }

    pub async fn count_for_user(&self, user_id: &str) -> Result<i64, PersistenceError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM applications WHERE user_id = ?")
            .bind(user_id)
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn db() -> DatabaseConfig {
        DatabaseConfig::in_memory().await.unwrap()
    }

    #[tokio::test]
    async fn user_upsert_is_idempotent_and_keeps_known_email() {
        let db = db().await;
        let users = UserRepository::new(db.pool().unwrap());

        let first = users.upsert("ext-1", Some("ada@example.com")).await.unwrap();
        let second = users.upsert("ext-1", None).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.email, "ada@example.com");
    }

    #[tokio::test]
    async fn user_without_email_gets_placeholder() {
        let db = db().await;
        let users = UserRepository::new(db.pool().unwrap());
        let user = users.upsert("ext-2", None).await.unwrap();
        assert_eq!(user.email, "ext-2@placeholder.email");
    }

    #[tokio::test]
    async fn job_upsert_returns_same_record_for_same_url() {
        let db = db().await;
        let jobs = JobRepository::new(db.pool().unwrap());
        let a = jobs.upsert("https://linkedin.com/jobs/view/1", "linkedin", "1").await.unwrap();
        let b = jobs.upsert("https://linkedin.com/jobs/view/1", "linkedin", "1").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(a.title, "Job Title TBD");
    }

    #[tokio::test]
    async fn applications_are_never_upserted() {
        let db = db().await;
        let pool = db.pool().unwrap();
        let user = UserRepository::new(pool).upsert("ext-3", None).await.unwrap();
        let job = JobRepository::new(pool).upsert("https://x.io/j", "unknown", "TBD").await.unwrap();
        let resume = ResumeRepository::new(pool).upsert("r1", &user.id).await.unwrap();

        let apps = ApplicationRepository::new(pool);
        let a = apps.create(&user.id, &job.id, &resume.id, None).await.unwrap();
        let b = apps.create(&user.id, &job.id, &resume.id, None).await.unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(a.status, INITIAL_STATUS);
        assert_eq!(apps.count_for_user(&user.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn status_updates_append_events_and_stamp_success() {
        let db = db().await;
        let pool = db.pool().unwrap();
        let user = UserRepository::new(pool).upsert("ext-4", None).await.unwrap();
        let job = JobRepository::new(pool).upsert("https://x.io/k", "unknown", "TBD").await.unwrap();
        let resume = ResumeRepository::new(pool).upsert("r2", &user.id).await.unwrap();
        let apps = ApplicationRepository::new(pool);
        let app = apps.create(&user.id, &job.id, &resume.id, Some("c1")).await.unwrap();

        let loaded = apps
            .apply_status(
                &app.id,
                &StatusUpdate {
                    status: "JOB_PAGE_LOADED".into(),
                    job_title: Some("Rust Engineer".into()),
                    job_company: Some("Acme".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(loaded.status, "JOB_PAGE_LOADED");
        assert!(loaded.submitted_at.is_none());

        let done = apps
            .apply_status(
                &app.id,
                &StatusUpdate {
                    status: SUCCESS_STATUS.into(),
                    message: Some("Application submitted.".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(done.submitted_at.is_some());
        assert!(done.error_message.is_none());

        let events = apps.events(&app.id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].status, SUCCESS_STATUS);

        let job = JobRepository::new(pool).find(&job.id).await.unwrap().unwrap();
        assert_eq!(job.title, "Rust Engineer");
        assert_eq!(job.company, "Acme");
    }

    async fn pending_application(pool: &SqlitePool, external_id: &str) -> Application {
        let user = UserRepository::new(pool).upsert(external_id, None).await.unwrap();
        let job = JobRepository::new(pool)
            .upsert(&format!("https://x.io/{external_id}"), "unknown", "TBD")
            .await
            .unwrap();
        let resume = ResumeRepository::new(pool)
            .upsert(&format!("r-{external_id}"), &user.id)
            .await
            .unwrap();
        ApplicationRepository::new(pool)
            .create(&user.id, &job.id, &resume.id, None)
            .await
            .unwrap()
    }

    fn update_at(status: &str, emitted_at: DateTime<Utc>) -> StatusUpdate {
        StatusUpdate {
            status: status.into(),
            emitted_at: Some(emitted_at),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn late_progress_never_replaces_a_terminal_status() {
        let db = db().await;
        let pool = db.pool().unwrap();
        let app = pending_application(pool, "ext-late").await;
        let apps = ApplicationRepository::new(pool);
        let t0 = Utc::now();

        apps.apply_status(&app.id, &update_at(SUCCESS_STATUS, t0 + chrono::Duration::seconds(5)))
            .await
            .unwrap();
        let after = apps
            .apply_status(&app.id, &update_at("SUBMITTING", t0))
            .await
            .unwrap();

        assert_eq!(after.status, SUCCESS_STATUS);
        assert!(after.submitted_at.is_some());
        let events = apps.events(&app.id).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].status, "SUBMITTING");
        assert_eq!(events[1].emitted_at, Some(t0));
    }

    #[tokio::test]
    async fn out_of_order_progress_keeps_the_newest_emission() {
        let db = db().await;
        let pool = db.pool().unwrap();
        let app = pending_application(pool, "ext-order").await;
        let apps = ApplicationRepository::new(pool);
        let t0 = Utc::now();

        apps.apply_status(&app.id, &update_at("RESUME_UPLOADED", t0 + chrono::Duration::seconds(2)))
            .await
            .unwrap();
        let after = apps
            .apply_status(&app.id, &update_at("FILLING_PROFILE", t0))
            .await
            .unwrap();
        assert_eq!(after.status, "RESUME_UPLOADED");

        let newer = apps
            .apply_status(&app.id, &update_at("ANSWERING_QUESTIONS", t0 + chrono::Duration::seconds(3)))
            .await
            .unwrap();
        assert_eq!(newer.status, "ANSWERING_QUESTIONS");
    }

    #[tokio::test]
    async fn migrations_can_run_twice() {
        let db = db().await;
        db.migrate().await.unwrap();
    }

    #[tokio::test]
    async fn status_update_for_unknown_application_is_not_found() {
        let db = db().await;
        let apps = ApplicationRepository::new(db.pool().unwrap());
        let err = apps
            .apply_status(
                "missing",
                &StatusUpdate {
                    status: "LOGGING_IN".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn ownership_is_enforced_on_lookup() {
        let db = db().await;
        let pool = db.pool().unwrap();
        let owner = UserRepository::new(pool).upsert("owner", None).await.unwrap();
        UserRepository::new(pool).upsert("stranger", None).await.unwrap();
        let job = JobRepository::new(pool).upsert("https://x.io/o", "unknown", "TBD").await.unwrap();
        let resume = ResumeRepository::new(pool).upsert("r3", &owner.id).await.unwrap();
        let apps = ApplicationRepository::new(pool);
        let app = apps.create(&owner.id, &job.id, &resume.id, None).await.unwrap();

        assert!(apps.find_owned(&app.id, "owner").await.unwrap().is_some());
        assert!(apps.find_owned(&app.id, "stranger").await.unwrap().is_none());
    }
}
