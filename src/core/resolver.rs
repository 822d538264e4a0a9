// src/core/resolver.rs
//! Credential & Identity Resolver: turns a verified caller plus a submission
//! into the durable user / job / résumé linkage a run needs.

use crate::auth::Caller;
use crate::core::credentials::CredentialCipher;
use crate::database::{Job, JobRepository, Resume, ResumeRepository, User, UserRepository};
use crate::error::SubmissionError;
use crate::platform::locate_job;
use crate::secret::Secret;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, warn};

/// Target-site login, decrypted once and held only in memory.
#[derive(Debug, Clone, Default)]
pub struct SiteCredentials {
    pub username: Option<String>,
    pub password: Option<Secret>,
}

#[derive(Debug)]
pub struct ResolvedIdentity {
    pub user: User,
    pub job: Job,
    pub resume: Resume,
    pub credentials: SiteCredentials,
}

pub struct IdentityResolver {
    pool: SqlitePool,
    cipher: Arc<dyn CredentialCipher>,
}

impl IdentityResolver {
    pub fn new(pool: SqlitePool, cipher: Arc<dyn CredentialCipher>) -> Self {
        Self { pool, cipher }
    }

    pub async fn resolve(
        &self,
        caller: &Caller,
        job_url: &str,
        resume_external_id: &str,
    ) -> Result<ResolvedIdentity, SubmissionError> {
        let location = locate_job(job_url);

        let user = UserRepository::new(&self.pool)
            .upsert(&caller.external_id, caller.email.as_deref())
            .await?;
        info!(
            "Upserted user {} (site username: {}, sealed secret: {})",
            user.id,
            if user.site_username.is_some() { "yes" } else { "no" },
            if user.site_secret_sealed.is_some() { "yes" } else { "no" },
        );

        let credentials = self.open_credentials(&user);

        let resume = ResumeRepository::new(&self.pool)
            .upsert(resume_external_id, &user.id)
            .await?;

        let job = JobRepository::new(&self.pool)
            .upsert(
                &location.normalized_url,
                &location.platform,
                &location.platform_job_id,
            )
            .await?;
        info!(
            "Upserted job {} (platform: {}, platform job id: {})",
            job.id, job.platform, job.platform_job_id
        );

        Ok(ResolvedIdentity {
            user,
            job,
            resume,
            credentials,
        })
    }

    /// A secret that cannot be opened is dropped; the run then stops at Login
    /// with a missing-credentials outcome instead of failing the request.
    fn open_credentials(&self, user: &User) -> SiteCredentials {
        let password = match &user.site_secret_sealed {
            Some(sealed) => match self.cipher.open(sealed) {
                Ok(secret) => Some(secret),
                Err(e) => {
                    warn!("Failed to open stored credential for user {}: {}", user.id, e);
                    None
                }
            },
            None => None,
        };

        SiteCredentials {
            username: user.site_username.clone(),
            password,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::credentials::UnsealedCipher;
    use crate::database::DatabaseConfig;

    fn caller(id: &str) -> Caller {
        Caller {
            external_id: id.to_string(),
            email: None,
            token: Secret::new("t"),
        }
    }

    async fn resolver() -> (DatabaseConfig, IdentityResolver) {
        let db = DatabaseConfig::in_memory().await.unwrap();
        let pool = db.pool().unwrap().clone();
        (db, IdentityResolver::new(pool, Arc::new(UnsealedCipher)))
    }

    #[tokio::test]
    async fn resubmission_resolves_same_records() {
        let (_db, resolver) = resolver().await;
        let a = resolver
            .resolve(&caller("u1"), "https://linkedin.com/jobs/view/12345", "r1")
            .await
            .unwrap();
        let b = resolver
            .resolve(&caller("u1"), "https://www.linkedin.com/jobs/view/12345/?trk=x", "r1")
            .await
            .unwrap();

        assert_eq!(a.user.id, b.user.id);
        assert_eq!(a.job.id, b.job.id);
        assert_eq!(a.resume.id, b.resume.id);
        assert_eq!(a.job.platform, "linkedin");
        assert_eq!(a.job.platform_job_id, "12345");
    }

    #[tokio::test]
    async fn stored_credentials_are_opened() {
        let (db, resolver) = resolver().await;
        UserRepository::new(db.pool().unwrap())
            .set_site_credentials("u2", "ada@example.com", &Secret::new("pw-123"), Some("555-0100"))
            .await
            .unwrap();

        let resolved = resolver
            .resolve(&caller("u2"), "https://linkedin.com/jobs/view/1", "r2")
            .await
            .unwrap();
        assert_eq!(resolved.credentials.username.as_deref(), Some("ada@example.com"));
        assert_eq!(resolved.credentials.password.unwrap().expose(), "pw-123");
        assert_eq!(resolved.user.phone.as_deref(), Some("555-0100"));
    }

    #[tokio::test]
    async fn scheme_less_url_resolves_to_the_same_job() {
        let (_db, resolver) = resolver().await;
        let bare = resolver
            .resolve(&caller("u3"), "www.linkedin.com/jobs/view/12345", "r3")
            .await
            .unwrap();
        let full = resolver
            .resolve(&caller("u3"), "https://linkedin.com/jobs/view/12345", "r3")
            .await
            .unwrap();
        assert_eq!(bare.job.id, full.job.id);
        assert_eq!(bare.job.platform, "linkedin");
        assert_eq!(bare.job.platform_job_id, "12345");
    }

    #[tokio::test]
    async fn unparseable_url_still_resolves() {
        let (_db, resolver) = resolver().await;
        let resolved = resolver.resolve(&caller("u4"), "not a url", "r4").await.unwrap();
        assert_eq!(resolved.job.url, "not a url");
        assert_eq!(resolved.job.platform, "unknown");
        assert_eq!(resolved.job.platform_job_id, "TBD");
    }
}
