// src/core/mod.rs
//! Services shared by the orchestrator and the automation runs.

pub mod credentials;
pub mod documents;
pub mod job_page;
pub mod resolver;
pub mod status;

pub use credentials::{CredentialCipher, UnsealedCipher};
pub use documents::{Document, DocumentChannel, HttpDocumentChannel, ResumeStore};
pub use resolver::{IdentityResolver, ResolvedIdentity, SiteCredentials};
pub use status::{HttpStatusChannel, JobDetails, StageEvent, StageStatus, StatusChannel};
