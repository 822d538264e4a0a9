// src/core/credentials.rs
//! Seam for sealing target-site secrets at rest.

use crate::secret::Secret;
use anyhow::Result;

pub trait CredentialCipher: Send + Sync {
    fn seal(&self, plain: &Secret) -> Result<Secret>;
    fn open(&self, sealed: &Secret) -> Result<Secret>;
}

/// Stores values as given. Deployments whose credential store already
/// encrypts at rest use this; otherwise plug a real cipher in here.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsealedCipher;

impl CredentialCipher for UnsealedCipher {
    fn seal(&self, plain: &Secret) -> Result<Secret> {
        Ok(plain.clone())
    }

    fn open(&self, sealed: &Secret) -> Result<Secret> {
        if sealed.is_empty() {
            anyhow::bail!("Stored credential is empty");
        }
        Ok(sealed.clone())
    }
}
