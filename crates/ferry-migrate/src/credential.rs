//! Tenant credentials and direction normalisation.

use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, Result};
use crate::types::{MigrationDirection, MigrationJob};

/// A raw tenant token, obtained by the caller.
///
/// The [`Debug`] impl redacts the token so it never lands in log output.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// The raw token, as sent in the `authorization` header.
    pub fn token(&self) -> &str {
        &self.0
    }

    /// Whether the token is empty or whitespace.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Short, non-reversible hint for logs.
    pub fn fingerprint(&self) -> String {
        let tail: String = self
            .0
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("…{tail}")
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Credential").field(&"[REDACTED]").finish()
    }
}

/// Credentials a job reads from and writes with, after applying its direction.
#[derive(Debug, Clone)]
pub struct CredentialPair {
    /// Credential used for every read.
    pub from: Credential,
    /// Credential used for every write.
    pub to: Credential,
}

impl CredentialPair {
    /// Normalise a job's credentials into a `{from, to}` pair.
    ///
    /// A missing or blank credential is a fatal pre-condition failure.
    pub fn resolve(job: &MigrationJob) -> Result<Self> {
        let source = present(job.source_credential.as_ref(), "source")?;
        let target = present(job.target_credential.as_ref(), "target")?;

        let (from, to) = match job.direction {
            MigrationDirection::SourceToTarget => (source, target),
            MigrationDirection::TargetToSource => (target, source),
        };

        Ok(Self {
            from: from.clone(),
            to: to.clone(),
        })
    }
}

fn present<'a>(credential: Option<&'a Credential>, role: &str) -> Result<&'a Credential> {
    match credential {
        Some(c) if !c.is_blank() => Ok(c),
        _ => Err(MigrationError::MissingCredential(format!(
            "{role} credential is required"
        ))),
    }
}
