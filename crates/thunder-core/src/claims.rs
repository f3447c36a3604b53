// crates/thunder-core/src/claims.rs
//
// IdentityClaims: the verified caller identity carried through one call.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Verified identity derived from a bearer credential.
///
/// Only a `CredentialVerifier` constructs these, after signature and expiry
/// checks have passed. The value is never persisted and lives for a single call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityClaims {
    subject: String,
    issuer: String,
    expires_at: DateTime<Utc>,
}

impl IdentityClaims {
    /// Build claims from already-verified token contents.
    pub fn new(
        subject: impl Into<String>,
        issuer: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            subject: subject.into(),
            issuer: issuer.into(),
            expires_at,
        }
    }

    /// Subject identifier (the caller's email address).
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }
}
