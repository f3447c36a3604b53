// crates/thunder-core/src/traits.rs

use std::sync::Arc;

use crate::claims::IdentityClaims;
use crate::error::VerifyError;

/// Trait for bearer credential verification.
///
/// Implemented by `JwtVerifier`. Verification is synchronous and performs no
/// I/O, so it can run inline in the authentication stage.
pub trait CredentialVerifier: Send + Sync {
    /// Verify a raw token (no scheme prefix) and return the caller's identity.
    fn verify(&self, token: &str) -> Result<IdentityClaims, VerifyError>;
}

impl<V: CredentialVerifier + ?Sized> CredentialVerifier for Arc<V> {
    fn verify(&self, token: &str) -> Result<IdentityClaims, VerifyError> {
        (**self).verify(token)
    }
}
