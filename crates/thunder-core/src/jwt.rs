// crates/thunder-core/src/jwt.rs
//
// HMAC-signed JWT verification, the default CredentialVerifier.
//
// Tokens are minted elsewhere (the credential issuance service); this module
// only checks signature, algorithm family and expiry, then maps the payload
// onto IdentityClaims.

use chrono::DateTime;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::claims::IdentityClaims;
use crate::error::VerifyError;
use crate::traits::CredentialVerifier;

/// Environment variable holding the shared signing secret.
pub const JWT_SECRET_ENV: &str = "JWT_SECRET";

const HMAC_ALGORITHMS: [Algorithm; 3] = [Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];

/// JWT payload as issued by the credential service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Caller email; becomes the subject identifier.
    pub email: String,
    /// Issuer.
    #[serde(default)]
    pub iss: String,
    /// Expiration time (Unix timestamp, seconds).
    pub exp: i64,
}

/// Verifies HS256/HS384/HS512 tokens against a shared secret.
#[derive(Clone)]
pub struct JwtVerifier {
    secret: Vec<u8>,
    validation: Validation,
}

impl std::fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("secret_configured", &!self.secret.is_empty())
            .finish()
    }
}

impl JwtVerifier {
    /// Create a verifier for the given shared secret.
    ///
    /// An empty secret is accepted here and reported as `Misconfigured` on
    /// every verification, so a missing secret surfaces as an internal error
    /// per call instead of aborting startup.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.algorithms = HMAC_ALGORITHMS.to_vec();
        validation.validate_exp = true;
        validation.leeway = 0;
        Self {
            secret: secret.into(),
            validation,
        }
    }

    /// Create a verifier from the `JWT_SECRET` environment variable.
    pub fn from_env() -> Self {
        let secret = std::env::var(JWT_SECRET_ENV).unwrap_or_default();
        if secret.is_empty() {
            tracing::warn!("{} is not set; every protected call will fail", JWT_SECRET_ENV);
        }
        Self::new(secret)
    }

    /// Additionally require the `iss` claim to equal `issuer`.
    pub fn with_issuer(mut self, issuer: &str) -> Self {
        self.validation.set_issuer(&[issuer]);
        self
    }
}

impl CredentialVerifier for JwtVerifier {
    fn verify(&self, token: &str) -> Result<IdentityClaims, VerifyError> {
        if self.secret.is_empty() {
            return Err(VerifyError::Misconfigured(format!(
                "{} is not set",
                JWT_SECRET_ENV
            )));
        }

        let header = decode_header(token)
            .map_err(|_| VerifyError::Invalid("invalid or expired token".to_string()))?;
        if !HMAC_ALGORITHMS.contains(&header.alg) {
            return Err(VerifyError::Invalid(format!(
                "unexpected signing method: {:?}",
                header.alg
            )));
        }

        let data = decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &self.validation,
        )
        .map_err(|e| {
            tracing::debug!(error = %e, "token rejected");
            VerifyError::Invalid("invalid or expired token".to_string())
        })?;

        let claims = data.claims;
        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| VerifyError::Invalid("invalid expiry".to_string()))?;

        Ok(IdentityClaims::new(claims.email, claims.iss, expires_at))
    }
}
