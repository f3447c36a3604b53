// crates/thunder-core/src/error.rs
//
// Error taxonomy shared by every admission stage and front end.

use thiserror::Error;
use tonic::{Code, Status};

/// Error kinds surfaced by the admission stages and handlers.
///
/// Every stage fails fast with one of these; they are converted to a
/// `tonic::Status` (native RPC) or an HTTP status (gateway) at the edge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RpcError {
    /// Transport peer address is missing or malformed.
    #[error("{0}")]
    InvalidPeer(String),

    /// Per-client token bucket is empty.
    #[error("too many requests")]
    RateLimited,

    /// No bearer credential in the call metadata.
    #[error("missing token")]
    MissingCredential,

    /// Credential present but rejected by the verifier.
    #[error("unauthorized: {0}")]
    InvalidCredential(String),

    /// Verifier could not run (e.g. no signing secret configured).
    #[error("verification failure: {0}")]
    VerificationInternalFailure(String),

    /// No handler registered for the operation.
    #[error("unknown method: {0}")]
    UnknownMethod(String),

    /// Request payload could not be decoded for the handler.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Error returned by a business handler, carried through unchanged.
    #[error("{message}")]
    Handler { code: Code, message: String },
}

pub type RpcResult<T> = Result<T, RpcError>;

impl RpcError {
    /// Build a handler error with an explicit status code.
    pub fn handler(code: Code, message: impl Into<String>) -> Self {
        RpcError::Handler {
            code,
            message: message.into(),
        }
    }

    /// gRPC status code for this error.
    pub fn code(&self) -> Code {
        match self {
            RpcError::InvalidPeer(_) => Code::Internal,
            RpcError::RateLimited => Code::ResourceExhausted,
            RpcError::MissingCredential | RpcError::InvalidCredential(_) => Code::Unauthenticated,
            RpcError::VerificationInternalFailure(_) => Code::Internal,
            RpcError::UnknownMethod(_) => Code::Unimplemented,
            RpcError::InvalidArgument(_) => Code::InvalidArgument,
            RpcError::Handler { code, .. } => *code,
        }
    }

    /// Machine-readable kind, stable across front ends.
    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::InvalidPeer(_) => "INVALID_PEER",
            RpcError::RateLimited => "RATE_LIMITED",
            RpcError::MissingCredential => "MISSING_CREDENTIAL",
            RpcError::InvalidCredential(_) => "INVALID_CREDENTIAL",
            RpcError::VerificationInternalFailure(_) => "VERIFICATION_FAILURE",
            RpcError::UnknownMethod(_) => "UNKNOWN_METHOD",
            RpcError::InvalidArgument(_) => "INVALID_ARGUMENT",
            RpcError::Handler { .. } => "HANDLER_ERROR",
        }
    }

    /// Only rate-limit rejections are worth retrying with the same credential.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RpcError::RateLimited)
    }

    /// HTTP status used by the REST and GraphQL front ends.
    pub fn http_status(&self) -> http::StatusCode {
        match self.code() {
            Code::Unauthenticated => http::StatusCode::UNAUTHORIZED,
            Code::PermissionDenied => http::StatusCode::FORBIDDEN,
            Code::ResourceExhausted => http::StatusCode::TOO_MANY_REQUESTS,
            Code::InvalidArgument => http::StatusCode::BAD_REQUEST,
            Code::NotFound => http::StatusCode::NOT_FOUND,
            Code::Unimplemented => http::StatusCode::NOT_IMPLEMENTED,
            Code::Unavailable => http::StatusCode::SERVICE_UNAVAILABLE,
            _ => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RpcError> for Status {
    fn from(err: RpcError) -> Self {
        Status::new(err.code(), err.to_string())
    }
}

impl From<Status> for RpcError {
    fn from(status: Status) -> Self {
        RpcError::handler(status.code(), status.message())
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(e: serde_json::Error) -> Self {
        RpcError::InvalidArgument(e.to_string())
    }
}

/// Failure reported by a `CredentialVerifier`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    /// Bad signature, wrong algorithm, malformed token or expiry.
    #[error("{0}")]
    Invalid(String),

    /// The verifier itself is not usable.
    #[error("{0}")]
    Misconfigured(String),
}

impl From<VerifyError> for RpcError {
    fn from(e: VerifyError) -> Self {
        match e {
            VerifyError::Invalid(reason) => RpcError::InvalidCredential(reason),
            VerifyError::Misconfigured(reason) => RpcError::VerificationInternalFailure(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let status: Status = RpcError::RateLimited.into();
        assert_eq!(status.code(), Code::ResourceExhausted);
        assert_eq!(status.message(), "too many requests");

        let status: Status = RpcError::MissingCredential.into();
        assert_eq!(status.code(), Code::Unauthenticated);
        assert_eq!(status.message(), "missing token");

        let status: Status = RpcError::InvalidCredential("invalid or expired token".into()).into();
        assert_eq!(status.message(), "unauthorized: invalid or expired token");

        let status: Status = RpcError::InvalidPeer("invalid peer address".into()).into();
        assert_eq!(status.code(), Code::Internal);
    }

    #[test]
    fn test_verify_error_conversion() {
        let err: RpcError = VerifyError::Misconfigured("JWT_SECRET is not set".into()).into();
        assert_eq!(err.code(), Code::Internal);
        assert_eq!(err.kind(), "VERIFICATION_FAILURE");

        let err: RpcError = VerifyError::Invalid("bad signature".into()).into();
        assert_eq!(err.code(), Code::Unauthenticated);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(RpcError::RateLimited.http_status(), http::StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(RpcError::MissingCredential.http_status(), http::StatusCode::UNAUTHORIZED);
        assert_eq!(
            RpcError::UnknownMethod("Nope".into()).http_status(),
            http::StatusCode::NOT_IMPLEMENTED
        );
    }

    #[test]
    fn test_status_roundtrip_keeps_handler_code() {
        let err: RpcError = Status::not_found("no such user").into();
        assert_eq!(err.code(), Code::NotFound);
        assert_eq!(err.to_string(), "no such user");
    }
}
