// crates/thunder-core/src/lib.rs
//
// thunder-core: Core types, error taxonomy and credential verification for
// the Thunder RPC gateway.
//
// This is the leaf crate the rest of the workspace depends on. It defines the
// verified caller identity, the call metadata map shared by every front end,
// the error kinds surfaced by the admission stages, and the credential
// verifier interface.

pub mod claims;
pub mod error;
pub mod jwt;
pub mod metadata;
pub mod traits;

// Re-export key types for ergonomic access from downstream crates.
// Usage: `use thunder_core::CallMetadata;`

pub use claims::IdentityClaims;
pub use error::{RpcError, RpcResult, VerifyError};
pub use jwt::JwtVerifier;
pub use metadata::{CallMetadata, AUTHORIZATION, CURRENT_USER};
pub use traits::CredentialVerifier;
