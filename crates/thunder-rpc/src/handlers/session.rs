// crates/thunder-rpc/src/handlers/session.rs
//
// Built-in operations: Health and CurrentUser.

use serde::{Deserialize, Serialize};
use tonic::Code;

use thunder_core::{RpcError, RpcResult};

use crate::context::CallContext;

pub const HEALTH: &str = "Health";
pub const CURRENT_USER_OP: &str = "CurrentUser";

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always "ok" when the handler runs.
    pub status: String,
    /// Software version.
    pub version: String,
}

pub async fn handle_health(_ctx: CallContext, _request: HealthRequest) -> RpcResult<HealthResponse> {
    Ok(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ---------------------------------------------------------------------------
// CurrentUser
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CurrentUserRequest {}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUserResponse {
    /// Subject published by the authentication stage.
    pub email: String,
}

/// Return the authenticated caller.
///
/// Fails with `Unauthenticated` when the call carries no `current_user`
/// entry, i.e. the operation was reached without passing authentication.
pub async fn handle_current_user(
    ctx: CallContext,
    _request: CurrentUserRequest,
) -> RpcResult<CurrentUserResponse> {
    let email = ctx
        .metadata()
        .current_user()
        .ok_or_else(|| RpcError::handler(Code::Unauthenticated, "current_user metadata is missing"))?;
    Ok(CurrentUserResponse {
        email: email.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use thunder_core::{CallMetadata, CURRENT_USER};

    #[tokio::test]
    async fn test_health() {
        let resp = handle_health(CallContext::new(HEALTH), HealthRequest {}).await.unwrap();
        assert_eq!(resp.status, "ok");
    }

    #[tokio::test]
    async fn test_current_user_present() {
        let ctx = CallContext::new(CURRENT_USER_OP)
            .with_metadata(CallMetadata::from_pairs([(CURRENT_USER, "ada@example.com")]));
        let resp = handle_current_user(ctx, CurrentUserRequest {}).await.unwrap();
        assert_eq!(resp.email, "ada@example.com");
    }

    #[tokio::test]
    async fn test_current_user_missing() {
        let err = handle_current_user(CallContext::new(CURRENT_USER_OP), CurrentUserRequest {})
            .await
            .unwrap_err();
        assert_eq!(err.code(), Code::Unauthenticated);
    }
}
