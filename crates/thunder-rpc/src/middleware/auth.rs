// crates/thunder-rpc/src/middleware/auth.rs
//
// AuthStage: bearer-credential verification for unary and streaming calls.
//
// On success the verified subject is published as the `current_user` metadata
// entry of the context handed downstream. The `authorization` entry is kept.
// Operations in the exempt set (credential issuance and registration) pass
// through untouched.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use thunder_core::{CredentialVerifier, RpcError, RpcResult, CURRENT_USER};

use crate::chain::{Interceptor, StreamHandler, UnaryHandler};
use crate::context::CallContext;
use crate::stream::{BoxServerStream, ContextStream};

/// Operations reachable without a credential unless configured otherwise.
pub fn default_exempt_methods() -> Vec<String> {
    vec!["Login".to_string(), "Register".to_string()]
}

#[derive(Clone)]
pub struct AuthStage {
    verifier: Arc<dyn CredentialVerifier>,
    exempt: Arc<HashSet<String>>,
}

impl fmt::Debug for AuthStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthStage")
            .field("exempt", &self.exempt)
            .finish_non_exhaustive()
    }
}

impl AuthStage {
    /// Stage with the default exempt set.
    pub fn new(verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self::with_exempt(verifier, default_exempt_methods())
    }

    /// Stage exempting the given operation names.
    pub fn with_exempt<I, S>(verifier: Arc<dyn CredentialVerifier>, exempt: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            verifier,
            exempt: Arc::new(exempt.into_iter().map(Into::into).collect()),
        }
    }

    /// Whether `ctx` targets an exempt operation. A fully qualified name
    /// matches on its final path segment.
    pub fn is_exempt(&self, ctx: &CallContext) -> bool {
        self.exempt.contains(ctx.method()) || self.exempt.contains(ctx.operation())
    }

    /// Verify the caller and return the context the handler should see.
    pub fn authenticate(&self, ctx: CallContext) -> RpcResult<CallContext> {
        if self.is_exempt(&ctx) {
            return Ok(ctx);
        }

        let peer = ctx.peer_addr().unwrap_or("-");
        let Some(token) = ctx.metadata().bearer_token() else {
            tracing::warn!(method = %ctx.method(), peer = %peer, reason = "missing token", "authentication rejected");
            return Err(RpcError::MissingCredential);
        };

        let claims = self.verifier.verify(token).map_err(|e| {
            let err = RpcError::from(e);
            tracing::warn!(method = %ctx.method(), peer = %peer, reason = %err, "authentication rejected");
            err
        })?;

        tracing::debug!(
            method = %ctx.method(),
            subject = %claims.subject(),
            issuer = %claims.issuer(),
            expires_at = %claims.expires_at(),
            "caller authenticated"
        );
        let metadata = ctx.metadata().with_replaced(CURRENT_USER, claims.subject());
        Ok(ctx.with_metadata(metadata))
    }
}

#[async_trait]
impl Interceptor for AuthStage {
    fn name(&self) -> &'static str {
        "auth"
    }

    async fn intercept(
        &self,
        ctx: CallContext,
        request: Value,
        next: UnaryHandler,
    ) -> RpcResult<Value> {
        let ctx = self.authenticate(ctx)?;
        next(ctx, request).await
    }

    async fn intercept_stream(
        &self,
        stream: BoxServerStream,
        next: StreamHandler,
    ) -> RpcResult<()> {
        if self.is_exempt(stream.context()) {
            return next(stream).await;
        }
        let ctx = self.authenticate(stream.context().clone())?;
        next(Box::new(ContextStream::new(stream, ctx))).await
    }
}
