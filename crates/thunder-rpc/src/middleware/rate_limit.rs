// crates/thunder-rpc/src/middleware/rate_limit.rs
//
// RateLimitStage: admits a call only if its client's token bucket has a token.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use thunder_core::{RpcError, RpcResult};

use crate::chain::{Interceptor, StreamHandler, UnaryHandler};
use crate::context::CallContext;
use crate::identity::ClientIdentityResolver;
use crate::limiter::LimiterRegistry;
use crate::stream::BoxServerStream;

/// Per-client rate limiting over a shared [`LimiterRegistry`].
///
/// Streams are charged one token at establishment; messages on an open
/// stream are not limited.
#[derive(Debug, Clone)]
pub struct RateLimitStage {
    registry: Arc<LimiterRegistry>,
    resolver: ClientIdentityResolver,
}

impl RateLimitStage {
    /// The stage trusts the registry's proxy set for forwarding headers.
    pub fn new(registry: Arc<LimiterRegistry>) -> Self {
        let resolver = ClientIdentityResolver::new(registry.trusted_proxies().clone());
        Self { registry, resolver }
    }

    pub fn registry(&self) -> &Arc<LimiterRegistry> {
        &self.registry
    }

    /// Resolve the caller and consume one token from its bucket.
    pub fn admit(&self, ctx: &CallContext) -> RpcResult<()> {
        let key = self.resolver.resolve(ctx.peer_addr(), ctx.metadata())?;
        let bucket = self.registry.get_or_create(&key);
        if bucket.allow() {
            Ok(())
        } else {
            tracing::warn!(
                client_key = %key,
                method = %ctx.method(),
                rate = bucket.rate(),
                burst = bucket.burst(),
                "rate limit exceeded"
            );
            Err(RpcError::RateLimited)
        }
    }
}

#[async_trait]
impl Interceptor for RateLimitStage {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn intercept(
        &self,
        ctx: CallContext,
        request: Value,
        next: UnaryHandler,
    ) -> RpcResult<Value> {
        self.admit(&ctx)?;
        next(ctx, request).await
    }

    async fn intercept_stream(
        &self,
        stream: BoxServerStream,
        next: StreamHandler,
    ) -> RpcResult<()> {
        self.admit(stream.context())?;
        next(stream).await
    }
}
