// crates/thunder-rpc/src/middleware/logging.rs
//
// LoggingStage: one structured log line per call with outcome and latency.

use async_trait::async_trait;
use serde_json::Value;

use thunder_core::RpcResult;

use crate::chain::{Interceptor, StreamHandler, UnaryHandler};
use crate::context::CallContext;
use crate::stream::BoxServerStream;

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingStage;

#[async_trait]
impl Interceptor for LoggingStage {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn intercept(
        &self,
        ctx: CallContext,
        request: Value,
        next: UnaryHandler,
    ) -> RpcResult<Value> {
        let call_id = ctx.call_id();
        let method = ctx.method().to_string();
        let peer = ctx.peer_addr().unwrap_or("-").to_string();
        let started = ctx.received_at();

        tracing::debug!(%call_id, method = %method, peer = %peer, "incoming rpc request");
        let result = next(ctx, request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => tracing::info!(%call_id, method = %method, peer = %peer, elapsed_ms, code = "OK", "rpc completed"),
            Err(e) => tracing::info!(
                %call_id,
                method = %method,
                peer = %peer,
                elapsed_ms,
                code = ?e.code(),
                kind = e.kind(),
                "rpc failed"
            ),
        }
        result
    }

    async fn intercept_stream(
        &self,
        stream: BoxServerStream,
        next: StreamHandler,
    ) -> RpcResult<()> {
        let call_id = stream.context().call_id();
        let method = stream.context().method().to_string();
        let started = stream.context().received_at();

        tracing::debug!(%call_id, method = %method, "stream opened");
        let result = next(stream).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(()) => tracing::info!(%call_id, method = %method, elapsed_ms, "stream closed"),
            Err(e) => tracing::info!(%call_id, method = %method, elapsed_ms, kind = e.kind(), "stream failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use thunder_core::RpcError;

    use crate::chain::{unary_handler, InterceptorChain};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_logging_stage_is_transparent() {
        let chain = InterceptorChain::new(vec![Arc::new(LoggingStage)]);
        let ok = chain.wrap(unary_handler(|_ctx, req| async move { Ok(req) }));
        assert_eq!(ok(CallContext::new("Echo"), json!("x")).await, Ok(json!("x")));

        let failing = chain.wrap(unary_handler(|_ctx, _req| async move {
            Err::<Value, _>(RpcError::MissingCredential)
        }));
        assert_eq!(
            failing(CallContext::new("Echo"), json!(null)).await,
            Err(RpcError::MissingCredential)
        );
    }
}
