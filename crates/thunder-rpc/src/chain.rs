// crates/thunder-rpc/src/chain.rs
//
// InterceptorChain: composes an ordered list of request interceptors around a
// unary or streaming handler.
//
// The list is folded right-to-left, so the first interceptor observes the call
// first and its `next` already wraps every later interceptor plus the
// terminal handler. The chain is built once at server construction and never
// mutated afterwards.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use thunder_core::RpcResult;

use crate::context::CallContext;
use crate::stream::BoxServerStream;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Handler for one unary call.
pub type UnaryHandler =
    Arc<dyn Fn(CallContext, Value) -> BoxFuture<'static, RpcResult<Value>> + Send + Sync>;

/// Handler for one streaming call; runs for the lifetime of the stream.
pub type StreamHandler =
    Arc<dyn Fn(BoxServerStream) -> BoxFuture<'static, RpcResult<()>> + Send + Sync>;

/// Box an async fn/closure into a [`UnaryHandler`].
pub fn unary_handler<F, Fut>(f: F) -> UnaryHandler
where
    F: Fn(CallContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<Value>> + Send + 'static,
{
    Arc::new(
        move |ctx: CallContext, request: Value| -> BoxFuture<'static, RpcResult<Value>> {
            Box::pin(f(ctx, request))
        },
    )
}

/// Box an async fn/closure into a [`StreamHandler`].
pub fn stream_handler<F, Fut>(f: F) -> StreamHandler
where
    F: Fn(BoxServerStream) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<()>> + Send + 'static,
{
    Arc::new(
        move |stream: BoxServerStream| -> BoxFuture<'static, RpcResult<()>> {
            Box::pin(f(stream))
        },
    )
}

/// A request-processing stage.
///
/// An interceptor either short-circuits by returning without calling `next`,
/// or calls `next` (possibly with an updated context) and returns its result.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Intercept a unary call.
    async fn intercept(
        &self,
        ctx: CallContext,
        request: Value,
        next: UnaryHandler,
    ) -> RpcResult<Value>;

    /// Intercept a streaming call once, at stream establishment.
    ///
    /// The default forwards the stream unchanged.
    async fn intercept_stream(
        &self,
        stream: BoxServerStream,
        next: StreamHandler,
    ) -> RpcResult<()> {
        next(stream).await
    }
}

/// Ordered, immutable sequence of interceptors.
#[derive(Clone)]
pub struct InterceptorChain {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
}

impl Default for InterceptorChain {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl std::fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("stages", &self.names())
            .finish()
    }
}

impl InterceptorChain {
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self {
            interceptors: interceptors.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Stage names in execution order.
    pub fn names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    /// Wrap a unary handler. With no interceptors the handler is returned as is.
    pub fn wrap(&self, handler: UnaryHandler) -> UnaryHandler {
        self.interceptors
            .iter()
            .rev()
            .fold(handler, |next, interceptor| {
                let interceptor = Arc::clone(interceptor);
                let wrapped: UnaryHandler = Arc::new(
                    move |ctx: CallContext, request: Value| -> BoxFuture<'static, RpcResult<Value>> {
                        let interceptor = Arc::clone(&interceptor);
                        let next = Arc::clone(&next);
                        Box::pin(async move { interceptor.intercept(ctx, request, next).await })
                    },
                );
                wrapped
            })
    }

    /// Wrap a stream handler. Same ordering as [`InterceptorChain::wrap`].
    pub fn wrap_stream(&self, handler: StreamHandler) -> StreamHandler {
        self.interceptors
            .iter()
            .rev()
            .fold(handler, |next, interceptor| {
                let interceptor = Arc::clone(interceptor);
                let wrapped: StreamHandler = Arc::new(
                    move |stream: BoxServerStream| -> BoxFuture<'static, RpcResult<()>> {
                        let interceptor = Arc::clone(&interceptor);
                        let next = Arc::clone(&next);
                        Box::pin(async move { interceptor.intercept_stream(stream, next).await })
                    },
                );
                wrapped
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use thunder_core::RpcError;

    use crate::stream::ChannelStream;

    #[derive(Clone, Default)]
    struct Trace(Arc<Mutex<Vec<String>>>);

    impl Trace {
        fn push(&self, entry: impl Into<String>) {
            self.0.lock().push(entry.into());
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().clone()
        }
    }

    struct Recording {
        label: &'static str,
        trace: Trace,
        reject: bool,
    }

    #[async_trait]
    impl Interceptor for Recording {
        fn name(&self) -> &'static str {
            self.label
        }

        async fn intercept(
            &self,
            ctx: CallContext,
            request: Value,
            next: UnaryHandler,
        ) -> RpcResult<Value> {
            self.trace.push(format!("{}:before", self.label));
            if self.reject {
                return Err(RpcError::RateLimited);
            }
            let result = next(ctx, request).await;
            self.trace.push(format!("{}:after", self.label));
            result
        }

        async fn intercept_stream(
            &self,
            stream: BoxServerStream,
            next: StreamHandler,
        ) -> RpcResult<()> {
            self.trace.push(format!("{}:stream", self.label));
            if self.reject {
                return Err(RpcError::RateLimited);
            }
            next(stream).await
        }
    }

    fn stage(label: &'static str, trace: &Trace, reject: bool) -> Arc<dyn Interceptor> {
        Arc::new(Recording {
            label,
            trace: trace.clone(),
            reject,
        })
    }

    fn terminal(trace: &Trace) -> UnaryHandler {
        let trace = trace.clone();
        unary_handler(move |_ctx, request| {
            let trace = trace.clone();
            async move {
                trace.push("handler");
                Ok(json!({ "echo": request }))
            }
        })
    }

    #[tokio::test]
    async fn test_empty_chain_is_identity() {
        let trace = Trace::default();
        let handler = terminal(&trace);
        let wrapped = InterceptorChain::default().wrap(Arc::clone(&handler));
        assert!(Arc::ptr_eq(&handler, &wrapped));

        let out = wrapped(CallContext::new("Ping"), json!(1)).await.unwrap();
        assert_eq!(out, json!({ "echo": 1 }));
        assert_eq!(trace.entries(), vec!["handler"]);
    }

    #[tokio::test]
    async fn test_single_interceptor() {
        let trace = Trace::default();
        let chain = InterceptorChain::new(vec![stage("only", &trace, false)]);
        chain.wrap(terminal(&trace))(CallContext::new("Ping"), json!(null))
            .await
            .unwrap();
        assert_eq!(trace.entries(), vec!["only:before", "handler", "only:after"]);
    }

    #[tokio::test]
    async fn test_first_interceptor_runs_first() {
        let trace = Trace::default();
        let chain = InterceptorChain::new(vec![
            stage("first", &trace, false),
            stage("second", &trace, false),
            stage("third", &trace, false),
        ]);
        assert_eq!(chain.names(), vec!["first", "second", "third"]);

        chain.wrap(terminal(&trace))(CallContext::new("Ping"), json!(null))
            .await
            .unwrap();
        assert_eq!(
            trace.entries(),
            vec![
                "first:before",
                "second:before",
                "third:before",
                "handler",
                "third:after",
                "second:after",
                "first:after",
            ]
        );
    }

    #[tokio::test]
    async fn test_short_circuit_stops_chain() {
        let trace = Trace::default();
        let chain = InterceptorChain::new(vec![
            stage("first", &trace, false),
            stage("gate", &trace, true),
            stage("never", &trace, false),
        ]);
        let err = chain.wrap(terminal(&trace))(CallContext::new("Ping"), json!(null))
            .await
            .unwrap_err();
        assert_eq!(err, RpcError::RateLimited);
        let entries = trace.entries();
        assert_eq!(entries, vec!["first:before", "gate:before", "first:after"]);
        assert!(!entries.iter().any(|e| e.starts_with("never") || e == "handler"));
    }

    #[tokio::test]
    async fn test_stream_chain_order_and_short_circuit() {
        let trace = Trace::default();
        let handler_trace = trace.clone();
        let handler = stream_handler(move |_stream| {
            let trace = handler_trace.clone();
            async move {
                trace.push("handler");
                Ok(())
            }
        });

        let chain = InterceptorChain::new(vec![stage("a", &trace, false), stage("b", &trace, false)]);
        let (stream, _peer) = ChannelStream::pair(CallContext::new("Watch"), 1);
        chain.wrap_stream(Arc::clone(&handler))(Box::new(stream)).await.unwrap();
        assert_eq!(trace.entries(), vec!["a:stream", "b:stream", "handler"]);

        let trace = Trace::default();
        let chain = InterceptorChain::new(vec![stage("gate", &trace, true)]);
        let (stream, _peer) = ChannelStream::pair(CallContext::new("Watch"), 1);
        assert!(chain.wrap_stream(handler)(Box::new(stream)).await.is_err());
        assert_eq!(trace.entries(), vec!["gate:stream"]);
    }
}
