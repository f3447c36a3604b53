// crates/thunder-rpc/src/handlers/mod.rs
//
// Business handler registry: operation name -> unary or stream handler.
//
// The registry is the terminal stage behind the interceptor chain. Lookups try
// the method name as dispatched first, then its final path segment, so
// `/authenticator.Auth/GetUser` and `GetUser` reach the same handler.

pub mod session;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tonic::Code;

use thunder_core::{RpcError, RpcResult};

use crate::chain::{stream_handler, unary_handler, StreamHandler, UnaryHandler};
use crate::context::CallContext;
use crate::stream::BoxServerStream;

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    unary: HashMap<String, UnaryHandler>,
    streams: HashMap<String, StreamHandler>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut unary: Vec<&String> = self.unary.keys().collect();
        unary.sort();
        let mut streams: Vec<&String> = self.streams.keys().collect();
        streams.sort();
        f.debug_struct("HandlerRegistry")
            .field("unary", &unary)
            .field("streams", &streams)
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the `Health` and `CurrentUser` operations.
    pub fn with_builtins() -> Self {
        Self::new()
            .route(session::HEALTH, typed(session::handle_health))
            .route(session::CURRENT_USER_OP, typed(session::handle_current_user))
    }

    /// Register a unary handler, replacing any previous one for `name`.
    pub fn route(mut self, name: impl Into<String>, handler: UnaryHandler) -> Self {
        self.unary.insert(name.into(), handler);
        self
    }

    /// Register a stream handler, replacing any previous one for `name`.
    pub fn route_stream(mut self, name: impl Into<String>, handler: StreamHandler) -> Self {
        self.streams.insert(name.into(), handler);
        self
    }

    pub fn unary(&self, method: &str) -> Option<&UnaryHandler> {
        self.unary
            .get(method)
            .or_else(|| self.unary.get(last_segment(method)))
    }

    pub fn stream(&self, method: &str) -> Option<&StreamHandler> {
        self.streams
            .get(method)
            .or_else(|| self.streams.get(last_segment(method)))
    }

    pub fn methods(&self) -> Vec<String> {
        let mut names: Vec<String> = self.unary.keys().chain(self.streams.keys()).cloned().collect();
        names.sort();
        names.dedup();
        names
    }

    /// Terminal unary handler that dispatches on `ctx.method()`.
    pub fn dispatcher(&self) -> UnaryHandler {
        let registry = self.clone();
        unary_handler(move |ctx: CallContext, request: Value| {
            let handler = registry.unary(ctx.method()).cloned();
            async move {
                match handler {
                    Some(handler) => handler(ctx, request).await,
                    None => Err(RpcError::UnknownMethod(ctx.method().to_string())),
                }
            }
        })
    }

    /// Terminal stream handler that dispatches on the stream's method.
    pub fn stream_dispatcher(&self) -> StreamHandler {
        let registry = self.clone();
        stream_handler(move |stream: BoxServerStream| {
            let handler = registry.stream(stream.context().method()).cloned();
            async move {
                match handler {
                    Some(handler) => handler(stream).await,
                    None => Err(RpcError::UnknownMethod(stream.context().method().to_string())),
                }
            }
        })
    }
}

fn last_segment(method: &str) -> &str {
    method.rsplit('/').next().unwrap_or(method)
}

/// Adapt a typed async handler: decode `params` into `Req`, encode `Resp`.
///
/// A `null` payload decodes as an empty object.
pub fn typed<Req, Resp, F, Fut>(handler: F) -> UnaryHandler
where
    Req: serde::de::DeserializeOwned + Send + 'static,
    Resp: serde::Serialize + Send + 'static,
    F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = RpcResult<Resp>> + Send + 'static,
{
    let handler = Arc::new(handler);
    unary_handler(move |ctx: CallContext, params: Value| {
        let handler = Arc::clone(&handler);
        async move {
            let params = if params.is_null() {
                Value::Object(serde_json::Map::new())
            } else {
                params
            };
            let request: Req = serde_json::from_value(params)?;
            let response = handler(ctx, request).await?;
            serde_json::to_value(response).map_err(|e| {
                RpcError::handler(Code::Internal, format!("failed to serialize response: {}", e))
            })
        }
    })
}
