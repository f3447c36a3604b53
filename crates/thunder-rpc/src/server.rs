// crates/thunder-rpc/src/server.rs
//
// RPC server setup: ThunderRpcServer and RpcConfig.
//
// A single tonic service accepts JSON-encoded `{method, params}` requests,
// runs them through the admission chain and the handler registry, and
// returns a JSON envelope. No proto codegen is involved; tonic provides the
// transport. The peer address is read from the connection info tonic attaches
// to each request, and call metadata from the request headers.

use std::future::Future;
use std::net::SocketAddr;

use http_body::Body as HttpBody;
use http_body_util::BodyExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tonic::transport::server::TcpConnectInfo;
use tonic::transport::Server;
use tonic::Status;

use thunder_core::{CallMetadata, RpcError, RpcResult, CURRENT_USER};

use crate::chain::{InterceptorChain, StreamHandler, UnaryHandler};
use crate::context::CallContext;
use crate::handlers::HandlerRegistry;
use crate::stream::BoxServerStream;

// ---------------------------------------------------------------------------
// RpcConfig
// ---------------------------------------------------------------------------

/// Configuration for the RPC server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Host to bind to (e.g., "127.0.0.1" or "0.0.0.0").
    pub host: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 50051,
        }
    }
}

impl RpcConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ServeError> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse::<SocketAddr>()
            .map_err(|_| ServeError::InvalidAddress(addr))
    }
}

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("invalid listen address: {0}")]
    InvalidAddress(String),

    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// JSON-RPC Envelope
// ---------------------------------------------------------------------------

/// A JSON-RPC-style request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Operation to invoke (e.g., "Login", "/authenticator.Auth/GetUser").
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// A JSON-RPC-style response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
    /// gRPC status code of the failure (`None` on success).
    pub code: Option<i32>,
}

impl JsonRpcResponse {
    pub fn from_result(result: RpcResult<Value>) -> Self {
        match result {
            Ok(value) => Self {
                success: true,
                result: Some(value),
                error: None,
                code: None,
            },
            Err(e) => Self::from_error(&e),
        }
    }

    pub fn from_error(err: &RpcError) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(err.to_string()),
            code: Some(err.code() as i32),
        }
    }
}

// ---------------------------------------------------------------------------
// ThunderRpcServer
// ---------------------------------------------------------------------------

/// The RPC server: the admission chain wrapped once around the handler registry.
#[derive(Clone)]
pub struct ThunderRpcServer {
    config: RpcConfig,
    unary: UnaryHandler,
    stream: StreamHandler,
    stages: Vec<&'static str>,
}

impl std::fmt::Debug for ThunderRpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThunderRpcServer")
            .field("config", &self.config)
            .field("stages", &self.stages)
            .finish()
    }
}

impl ThunderRpcServer {
    pub fn new(config: RpcConfig, chain: &InterceptorChain, registry: &HandlerRegistry) -> Self {
        Self {
            config,
            unary: chain.wrap(registry.dispatcher()),
            stream: chain.wrap_stream(registry.stream_dispatcher()),
            stages: chain.names(),
        }
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// The wrapped unary handler, shared with the HTTP gateway.
    pub fn handler(&self) -> UnaryHandler {
        self.unary.clone()
    }

    /// Dispatch one unary call in-process.
    pub async fn call(&self, ctx: CallContext, params: Value) -> RpcResult<Value> {
        (self.unary)(ctx, params).await
    }

    /// Run one streaming call to completion.
    pub async fn open_stream(&self, stream: BoxServerStream) -> RpcResult<()> {
        (self.stream)(stream).await
    }

    /// The tonic service for this server.
    pub fn service(&self) -> ThunderJsonRpcService {
        ThunderJsonRpcService {
            handler: self.unary.clone(),
        }
    }

    /// Serve until `signal` resolves.
    pub async fn serve_with_shutdown<F>(&self, signal: F) -> Result<(), ServeError>
    where
        F: Future<Output = ()> + Send,
    {
        let addr = self.config.socket_addr()?;
        tracing::info!(stages = ?self.stages, "Thunder RPC server starting on {}", addr);

        Server::builder()
            .accept_http1(true)
            .add_service(self.service())
            .serve_with_shutdown(addr, signal)
            .await?;

        tracing::info!("Thunder RPC server stopped");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tonic Service Wiring
// ---------------------------------------------------------------------------
// One service, any method path under it. Request and response bodies are raw
// JSON (JsonRpcRequest / JsonRpcResponse).

#[derive(Clone)]
pub struct ThunderJsonRpcService {
    handler: UnaryHandler,
}

impl std::fmt::Debug for ThunderJsonRpcService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThunderJsonRpcService").finish()
    }
}

impl tonic::server::NamedService for ThunderJsonRpcService {
    const NAME: &'static str = "thunder.rpc.Gateway";
}

impl<B> tower_service::Service<http::Request<B>> for ThunderJsonRpcService
where
    B: HttpBody + Send + 'static,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>> + Send,
    B::Data: Send,
{
    type Response = http::Response<tonic::body::BoxBody>;
    type Error = std::convert::Infallible;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let handler = self.handler.clone();

        Box::pin(async move {
            let peer_addr = req
                .extensions()
                .get::<TcpConnectInfo>()
                .and_then(|info| info.remote_addr())
                .map(|addr| addr.to_string());
            // `current_user` is only ever set by AuthStage.
            let metadata = CallMetadata::from_headers(req.headers()).without(CURRENT_USER);

            let body_bytes = match collect_body(req.into_body()).await {
                Ok(b) => b,
                Err(e) => {
                    tracing::error!("Failed to read request body: {}", e);
                    let err = RpcError::InvalidArgument(format!("failed to read request body: {}", e));
                    return Ok(build_response(&JsonRpcResponse::from_error(&err)));
                }
            };

            let rpc_request: JsonRpcRequest = match serde_json::from_slice(&body_bytes) {
                Ok(r) => r,
                Err(e) => {
                    let err = RpcError::InvalidArgument(format!("invalid JSON-RPC request: {}", e));
                    return Ok(build_response(&JsonRpcResponse::from_error(&err)));
                }
            };

            let mut ctx = CallContext::new(rpc_request.method).with_metadata(metadata);
            if let Some(peer_addr) = peer_addr {
                ctx = ctx.with_peer(peer_addr);
            }

            let result = handler(ctx, rpc_request.params).await;
            Ok(build_response(&JsonRpcResponse::from_result(result)))
        })
    }
}

/// Collect the body of an HTTP request into bytes.
async fn collect_body<B>(body: B) -> Result<Vec<u8>, String>
where
    B: HttpBody + Send,
    B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    B::Data: Send,
{
    let mut collected = Vec::new();
    let mut body = std::pin::pin!(body);

    loop {
        match std::future::poll_fn(|cx| HttpBody::poll_frame(body.as_mut(), cx)).await {
            Some(Ok(frame)) => {
                if let Ok(data) = frame.into_data() {
                    use bytes::Buf;
                    collected.extend_from_slice(data.chunk());
                }
            }
            Some(Err(e)) => return Err(e.into().to_string()),
            None => break,
        }
    }

    Ok(collected)
}

/// Build an HTTP response carrying the JSON envelope.
fn build_response(envelope: &JsonRpcResponse) -> http::Response<tonic::body::BoxBody> {
    let json = serde_json::to_vec(envelope).unwrap_or_default();
    let body = tonic::body::BoxBody::new(
        http_body_util::Full::new(bytes::Bytes::from(json))
            .map_err(|e| Status::internal(format!("body error: {}", e))),
    );

    let mut response = http::Response::new(body);
    response.headers_mut().insert(
        http::header::CONTENT_TYPE,
        http::HeaderValue::from_static("application/json"),
    );
    response
}
