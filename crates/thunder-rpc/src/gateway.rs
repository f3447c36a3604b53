// crates/thunder-rpc/src/gateway.rs
//
// HTTP front door: REST and GraphQL routes into the same wrapped handler the
// native RPC server runs.
//
// Every request is translated by the MetadataBridge before it reaches the
// admission chain, so a credential sent as `Authorization`, `authorization`
// or with no scheme at all is seen by AuthStage in the same shape.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use thunder_core::RpcError;

use crate::bridge::MetadataBridge;
use crate::chain::UnaryHandler;
use crate::context::CallContext;
use crate::server::ServeError;

/// Shared state of the gateway routes.
#[derive(Clone)]
pub struct GatewayState {
    handler: UnaryHandler,
    bridge: MetadataBridge,
    ready: Arc<AtomicBool>,
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("ready", &self.is_ready())
            .finish_non_exhaustive()
    }
}

impl GatewayState {
    /// State for `handler` (already wrapped in the admission chain). Starts
    /// not ready.
    pub fn new(handler: UnaryHandler, bridge: MetadataBridge) -> Self {
        Self {
            handler,
            bridge,
            ready: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn dispatch(
        &self,
        method: String,
        peer: Option<SocketAddr>,
        headers: &HeaderMap,
        params: Value,
    ) -> Result<Value, RpcError> {
        let mut ctx = self.bridge.apply(headers, CallContext::new(method));
        if let Some(peer) = peer {
            ctx = ctx.with_peer(peer.to_string());
        }
        (self.handler)(ctx, params).await
    }
}

/// Build the gateway router.
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/v1/:method", post(rest_call))
        .route("/graphql", post(graphql_call))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind `addr` and serve the gateway until `signal` resolves.
pub async fn serve<F>(addr: SocketAddr, state: GatewayState, signal: F) -> Result<(), ServeError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Thunder HTTP gateway ready at http://{}", addr);

    state.set_ready(true);
    let app = router(state.clone());
    let result = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(signal)
    .await;
    state.set_ready(false);

    result?;
    tracing::info!("Thunder HTTP gateway stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// REST
// ---------------------------------------------------------------------------

async fn rest_call(
    State(state): State<GatewayState>,
    Path(method): Path<String>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let params = match parse_params(&body) {
        Ok(params) => params,
        Err(e) => return rest_error(&e),
    };
    let peer = connect.map(|ConnectInfo(addr)| addr);

    match state.dispatch(method, peer, &headers, params).await {
        Ok(result) => (StatusCode::OK, Json(json!({ "result": result }))).into_response(),
        Err(e) => rest_error(&e),
    }
}

fn parse_params(body: &Bytes) -> Result<Value, RpcError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(body)?)
}

fn rest_error(err: &RpcError) -> Response {
    (
        err.http_status(),
        Json(json!({ "error": err.to_string(), "code": err.kind() })),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// GraphQL
// ---------------------------------------------------------------------------

/// GraphQL-over-HTTP request. `operationName` selects the operation and
/// `variables` become its parameters; the query document is not interpreted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphqlRequest {
    #[serde(default)]
    query: String,
    operation_name: Option<String>,
    #[serde(default)]
    variables: Option<Map<String, Value>>,
}

async fn graphql_call(
    State(state): State<GatewayState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request: GraphqlRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => return graphql_error(&RpcError::from(e)),
    };
    let Some(operation) = request.operation_name.filter(|name| !name.is_empty()) else {
        return graphql_error(&RpcError::InvalidArgument("operationName is required".to_string()));
    };
    tracing::debug!(operation = %operation, query_len = request.query.len(), "graphql request");
    let params = request.variables.map(Value::Object).unwrap_or(Value::Null);
    let peer = connect.map(|ConnectInfo(addr)| addr);

    match state.dispatch(operation.clone(), peer, &headers, params).await {
        Ok(result) => {
            let mut data = Map::new();
            data.insert(operation, result);
            (StatusCode::OK, Json(json!({ "data": data }))).into_response()
        }
        Err(e) => graphql_error(&e),
    }
}

fn graphql_error(err: &RpcError) -> Response {
    (
        err.http_status(),
        Json(json!({
            "data": null,
            "errors": [{
                "message": err.to_string(),
                "extensions": { "code": err.kind() },
            }],
        })),
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Probes
// ---------------------------------------------------------------------------

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn ready(State(state): State<GatewayState>) -> Response {
    if state.is_ready() {
        (StatusCode::OK, Json(json!({ "status": "ready" }))).into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "starting" })),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::chain::{unary_handler, InterceptorChain};
    use crate::handlers::HandlerRegistry;
    use crate::limiter::LimiterRegistry;
    use crate::middleware::{admission_chain, AuthStage, RateLimitStage};
    use thunder_core::{CredentialVerifier, IdentityClaims, VerifyError};

    struct FixedVerifier;

    impl CredentialVerifier for FixedVerifier {
        fn verify(&self, token: &str) -> Result<IdentityClaims, VerifyError> {
            if token == "xyz" {
                Ok(IdentityClaims::new(
                    "ada@example.com",
                    "thunder",
                    chrono::Utc::now() + chrono::Duration::hours(1),
                ))
            } else {
                Err(VerifyError::Invalid("invalid or expired token".to_string()))
            }
        }
    }

    fn state(burst: u32) -> GatewayState {
        let registry = Arc::new(LimiterRegistry::new(5.0, burst, HashSet::new()));
        let chain = admission_chain(
            Some(RateLimitStage::new(registry)),
            AuthStage::new(Arc::new(FixedVerifier)),
        );
        let handlers = HandlerRegistry::with_builtins().route(
            "Login",
            unary_handler(|_ctx, params| async move { Ok(json!({ "token": "xyz", "echo": params })) }),
        );
        GatewayState::new(chain.wrap(handlers.dispatcher()), MetadataBridge::default())
    }

    fn request(uri: &str, authorization: Option<(&str, &str)>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some((name, value)) = authorization {
            builder = builder.header(name, value);
        }
        let mut req = builder.body(Body::from(body.to_string())).unwrap();
        req.extensions_mut()
            .insert(ConnectInfo(SocketAddr::from(([10, 0, 0, 9], 4000))));
        req
    }

    async fn send(router: Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = router.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_rest_exempt_call_reaches_handler() {
        let (status, body) = send(router(state(10)), request("/v1/Login", None, json!({"email": "a"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["echo"], json!({"email": "a"}));
    }

    #[tokio::test]
    async fn test_rest_protected_call_requires_credential() {
        let (status, body) = send(router(state(10)), request("/v1/CurrentUser", None, json!({}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], json!("missing token"));
        assert_eq!(body["code"], json!("MISSING_CREDENTIAL"));
    }

    #[tokio::test]
    async fn test_rest_credential_in_any_casing_and_without_scheme() {
        for (name, value) in [("Authorization", "Bearer xyz"), ("AUTHORIZATION", "xyz")] {
            let req = request("/v1/CurrentUser", Some((name, value)), json!({}));
            let (status, body) = send(router(state(10)), req).await;
            assert_eq!(status, StatusCode::OK, "{}: {}", name, body);
            assert_eq!(body["result"]["email"], json!("ada@example.com"));
        }
    }

    #[tokio::test]
    async fn test_rest_rate_limited() {
        let app = router(state(2));
        for _ in 0..2 {
            let (status, _) = send(app.clone(), request("/v1/Login", None, json!(null))).await;
            assert_eq!(status, StatusCode::OK);
        }
        let (status, body) = send(app, request("/v1/Login", None, json!(null))).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["error"], json!("too many requests"));
    }

    #[tokio::test]
    async fn test_rest_unknown_method() {
        let req = request("/v1/Nope", Some(("authorization", "Bearer xyz")), json!(null));
        let (status, _) = send(router(state(10)), req).await;
        assert_eq!(status, StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn test_graphql_operation_dispatch() {
        let body = json!({
            "query": "query CurrentUser { currentUser { email } }",
            "operationName": "CurrentUser",
        });
        let req = request("/graphql", Some(("Authorization", "Bearer xyz")), body);
        let (status, body) = send(router(state(10)), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["CurrentUser"]["email"], json!("ada@example.com"));
    }

    #[tokio::test]
    async fn test_graphql_variables_become_params() {
        let body = json!({
            "query": "mutation Login($email: String!) { login(email: $email) { token } }",
            "operationName": "Login",
            "variables": { "email": "ada@example.com" },
        });
        let (status, body) = send(router(state(10)), request("/graphql", None, body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["Login"]["echo"]["email"], json!("ada@example.com"));
    }

    #[tokio::test]
    async fn test_graphql_errors() {
        let body = json!({ "query": "{ currentUser { email } }", "operationName": "CurrentUser" });
        let (status, body) = send(router(state(10)), request("/graphql", None, body)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["errors"][0]["message"], json!("missing token"));

        let body = json!({ "query": "{ currentUser { email } }" });
        let (status, _) = send(router(state(10)), request("/graphql", None, body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_probes() {
        let state = state(10);
        let app = router(state.clone());

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = send(app.clone(), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], json!("ok"));

        let req = Request::builder().uri("/ready").body(Body::empty()).unwrap();
        let (status, _) = send(app.clone(), req).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        state.set_ready(true);
        let req = Request::builder().uri("/ready").body(Body::empty()).unwrap();
        let (status, _) = send(app, req).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_exempt_call_cannot_forge_current_user() {
        let registry = Arc::new(LimiterRegistry::new(5.0, 10, HashSet::new()));
        let chain = admission_chain(
            Some(RateLimitStage::new(registry)),
            AuthStage::new(Arc::new(FixedVerifier)),
        );
        let handlers = HandlerRegistry::new().route(
            "Login",
            unary_handler(|ctx: CallContext, _params| async move {
                Ok(json!({ "seen_current_user": ctx.metadata().current_user() }))
            }),
        );
        let state = GatewayState::new(chain.wrap(handlers.dispatcher()), MetadataBridge::default());

        let req = request("/v1/Login", Some(("Current_User", "admin@corp.example")), json!(null));
        let (status, body) = send(router(state), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["seen_current_user"], Value::Null);
    }

    #[tokio::test]
    async fn test_handler_sees_bridged_outgoing_metadata() {
        let handler = unary_handler(|ctx: CallContext, _params| async move {
            Ok(json!({ "outgoing": ctx.outgoing().bearer_token() }))
        });
        let state = GatewayState::new(InterceptorChain::default().wrap(handler), MetadataBridge::default());
        let req = request("/v1/Anything", Some(("Authorization", "xyz")), json!(null));
        let (status, body) = send(router(state), req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["outgoing"], json!("xyz"));
    }
}
