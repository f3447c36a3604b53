// crates/thunder-rpc/src/lib.rs
//
// thunder-rpc: request-admission and identity-propagation middleware, the
// tonic JSON-RPC server and the HTTP/GraphQL gateway.
//
// Calls from every front door run through one InterceptorChain (logging,
// per-client rate limiting, bearer authentication) before they reach the
// handler registry.

pub mod bridge;
pub mod chain;
pub mod context;
pub mod gateway;
pub mod handlers;
pub mod identity;
pub mod limiter;
pub mod middleware;
pub mod server;
pub mod stream;

pub use bridge::{AllowList, BridgedMetadata, ForwardAll, HeaderMatcher, MetadataBridge};
pub use chain::{stream_handler, unary_handler, Interceptor, InterceptorChain, StreamHandler, UnaryHandler};
pub use context::CallContext;
pub use gateway::GatewayState;
pub use handlers::HandlerRegistry;
pub use identity::{ClientIdentityResolver, ClientKey};
pub use limiter::{Clock, LimiterRegistry, LimiterSettings, ManualClock, SystemClock, TokenBucket};
pub use middleware::{admission_chain, AuthStage, LoggingStage, RateLimitStage};
pub use server::{RpcConfig, ServeError, ThunderRpcServer};
pub use stream::{BoxServerStream, ChannelStream, ContextStream, ServerStream, StreamPeer};
