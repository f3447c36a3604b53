// crates/thunder-rpc/src/context.rs
//
// CallContext: explicit call-scoped state threaded through every stage.

use std::time::Instant;

use thunder_core::CallMetadata;
use uuid::Uuid;

/// Per-call context handed to interceptors and handlers.
///
/// Carries the target operation, the transport peer address and the inbound
/// and outbound metadata. Stages never mutate a context they were given;
/// they pass an updated copy to the next stage.
#[derive(Debug, Clone)]
pub struct CallContext {
    call_id: Uuid,
    method: String,
    peer_addr: Option<String>,
    metadata: CallMetadata,
    outgoing: CallMetadata,
    received_at: Instant,
}

impl CallContext {
    /// Create a context for a call to `method` with no peer and empty metadata.
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            call_id: Uuid::now_v7(),
            method: method.into(),
            peer_addr: None,
            metadata: CallMetadata::new(),
            outgoing: CallMetadata::new(),
            received_at: Instant::now(),
        }
    }

    /// Set the transport peer address (`host:port`).
    pub fn with_peer(mut self, peer_addr: impl Into<String>) -> Self {
        self.peer_addr = Some(peer_addr.into());
        self
    }

    /// Replace the inbound metadata.
    pub fn with_metadata(mut self, metadata: CallMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Replace the outbound metadata.
    pub fn with_outgoing(mut self, outgoing: CallMetadata) -> Self {
        self.outgoing = outgoing;
        self
    }

    pub fn call_id(&self) -> Uuid {
        self.call_id
    }

    /// Operation name as dispatched (e.g. `Login` or `/authenticator.Auth/Login`).
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Final path segment of the operation name.
    pub fn operation(&self) -> &str {
        self.method.rsplit('/').next().unwrap_or(&self.method)
    }

    pub fn peer_addr(&self) -> Option<&str> {
        self.peer_addr.as_deref()
    }

    pub fn metadata(&self) -> &CallMetadata {
        &self.metadata
    }

    pub fn outgoing(&self) -> &CallMetadata {
        &self.outgoing
    }

    pub fn received_at(&self) -> Instant {
        self.received_at
    }
}
