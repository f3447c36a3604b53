// crates/thunder-rpc/src/stream.rs
//
// Server-side stream abstraction used by the streaming interceptor chain.
//
// A stream's context is fixed for its lifetime. Stages that need to attach
// call-scoped data (the authenticated identity) wrap the stream in a
// ContextStream once, before the handler runs; every message received on the
// wrapped stream then observes the new context.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tonic::Code;

use thunder_core::{RpcError, RpcResult};

use crate::context::CallContext;

/// One long-lived streaming call as seen by interceptors and handlers.
#[async_trait]
pub trait ServerStream: Send {
    /// Context of the call, constant for the stream's lifetime.
    fn context(&self) -> &CallContext;

    /// Next inbound message, or `None` once the client half-closes.
    async fn recv(&mut self) -> Option<RpcResult<Value>>;

    /// Send one outbound message.
    async fn send(&mut self, message: Value) -> RpcResult<()>;
}

pub type BoxServerStream = Box<dyn ServerStream>;

/// Stream wrapper that overrides `context()` and delegates message I/O.
pub struct ContextStream {
    inner: BoxServerStream,
    context: CallContext,
}

impl ContextStream {
    pub fn new(inner: BoxServerStream, context: CallContext) -> Self {
        Self { inner, context }
    }

    pub fn into_inner(self) -> BoxServerStream {
        self.inner
    }
}

#[async_trait]
impl ServerStream for ContextStream {
    fn context(&self) -> &CallContext {
        &self.context
    }

    async fn recv(&mut self) -> Option<RpcResult<Value>> {
        self.inner.recv().await
    }

    async fn send(&mut self, message: Value) -> RpcResult<()> {
        self.inner.send(message).await
    }
}

/// In-process stream backed by a pair of tokio channels.
pub struct ChannelStream {
    context: CallContext,
    inbound: mpsc::Receiver<RpcResult<Value>>,
    outbound: mpsc::Sender<Value>,
}

/// The client-facing half of a [`ChannelStream`].
pub struct StreamPeer {
    /// Messages sent here are received by the server handler.
    pub requests: mpsc::Sender<RpcResult<Value>>,
    /// Messages the server handler sends arrive here.
    pub responses: mpsc::Receiver<Value>,
}

impl ChannelStream {
    /// Create a stream for `context` and the peer half that drives it.
    pub fn pair(context: CallContext, buffer: usize) -> (Self, StreamPeer) {
        let (req_tx, req_rx) = mpsc::channel(buffer);
        let (resp_tx, resp_rx) = mpsc::channel(buffer);
        (
            Self {
                context,
                inbound: req_rx,
                outbound: resp_tx,
            },
            StreamPeer {
                requests: req_tx,
                responses: resp_rx,
            },
        )
    }
}

#[async_trait]
impl ServerStream for ChannelStream {
    fn context(&self) -> &CallContext {
        &self.context
    }

    async fn recv(&mut self) -> Option<RpcResult<Value>> {
        self.inbound.recv().await
    }

    async fn send(&mut self, message: Value) -> RpcResult<()> {
        self.outbound
            .send(message)
            .await
            .map_err(|_| RpcError::handler(Code::Cancelled, "stream closed by peer"))
    }
}
