//! Transport abstraction underneath the realtime channel client.
//!
//! The client never talks to a socket directly: it drives an injected
//! `TransportFactory`/`Transport` pair so tests can substitute an in-memory
//! fake and production uses the WebSocket/STOMP implementation in [`crate::ws`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::BoxFuture;

use kitlend_core::KitResult;

/// Raw inbound message body delivered by the transport for one subscription.
pub type MessageHandler = Arc<dyn Fn(String) + Send + Sync>;

/// Lifecycle hook that performs async bookkeeping before returning.
/// The transport awaits the returned future, so client state is settled
/// before anything that observes it runs.
pub type LifecycleHook = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// Lifecycle hook carrying a broker ERROR frame.
pub type ErrorHook = Arc<dyn Fn(ErrorFrame) -> BoxFuture<'static, ()> + Send + Sync>;

/// Surface of a STOMP ERROR frame handed to the error hook.
#[derive(Debug, Clone)]
pub struct ErrorFrame {
    /// Short reason from the frame's `message` header.
    pub message: String,
    /// Full frame body, if any.
    pub body: String,
}

/// Connection parameters handed to the transport factory.
#[derive(Clone)]
pub struct TransportConfig {
    /// Full WebSocket endpoint URL (`wss://host/ws/websocket`).
    pub url: String,
    /// Bearer token attached at connect time, when a session exists.
    pub auth_token: Option<String>,
    /// Outgoing heartbeat interval.
    pub heartbeat_outgoing: Duration,
    /// Expected incoming heartbeat interval.
    pub heartbeat_incoming: Duration,
    /// Fixed delay between reconnection attempts.
    pub reconnect_delay: Duration,
}

/// Lifecycle callbacks registered by the client at connect time.
#[derive(Clone, Default)]
pub struct LifecycleHooks {
    /// Fired each time a connection (or reconnection) completes.
    pub on_connected: Option<LifecycleHook>,
    /// Fired when the broker sends an ERROR frame.
    pub on_error: Option<ErrorHook>,
    /// Fired when the underlying socket closes unexpectedly.
    pub on_close: Option<LifecycleHook>,
    /// Fired when the broker acknowledges an orderly disconnect.
    pub on_server_disconnect: Option<LifecycleHook>,
}

/// Opaque unsubscribe handle returned by [`Transport::subscribe`].
///
/// Handles are only valid for the connection that produced them; after a
/// close they are dead weight and may be dropped without calling
/// [`SubscriptionHandle::unsubscribe`].
#[async_trait]
pub trait SubscriptionHandle: Send + Sync {
    /// Stop delivery for this subscription.
    async fn unsubscribe(&self);
}

/// One logical realtime connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether the connection handshake has completed and the link is live.
    fn is_connected(&self) -> bool;

    /// Begin connecting. Non-blocking: readiness is signaled through the
    /// `on_connected` hook, never through this method returning.
    async fn activate(&self);

    /// Tear the connection down and stop any reconnection attempts.
    async fn deactivate(&self);

    /// Register a server-push subscription on `destination` under `id`.
    async fn subscribe(
        &self,
        destination: &str,
        id: &str,
        handler: MessageHandler,
    ) -> KitResult<Box<dyn SubscriptionHandle>>;

    /// Publish a pre-serialized body to `destination`.
    async fn publish(&self, destination: &str, body: &str) -> KitResult<()>;
}

/// Produces transports; injected into the client so tests can count and
/// script connections.
pub trait TransportFactory: Send + Sync {
    fn create(&self, config: TransportConfig, hooks: LifecycleHooks) -> Arc<dyn Transport>;
}
