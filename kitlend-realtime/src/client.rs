//! Realtime channel client.
//!
//! Owns one logical connection to the lending server's STOMP endpoint and
//! the subscription bookkeeping on top of it: connect/disconnect, generic
//! subscribe/unsubscribe/send, and named helpers for each push channel the
//! portals consume.
//!
//! The client never constructs sockets itself; it drives an injected
//! [`TransportFactory`], and reads the bearer token from an injected
//! [`TokenProvider`] at connect time. Subscriptions requested while
//! disconnected are queued and registered once by the connected hook
//! rather than re-entering `subscribe` recursively.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use kitlend_core::auth::TokenProvider;
use kitlend_core::config::AppConfig;
use kitlend_core::{constants, KitResult};

use crate::channels::PushChannel;
use crate::message::InboundMessage;
use crate::transport::{
    ErrorFrame, ErrorHook, LifecycleHook, LifecycleHooks, MessageHandler, SubscriptionHandle,
    Transport, TransportConfig, TransportFactory,
};

/// Callback receiving server pushes for one subscription.
pub type ChannelCallback = Arc<dyn Fn(InboundMessage) + Send + Sync>;

/// Callback fired when a connection attempt resolves.
pub type ConnectCallback = Arc<dyn Fn() + Send + Sync>;

/// Callback fired when the broker reports a protocol-level error.
pub type ErrorCallback = Arc<dyn Fn(&ErrorFrame) + Send + Sync>;

/// Connection parameters for the realtime client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Full WebSocket endpoint URL.
    pub ws_url: String,
    /// Outgoing heartbeat interval.
    pub heartbeat_outgoing: Duration,
    /// Expected incoming heartbeat interval.
    pub heartbeat_incoming: Duration,
    /// Fixed delay between reconnection attempts.
    pub reconnect_delay: Duration,
}

impl ClientConfig {
    /// Config with the default heartbeat (4s) and reconnect delay (5s).
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            heartbeat_outgoing: Duration::from_millis(constants::HEARTBEAT_MS),
            heartbeat_incoming: Duration::from_millis(constants::HEARTBEAT_MS),
            reconnect_delay: Duration::from_millis(constants::RECONNECT_DELAY_MS),
        }
    }

    /// Derive the client config from the application configuration.
    pub fn from_app_config(config: &AppConfig) -> KitResult<Self> {
        Ok(Self {
            ws_url: config.server.ws_url()?,
            heartbeat_outgoing: Duration::from_millis(config.realtime.heartbeat_outgoing_ms),
            heartbeat_incoming: Duration::from_millis(config.realtime.heartbeat_incoming_ms),
            reconnect_delay: Duration::from_millis(config.realtime.reconnect_delay_ms),
        })
    }
}

/// A subscription requested while disconnected, registered once the
/// connection resolves.
struct PendingSubscribe {
    destination: String,
    id: String,
    callback: ChannelCallback,
}

/// Mutable client state behind one lock: the transport handle, the
/// connected flag, the subscription registry, and the queues drained by the
/// connected hook.
#[derive(Default)]
struct ClientState {
    transport: Option<Arc<dyn Transport>>,
    connected: bool,
    registry: HashMap<String, Box<dyn SubscriptionHandle>>,
    pending_subscribes: Vec<PendingSubscribe>,
    connect_callbacks: Vec<ConnectCallback>,
    error_callbacks: Vec<ErrorCallback>,
}

/// Client for the lending server's realtime push channels.
///
/// At most one transport is active per instance. Portals in the same
/// process typically share one instance via [`init_shared`]/[`shared`];
/// the deterministic per-channel subscription ids keep their
/// subscriptions from colliding.
pub struct RealtimeChannelClient {
    config: ClientConfig,
    factory: Arc<dyn TransportFactory>,
    tokens: Arc<dyn TokenProvider>,
    state: Mutex<ClientState>,
}

static SHARED: OnceLock<Arc<RealtimeChannelClient>> = OnceLock::new();

/// Install the process-wide shared client. The first call wins; later
/// calls return the already-installed instance.
pub fn init_shared(client: Arc<RealtimeChannelClient>) -> Arc<RealtimeChannelClient> {
    SHARED.get_or_init(|| client).clone()
}

/// The process-wide shared client, if one was installed.
pub fn shared() -> Option<Arc<RealtimeChannelClient>> {
    SHARED.get().cloned()
}

impl RealtimeChannelClient {
    /// Create a client with injected transport factory and token provider.
    pub fn new(
        config: ClientConfig,
        factory: Arc<dyn TransportFactory>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            factory,
            tokens,
            state: Mutex::new(ClientState::default()),
        })
    }

    /// Open the realtime connection.
    ///
    /// Non-blocking: readiness is signaled through `on_connected`, never by
    /// this method returning. Calling while already connected is a no-op
    /// that still fires `on_connected` before returning, so portals can call
    /// `connect` defensively before every subscribe. Calling while a connect
    /// is in flight queues the callback to fire on resolution. `on_error` is
    /// honored only by the call that constructs the transport; later calls
    /// leave the existing error callbacks untouched.
    pub async fn connect(
        self: &Arc<Self>,
        on_connected: Option<ConnectCallback>,
        on_error: Option<ErrorCallback>,
    ) {
        let mut state = self.state.lock().await;

        // Error callbacks are registered only by the connect that constructs
        // the transport; defensive re-connects would otherwise stack the
        // same callback and deliver one ERROR frame many times.
        if let Some(transport) = state.transport.clone() {
            if transport.is_connected() {
                drop(state);
                debug!("connect: already connected");
                if let Some(cb) = on_connected {
                    cb();
                }
            } else {
                debug!("connect: attempt already in flight, queueing callback");
                if let Some(cb) = on_connected {
                    state.connect_callbacks.push(cb);
                }
            }
            return;
        }

        if let Some(cb) = on_connected {
            state.connect_callbacks.push(cb);
        }
        if let Some(cb) = on_error {
            state.error_callbacks.push(cb);
        }

        let transport_config = TransportConfig {
            url: self.config.ws_url.clone(),
            auth_token: self.tokens.token(),
            heartbeat_outgoing: self.config.heartbeat_outgoing,
            heartbeat_incoming: self.config.heartbeat_incoming,
            reconnect_delay: self.config.reconnect_delay,
        };
        let transport = self.factory.create(transport_config, self.lifecycle_hooks());
        state.transport = Some(transport.clone());
        state.connected = false;
        drop(state);

        info!("connecting realtime channel to {}", self.config.ws_url);
        transport.activate().await;
    }

    /// Close the connection, unsubscribing every registered subscription
    /// first. Idempotent: calling without an active connection is a no-op.
    pub async fn disconnect(&self) {
        let (transport, handles) = {
            let mut state = self.state.lock().await;
            let transport = state.transport.take();
            state.connected = false;
            state.pending_subscribes.clear();
            state.connect_callbacks.clear();
            state.error_callbacks.clear();
            let handles: Vec<(String, Box<dyn SubscriptionHandle>)> =
                state.registry.drain().collect();
            (transport, handles)
        };

        let transport = match transport {
            Some(t) => t,
            None => {
                debug!("disconnect: no active connection");
                return;
            }
        };

        for (id, handle) in handles {
            handle.unsubscribe().await;
            debug!("unsubscribed {id}");
        }
        transport.deactivate().await;
        info!("realtime channel disconnected");
    }

    /// Subscribe to an arbitrary destination.
    ///
    /// Returns the subscription id when registered immediately. When the
    /// client is not connected, the subscription is queued, at most one
    /// connection attempt is triggered, and `None` is returned: the queued
    /// entry is registered under the same id by the connected hook, so
    /// callers using deterministic ids can still unsubscribe later.
    pub async fn subscribe(
        self: &Arc<Self>,
        destination: &str,
        callback: ChannelCallback,
        id: Option<String>,
    ) -> Option<String> {
        if destination.is_empty() {
            warn!("subscribe: empty destination, ignoring");
            return None;
        }
        let id = id.unwrap_or_else(generate_subscription_id);

        let mut state = self.state.lock().await;
        let live = state.connected
            && state
                .transport
                .as_ref()
                .map(|t| t.is_connected())
                .unwrap_or(false);

        if !live {
            warn!("subscribe to {destination} while disconnected, queueing");
            state.pending_subscribes.retain(|p| p.id != id);
            state.pending_subscribes.push(PendingSubscribe {
                destination: destination.to_string(),
                id,
                callback,
            });
            let needs_connect = state.transport.is_none();
            drop(state);
            if needs_connect {
                self.connect(None, None).await;
            }
            return None;
        }

        let transport = state.transport.clone()?;
        match Self::register(&mut state, &transport, destination, id.clone(), callback).await {
            Ok(()) => {
                debug!("subscribed to {destination} as {id}");
                Some(id)
            }
            Err(e) => {
                error!("subscribe to {destination} failed: {e}");
                None
            }
        }
    }

    /// Remove a subscription. Unknown or already-removed ids are a no-op.
    pub async fn unsubscribe(&self, id: &str) {
        let handle = {
            let mut state = self.state.lock().await;
            state.pending_subscribes.retain(|p| p.id != id);
            state.registry.remove(id)
        };
        match handle {
            Some(handle) => {
                handle.unsubscribe().await;
                debug!("unsubscribed {id}");
            }
            None => debug!("unsubscribe: unknown id {id}, ignoring"),
        }
    }

    /// Publish a JSON-serialized body to a destination.
    ///
    /// Sends are best-effort: when disconnected the message is logged and
    /// dropped, never queued, and nothing is thrown to the caller.
    pub async fn send<T: Serialize>(&self, destination: &str, body: &T) {
        let transport = {
            let state = self.state.lock().await;
            match &state.transport {
                Some(t) if state.connected && t.is_connected() => t.clone(),
                _ => {
                    error!("send to {destination} dropped: not connected");
                    return;
                }
            }
        };

        let body = match serde_json::to_string(body) {
            Ok(body) => body,
            Err(e) => {
                error!("send to {destination} dropped: serialization failed: {e}");
                return;
            }
        };
        if let Err(e) = transport.publish(destination, &body).await {
            error!("publish to {destination} failed: {e}");
        }
    }

    /// Whether the client currently reports a live connection.
    pub async fn is_connected(&self) -> bool {
        let state = self.state.lock().await;
        state.connected
            && state
                .transport
                .as_ref()
                .map(|t| t.is_connected())
                .unwrap_or(false)
    }

    /// Number of registered subscriptions.
    pub async fn subscription_count(&self) -> usize {
        self.state.lock().await.registry.len()
    }

    /// Whether a subscription with the given id is registered.
    pub async fn has_subscription(&self, id: &str) -> bool {
        self.state.lock().await.registry.contains_key(id)
    }

    // -- Named channel helpers --

    /// Subscribe to a named push channel under its deterministic id.
    pub async fn subscribe_channel(
        self: &Arc<Self>,
        channel: &PushChannel,
        callback: ChannelCallback,
    ) -> Option<String> {
        self.subscribe(&channel.destination(), callback, Some(channel.subscription_id()))
            .await
    }

    /// Admin broadcast: all rental-request activity.
    pub async fn subscribe_to_admin_rental_requests(
        self: &Arc<Self>,
        callback: ChannelCallback,
    ) -> Option<String> {
        self.subscribe_channel(&PushChannel::AdminRentalRequests, callback).await
    }

    /// Admin broadcast: system-wide notifications.
    pub async fn subscribe_to_admin_notifications(
        self: &Arc<Self>,
        callback: ChannelCallback,
    ) -> Option<String> {
        self.subscribe_channel(&PushChannel::AdminNotifications, callback).await
    }

    /// Per-user notifications.
    pub async fn subscribe_to_user_notifications(
        self: &Arc<Self>,
        user_id: &str,
        callback: ChannelCallback,
    ) -> Option<String> {
        self.subscribe_channel(
            &PushChannel::UserNotifications { user_id: user_id.to_string() },
            callback,
        )
        .await
    }

    /// Per-user rental-request status changes.
    pub async fn subscribe_to_user_rental_requests(
        self: &Arc<Self>,
        user_id: &str,
        callback: ChannelCallback,
    ) -> Option<String> {
        self.subscribe_channel(
            &PushChannel::UserRentalRequests { user_id: user_id.to_string() },
            callback,
        )
        .await
    }

    /// Per-user wallet balance patches.
    pub async fn subscribe_to_user_wallet(
        self: &Arc<Self>,
        user_id: &str,
        callback: ChannelCallback,
    ) -> Option<String> {
        self.subscribe_channel(
            &PushChannel::UserWallet { user_id: user_id.to_string() },
            callback,
        )
        .await
    }

    /// Per-user wallet transaction feed.
    pub async fn subscribe_to_user_wallet_transactions(
        self: &Arc<Self>,
        user_id: &str,
        callback: ChannelCallback,
    ) -> Option<String> {
        self.subscribe_channel(
            &PushChannel::UserWalletTransactions { user_id: user_id.to_string() },
            callback,
        )
        .await
    }

    /// Per-user penalty notices.
    pub async fn subscribe_to_user_penalties(
        self: &Arc<Self>,
        user_id: &str,
        callback: ChannelCallback,
    ) -> Option<String> {
        self.subscribe_channel(
            &PushChannel::UserPenalties { user_id: user_id.to_string() },
            callback,
        )
        .await
    }

    /// Per-user group membership changes.
    pub async fn subscribe_to_user_groups(
        self: &Arc<Self>,
        user_id: &str,
        callback: ChannelCallback,
    ) -> Option<String> {
        self.subscribe_channel(
            &PushChannel::UserGroups { user_id: user_id.to_string() },
            callback,
        )
        .await
    }

    // -- Lifecycle hooks --

    fn lifecycle_hooks(self: &Arc<Self>) -> LifecycleHooks {
        let weak = Arc::downgrade(self);

        let on_connected: LifecycleHook = {
            let weak = weak.clone();
            Arc::new(move || {
                let weak = weak.clone();
                Box::pin(async move {
                    if let Some(client) = weak.upgrade() {
                        client.handle_connected().await;
                    }
                })
            })
        };

        let on_error: ErrorHook = {
            let weak = weak.clone();
            Arc::new(move |frame: ErrorFrame| {
                let weak = weak.clone();
                Box::pin(async move {
                    if let Some(client) = weak.upgrade() {
                        client.handle_error(frame).await;
                    }
                })
            })
        };

        let on_close: LifecycleHook = {
            let weak = weak.clone();
            Arc::new(move || {
                let weak = weak.clone();
                Box::pin(async move {
                    if let Some(client) = weak.upgrade() {
                        client.handle_closed("transport closed").await;
                    }
                })
            })
        };

        let on_server_disconnect: LifecycleHook = Arc::new(move || {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(client) = weak.upgrade() {
                    client.handle_closed("server disconnect").await;
                }
            })
        });

        LifecycleHooks {
            on_connected: Some(on_connected),
            on_error: Some(on_error),
            on_close: Some(on_close),
            on_server_disconnect: Some(on_server_disconnect),
        }
    }

    /// Connection (or reconnection) resolved: mark connected, drain the
    /// pending subscription queue once, then fire queued connect callbacks.
    async fn handle_connected(&self) {
        let (transport, pending, callbacks) = {
            let mut state = self.state.lock().await;
            state.connected = true;
            let transport = match state.transport.clone() {
                Some(t) => t,
                None => return,
            };
            (
                transport,
                std::mem::take(&mut state.pending_subscribes),
                std::mem::take(&mut state.connect_callbacks),
            )
        };

        info!(
            "realtime channel connected ({} queued subscription(s))",
            pending.len()
        );
        for sub in pending {
            let mut state = self.state.lock().await;
            if let Err(e) =
                Self::register(&mut state, &transport, &sub.destination, sub.id, sub.callback).await
            {
                error!("queued subscription to {} failed: {e}", sub.destination);
            }
        }
        for cb in callbacks {
            cb();
        }
    }

    /// Broker ERROR frame: mark disconnected and surface the frame to every
    /// registered error callback. Retry, if any, belongs to the transport.
    async fn handle_error(&self, frame: ErrorFrame) {
        let callbacks = {
            let mut state = self.state.lock().await;
            state.connected = false;
            state.error_callbacks.clone()
        };
        warn!("broker error frame: {}", frame.message);
        for cb in callbacks {
            cb(&frame);
        }
    }

    /// Socket gone: the registry's handles are invalid, so it is cleared
    /// without individual unsubscribes.
    async fn handle_closed(&self, reason: &str) {
        let mut state = self.state.lock().await;
        state.connected = false;
        let dropped = state.registry.len();
        state.registry.clear();
        if dropped > 0 {
            warn!("connection lost ({reason}), dropped {dropped} subscription(s)");
        } else {
            debug!("connection closed ({reason})");
        }
    }

    /// Register a subscription on the transport, wrapping the callback with
    /// JSON-or-raw delivery. A same-id entry is unsubscribed first so the
    /// registry never holds duplicates for one logical channel.
    async fn register(
        state: &mut ClientState,
        transport: &Arc<dyn Transport>,
        destination: &str,
        id: String,
        callback: ChannelCallback,
    ) -> KitResult<()> {
        if let Some(old) = state.registry.remove(&id) {
            old.unsubscribe().await;
            debug!("replacing existing subscription {id}");
        }
        let handler: MessageHandler = Arc::new(move |body: String| {
            callback(InboundMessage::from_body(body));
        });
        let handle = transport.subscribe(destination, &id, handler).await?;
        state.registry.insert(id, handle);
        Ok(())
    }
}

/// Generate a unique subscription id (`sub-<timestamp>-<random>`).
fn generate_subscription_id() -> String {
    format!(
        "{}-{}-{:04x}",
        constants::SUBSCRIPTION_ID_PREFIX,
        chrono::Utc::now().timestamp_millis(),
        rand::random::<u16>()
    )
}
