//! Production transport: STOMP 1.2 over a WebSocket.
//!
//! A background task owns the socket for the whole transport lifetime:
//! handshake (bearer token attached as the HTTP `Authorization` header and
//! repeated on the CONNECT frame), heartbeat send ticker and receive
//! watchdog, MESSAGE dispatch to per-subscription handlers, and a
//! fixed-delay reconnect loop after unplanned closes. Subscriptions do not
//! survive a reconnect; handlers are cleared when the socket drops and the
//! client re-registers through its own pending queue.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::time::interval;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use kitlend_core::{KitError, KitResult};

use crate::frame::{self, commands, negotiate_heartbeats, parse_heartbeat_header, Frame};
use crate::transport::{
    ErrorFrame, LifecycleHooks, MessageHandler, SubscriptionHandle, Transport, TransportConfig,
    TransportFactory,
};

/// Idle interval used when a heartbeat direction is disabled.
const DISABLED_INTERVAL: Duration = Duration::from_secs(86_400);

/// Factory producing [`WsTransport`] instances.
#[derive(Default)]
pub struct WsTransportFactory;

impl TransportFactory for WsTransportFactory {
    fn create(&self, config: TransportConfig, hooks: LifecycleHooks) -> Arc<dyn Transport> {
        Arc::new(WsTransport::new(config, hooks))
    }
}

/// Commands from the transport's public surface to the connection task.
#[derive(Debug)]
enum Command {
    Subscribe { destination: String, id: String },
    Unsubscribe { id: String },
    Publish { destination: String, body: String },
}

impl Command {
    fn to_frame(&self) -> Frame {
        match self {
            Command::Subscribe { destination, id } => Frame::new(commands::SUBSCRIBE)
                .header("id", id)
                .header("destination", destination)
                .header("ack", "auto"),
            Command::Unsubscribe { id } => Frame::new(commands::UNSUBSCRIBE).header("id", id),
            Command::Publish { destination, body } => Frame::new(commands::SEND)
                .header("destination", destination)
                .header("content-type", "application/json")
                .body(body.clone()),
        }
    }
}

/// State shared between the transport surface and the connection task.
struct Shared {
    config: TransportConfig,
    hooks: LifecycleHooks,
    connected: AtomicBool,
    shutting_down: AtomicBool,
    shutdown: Notify,
    handlers: Mutex<HashMap<String, MessageHandler>>,
}

/// How one connection attempt ended.
enum Exit {
    /// Orderly deactivation; do not reconnect.
    Shutdown,
    /// Socket lost or handshake failed; reconnect after the fixed delay.
    Lost,
}

/// WebSocket/STOMP transport.
///
/// The command channel is unbounded: the connected hook registers queued
/// subscriptions before the frame pump starts polling commands, so a
/// bounded channel could fill up and deadlock the connection task against
/// its own producers.
pub struct WsTransport {
    shared: Arc<Shared>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    cmd_rx: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl WsTransport {
    fn new(config: TransportConfig, hooks: LifecycleHooks) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        Self {
            shared: Arc::new(Shared {
                config,
                hooks,
                connected: AtomicBool::new(false),
                shutting_down: AtomicBool::new(false),
                shutdown: Notify::new(),
                handlers: Mutex::new(HashMap::new()),
            }),
            cmd_tx,
            cmd_rx: Mutex::new(Some(cmd_rx)),
            task: Mutex::new(None),
        }
    }

    /// Outer loop: one `run_connection` per attempt, fixed delay between
    /// unplanned exits, no attempt cap.
    async fn run_loop(shared: Arc<Shared>, mut cmd_rx: mpsc::UnboundedReceiver<Command>) {
        loop {
            if shared.shutting_down.load(Ordering::SeqCst) {
                break;
            }
            match Self::run_connection(&shared, &mut cmd_rx).await {
                Exit::Shutdown => {
                    shared.connected.store(false, Ordering::SeqCst);
                    shared.handlers.lock().await.clear();
                    if let Some(hook) = &shared.hooks.on_server_disconnect {
                        hook().await;
                    }
                    break;
                }
                Exit::Lost => {
                    shared.connected.store(false, Ordering::SeqCst);
                    shared.handlers.lock().await.clear();
                    // Commands queued for the dead session are stale now.
                    while cmd_rx.try_recv().is_ok() {}
                    if let Some(hook) = &shared.hooks.on_close {
                        hook().await;
                    }
                    warn!(
                        "connection lost, retrying in {:.0}s",
                        shared.config.reconnect_delay.as_secs_f64()
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(shared.config.reconnect_delay) => {}
                        _ = shared.shutdown.notified() => break,
                    }
                }
            }
        }
        debug!("connection task finished");
    }

    /// One full connection attempt: WebSocket handshake, STOMP session,
    /// then the frame pump until the session ends.
    async fn run_connection(
        shared: &Arc<Shared>,
        cmd_rx: &mut mpsc::UnboundedReceiver<Command>,
    ) -> Exit {
        let mut request = match shared.config.url.as_str().into_client_request() {
            Ok(request) => request,
            Err(e) => {
                error!("invalid websocket url {}: {e}", shared.config.url);
                return Exit::Lost;
            }
        };
        if let Some(token) = &shared.config.auth_token {
            match HeaderValue::from_str(&format!("Bearer {token}")) {
                Ok(value) => {
                    request.headers_mut().insert(AUTHORIZATION, value);
                }
                Err(_) => warn!("auth token not header-safe, connecting unauthenticated"),
            }
        }

        let ws = tokio::select! {
            _ = shared.shutdown.notified() => return Exit::Shutdown,
            result = connect_async(request) => match result {
                Ok((ws, _response)) => ws,
                Err(e) => {
                    warn!("websocket handshake to {} failed: {e}", shared.config.url);
                    return Exit::Lost;
                }
            }
        };
        let (mut sink, mut stream) = ws.split();

        if sink
            .send(Message::Text(connect_frame(&shared.config).to_wire().into()))
            .await
            .is_err()
        {
            return Exit::Lost;
        }

        // Await CONNECTED before pumping frames.
        let connected_frame = loop {
            tokio::select! {
                _ = shared.shutdown.notified() => return Exit::Shutdown,
                msg = stream.next() => {
                    let msg = match msg {
                        Some(Ok(msg)) => msg,
                        _ => return Exit::Lost,
                    };
                    let text = match msg.into_text() {
                        Ok(text) => text,
                        Err(_) => continue,
                    };
                    match Frame::parse(&text) {
                        Ok(Some(f)) if f.command == commands::CONNECTED => break f,
                        Ok(Some(f)) if f.command == commands::ERROR => {
                            if let Some(hook) = &shared.hooks.on_error {
                                hook(error_surface(&f)).await;
                            }
                            return Exit::Lost;
                        }
                        Ok(Some(f)) => debug!("ignoring {} frame before CONNECTED", f.command),
                        Ok(None) => {}
                        Err(e) => warn!("dropping malformed frame: {e}"),
                    }
                }
            }
        };

        let server_hb = connected_frame.header_value("heart-beat").unwrap_or("0,0");
        let (server_out, server_in) = parse_heartbeat_header(server_hb);
        let (send_interval, recv_interval) = negotiate_heartbeats(
            shared.config.heartbeat_outgoing.as_millis() as u64,
            shared.config.heartbeat_incoming.as_millis() as u64,
            server_out,
            server_in,
        );

        shared.connected.store(true, Ordering::SeqCst);
        info!(
            "stomp session established (heartbeat out={:?} in={:?})",
            send_interval, recv_interval
        );
        if let Some(hook) = &shared.hooks.on_connected {
            hook().await;
        }

        let mut send_tick = interval(send_interval.unwrap_or(DISABLED_INTERVAL));
        let mut watchdog = interval(recv_interval.unwrap_or(DISABLED_INTERVAL));
        let mut last_received = Instant::now();

        loop {
            tokio::select! {
                _ = shared.shutdown.notified() => {
                    let bye = Frame::new(commands::DISCONNECT).to_wire();
                    let _ = sink.send(Message::Text(bye.into())).await;
                    let _ = sink.close().await;
                    return Exit::Shutdown;
                }
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => {
                        let wire = cmd.to_frame().to_wire();
                        if sink.send(Message::Text(wire.into())).await.is_err() {
                            return Exit::Lost;
                        }
                    }
                    // All senders dropped: the transport itself is gone.
                    None => return Exit::Shutdown,
                },
                msg = stream.next() => {
                    let msg = match msg {
                        Some(Ok(msg)) => msg,
                        Some(Err(e)) => {
                            warn!("websocket read failed: {e}");
                            return Exit::Lost;
                        }
                        None => return Exit::Lost,
                    };
                    last_received = Instant::now();
                    if msg.is_close() {
                        return Exit::Lost;
                    }
                    let text = match msg.into_text() {
                        Ok(text) => text,
                        Err(_) => continue,
                    };
                    match Frame::parse(&text) {
                        Ok(Some(f)) if f.command == commands::MESSAGE => {
                            Self::dispatch(shared, &f).await;
                        }
                        Ok(Some(f)) if f.command == commands::ERROR => {
                            warn!("broker error: {}", f.header_value("message").unwrap_or("<none>"));
                            if let Some(hook) = &shared.hooks.on_error {
                                hook(error_surface(&f)).await;
                            }
                        }
                        Ok(Some(f)) => debug!("ignoring {} frame", f.command),
                        Ok(None) => {} // heartbeat
                        Err(e) => warn!("dropping malformed frame: {e}"),
                    }
                }
                _ = send_tick.tick() => {
                    if sink.send(Message::Text(frame::HEARTBEAT.into())).await.is_err() {
                        return Exit::Lost;
                    }
                }
                _ = watchdog.tick() => {
                    if let Some(expected) = recv_interval {
                        if last_received.elapsed() > expected * 2 {
                            warn!("heartbeat watchdog expired, dropping connection");
                            return Exit::Lost;
                        }
                    }
                }
            }
        }
    }

    /// Route a MESSAGE frame to the handler registered for its
    /// `subscription` header.
    async fn dispatch(shared: &Arc<Shared>, f: &Frame) {
        let sub_id = match f.header_value("subscription") {
            Some(id) => id,
            None => {
                warn!("MESSAGE frame without subscription header, dropping");
                return;
            }
        };
        let handler = shared.handlers.lock().await.get(sub_id).cloned();
        match handler {
            Some(handler) => handler(f.body.clone()),
            // Can happen briefly after an unsubscribe already in flight.
            None => debug!("no handler for subscription {sub_id}, dropping message"),
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    async fn activate(&self) {
        let cmd_rx = match self.cmd_rx.lock().await.take() {
            Some(rx) => rx,
            None => {
                debug!("activate: already activated");
                return;
            }
        };
        let shared = self.shared.clone();
        let handle = tokio::spawn(Self::run_loop(shared, cmd_rx));
        *self.task.lock().await = Some(handle);
    }

    async fn deactivate(&self) {
        self.shared.shutting_down.store(true, Ordering::SeqCst);
        self.shared.shutdown.notify_one();
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
        }
        self.shared.connected.store(false, Ordering::SeqCst);
    }

    async fn subscribe(
        &self,
        destination: &str,
        id: &str,
        handler: MessageHandler,
    ) -> KitResult<Box<dyn SubscriptionHandle>> {
        self.shared.handlers.lock().await.insert(id.to_string(), handler);
        self.cmd_tx
            .send(Command::Subscribe {
                destination: destination.to_string(),
                id: id.to_string(),
            })
            .map_err(|_| KitError::Transport("connection task gone".into()))?;
        Ok(Box::new(WsSubscriptionHandle {
            id: id.to_string(),
            cmd_tx: self.cmd_tx.clone(),
            shared: self.shared.clone(),
        }))
    }

    async fn publish(&self, destination: &str, body: &str) -> KitResult<()> {
        if !self.is_connected() {
            return Err(KitError::NotConnected(format!(
                "publish to {destination} dropped"
            )));
        }
        self.cmd_tx
            .send(Command::Publish {
                destination: destination.to_string(),
                body: body.to_string(),
            })
            .map_err(|_| KitError::Transport("connection task gone".into()))
    }
}

/// Unsubscribe handle for one WebSocket subscription.
struct WsSubscriptionHandle {
    id: String,
    cmd_tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
}

#[async_trait]
impl SubscriptionHandle for WsSubscriptionHandle {
    async fn unsubscribe(&self) {
        self.shared.handlers.lock().await.remove(&self.id);
        if self
            .cmd_tx
            .send(Command::Unsubscribe { id: self.id.clone() })
            .is_err()
        {
            debug!("unsubscribe {}: connection task gone", self.id);
        }
    }
}

/// Build the CONNECT frame for a session.
fn connect_frame(config: &TransportConfig) -> Frame {
    let heartbeat = format!(
        "{},{}",
        config.heartbeat_outgoing.as_millis(),
        config.heartbeat_incoming.as_millis()
    );
    let mut f = Frame::new(commands::CONNECT)
        .header("accept-version", "1.2")
        .header("host", host_of(&config.url))
        .header("heart-beat", &heartbeat);
    if let Some(token) = &config.auth_token {
        f = f.header("Authorization", &format!("Bearer {token}"));
    }
    f
}

/// Extract the host (with port, if any) from a ws(s) URL.
fn host_of(url: &str) -> &str {
    let rest = url
        .strip_prefix("wss://")
        .or_else(|| url.strip_prefix("ws://"))
        .unwrap_or(url);
    rest.split('/').next().unwrap_or(rest)
}

/// Project an ERROR frame onto the hook surface.
fn error_surface(f: &Frame) -> ErrorFrame {
    ErrorFrame {
        message: f.header_value("message").unwrap_or_default().to_string(),
        body: f.body.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(token: Option<&str>) -> TransportConfig {
        TransportConfig {
            url: "wss://lend.example.edu/ws/websocket".into(),
            auth_token: token.map(|t| t.to_string()),
            heartbeat_outgoing: Duration::from_millis(4_000),
            heartbeat_incoming: Duration::from_millis(4_000),
            reconnect_delay: Duration::from_millis(5_000),
        }
    }

    #[test]
    fn test_host_of() {
        assert_eq!(host_of("wss://lend.example.edu/ws/websocket"), "lend.example.edu");
        assert_eq!(host_of("ws://localhost:8080/ws/websocket"), "localhost:8080");
        assert_eq!(host_of("lend.example.edu"), "lend.example.edu");
    }

    #[test]
    fn test_connect_frame_with_token() {
        let f = connect_frame(&test_config(Some("jwt-abc")));
        assert_eq!(f.command, commands::CONNECT);
        assert_eq!(f.header_value("accept-version"), Some("1.2"));
        assert_eq!(f.header_value("host"), Some("lend.example.edu"));
        assert_eq!(f.header_value("heart-beat"), Some("4000,4000"));
        assert_eq!(f.header_value("authorization"), Some("Bearer jwt-abc"));
    }

    #[test]
    fn test_connect_frame_without_token() {
        let f = connect_frame(&test_config(None));
        assert_eq!(f.header_value("authorization"), None);
    }

    #[test]
    fn test_command_frames() {
        let f = Command::Subscribe {
            destination: "/queue/wallet/42".into(),
            id: "user-wallet-42".into(),
        }
        .to_frame();
        assert_eq!(f.command, commands::SUBSCRIBE);
        assert_eq!(f.header_value("destination"), Some("/queue/wallet/42"));
        assert_eq!(f.header_value("id"), Some("user-wallet-42"));
        assert_eq!(f.header_value("ack"), Some("auto"));

        let f = Command::Unsubscribe { id: "user-wallet-42".into() }.to_frame();
        assert_eq!(f.command, commands::UNSUBSCRIBE);
        assert_eq!(f.header_value("id"), Some("user-wallet-42"));

        let f = Command::Publish {
            destination: "/app/ping".into(),
            body: r#"{"at":1}"#.into(),
        }
        .to_frame();
        assert_eq!(f.command, commands::SEND);
        assert_eq!(f.header_value("content-type"), Some("application/json"));
        assert_eq!(f.body, r#"{"at":1}"#);
    }

    #[test]
    fn test_error_surface() {
        let f = Frame::new(commands::ERROR)
            .header("message", "access denied")
            .body("detail text");
        let surface = error_surface(&f);
        assert_eq!(surface.message, "access denied");
        assert_eq!(surface.body, "detail text");
    }

    #[tokio::test]
    async fn test_bulk_subscribes_never_block_on_command_queue() {
        let transport = WsTransport::new(test_config(None), LifecycleHooks::default());
        let handler: MessageHandler = Arc::new(|_| {});

        // Nothing consumes commands here; every registration must still
        // complete immediately regardless of how many are queued.
        let register_all = async {
            for i in 0..200 {
                transport
                    .subscribe("/queue/notifications/1", &format!("sub-{i}"), handler.clone())
                    .await
                    .unwrap();
            }
        };
        tokio::time::timeout(Duration::from_secs(1), register_all)
            .await
            .expect("queued subscribes must not block");
        assert_eq!(transport.shared.handlers.lock().await.len(), 200);
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_stays_disconnected_until_deactivated() {
        let factory = WsTransportFactory;
        let transport = factory.create(
            TransportConfig {
                url: "ws://127.0.0.1:1/ws/websocket".into(),
                ..test_config(None)
            },
            LifecycleHooks::default(),
        );
        transport.activate().await;
        assert!(!transport.is_connected());

        // Sends are refused while disconnected.
        let result = transport.publish("/app/ping", "{}").await;
        assert!(result.is_err());

        transport.deactivate().await;
        assert!(!transport.is_connected());
    }
}
