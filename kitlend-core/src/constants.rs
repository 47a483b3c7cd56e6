//! Application-wide constants.

/// Application name.
pub const APP_NAME: &str = "KitLend";

/// Application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Path at which the server mounts its SockJS/STOMP endpoint.
pub const WS_MOUNT_PATH: &str = "/ws";

/// Suffix selecting the raw-WebSocket transport of a SockJS mount.
pub const WS_RAW_SUFFIX: &str = "/websocket";

/// Heartbeat interval sent to and expected from the broker, in milliseconds.
pub const HEARTBEAT_MS: u64 = 4_000;

/// Delay between reconnection attempts after an unplanned disconnect, in
/// milliseconds. Fixed delay, no backoff.
pub const RECONNECT_DELAY_MS: u64 = 5_000;

/// Prefix for generated subscription ids (`sub-<timestamp>-<random>`).
pub const SUBSCRIPTION_ID_PREFIX: &str = "sub";

/// Broker destination prefix for broadcast topics.
pub const TOPIC_PREFIX: &str = "/topic";

/// Broker destination prefix for per-user queues.
pub const QUEUE_PREFIX: &str = "/queue";

/// File name under the data directory holding the persisted bearer token.
pub const AUTH_TOKEN_FILE: &str = "auth_token";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_path_pieces() {
        assert!(WS_MOUNT_PATH.starts_with('/'));
        assert!(WS_RAW_SUFFIX.starts_with('/'));
        assert_eq!(HEARTBEAT_MS, 4_000);
        assert_eq!(RECONNECT_DELAY_MS, 5_000);
    }
}
