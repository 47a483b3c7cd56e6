//! STOMP 1.2 frame model.
//!
//! A minimal wire representation: `COMMAND\nheader:value...\n\nbody\0`.
//! Heartbeats are bare newlines outside of any frame. Header octet escaping
//! is not applied; the lending broker never emits headers containing `:`,
//! `\n`, or `\\` in values.

use std::time::Duration;

use kitlend_core::{KitError, KitResult};

/// STOMP frame commands used by the client.
pub mod commands {
    pub const CONNECT: &str = "CONNECT";
    pub const CONNECTED: &str = "CONNECTED";
    pub const SUBSCRIBE: &str = "SUBSCRIBE";
    pub const UNSUBSCRIBE: &str = "UNSUBSCRIBE";
    pub const SEND: &str = "SEND";
    pub const MESSAGE: &str = "MESSAGE";
    pub const ERROR: &str = "ERROR";
    pub const DISCONNECT: &str = "DISCONNECT";
}

/// A single STOMP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    /// Create a new frame with no headers and an empty body.
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Append a header (builder style).
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Set the frame body (builder style).
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First header value with the given name, case-insensitive.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Serialize to the STOMP wire format including the NUL terminator.
    pub fn to_wire(&self) -> String {
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(&self.command);
        out.push('\n');
        for (k, v) in &self.headers {
            out.push_str(k);
            out.push(':');
            out.push_str(v);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    /// Parse a single frame from wire text.
    ///
    /// Returns `None` for heartbeat payloads (newlines only). A missing NUL
    /// terminator is tolerated since the WebSocket framing already delimits
    /// messages.
    pub fn parse(text: &str) -> KitResult<Option<Frame>> {
        let trimmed_terminator = text.trim_end_matches('\0');
        if trimmed_terminator.trim_matches(['\n', '\r']).is_empty() {
            return Ok(None);
        }

        let (head, body) = match trimmed_terminator.split_once("\n\n") {
            Some((head, body)) => (head, body),
            None => (trimmed_terminator, ""),
        };

        let mut lines = head.lines();
        let command = lines
            .next()
            .map(|l| l.trim_end_matches('\r').to_string())
            .filter(|c| !c.is_empty())
            .ok_or_else(|| KitError::Protocol("frame missing command".into()))?;

        let mut headers = Vec::new();
        for line in lines {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                continue;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| KitError::Protocol(format!("malformed header: {line}")))?;
            headers.push((name.to_string(), value.to_string()));
        }

        Ok(Some(Frame {
            command,
            headers,
            body: body.to_string(),
        }))
    }
}

/// The wire payload for an outgoing heartbeat.
pub const HEARTBEAT: &str = "\n";

/// Parse the STOMP `heart-beat` header value ("cx,cy", milliseconds).
/// Missing or invalid fields default to 0 (disabled).
pub fn parse_heartbeat_header(header: &str) -> (u64, u64) {
    let mut parts = header.split(',');
    let cx = parts
        .next()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0);
    let cy = parts
        .next()
        .and_then(|s| s.trim().parse::<u64>().ok())
        .unwrap_or(0);
    (cx, cy)
}

/// Negotiate heartbeat intervals between client and server.
///
/// Returns `(outgoing, incoming)`; an element is `None` when heartbeats are
/// disabled in that direction. Uses the STOMP rule of taking the maximum of
/// the corresponding client and server values, with 0 meaning disabled.
pub fn negotiate_heartbeats(
    client_out: u64,
    client_in: u64,
    server_out: u64,
    server_in: u64,
) -> (Option<Duration>, Option<Duration>) {
    let outgoing = if client_out == 0 || server_in == 0 {
        None
    } else {
        Some(Duration::from_millis(client_out.max(server_in)))
    };
    let incoming = if client_in == 0 || server_out == 0 {
        None
    } else {
        Some(Duration::from_millis(client_in.max(server_out)))
    };
    (outgoing, incoming)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_roundtrip() {
        let frame = Frame::new(commands::SEND)
            .header("destination", "/queue/wallet/42")
            .header("content-type", "application/json")
            .body(r#"{"balance":120.5}"#);

        let wire = frame.to_wire();
        assert!(wire.starts_with("SEND\ndestination:/queue/wallet/42\n"));
        assert!(wire.ends_with("{\"balance\":120.5}\0"));

        let parsed = Frame::parse(&wire).unwrap().unwrap();
        assert_eq!(parsed, frame);
    }

    #[test]
    fn test_parse_connected_frame() {
        let text = "CONNECTED\nversion:1.2\nheart-beat:4000,4000\n\n\0";
        let frame = Frame::parse(text).unwrap().unwrap();
        assert_eq!(frame.command, commands::CONNECTED);
        assert_eq!(frame.header_value("heart-beat"), Some("4000,4000"));
        assert_eq!(frame.header_value("HEART-BEAT"), Some("4000,4000"));
        assert!(frame.body.is_empty());
    }

    #[test]
    fn test_parse_heartbeat_as_none() {
        assert!(Frame::parse("\n").unwrap().is_none());
        assert!(Frame::parse("\r\n").unwrap().is_none());
        assert!(Frame::parse("").unwrap().is_none());
    }

    #[test]
    fn test_parse_malformed_header() {
        let text = "MESSAGE\nnot-a-header\n\nbody\0";
        assert!(Frame::parse(text).is_err());
    }

    #[test]
    fn test_parse_missing_terminator() {
        let text = "MESSAGE\nsubscription:user-wallet-42\ndestination:/queue/wallet/42\n\n{\"balance\":1}";
        let frame = Frame::parse(text).unwrap().unwrap();
        assert_eq!(frame.header_value("subscription"), Some("user-wallet-42"));
        assert_eq!(frame.body, "{\"balance\":1}");
    }

    #[test]
    fn test_heartbeat_header_parsing() {
        assert_eq!(parse_heartbeat_header("4000,4000"), (4000, 4000));
        assert_eq!(parse_heartbeat_header("0,10000"), (0, 10000));
        assert_eq!(parse_heartbeat_header("garbage"), (0, 0));
    }

    #[test]
    fn test_negotiate_heartbeats() {
        let (out, inc) = negotiate_heartbeats(4000, 4000, 10000, 2000);
        assert_eq!(out, Some(Duration::from_millis(4000)));
        assert_eq!(inc, Some(Duration::from_millis(10000)));

        // Either side advertising 0 disables that direction
        let (out, inc) = negotiate_heartbeats(4000, 4000, 0, 0);
        assert_eq!(out, None);
        assert_eq!(inc, None);
    }
}
