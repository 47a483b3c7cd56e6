//! Inbound message model and typed payloads for the portal channels.
//!
//! Every server push is expected to carry a JSON body, but the contract is
//! best-effort: bodies that fail to parse are delivered as raw text instead
//! of being dropped, and the subscriber decides what to do with them.

use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// A server-pushed message as delivered to a subscription callback.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// The body parsed as JSON.
    Parsed(serde_json::Value),
    /// The body was not valid JSON; delivered verbatim.
    Raw(String),
}

impl InboundMessage {
    /// Parse a raw body, falling back to `Raw` when it is not JSON.
    pub fn from_body(body: String) -> Self {
        match serde_json::from_str::<serde_json::Value>(&body) {
            Ok(value) => InboundMessage::Parsed(value),
            Err(_) => InboundMessage::Raw(body),
        }
    }

    /// The parsed JSON value, if this message parsed.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            InboundMessage::Parsed(value) => Some(value),
            InboundMessage::Raw(_) => None,
        }
    }

    /// The raw text body, if this message did not parse.
    pub fn as_raw(&self) -> Option<&str> {
        match self {
            InboundMessage::Parsed(_) => None,
            InboundMessage::Raw(text) => Some(text),
        }
    }

    /// Decode the parsed JSON into a concrete payload type.
    pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        match self {
            InboundMessage::Parsed(value) => serde_json::from_value(value.clone()).ok(),
            InboundMessage::Raw(_) => None,
        }
    }
}

/// A user-facing notification pushed on `/queue/notifications/{userId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub id: i64,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub read: bool,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<String>,
}

/// A rental-request status change pushed to the requesting user or the
/// admin broadcast topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RentalRequestUpdate {
    pub id: i64,
    /// PENDING, APPROVED, REJECTED, RETURNED, OVERDUE.
    pub status: String,
    #[serde(rename = "kitName", default)]
    pub kit_name: Option<String>,
    #[serde(rename = "requesterId", default)]
    pub requester_id: Option<i64>,
}

/// A wallet balance patch pushed on `/queue/wallet/{userId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletBalanceUpdate {
    pub balance: f64,
    #[serde(default)]
    pub currency: Option<String>,
}

/// A wallet transaction pushed on `/queue/wallet-transactions/{userId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletTransaction {
    pub id: i64,
    pub amount: f64,
    /// DEPOSIT, RENTAL_FEE, PENALTY, REFUND.
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A penalty pushed on `/queue/penalties/{userId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PenaltyNotice {
    pub id: i64,
    pub amount: f64,
    #[serde(default)]
    pub reason: Option<String>,
}

/// A group membership change pushed on `/queue/groups/{userId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupUpdate {
    #[serde(rename = "groupId")]
    pub group_id: i64,
    /// MEMBER_ADDED, MEMBER_REMOVED, GROUP_RENAMED, GROUP_DELETED.
    pub action: String,
    #[serde(rename = "groupName", default)]
    pub group_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_body_parses() {
        let msg = InboundMessage::from_body(r#"{"id":1,"title":"Kit ready","message":"Pick up at lab 3"}"#.into());
        let value = msg.as_json().unwrap();
        assert_eq!(value["title"], "Kit ready");
        assert!(msg.as_raw().is_none());
    }

    #[test]
    fn test_non_json_body_falls_back_to_raw() {
        let msg = InboundMessage::from_body("PONG".into());
        assert_eq!(msg.as_raw(), Some("PONG"));
        assert!(msg.as_json().is_none());
        assert!(msg.decode::<NotificationPayload>().is_none());
    }

    #[test]
    fn test_decode_notification() {
        let msg = InboundMessage::from_body(
            r#"{"id":7,"title":"Approved","message":"Your rental was approved","read":false,"createdAt":"2025-04-01T10:00:00Z"}"#.into(),
        );
        let payload: NotificationPayload = msg.decode().unwrap();
        assert_eq!(payload.id, 7);
        assert!(!payload.read);
        assert_eq!(payload.created_at.as_deref(), Some("2025-04-01T10:00:00Z"));
    }

    #[test]
    fn test_decode_wallet_transaction() {
        let msg = InboundMessage::from_body(
            r#"{"id":12,"amount":-35.0,"type":"RENTAL_FEE","description":"ESP32 starter kit"}"#.into(),
        );
        let tx: WalletTransaction = msg.decode().unwrap();
        assert_eq!(tx.kind, "RENTAL_FEE");
        assert!(tx.amount < 0.0);
    }

    #[test]
    fn test_decode_rejects_mismatched_shape() {
        let msg = InboundMessage::from_body(r#"{"balance":100.0}"#.into());
        assert!(msg.decode::<NotificationPayload>().is_none());
        assert!(msg.decode::<WalletBalanceUpdate>().is_some());
    }
}
