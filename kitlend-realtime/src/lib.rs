//! Realtime push channels for the KitLend client.
//!
//! This crate wraps a STOMP 1.2 session over a WebSocket behind
//! [`RealtimeChannelClient`]: connection lifecycle with automatic
//! reconnection, named subscription management for the portal channels
//! (rental requests, notifications, wallet, penalties, groups), and
//! best-effort JSON delivery to subscriber callbacks.
//!
//! The transport is injectable: production uses [`ws::WsTransportFactory`],
//! tests drive the client with an in-memory fake.

pub mod channels;
pub mod client;
pub mod frame;
pub mod message;
pub mod transport;
pub mod ws;

pub use channels::PushChannel;
pub use client::{init_shared, shared, ChannelCallback, ClientConfig, RealtimeChannelClient};
pub use message::InboundMessage;
pub use transport::{
    ErrorFrame, LifecycleHooks, Transport, TransportConfig, TransportFactory,
};
pub use ws::WsTransportFactory;
