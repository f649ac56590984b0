//! WebSocket transport for SupportChat
//!
//! This crate provides `WsTransport`, a `SessionTransport` implementation from
//! `supportchat-core` that carries chat events over a WebSocket connection.
//! The client id is passed as a `clientId` query parameter when the channel is
//! opened so a multi-tenant backend can route it to the right room.

pub mod transport;

pub use transport::WsTransport;
