//! Protocol client contract for pairgate sessions.
//!
//! The messaging protocol itself (handshake, encryption, framing) lives
//! outside this workspace. This crate defines what the session controller
//! needs from it and ships one implementation:
//!
//! - **[`Connector`] / [`SessionHandle`]**: open a session generation, ask it
//!   for a pairing code, send messages, manage group membership, close it.
//! - **[`ConnectionEvent`]**: the ordered event stream of one generation,
//!   with [`DisconnectReason`] classifying platform close codes.
//! - **[`bridge`]**: WebSocket client for a protocol sidecar speaking JSON.
//! - **`mock`** (feature `mock`): scripted connector for tests.

pub mod bridge;
pub mod client;
pub mod error;
pub mod event;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use bridge::{BridgeConfig, BridgeConnector};
pub use client::{Connector, Session, SessionHandle};
pub use error::Error;
pub use event::{
    ConnectionEvent, DisconnectReason, GroupMetadata, IncomingMessage, Participant,
    ParticipantAction, ParticipantRole, user_jid,
};
