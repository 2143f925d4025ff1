//! Session lifecycle controller for pairgate.
//!
//! Sits between the protocol client contract in `pairgate-api` and the
//! HTTP/CLI surface in the `pairgate` binary:
//!
//! - **[`SessionController`]**: owns the single active connection.
//!   [`request_pairing()`](SessionController::request_pairing) tears down,
//!   reopens and asks the platform for a pairing code;
//!   [`status_snapshot()`](SessionController::status_snapshot) is the
//!   non-blocking read side.
//!
//! - **[`machine`]**: pure reducer from `(status, event)` to the next
//!   status plus [`Effect`]s (reconnect, destroy credentials).
//!
//! - **[`RateGate`]**: cooldown window and single-flight guard for pairing.
//!
//! - **[`CredentialStore`]**: the on-disk credential directory; only
//!   "exists", "create" and "destroy".
//!
//! - **[`commands`]**: chat command table (`!ping`, `!help`, `!quit`, ...).

pub mod commands;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod error;
pub mod gate;
pub mod machine;
pub mod pairing;
pub mod reconnect;
pub mod status;

// ── Primary re-exports ──────────────────────────────────────────────
pub use commands::BotCommand;
pub use config::SessionConfig;
pub use controller::SessionController;
pub use credentials::CredentialStore;
pub use error::CoreError;
pub use gate::{GatePermit, GateRejection, RateGate};
pub use machine::{Effect, Transition};
pub use pairing::{PairingCode, PairingRecord, normalize_phone_number};
pub use reconnect::ReconnectPolicy;
pub use status::{SessionStatus, StatusCell, StatusSnapshot};
