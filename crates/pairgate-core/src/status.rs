// ── Session status ──
//
// The single process-wide status value plus the read-only snapshot
// handed to the HTTP layer.

use chrono::{DateTime, Utc};
use pairgate_api::DisconnectReason;
use serde::Serialize;
use strum::{Display, EnumString};

/// Lifecycle status of the managed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    WaitingPairing,
    Connected,
    NeedsInvalidation,
    NeedsRestart,
    Closed,
}

impl SessionStatus {
    /// States from which a pairing code may be requested.
    pub fn is_ready_for_pairing(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }

    /// States that end a generation before it became ready.
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Disconnected | Self::Closed)
    }
}

/// Value published on the status watch channel.
///
/// `observed` flips to `true` once the current generation has reported at
/// least one event, so a waiter can tell "fresh, nothing heard yet" apart
/// from "the connection itself reported `Connecting`".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCell {
    pub generation: u64,
    pub status: SessionStatus,
    pub observed: bool,
    pub last_close: Option<DisconnectReason>,
}

impl StatusCell {
    pub(crate) fn initial() -> Self {
        Self {
            generation: 0,
            status: SessionStatus::Disconnected,
            observed: false,
            last_close: None,
        }
    }
}

/// Read-only projection for API consumers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub status: SessionStatus,
    pub pairing_code: Option<String>,
    pub pairing_code_valid: bool,
    pub code_issued_at: Option<DateTime<Utc>>,
    pub can_request_now: bool,
    pub wait_seconds: u64,
    pub generation: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_round_trips_through_strings() {
        assert_eq!(SessionStatus::WaitingPairing.to_string(), "waiting_pairing");
        assert_eq!(
            SessionStatus::from_str("needs_restart").ok(),
            Some(SessionStatus::NeedsRestart)
        );
        assert_eq!(
            serde_json::to_value(SessionStatus::Connected).ok(),
            Some(serde_json::json!("connected"))
        );
    }

    #[test]
    fn readiness_set() {
        assert!(SessionStatus::Connecting.is_ready_for_pairing());
        assert!(SessionStatus::Connected.is_ready_for_pairing());
        assert!(!SessionStatus::WaitingPairing.is_ready_for_pairing());
        assert!(SessionStatus::Closed.is_closed());
        assert!(!SessionStatus::NeedsRestart.is_closed());
    }
}
