// ── Core error types ──
//
// User-facing errors from pairgate-core. Protocol-level failures from
// `pairgate_api` are classified into a handful of categories before they
// reach a caller; nobody outside this crate sees raw bridge errors.

use thiserror::Error;

use crate::gate::GateRejection;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Input ────────────────────────────────────────────────────────
    #[error("Invalid phone number: {reason}")]
    InvalidInput { reason: String },

    // ── Rate gate ────────────────────────────────────────────────────
    #[error("A pairing request is already in progress")]
    AlreadyInFlight,

    #[error("Please wait {remaining_secs}s before requesting a new code")]
    Cooldown { remaining_secs: u64 },

    // ── Connection ───────────────────────────────────────────────────
    #[error("Opening the connection timed out after {timeout_secs}s")]
    ConnectTimeout { timeout_secs: u64 },

    #[error("Could not open a connection: {reason}")]
    ConnectFailed { reason: String },

    #[error("Connection was not ready after {timeout_secs}s")]
    NotReady { timeout_secs: u64 },

    #[error("Connection closed before it was ready")]
    ConnectionClosedEarly,

    #[error("Session credentials were rejected by the platform")]
    SessionInvalidated,

    // ── Pairing ──────────────────────────────────────────────────────
    #[error("Pairing code request timed out")]
    PairingTimeout,

    #[error("Platform rate limit reached")]
    PlatformRateLimited,

    #[error("Network error: {reason}")]
    Network { reason: String },

    #[error("Pairing failed: {reason}")]
    PairingFailed { reason: String },

    // ── Session operations ───────────────────────────────────────────
    #[error("not connected")]
    NotConnected,

    #[error("Sending failed: {reason}")]
    SendFailed { reason: String },

    #[error("Credential store error at {path}: {source}")]
    Credentials {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Session controller has shut down")]
    ShutDown,
}

impl CoreError {
    /// Returns `true` for the "connection hiccup, just try again" class.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ConnectTimeout { .. }
                | Self::ConnectFailed { .. }
                | Self::NotReady { .. }
                | Self::ConnectionClosedEarly
                | Self::PairingTimeout
                | Self::Network { .. }
        )
    }

    /// Seconds the caller should wait before retrying, when known.
    pub fn wait_seconds(&self) -> Option<u64> {
        match self {
            Self::Cooldown { remaining_secs } => Some(*remaining_secs),
            _ => None,
        }
    }

    /// Text suitable for the `error` field of an API response.
    pub fn user_message(&self) -> String {
        match self {
            Self::PlatformRateLimited => {
                "Too many pairing attempts. Wait a few minutes (5-10) before trying again.".into()
            }
            Self::PairingTimeout => "The pairing code request timed out. Please try again.".into(),
            Self::Network { .. } => "Network error while requesting the code. Please try again.".into(),
            Self::SessionInvalidated => {
                "The platform rejected the session. Please request a new code.".into()
            }
            err if err.is_retryable() => format!("{err}. Please try again."),
            err => err.to_string(),
        }
    }

    /// Classify a failed pairing-code request.
    pub(crate) fn from_pairing(err: &pairgate_api::Error) -> Self {
        if err.is_rate_limited() {
            Self::PlatformRateLimited
        } else if err.is_timeout() {
            Self::PairingTimeout
        } else if err.is_network() {
            Self::Network {
                reason: err.to_string(),
            }
        } else {
            Self::PairingFailed {
                reason: err.to_string(),
            }
        }
    }
}

impl From<GateRejection> for CoreError {
    fn from(rejection: GateRejection) -> Self {
        match rejection {
            GateRejection::AlreadyInFlight => Self::AlreadyInFlight,
            GateRejection::Cooldown { remaining } => Self::Cooldown {
                remaining_secs: crate::gate::ceil_secs(remaining),
            },
        }
    }
}
