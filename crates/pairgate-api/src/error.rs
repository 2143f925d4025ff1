use thiserror::Error;

/// Top-level error type for the `pairgate-api` crate.
///
/// Covers every failure mode of a protocol session: opening the bridge
/// socket, request/response correlation, and rejections reported by the
/// messaging platform. `pairgate-core` classifies these into user-facing
/// categories.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// The bridge socket could not be opened.
    #[error("Bridge connection failed: {0}")]
    Connect(String),

    /// The session was closed before the operation completed.
    #[error("Session closed")]
    Closed,

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out waiting for the bridge to answer.
    #[error("Request timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Platform ────────────────────────────────────────────────────
    /// The platform throttled the request.
    #[error("Rate limited by platform: {message}")]
    RateLimited { message: String },

    /// Any other rejection reported by the platform.
    #[error("Platform error{}: {message}", .status.map_or_else(String::new, |s| format!(" ({s})")))]
    Platform { status: Option<u16>, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// A frame could not be encoded or decoded.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Build a platform error, promoting throttling responses to
    /// [`RateLimited`](Self::RateLimited).
    pub fn platform(status: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == Some(429) || looks_rate_limited(&message) {
            Self::RateLimited { message }
        } else {
            Self::Platform { status, message }
        }
    }

    /// Returns `true` if the platform asked us to slow down.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Returns `true` if the operation ran out of time.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Platform { status, message } => {
                *status == Some(408) || message.to_ascii_lowercase().contains("timed out")
            }
            _ => false,
        }
    }

    /// Returns `true` if the failure is a connectivity problem.
    pub fn is_network(&self) -> bool {
        match self {
            Self::Connect(_) | Self::Closed => true,
            Self::Platform { message, .. } => {
                let lower = message.to_ascii_lowercase();
                ["econn", "enotfound", "network", "socket", "connection"]
                    .iter()
                    .any(|needle| lower.contains(needle))
            }
            _ => false,
        }
    }
}

fn looks_rate_limited(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("rate-overlimit") || lower.contains("rate limit") || lower.contains("too many")
}
