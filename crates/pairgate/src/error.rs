//! CLI error types with miette diagnostics.
//!
//! Maps config, core and HTTP failures into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use pairgate_config::ConfigError;
use pairgate_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const RATE_LIMITED: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Server ───────────────────────────────────────────────────────
    #[error("Could not reach pairgate server at {url}")]
    #[diagnostic(
        code(pairgate::connection_failed),
        help(
            "Check that `pairgate serve` is running and reachable.\n\
             Use --server or PAIRGATE_SERVER to point at another address."
        )
    )]
    ConnectionFailed {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Could not listen on {addr}")]
    #[diagnostic(
        code(pairgate::bind_failed),
        help("Another process may be using the port. Try --port or the PORT variable.")
    )]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Server rejected the request: {message}")]
    #[diagnostic(code(pairgate::rejected))]
    Rejected { message: String },

    // ── Pairing ──────────────────────────────────────────────────────
    #[error("Pairing is cooling down: {message}")]
    #[diagnostic(
        code(pairgate::cooldown),
        help("Retry in {wait_secs}s, or run `pairgate clear-session` to reset the cooldown.")
    )]
    Cooldown { message: String, wait_secs: u64 },

    #[error("{message}")]
    #[diagnostic(code(pairgate::rate_limited))]
    RateLimited { message: String },

    #[error("{message}")]
    #[diagnostic(code(pairgate::in_flight), help("Wait for the running request to finish."))]
    InFlight { message: String },

    #[error("{message}")]
    #[diagnostic(code(pairgate::timeout))]
    Timeout { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(pairgate::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(pairgate::config),
        help("Check the config file and PAIRGATE__* environment variables.")
    )]
    Config(#[from] ConfigError),

    // ── Interactive ──────────────────────────────────────────────────
    #[error("Destructive operation '{action}' requires confirmation")]
    #[diagnostic(
        code(pairgate::confirmation_required),
        help("Use --yes (-y) to skip confirmation in non-interactive contexts.")
    )]
    NonInteractiveRequiresYes { action: String },

    // ── Core ─────────────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(code(pairgate::session))]
    Session(CoreError),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON payload: {0}")]
    #[diagnostic(code(pairgate::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Bind { .. } => exit_code::CONNECTION,
            Self::Config(_) => exit_code::CONFIG,
            Self::Cooldown { .. } | Self::RateLimited { .. } => exit_code::RATE_LIMITED,
            Self::InFlight { .. } => exit_code::CONFLICT,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::NonInteractiveRequiresYes { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        let message = err.user_message();
        match err {
            CoreError::InvalidInput { reason } => CliError::Validation {
                field: "phone number".into(),
                reason,
            },
            CoreError::Cooldown { remaining_secs } => CliError::Cooldown {
                message,
                wait_secs: remaining_secs,
            },
            CoreError::AlreadyInFlight => CliError::InFlight { message },
            CoreError::PlatformRateLimited => CliError::RateLimited { message },
            CoreError::ConnectTimeout { .. } | CoreError::NotReady { .. } | CoreError::PairingTimeout => {
                CliError::Timeout { message }
            }
            other => CliError::Session(other),
        }
    }
}
