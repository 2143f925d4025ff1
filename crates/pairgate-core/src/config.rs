// ── Runtime session configuration ──
//
// Every timing knob of the session lifecycle. These types never touch
// disk; `pairgate-config` builds a `SessionConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

use crate::reconnect::ReconnectPolicy;

/// Configuration for the single managed session.
///
/// Built by the binary, passed to `SessionController` -- core never reads config files.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Where the protocol client keeps its credentials.
    pub auth_dir: PathBuf,
    /// Number promoted to group admin by the `!quit` command.
    pub admin_number: Option<String>,
    /// Minimum time between pairing attempts.
    pub cooldown: Duration,
    /// Lifetime of an issued pairing code.
    pub pairing_code_ttl: Duration,
    /// Delay policy for autonomous reconnects.
    pub reconnect: ReconnectPolicy,
    /// Pause between tearing down a session and opening the next one.
    pub teardown_pause: Duration,
    /// Bound on opening a new session.
    pub connect_timeout: Duration,
    /// Bound on waiting for a new session to report readiness.
    pub ready_timeout: Duration,
    /// Extra wait after readiness before asking for a pairing code.
    pub settle_delay: Duration,
    /// Bound on the pairing-code request itself.
    pub request_timeout: Duration,
    /// Reopen the session at startup when credentials already exist.
    pub resume_on_start: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auth_dir: PathBuf::from("./auth_info"),
            admin_number: None,
            cooldown: Duration::from_secs(120),
            pairing_code_ttl: Duration::from_secs(60),
            reconnect: ReconnectPolicy::default(),
            teardown_pause: Duration::from_secs(2),
            connect_timeout: Duration::from_secs(30),
            ready_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(3),
            request_timeout: Duration::from_secs(30),
            resume_on_start: true,
        }
    }
}
