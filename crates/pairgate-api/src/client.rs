// ── Protocol client contract ──
//
// The controller never speaks the messaging protocol itself. It drives a
// `Connector` to open one session per generation and talks to that session
// through a `SessionHandle`. Events flow back on a dedicated channel that is
// consumed exactly once.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Error;
use crate::event::{ConnectionEvent, GroupMetadata, ParticipantAction};

/// Capacity of the per-session event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A freshly opened session: the handle plus its ordered event stream.
pub struct Session {
    pub handle: Arc<dyn SessionHandle>,
    pub events: mpsc::Receiver<ConnectionEvent>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").finish_non_exhaustive()
    }
}

/// Opens protocol sessions.
///
/// `auth_dir` is the credential location; the client loads existing
/// credentials from it or creates fresh ones there.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn open(&self, auth_dir: &Path) -> Result<Session, Error>;
}

/// One live protocol session.
#[async_trait]
pub trait SessionHandle: Send + Sync + 'static {
    /// Ask the platform for a pairing code bound to `phone_number` (digits only).
    async fn request_pairing_code(&self, phone_number: &str) -> Result<String, Error>;

    /// Send a plain text message to a user or group JID.
    async fn send_text(&self, to: &str, text: &str) -> Result<(), Error>;

    async fn group_metadata(&self, group: &str) -> Result<GroupMetadata, Error>;

    async fn update_participants(
        &self,
        group: &str,
        participants: &[String],
        action: ParticipantAction,
    ) -> Result<(), Error>;

    async fn leave_group(&self, group: &str) -> Result<(), Error>;

    /// The JID of the linked account, once known.
    fn own_id(&self) -> Option<String>;

    /// Close the session. Closing an already-closed session succeeds.
    async fn close(&self) -> Result<(), Error>;
}
