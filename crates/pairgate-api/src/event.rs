// ── Session event types ──
//
// Everything a protocol session reports back to its owner. The platform's
// numeric close codes are classified here so the state machine never has
// to know the raw numbers.

use serde::{Deserialize, Serialize};

/// JID suffix for one-to-one chats.
pub const USER_JID_SUFFIX: &str = "@s.whatsapp.net";

/// JID suffix for group chats.
pub const GROUP_JID_SUFFIX: &str = "@g.us";

// ── ConnectionEvent ──────────────────────────────────────────────────

/// An event emitted by one session generation, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The transport is negotiating with the platform.
    Connecting,
    /// The session is fully established and authenticated.
    Open,
    /// The session ended. `code` is the platform status code, if any.
    Close { code: Option<u16> },
    /// An inbound chat message.
    Message(IncomingMessage),
}

impl ConnectionEvent {
    /// Classify the close code of a [`Close`](Self::Close) event.
    pub fn disconnect_reason(&self) -> Option<DisconnectReason> {
        match self {
            Self::Close { code } => Some(DisconnectReason::from_code(*code)),
            _ => None,
        }
    }
}

/// A text message received on the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    /// Chat the message arrived in (user or group JID).
    pub from: String,
    /// Plain text body; empty for media or unsupported message kinds.
    #[serde(default)]
    pub text: String,
    /// Whether the message was sent by this account.
    #[serde(default)]
    pub from_me: bool,
}

impl IncomingMessage {
    /// Whether the message was posted in a group chat.
    pub fn is_group(&self) -> bool {
        self.from.ends_with(GROUP_JID_SUFFIX)
    }
}

// ── DisconnectReason ─────────────────────────────────────────────────

/// Platform close codes, as reported in [`ConnectionEvent::Close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// 401: the device was unlinked; stored credentials are useless.
    LoggedOut,
    /// 403: the account is not allowed to connect.
    Forbidden,
    /// 408: the connection timed out or was lost.
    ConnectionLost,
    /// 411: multi-device state mismatch.
    MultideviceMismatch,
    /// 428: the platform closed the stream while a pairing code is pending.
    ConnectionClosed,
    /// 440: another client took over the session.
    ConnectionReplaced,
    /// 500: the stored session is corrupt.
    BadSession,
    /// 503: platform temporarily unavailable.
    UnavailableService,
    /// 515: the platform requires a fresh connection (typically right after linking).
    RestartRequired,
    /// Close without a status code (socket dropped).
    Unknown,
    /// Any code not listed above.
    Other(u16),
}

impl DisconnectReason {
    pub fn from_code(code: Option<u16>) -> Self {
        match code {
            Some(401) => Self::LoggedOut,
            Some(403) => Self::Forbidden,
            Some(408) => Self::ConnectionLost,
            Some(411) => Self::MultideviceMismatch,
            Some(428) => Self::ConnectionClosed,
            Some(440) => Self::ConnectionReplaced,
            Some(500) => Self::BadSession,
            Some(503) => Self::UnavailableService,
            Some(515) => Self::RestartRequired,
            Some(other) => Self::Other(other),
            None => Self::Unknown,
        }
    }

    /// The numeric code, if the close carried one.
    pub fn code(self) -> Option<u16> {
        match self {
            Self::LoggedOut => Some(401),
            Self::Forbidden => Some(403),
            Self::ConnectionLost => Some(408),
            Self::MultideviceMismatch => Some(411),
            Self::ConnectionClosed => Some(428),
            Self::ConnectionReplaced => Some(440),
            Self::BadSession => Some(500),
            Self::UnavailableService => Some(503),
            Self::RestartRequired => Some(515),
            Self::Unknown => None,
            Self::Other(code) => Some(code),
        }
    }

    /// Whether the stored credentials must be discarded.
    pub fn invalidates_credentials(self) -> bool {
        matches!(self, Self::LoggedOut | Self::BadSession)
    }

    /// Whether this close means "waiting for the user to confirm the pairing code".
    pub fn is_awaiting_pairing(self) -> bool {
        self == Self::ConnectionClosed
    }

    /// Whether the platform demands an explicit restart.
    pub fn requires_restart(self) -> bool {
        self == Self::RestartRequired
    }
}

// ── Group metadata ───────────────────────────────────────────────────

/// Role of a participant inside a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantRole {
    #[default]
    Member,
    Admin,
    Superadmin,
}

impl ParticipantRole {
    pub fn is_admin(self) -> bool {
        matches!(self, Self::Admin | Self::Superadmin)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub id: String,
    /// Absent (or `null`) for ordinary members.
    #[serde(default, rename = "admin", deserialize_with = "deserialize_role")]
    pub role: ParticipantRole,
}

fn deserialize_role<'de, D>(deserializer: D) -> Result<ParticipantRole, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<ParticipantRole>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMetadata {
    pub id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub participants: Vec<Participant>,
}

impl GroupMetadata {
    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }
}

/// Membership change applied by `update_participants`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantAction {
    Add,
    Remove,
    Promote,
    Demote,
}

/// Turn a user identifier (`"243858704832"`, `"243858704832:12@s.whatsapp.net"`)
/// into the canonical user JID.
pub fn user_jid(id: &str) -> String {
    let bare = id.split('@').next().unwrap_or(id);
    let bare = bare.split(':').next().unwrap_or(bare);
    format!("{bare}{USER_JID_SUFFIX}")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn close_codes_round_trip() {
        for code in [401, 403, 408, 411, 428, 440, 500, 503, 515, 999] {
            assert_eq!(DisconnectReason::from_code(Some(code)).code(), Some(code));
        }
        assert_eq!(DisconnectReason::from_code(None), DisconnectReason::Unknown);
    }

    #[test]
    fn reason_predicates() {
        assert!(DisconnectReason::LoggedOut.invalidates_credentials());
        assert!(DisconnectReason::BadSession.invalidates_credentials());
        assert!(!DisconnectReason::ConnectionLost.invalidates_credentials());
        assert!(DisconnectReason::ConnectionClosed.is_awaiting_pairing());
        assert!(DisconnectReason::RestartRequired.requires_restart());
    }

    #[test]
    fn close_event_reason() {
        let event = ConnectionEvent::Close { code: Some(515) };
        assert_eq!(event.disconnect_reason(), Some(DisconnectReason::RestartRequired));
        assert_eq!(ConnectionEvent::Open.disconnect_reason(), None);
    }

    #[test]
    fn user_jid_strips_device_suffix() {
        assert_eq!(user_jid("243858704832"), "243858704832@s.whatsapp.net");
        assert_eq!(
            user_jid("243858704832:12@s.whatsapp.net"),
            "243858704832@s.whatsapp.net"
        );
    }

    #[test]
    fn participant_role_defaults_to_member() {
        let raw = serde_json::json!({
            "id": "g1@g.us",
            "subject": "Team",
            "participants": [
                { "id": "1@s.whatsapp.net", "admin": null },
                { "id": "2@s.whatsapp.net", "admin": "superadmin" },
                { "id": "3@s.whatsapp.net" }
            ]
        });
        let meta: GroupMetadata = serde_json::from_value(raw).unwrap();
        assert_eq!(meta.participants[0].role, ParticipantRole::Member);
        assert!(meta.participant("2@s.whatsapp.net").unwrap().role.is_admin());
        assert_eq!(meta.participants[2].role, ParticipantRole::Member);
    }

    #[test]
    fn group_detection() {
        let msg = IncomingMessage {
            from: "123@g.us".into(),
            text: "!quit".into(),
            from_me: false,
        };
        assert!(msg.is_group());
    }
}
