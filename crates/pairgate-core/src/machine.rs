// ── Connection state machine ──
//
// Pure reducer over (status, event). Side effects come back as data so
// the controller decides when and under which lock to run them.

use pairgate_api::ConnectionEvent;

use crate::status::SessionStatus;

/// Work the controller must perform after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Reopen the session after the reconnect delay.
    ScheduleReconnect,
    /// Wipe stored credentials, then publish `Disconnected`.
    DestroyCredentials,
    /// The session is healthy again; forget previous reconnect failures.
    ResetBackoff,
}

/// Inputs besides the event that influence a transition.
#[derive(Debug, Clone, Copy, Default)]
pub struct Context {
    pub pairing_in_flight: bool,
}

/// Outcome of [`reduce`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub status: SessionStatus,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(status: SessionStatus) -> Self {
        Self {
            status,
            effects: Vec::new(),
        }
    }

    fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Compute the next status for an event of the current generation.
pub fn reduce(current: SessionStatus, event: &ConnectionEvent, ctx: Context) -> Transition {
    match event {
        ConnectionEvent::Connecting => Transition::to(SessionStatus::Connecting),
        ConnectionEvent::Open => {
            Transition::to(SessionStatus::Connected).with(Effect::ResetBackoff)
        }
        ConnectionEvent::Close { .. } => {
            let Some(reason) = event.disconnect_reason() else {
                return Transition::to(current);
            };
            if reason.is_awaiting_pairing() {
                Transition::to(SessionStatus::WaitingPairing)
            } else if reason.requires_restart() {
                Transition::to(SessionStatus::NeedsRestart)
            } else if reason.invalidates_credentials() {
                Transition::to(SessionStatus::NeedsInvalidation).with(Effect::DestroyCredentials)
            } else if ctx.pairing_in_flight {
                Transition::to(SessionStatus::Disconnected)
            } else {
                Transition::to(SessionStatus::Disconnected).with(Effect::ScheduleReconnect)
            }
        }
        ConnectionEvent::Message(_) => Transition::to(current),
    }
}
