// ── Rate gate ──
//
// Cooldown window plus a single-flight guard for pairing sequences.
// Acquiring stamps the cooldown anchor immediately, so a sequence that
// later fails is still charged.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

/// Why the gate refused a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    AlreadyInFlight,
    Cooldown { remaining: Duration },
}

#[derive(Debug, Default)]
struct GateState {
    last_request_at: Option<Instant>,
    in_flight: bool,
}

/// Cooldown timer and mutual-exclusion flag.
#[derive(Debug)]
pub struct RateGate {
    cooldown: Duration,
    state: Mutex<GateState>,
}

impl RateGate {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            state: Mutex::new(GateState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, GateState> {
        self.state.lock().expect("rate gate lock poisoned")
    }

    /// Try to start a pairing sequence.
    ///
    /// Exactly one concurrent caller wins. The returned permit clears the
    /// in-flight flag when dropped.
    pub fn acquire(self: &Arc<Self>) -> Result<GatePermit, GateRejection> {
        let mut state = self.state();
        if state.in_flight {
            return Err(GateRejection::AlreadyInFlight);
        }
        let now = Instant::now();
        if let Some(remaining) = remaining_at(state.last_request_at, self.cooldown, now) {
            return Err(GateRejection::Cooldown { remaining });
        }
        state.in_flight = true;
        state.last_request_at = Some(now);
        Ok(GatePermit {
            gate: Arc::clone(self),
        })
    }

    /// Clear the in-flight flag. Idempotent.
    pub fn release(&self) {
        self.state().in_flight = false;
    }

    pub fn in_flight(&self) -> bool {
        self.state().in_flight
    }

    /// Time left until the cooldown window elapses.
    pub fn remaining_cooldown(&self) -> Duration {
        remaining_at(self.state().last_request_at, self.cooldown, Instant::now())
            .unwrap_or(Duration::ZERO)
    }

    /// Not in flight and cooldown elapsed.
    pub fn can_request_now(&self) -> bool {
        let state = self.state();
        !state.in_flight && remaining_at(state.last_request_at, self.cooldown, Instant::now()).is_none()
    }

    /// Forget the cooldown anchor so the next request may proceed at once.
    pub fn reset_cooldown(&self) {
        self.state().last_request_at = None;
    }
}

fn remaining_at(last: Option<Instant>, cooldown: Duration, now: Instant) -> Option<Duration> {
    let elapsed = now.saturating_duration_since(last?);
    cooldown.checked_sub(elapsed).filter(|left| !left.is_zero())
}

/// Whole seconds, rounded up, for user-facing wait times.
pub fn ceil_secs(duration: Duration) -> u64 {
    let secs = duration.as_secs();
    if duration.subsec_nanos() > 0 { secs + 1 } else { secs }
}

/// Proof of a successful [`RateGate::acquire`].
#[derive(Debug)]
pub struct GatePermit {
    gate: Arc<RateGate>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.gate.release();
    }
}
