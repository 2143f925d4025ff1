// ── Session lifecycle controller ──
//
// Owns the single active connection, the status channel, the pairing
// record and the rate gate. Each opened session gets a generation
// number; events tagged with an older generation are dropped on arrival.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use pairgate_api::{ConnectionEvent, Connector, IncomingMessage, Session, SessionHandle, user_jid};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::commands;
use crate::config::SessionConfig;
use crate::credentials::CredentialStore;
use crate::error::CoreError;
use crate::gate::{RateGate, ceil_secs};
use crate::machine::{self, Context, Effect};
use crate::pairing::{PairingCode, PairingRecord, normalize_phone_number};
use crate::status::{SessionStatus, StatusCell, StatusSnapshot};

// ── SessionController ────────────────────────────────────────────

/// Entry point for the HTTP layer and the CLI.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Call
/// [`start()`](Self::start) once to resume a stored session, then drive it
/// with [`request_pairing()`](Self::request_pairing) and friends.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

struct ActiveConnection {
    generation: u64,
    handle: Arc<dyn SessionHandle>,
    /// Stops this generation's event consumer.
    cancel: CancellationToken,
}

struct ControllerInner {
    config: SessionConfig,
    connector: Arc<dyn Connector>,
    credentials: CredentialStore,
    gate: Arc<RateGate>,
    status: watch::Sender<StatusCell>,
    /// At most one live connection. Every write to it and every status
    /// transition happens under this lock.
    slot: Mutex<Option<ActiveConnection>>,
    last_generation: AtomicU64,
    pairing: ArcSwapOption<PairingRecord>,
    /// Pending autonomous reconnect, replaced on every new schedule.
    reconnect: std::sync::Mutex<Option<CancellationToken>>,
    reconnect_attempt: AtomicU32,
    cancel: CancellationToken,
}

impl SessionController {
    /// Create a controller. Does NOT connect.
    pub fn new(config: SessionConfig, connector: Arc<dyn Connector>) -> Self {
        let (status, _) = watch::channel(StatusCell::initial());
        Self {
            inner: Arc::new(ControllerInner {
                credentials: CredentialStore::new(config.auth_dir.clone()),
                gate: Arc::new(RateGate::new(config.cooldown)),
                config,
                connector,
                status,
                slot: Mutex::new(None),
                last_generation: AtomicU64::new(0),
                pairing: ArcSwapOption::empty(),
                reconnect: std::sync::Mutex::new(None),
                reconnect_attempt: AtomicU32::new(0),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.credentials
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Resume the stored session, if there is one and resuming is enabled.
    ///
    /// A failed open schedules an autonomous reconnect before the error is
    /// returned, so callers may log it and carry on.
    pub async fn start(&self) -> Result<(), CoreError> {
        self.inner.ensure_running()?;
        if !self.inner.config.resume_on_start {
            debug!("session resume disabled");
            return Ok(());
        }
        if !self.inner.credentials.exists().await {
            info!("no stored session; waiting for a pairing request");
            return Ok(());
        }

        info!(path = %self.inner.credentials.path().display(), "resuming stored session");
        match self.inner.open_session().await {
            Ok(session) => {
                self.inner.replace_connection(session).await;
                Ok(())
            }
            Err(e) => {
                self.inner.schedule_reconnect();
                Err(e)
            }
        }
    }

    /// Stop background work, close the connection and publish `Closed`.
    pub async fn shutdown(&self) {
        info!("session controller shutting down");
        self.inner.cancel.cancel();
        self.inner.cancel_reconnect();
        self.inner.teardown(SessionStatus::Closed).await;
    }

    // ── Pairing ──────────────────────────────────────────────────

    /// Run the full pairing sequence for `phone_number`.
    ///
    /// Tears down any current connection, wipes credentials, opens a fresh
    /// session, waits for it to become ready and asks for a code. The rate
    /// gate is held for the whole sequence and released on every exit path.
    pub async fn request_pairing(&self, phone_number: &str) -> Result<PairingCode, CoreError> {
        let number = normalize_phone_number(phone_number)?;
        self.inner.ensure_running()?;
        let _permit = self.inner.gate.acquire()?;
        info!(number = %number, "pairing requested");

        tokio::select! {
            () = self.inner.cancel.cancelled() => Err(CoreError::ShutDown),
            result = self.inner.pairing_sequence(&number) => {
                match &result {
                    Ok(code) => info!(expires_in = code.expires_in.as_secs(), "pairing code issued"),
                    Err(e) => warn!(error = %e, "pairing failed"),
                }
                result
            }
        }
    }

    // ── Administrative ───────────────────────────────────────────

    /// Close the connection, destroy credentials and lift the cooldown.
    /// Safe to call repeatedly.
    pub async fn clear_session(&self) -> Result<(), CoreError> {
        self.inner.cancel_reconnect();
        self.inner.teardown(SessionStatus::Disconnected).await;
        self.inner.pairing.store(None);
        self.inner.gate.reset_cooldown();
        self.inner.reconnect_attempt.store(0, Ordering::Relaxed);
        self.inner.credentials.destroy().await?;
        info!("session cleared");
        Ok(())
    }

    /// Reopen the session now, keeping credentials. Used after the
    /// platform demanded a restart.
    pub async fn reconnect_now(&self) -> Result<(), CoreError> {
        self.inner.ensure_running()?;
        if self.inner.gate.in_flight() {
            return Err(CoreError::AlreadyInFlight);
        }
        self.inner.cancel_reconnect();
        info!("manual reconnect");
        let session = self.inner.open_session().await?;
        if self.inner.install_unless_pairing(session, None).await {
            Ok(())
        } else {
            Err(CoreError::AlreadyInFlight)
        }
    }

    /// Send a text message. `to` is a JID or a bare phone number.
    pub async fn send_message(&self, to: &str, text: &str) -> Result<(), CoreError> {
        let handle = {
            let slot = self.inner.slot.lock().await;
            if self.status() != SessionStatus::Connected {
                return Err(CoreError::NotConnected);
            }
            slot.as_ref()
                .map(|active| Arc::clone(&active.handle))
                .ok_or(CoreError::NotConnected)?
        };

        let jid = if to.contains('@') {
            to.to_string()
        } else {
            user_jid(&normalize_phone_number(to)?)
        };
        handle
            .send_text(&jid, text)
            .await
            .map_err(|e| CoreError::SendFailed {
                reason: e.to_string(),
            })?;
        debug!(to = %jid, "message sent");
        Ok(())
    }

    // ── Status publisher ─────────────────────────────────────────

    pub fn status(&self) -> SessionStatus {
        self.inner.status.borrow().status
    }

    /// Watch status transitions, tagged with their connection generation.
    pub fn subscribe_status(&self) -> watch::Receiver<StatusCell> {
        self.inner.status.subscribe()
    }

    /// Non-blocking read of everything the status endpoint reports.
    pub fn status_snapshot(&self) -> StatusSnapshot {
        let cell = *self.inner.status.borrow();
        let record = self.inner.pairing.load_full();
        let now = Instant::now();
        let gate = &self.inner.gate;

        StatusSnapshot {
            status: cell.status,
            pairing_code: record.as_ref().map(|r| r.code.clone()),
            pairing_code_valid: record
                .as_ref()
                .is_some_and(|r| r.generation == cell.generation && r.is_valid_at(now)),
            code_issued_at: record.as_ref().map(|r| r.issued_at),
            can_request_now: gate.can_request_now(),
            wait_seconds: ceil_secs(gate.remaining_cooldown()),
            generation: cell.generation,
        }
    }
}

// ── Internals ────────────────────────────────────────────────────

impl ControllerInner {
    fn ensure_running(&self) -> Result<(), CoreError> {
        if self.cancel.is_cancelled() {
            Err(CoreError::ShutDown)
        } else {
            Ok(())
        }
    }

    async fn pairing_sequence(self: &Arc<Self>, number: &str) -> Result<PairingCode, CoreError> {
        self.cancel_reconnect();
        self.teardown(SessionStatus::Disconnected).await;
        self.credentials.destroy().await?;
        self.pairing.store(None);
        tokio::time::sleep(self.config.teardown_pause).await;

        let session = self.open_session().await?;
        let generation = self.replace_connection(session).await;
        // Readiness needs an event from this generation itself; the
        // `Connecting` published by `install` does not count.
        self.wait_until_ready(generation).await?;
        tokio::time::sleep(self.config.settle_delay).await;

        let handle = self
            .handle_for(generation)
            .await
            .ok_or(CoreError::ConnectionClosedEarly)?;
        let code = match tokio::time::timeout(
            self.config.request_timeout,
            handle.request_pairing_code(number),
        )
        .await
        {
            Err(_) => return Err(CoreError::PairingTimeout),
            Ok(Err(e)) => return Err(CoreError::from_pairing(&e)),
            Ok(Ok(code)) => code.to_uppercase(),
        };

        let ttl = self.config.pairing_code_ttl;
        self.pairing
            .store(Some(Arc::new(PairingRecord::new(code.clone(), generation, ttl))));
        Ok(PairingCode {
            code,
            expires_in: ttl,
        })
    }

    /// Block until `generation` reports a state a pairing code can be requested from.
    async fn wait_until_ready(&self, generation: u64) -> Result<(), CoreError> {
        let mut rx = self.status.subscribe();
        let timeout = self.config.ready_timeout;
        let waited = tokio::time::timeout(timeout, async {
            rx.wait_for(|cell| cell.generation != generation || cell.observed)
                .await
                .map(|cell| *cell)
        })
        .await;

        let cell = match waited {
            Err(_) => {
                return Err(CoreError::NotReady {
                    timeout_secs: ceil_secs(timeout),
                });
            }
            Ok(Err(_)) => return Err(CoreError::ShutDown),
            Ok(Ok(cell)) => cell,
        };

        if cell.generation == generation && cell.status.is_ready_for_pairing() {
            return Ok(());
        }
        debug!(generation, status = %cell.status, "connection ended before it was ready");
        if cell.last_close.is_some_and(|r| r.invalidates_credentials()) {
            Err(CoreError::SessionInvalidated)
        } else {
            Err(CoreError::ConnectionClosedEarly)
        }
    }

    async fn handle_for(&self, generation: u64) -> Option<Arc<dyn SessionHandle>> {
        self.slot
            .lock()
            .await
            .as_ref()
            .filter(|active| active.generation == generation)
            .map(|active| Arc::clone(&active.handle))
    }

    // ── Connection slot ──────────────────────────────────────────

    async fn open_session(&self) -> Result<Session, CoreError> {
        let auth_dir = self.credentials.load_or_create().await?;
        let timeout = self.config.connect_timeout;
        match tokio::time::timeout(timeout, self.connector.open(auth_dir)).await {
            Err(_) => Err(CoreError::ConnectTimeout {
                timeout_secs: ceil_secs(timeout),
            }),
            Ok(Err(e)) => Err(CoreError::ConnectFailed {
                reason: e.to_string(),
            }),
            Ok(Ok(session)) => Ok(session),
        }
    }

    /// Install `session` as the active connection, closing whatever was there.
    async fn replace_connection(self: &Arc<Self>, session: Session) -> u64 {
        let (generation, previous) = {
            let mut slot = self.slot.lock().await;
            let previous = slot.take();
            (self.install(&mut slot, session), previous)
        };
        if let Some(previous) = previous {
            close_connection(previous).await;
        }
        generation
    }

    fn install(self: &Arc<Self>, slot: &mut Option<ActiveConnection>, session: Session) -> u64 {
        let generation = self.last_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = self.cancel.child_token();

        self.status.send_replace(StatusCell {
            generation,
            status: SessionStatus::Connecting,
            observed: false,
            last_close: None,
        });
        *slot = Some(ActiveConnection {
            generation,
            handle: session.handle,
            cancel: cancel.clone(),
        });
        tokio::spawn(Arc::clone(self).consume_events(generation, session.events, cancel));

        info!(generation, "session opened");
        generation
    }

    /// Empty the slot, close the handle and publish `status`.
    async fn teardown(&self, status: SessionStatus) {
        let previous = {
            let mut slot = self.slot.lock().await;
            self.status.send_modify(|cell| {
                cell.status = status;
                cell.observed = true;
            });
            slot.take()
        };
        if let Some(previous) = previous {
            debug!(generation = previous.generation, %status, "tearing down connection");
            close_connection(previous).await;
        }
    }

    // ── Event consumption ────────────────────────────────────────

    async fn consume_events(
        self: Arc<Self>,
        generation: u64,
        mut events: mpsc::Receiver<ConnectionEvent>,
        cancel: CancellationToken,
    ) {
        let mut close_seen = false;
        loop {
            let event = tokio::select! {
                () = cancel.cancelled() => break,
                event = events.recv() => event,
            };
            match event {
                Some(event) => {
                    close_seen |= matches!(event, ConnectionEvent::Close { .. });
                    self.apply_event(generation, event).await;
                }
                None => {
                    // A stream that ends after its own close has nothing left to report.
                    if !close_seen {
                        self.apply_event(generation, ConnectionEvent::Close { code: None })
                            .await;
                    }
                    break;
                }
            }
        }
        debug!(generation, "event consumer stopped");
    }

    async fn apply_event(self: &Arc<Self>, generation: u64, event: ConnectionEvent) {
        let mut slot = self.slot.lock().await;
        let Some(active) = slot.as_ref().filter(|a| a.generation == generation) else {
            debug!(generation, ?event, "dropping event from superseded connection");
            return;
        };

        if let ConnectionEvent::Message(message) = &event {
            if self.status.borrow().status == SessionStatus::Connected {
                self.route_message(Arc::clone(&active.handle), message.clone());
            }
            return;
        }

        let current = self.status.borrow().status;
        let ctx = Context {
            pairing_in_flight: self.gate.in_flight(),
        };
        let transition = machine::reduce(current, &event, ctx);
        let reason = event.disconnect_reason();
        info!(
            generation,
            status = %transition.status,
            code = ?reason.and_then(|r| r.code()),
            "session status changed"
        );
        self.publish(generation, transition.status, reason);

        let mut closing = None;
        for effect in transition.effects {
            match effect {
                Effect::ResetBackoff => self.reconnect_attempt.store(0, Ordering::Relaxed),
                Effect::DestroyCredentials => {
                    if let Err(e) = self.credentials.destroy().await {
                        warn!(error = %e, "failed to destroy invalidated credentials");
                    }
                    self.pairing.store(None);
                    closing = slot.take();
                    self.publish(generation, SessionStatus::Disconnected, reason);
                }
                Effect::ScheduleReconnect => self.schedule_reconnect(),
            }
        }
        drop(slot);

        if let Some(active) = closing {
            close_connection(active).await;
        }
    }

    fn publish(
        &self,
        generation: u64,
        status: SessionStatus,
        last_close: Option<pairgate_api::DisconnectReason>,
    ) {
        self.status.send_replace(StatusCell {
            generation,
            status,
            observed: true,
            last_close,
        });
    }

    fn route_message(&self, handle: Arc<dyn SessionHandle>, message: IncomingMessage) {
        let admin = self.config.admin_number.clone();
        tokio::spawn(async move {
            if let Err(e) =
                commands::handle_message(handle.as_ref(), &message, admin.as_deref()).await
            {
                warn!(from = %message.from, error = %e, "command reply failed");
            }
        });
    }

    // ── Reconnect scheduling ─────────────────────────────────────

    /// Schedule one reconnect, cancelling any previously scheduled one.
    fn schedule_reconnect(self: &Arc<Self>) {
        if self.cancel.is_cancelled() {
            return;
        }
        let token = self.cancel.child_token();
        if let Some(previous) = self
            .reconnect
            .lock()
            .expect("reconnect lock poisoned")
            .replace(token.clone())
        {
            previous.cancel();
        }

        let attempt = self.reconnect_attempt.fetch_add(1, Ordering::Relaxed);
        let delay = self.config.reconnect.delay_for(attempt);
        info!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "reconnect scheduled"
        );

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                () = token.cancelled() => debug!("scheduled reconnect cancelled"),
                () = tokio::time::sleep(delay) => inner.run_reconnect(&token).await,
            }
        });
    }

    async fn run_reconnect(self: &Arc<Self>, token: &CancellationToken) {
        if self.gate.in_flight() {
            debug!("pairing in flight; skipping scheduled reconnect");
            return;
        }

        let session = match self.open_session().await {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "reconnect failed");
                if !token.is_cancelled() {
                    self.schedule_reconnect();
                }
                return;
            }
        };

        self.install_unless_pairing(session, Some(token)).await;
    }

    /// Install a session opened outside the pairing sequence.
    ///
    /// The open may have taken a while; if a pairing sequence (or a newer
    /// schedule) claimed the slot meanwhile, the fresh session is closed
    /// instead and `false` is returned.
    async fn install_unless_pairing(
        self: &Arc<Self>,
        session: Session,
        token: Option<&CancellationToken>,
    ) -> bool {
        let previous = {
            let mut slot = self.slot.lock().await;
            if token.is_some_and(CancellationToken::is_cancelled) || self.gate.in_flight() {
                drop(slot);
                debug!("reconnect superseded; discarding fresh session");
                if let Err(e) = session.handle.close().await {
                    debug!(error = %e, "closing discarded session failed");
                }
                return false;
            }
            let previous = slot.take();
            self.install(&mut slot, session);
            previous
        };
        if let Some(previous) = previous {
            close_connection(previous).await;
        }
        true
    }

    fn cancel_reconnect(&self) {
        if let Some(token) = self.reconnect.lock().expect("reconnect lock poisoned").take() {
            token.cancel();
        }
    }
}

/// Best-effort close. Failures are logged, never returned.
async fn close_connection(active: ActiveConnection) {
    active.cancel.cancel();
    if let Err(e) = active.handle.close().await {
        warn!(generation = active.generation, error = %e, "closing connection failed; ignoring");
    }
}
