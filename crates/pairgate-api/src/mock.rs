//! Scripted in-process [`Connector`] for tests.
//!
//! Every `open()` produces a [`MockSession`] the test can drive: emit
//! connection events, inspect what the controller sent, and check whether
//! the handle was closed.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};

use crate::client::{Connector, EVENT_CHANNEL_CAPACITY, Session, SessionHandle};
use crate::error::Error;
use crate::event::{ConnectionEvent, GroupMetadata, ParticipantAction};

/// How the next pairing-code request should be answered.
#[derive(Debug, Clone)]
pub enum PairingReply {
    Code(String),
    Reject { status: Option<u16>, message: String },
    Timeout,
    Hang,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recorded {
    Text { to: String, text: String },
    Participants { group: String, participants: Vec<String>, action: ParticipantAction },
    Leave { group: String },
}

struct Script {
    open_failures: VecDeque<String>,
    open_delays: VecDeque<Duration>,
    open_delay: Duration,
    initial_events: Vec<ConnectionEvent>,
    pairing: PairingReply,
    group: Option<GroupMetadata>,
    own_id: Option<String>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            open_failures: VecDeque::new(),
            open_delays: VecDeque::new(),
            open_delay: Duration::ZERO,
            initial_events: vec![ConnectionEvent::Connecting],
            pairing: PairingReply::Code("abcd1234".into()),
            group: None,
            own_id: None,
        }
    }
}

struct MockState {
    script: Mutex<Script>,
    sessions: Mutex<Vec<MockSession>>,
    auth_dirs: Mutex<Vec<PathBuf>>,
    opened: watch::Sender<usize>,
}

/// Scripted connector. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnector {
    pub fn new() -> Self {
        let (opened, _) = watch::channel(0);
        Self {
            state: Arc::new(MockState {
                script: Mutex::new(Script::default()),
                sessions: Mutex::new(Vec::new()),
                auth_dirs: Mutex::new(Vec::new()),
                opened,
            }),
        }
    }

    fn script(&self) -> std::sync::MutexGuard<'_, Script> {
        self.state.script.lock().expect("mock lock poisoned")
    }

    /// Make the next `open()` call fail with a connect error.
    pub fn fail_next_open(&self, reason: &str) {
        self.script().open_failures.push_back(reason.to_string());
    }

    /// Delay every `open()` by `delay`.
    pub fn set_open_delay(&self, delay: Duration) {
        self.script().open_delay = delay;
    }

    /// Delay the next `open()` by `delay` instead of the default. Queued
    /// delays are used in call order.
    pub fn push_open_delay(&self, delay: Duration) {
        self.script().open_delays.push_back(delay);
    }

    /// Events pushed onto every new session right after it opens.
    pub fn set_initial_events(&self, events: Vec<ConnectionEvent>) {
        self.script().initial_events = events;
    }

    pub fn set_pairing_reply(&self, reply: PairingReply) {
        self.script().pairing = reply;
    }

    pub fn set_group(&self, group: GroupMetadata) {
        self.script().group = Some(group);
    }

    pub fn set_own_id(&self, id: &str) {
        self.script().own_id = Some(id.to_string());
    }

    /// Number of successful `open()` calls so far.
    pub fn open_count(&self) -> usize {
        *self.state.opened.borrow()
    }

    /// Wait until at least `count` sessions have been opened.
    pub async fn wait_for_opens(&self, count: usize) {
        let mut rx = self.state.opened.subscribe();
        let _ = rx.wait_for(|opened| *opened >= count).await;
    }

    /// The `index`-th opened session (0-based).
    pub fn session(&self, index: usize) -> Option<MockSession> {
        self.state
            .sessions
            .lock()
            .expect("mock lock poisoned")
            .get(index)
            .cloned()
    }

    /// The most recently opened session.
    pub fn last_session(&self) -> Option<MockSession> {
        self.state
            .sessions
            .lock()
            .expect("mock lock poisoned")
            .last()
            .cloned()
    }

    /// Credential locations passed to `open()`, in order.
    pub fn auth_dirs(&self) -> Vec<PathBuf> {
        self.state.auth_dirs.lock().expect("mock lock poisoned").clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, auth_dir: &Path) -> Result<Session, Error> {
        let (delay, failure, initial, own_id) = {
            let mut script = self.script();
            (
                script.open_delays.pop_front().unwrap_or(script.open_delay),
                script.open_failures.pop_front(),
                script.initial_events.clone(),
                script.own_id.clone(),
            )
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if let Some(reason) = failure {
            return Err(Error::Connect(reason));
        }

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let handle = Arc::new(MockHandle {
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
            recorded: Mutex::new(Vec::new()),
            pairing_requests: Mutex::new(Vec::new()),
            own_id,
        });

        for event in initial {
            let _ = event_tx.send(event).await;
        }

        let session = MockSession {
            events: Arc::new(Mutex::new(Some(event_tx))),
            handle: Arc::clone(&handle),
        };
        self.state
            .sessions
            .lock()
            .expect("mock lock poisoned")
            .push(session);
        self.state
            .auth_dirs
            .lock()
            .expect("mock lock poisoned")
            .push(auth_dir.to_path_buf());
        self.state.opened.send_modify(|n| *n += 1);

        Ok(Session {
            handle,
            events: event_rx,
        })
    }
}

// ── MockSession ──────────────────────────────────────────────────────

/// Test-side view of one opened session.
#[derive(Clone)]
pub struct MockSession {
    events: Arc<Mutex<Option<mpsc::Sender<ConnectionEvent>>>>,
    handle: Arc<MockHandle>,
}

impl MockSession {
    /// Push an event onto this session's stream.
    pub async fn emit(&self, event: ConnectionEvent) {
        let sender = self.events.lock().expect("mock lock poisoned").clone();
        if let Some(sender) = sender {
            let _ = sender.send(event).await;
        }
    }

    /// End the event stream, like a transport whose socket went away.
    /// Later `emit` calls are ignored.
    pub fn end(&self) {
        self.events.lock().expect("mock lock poisoned").take();
    }

    pub fn is_closed(&self) -> bool {
        self.handle.closed.load(Ordering::Acquire)
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.handle.recorded.lock().expect("mock lock poisoned").clone()
    }

    pub fn pairing_requests(&self) -> Vec<String> {
        self.handle
            .pairing_requests
            .lock()
            .expect("mock lock poisoned")
            .clone()
    }
}

struct MockHandle {
    state: Arc<MockState>,
    closed: AtomicBool,
    recorded: Mutex<Vec<Recorded>>,
    pairing_requests: Mutex<Vec<String>>,
    own_id: Option<String>,
}

impl MockHandle {
    fn ensure_open(&self) -> Result<(), Error> {
        if self.closed.load(Ordering::Acquire) {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }

    fn record(&self, entry: Recorded) {
        self.recorded.lock().expect("mock lock poisoned").push(entry);
    }
}

#[async_trait]
impl SessionHandle for MockHandle {
    async fn request_pairing_code(&self, phone_number: &str) -> Result<String, Error> {
        self.ensure_open()?;
        self.pairing_requests
            .lock()
            .expect("mock lock poisoned")
            .push(phone_number.to_string());
        let reply = self
            .state
            .script
            .lock()
            .expect("mock lock poisoned")
            .pairing
            .clone();
        match reply {
            PairingReply::Code(code) => Ok(code),
            PairingReply::Reject { status, message } => Err(Error::platform(status, message)),
            PairingReply::Timeout => Err(Error::Timeout { timeout_secs: 30 }),
            PairingReply::Hang => std::future::pending().await,
        }
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<(), Error> {
        self.ensure_open()?;
        self.record(Recorded::Text {
            to: to.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    async fn group_metadata(&self, group: &str) -> Result<GroupMetadata, Error> {
        self.ensure_open()?;
        self.state
            .script
            .lock()
            .expect("mock lock poisoned")
            .group
            .clone()
            .filter(|meta| meta.id == group)
            .ok_or_else(|| Error::platform(Some(404), "item-not-found"))
    }

    async fn update_participants(
        &self,
        group: &str,
        participants: &[String],
        action: ParticipantAction,
    ) -> Result<(), Error> {
        self.ensure_open()?;
        self.record(Recorded::Participants {
            group: group.to_string(),
            participants: participants.to_vec(),
            action,
        });
        Ok(())
    }

    async fn leave_group(&self, group: &str) -> Result<(), Error> {
        self.ensure_open()?;
        self.record(Recorded::Leave {
            group: group.to_string(),
        });
        Ok(())
    }

    fn own_id(&self) -> Option<String> {
        self.own_id.clone()
    }

    async fn close(&self) -> Result<(), Error> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
