//! WebSocket bridge to a protocol sidecar.
//!
//! The sidecar owns the messaging protocol and the credential files; this
//! module only speaks its JSON frame format. One WebSocket connection is one
//! session generation: connection-state and message frames become
//! [`ConnectionEvent`]s, and requests are correlated with their responses by
//! a numeric `id`.
//!
//! # Example
//!
//! ```rust,ignore
//! use pairgate_api::bridge::{BridgeConfig, BridgeConnector};
//! use pairgate_api::Connector;
//!
//! let connector = BridgeConnector::new(BridgeConfig::default());
//! let mut session = connector.open(Path::new("./auth_info")).await?;
//! while let Some(event) = session.events.recv().await {
//!     println!("{event:?}");
//! }
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{SinkExt, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::client::{Connector, EVENT_CHANNEL_CAPACITY, Session, SessionHandle};
use crate::error::Error;
use crate::event::{ConnectionEvent, GroupMetadata, IncomingMessage, ParticipantAction};

type PendingMap = DashMap<u64, oneshot::Sender<Result<Value, Error>>>;

// ── BridgeConfig ─────────────────────────────────────────────────────

/// Where the sidecar listens and how long to wait for its answers.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Session endpoint, e.g. `ws://127.0.0.1:8765/session`.
    pub url: Url,

    /// Upper bound on any single request/response exchange. Default: 30s.
    pub request_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: Url::parse(DEFAULT_BRIDGE_URL).expect("default bridge URL is valid"),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Default sidecar endpoint.
pub const DEFAULT_BRIDGE_URL: &str = "ws://127.0.0.1:8765/session";

// ── BridgeConnector ──────────────────────────────────────────────────

/// [`Connector`] that opens one bridge WebSocket per session generation.
#[derive(Debug, Clone)]
pub struct BridgeConnector {
    config: BridgeConfig,
}

impl BridgeConnector {
    pub fn new(config: BridgeConfig) -> Self {
        Self { config }
    }

    /// The URL used for a session rooted at `auth_dir`.
    pub fn session_url(&self, auth_dir: &Path) -> Url {
        let mut url = self.config.url.clone();
        url.query_pairs_mut()
            .append_pair("authDir", &auth_dir.to_string_lossy());
        url
    }
}

#[async_trait]
impl Connector for BridgeConnector {
    async fn open(&self, auth_dir: &Path) -> Result<Session, Error> {
        let url = self.session_url(auth_dir);
        tracing::info!(url = %url, "Opening bridge session");

        let (ws_stream, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| Error::Connect(e.to_string()))?;

        let (mut write, read) = ws_stream.split();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
        let cancel = CancellationToken::new();
        let shared = Arc::new(Shared::default());

        let writer_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    () = writer_cancel.cancelled() => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                    msg = out_rx.recv() => {
                        let Some(msg) = msg else { break };
                        if let Err(e) = write.send(msg).await {
                            tracing::debug!(error = %e, "Bridge write failed");
                            break;
                        }
                    }
                }
            }
        });

        tokio::spawn(read_loop(read, event_tx, Arc::clone(&shared), cancel.clone()));

        let handle = BridgeHandle {
            out_tx,
            shared,
            cancel,
            next_id: AtomicU64::new(1),
            request_timeout: self.config.request_timeout,
        };

        Ok(Session {
            handle: Arc::new(handle),
            events: event_rx,
        })
    }
}

// ── BridgeHandle ─────────────────────────────────────────────────────

#[derive(Default)]
struct Shared {
    pending: PendingMap,
    own_id: RwLock<Option<String>>,
    closed: AtomicBool,
}

impl Shared {
    /// Fail every outstanding request with [`Error::Closed`].
    fn fail_pending(&self) {
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        for id in ids {
            if let Some((_, tx)) = self.pending.remove(&id) {
                let _ = tx.send(Err(Error::Closed));
            }
        }
    }
}

/// Live bridge session.
pub struct BridgeHandle {
    out_tx: mpsc::UnboundedSender<Message>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    next_id: AtomicU64,
    request_timeout: Duration,
}

impl BridgeHandle {
    async fn call(&self, request: Request<'_>) -> Result<Value, Error> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(Error::Closed);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let text = serde_json::to_string(&Envelope { id, request })
            .map_err(|e| Error::Protocol(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.shared.pending.insert(id, tx);

        // The reader may have failed pending requests between the check above
        // and the insert.
        if self.shared.closed.load(Ordering::Acquire) || self.out_tx.send(Message::text(text)).is_err()
        {
            self.shared.pending.remove(&id);
            return Err(Error::Closed);
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::Closed),
            Err(_) => {
                self.shared.pending.remove(&id);
                Err(Error::Timeout {
                    timeout_secs: self.request_timeout.as_secs(),
                })
            }
        }
    }
}

#[async_trait]
impl SessionHandle for BridgeHandle {
    async fn request_pairing_code(&self, phone_number: &str) -> Result<String, Error> {
        let result = self
            .call(Request::RequestPairingCode { phone_number })
            .await?;
        match result {
            Value::String(code) => Ok(code),
            Value::Object(ref map) => map
                .get("code")
                .and_then(Value::as_str)
                .map(String::from)
                .ok_or_else(|| Error::Protocol(format!("pairing response without code: {result}"))),
            other => Err(Error::Protocol(format!(
                "unexpected pairing response: {other}"
            ))),
        }
    }

    async fn send_text(&self, to: &str, text: &str) -> Result<(), Error> {
        self.call(Request::SendText { to, text }).await.map(|_| ())
    }

    async fn group_metadata(&self, group: &str) -> Result<GroupMetadata, Error> {
        let value = self.call(Request::GroupMetadata { jid: group }).await?;
        serde_json::from_value(value).map_err(|e| Error::Protocol(e.to_string()))
    }

    async fn update_participants(
        &self,
        group: &str,
        participants: &[String],
        action: ParticipantAction,
    ) -> Result<(), Error> {
        self.call(Request::GroupParticipantsUpdate {
            jid: group,
            participants,
            action,
        })
        .await
        .map(|_| ())
    }

    async fn leave_group(&self, group: &str) -> Result<(), Error> {
        self.call(Request::GroupLeave { jid: group }).await.map(|_| ())
    }

    fn own_id(&self) -> Option<String> {
        self.shared.own_id.read().expect("own id lock poisoned").clone()
    }

    async fn close(&self) -> Result<(), Error> {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.cancel.cancel();
        self.shared.fail_pending();
        tracing::debug!("Bridge session closed locally");
        Ok(())
    }
}

// ── Read loop ────────────────────────────────────────────────────────

/// Read frames until the socket drops or the session is closed locally.
///
/// A socket that ends without a `close` connection frame is reported as
/// `Close { code: None }` so the owner always sees the generation end.
async fn read_loop<S>(
    mut read: S,
    event_tx: mpsc::Sender<ConnectionEvent>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
) where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let mut close_reported = false;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            frame = read.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let Some(event) = handle_text(&text, &shared) else { continue };
                        close_reported |= matches!(event, ConnectionEvent::Close { .. });
                        if event_tx.send(event).await.is_err() {
                            tracing::debug!("Session event receiver dropped");
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        if let Some(ref cf) = frame {
                            tracing::info!(code = %cf.code, reason = %cf.reason, "Bridge close frame received");
                        } else {
                            tracing::info!("Bridge close frame received (no payload)");
                        }
                        break;
                    }
                    Some(Err(e)) => {
                        tracing::warn!(error = %e, "Bridge read failed");
                        break;
                    }
                    None => {
                        tracing::info!("Bridge stream ended");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary, Ping, Pong, Frame -- ignore
                    }
                }
            }
        }
    }

    let local_close = cancel.is_cancelled();
    shared.closed.store(true, Ordering::Release);
    shared.fail_pending();
    cancel.cancel();

    if !local_close && !close_reported {
        let _ = event_tx.send(ConnectionEvent::Close { code: None }).await;
    }
}

/// Decode one text frame. Responses and identity frames are absorbed into
/// `shared`; connection and message frames come back as events.
fn handle_text(text: &str, shared: &Shared) -> Option<ConnectionEvent> {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to parse bridge frame");
            return None;
        }
    };

    match frame {
        InboundFrame::Connection { state, status_code } => Some(match state {
            LinkState::Connecting => ConnectionEvent::Connecting,
            LinkState::Open => ConnectionEvent::Open,
            LinkState::Close => ConnectionEvent::Close { code: status_code },
        }),
        InboundFrame::Message(message) => Some(ConnectionEvent::Message(message)),
        InboundFrame::Me { id } => {
            *shared.own_id.write().expect("own id lock poisoned") = Some(id);
            None
        }
        InboundFrame::Response { id, ok, result, error } => {
            let Some((_, tx)) = shared.pending.remove(&id) else {
                tracing::debug!(id, "Response for unknown request");
                return None;
            };
            let outcome = if ok {
                Ok(result)
            } else {
                let error = error.unwrap_or_default();
                Err(Error::platform(error.status_code, error.message))
            };
            let _ = tx.send(outcome);
            None
        }
    }
}

// ── Wire format ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum InboundFrame {
    Connection {
        state: LinkState,
        #[serde(default, rename = "statusCode")]
        status_code: Option<u16>,
    },
    Message(IncomingMessage),
    Me {
        id: String,
    },
    Response {
        id: u64,
        ok: bool,
        #[serde(default)]
        result: Value,
        #[serde(default)]
        error: Option<BridgeError>,
    },
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LinkState {
    Connecting,
    Open,
    Close,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BridgeError {
    #[serde(default)]
    status_code: Option<u16>,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Serialize)]
struct Envelope<'a> {
    id: u64,
    #[serde(flatten)]
    request: Request<'a>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
enum Request<'a> {
    RequestPairingCode {
        #[serde(rename = "phoneNumber")]
        phone_number: &'a str,
    },
    SendText {
        to: &'a str,
        text: &'a str,
    },
    GroupMetadata {
        jid: &'a str,
    },
    GroupParticipantsUpdate {
        jid: &'a str,
        participants: &'a [String],
        action: ParticipantAction,
    },
    GroupLeave {
        jid: &'a str,
    },
}

// ── Tests ────────────────────────────────────────────────────────────
