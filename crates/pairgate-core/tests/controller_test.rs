#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use pairgate_api::mock::{MockConnector, PairingReply, Recorded};
use pairgate_api::{
    ConnectionEvent, GroupMetadata, IncomingMessage, Participant, ParticipantAction,
    ParticipantRole,
};
use pairgate_core::{
    CoreError, ReconnectPolicy, SessionConfig, SessionController, SessionStatus, StatusCell,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tokio::time::Instant;

// ── Helpers ──────────────────────────────────────────────────────

struct Harness {
    controller: SessionController,
    connector: MockConnector,
    tmp: TempDir,
}

fn harness() -> Harness {
    harness_with(|_| {})
}

fn harness_with(tweak: impl FnOnce(&mut SessionConfig)) -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = SessionConfig {
        auth_dir: tmp.path().join("auth_info"),
        ..SessionConfig::default()
    };
    tweak(&mut config);
    let connector = MockConnector::new();
    let controller = SessionController::new(config, Arc::new(connector.clone()));
    Harness {
        controller,
        connector,
        tmp,
    }
}

impl Harness {
    fn auth_dir(&self) -> std::path::PathBuf {
        self.tmp.path().join("auth_info")
    }

    fn store_credentials(&self) {
        std::fs::create_dir_all(self.auth_dir()).unwrap();
        std::fs::write(self.auth_dir().join("creds.json"), "{}").unwrap();
    }

    async fn wait_for(&self, pred: impl FnMut(&StatusCell) -> bool) -> StatusCell {
        let mut rx = self.controller.subscribe_status();
        let cell = tokio::time::timeout(Duration::from_secs(600), rx.wait_for(pred))
            .await
            .expect("status never matched")
            .unwrap();
        *cell
    }

    async fn wait_status(&self, status: SessionStatus) -> StatusCell {
        self.wait_for(|cell| cell.status == status).await
    }

    /// Pair successfully and bring the session to `Connected`.
    async fn connected(&self) {
        self.controller.request_pairing("243858704832").await.unwrap();
        self.connector.last_session().unwrap().emit(ConnectionEvent::Open).await;
        self.wait_status(SessionStatus::Connected).await;
    }
}

fn close(code: u16) -> ConnectionEvent {
    ConnectionEvent::Close { code: Some(code) }
}

/// Let spawned tasks run without moving the clock.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

// ── Pairing ──────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn invalid_numbers_never_touch_the_gate() {
    let h = harness();
    for input in ["12345", "", "+1 (555) 01", "1234567890123456"] {
        assert!(matches!(
            h.controller.request_pairing(input).await,
            Err(CoreError::InvalidInput { .. })
        ));
    }
    let snapshot = h.controller.status_snapshot();
    assert!(snapshot.can_request_now);
    assert_eq!(snapshot.wait_seconds, 0);
    assert_eq!(h.connector.open_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn pairing_issues_an_upper_cased_code_that_expires() {
    let h = harness();
    h.store_credentials();

    let code = h.controller.request_pairing("+243 858 704 832").await.unwrap();
    assert_eq!(code.code, "ABCD1234");
    assert_eq!(code.expires_in, Duration::from_secs(60));

    let session = h.connector.last_session().unwrap();
    assert_eq!(session.pairing_requests(), vec!["243858704832".to_string()]);
    assert!(!h.auth_dir().join("creds.json").exists(), "stale credentials wiped");
    assert_eq!(h.connector.auth_dirs(), vec![h.auth_dir()]);

    let snapshot = h.controller.status_snapshot();
    assert_eq!(snapshot.pairing_code.as_deref(), Some("ABCD1234"));
    assert!(snapshot.pairing_code_valid);
    assert!(!snapshot.can_request_now);
    assert_eq!(snapshot.status, SessionStatus::Connecting);

    tokio::time::advance(Duration::from_secs(59)).await;
    assert!(h.controller.status_snapshot().pairing_code_valid);
    tokio::time::advance(Duration::from_secs(1)).await;
    let snapshot = h.controller.status_snapshot();
    assert!(!snapshot.pairing_code_valid);
    assert_eq!(snapshot.pairing_code.as_deref(), Some("ABCD1234"));
}

#[tokio::test(start_paused = true)]
async fn pairing_waits_for_teardown_and_settling() {
    let h = harness();
    let started = Instant::now();
    h.controller.request_pairing("243858704832").await.unwrap();
    // 2s teardown pause + 3s settle delay.
    assert!(started.elapsed() >= Duration::from_secs(5));
}

#[tokio::test(start_paused = true)]
async fn concurrent_requests_let_exactly_one_through() {
    let h = harness();
    let (first, second) = tokio::join!(
        h.controller.request_pairing("243858704832"),
        h.controller.request_pairing("243858704833"),
    );
    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(
        results
            .iter()
            .any(|r| matches!(r, Err(CoreError::AlreadyInFlight)))
    );
    assert_eq!(h.connector.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn back_to_back_requests_hit_in_flight_then_cooldown() {
    let h = harness();
    let controller = h.controller.clone();
    let first = tokio::spawn(async move { controller.request_pairing("243858704832").await });
    while h.controller.status_snapshot().can_request_now {
        tokio::task::yield_now().await;
    }

    assert!(matches!(
        h.controller.request_pairing("243858704832").await,
        Err(CoreError::AlreadyInFlight)
    ));
    first.await.unwrap().unwrap();

    match h.controller.request_pairing("243858704832").await {
        Err(CoreError::Cooldown { remaining_secs }) => {
            assert!(remaining_secs > 0 && remaining_secs <= 120);
        }
        other => panic!("expected cooldown, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn failed_pairing_releases_gate_but_charges_cooldown() {
    let h = harness();
    h.connector.set_pairing_reply(PairingReply::Reject {
        status: Some(429),
        message: "rate-overlimit".into(),
    });

    let err = h.controller.request_pairing("243858704832").await.unwrap_err();
    assert!(matches!(err, CoreError::PlatformRateLimited));
    assert!(err.user_message().contains("minutes"));

    let snapshot = h.controller.status_snapshot();
    assert!(!snapshot.can_request_now);
    assert!(snapshot.wait_seconds > 0);
    assert!(matches!(
        h.controller.request_pairing("243858704832").await,
        Err(CoreError::Cooldown { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn pairing_request_timeout_is_classified() {
    let h = harness();
    h.connector.set_pairing_reply(PairingReply::Hang);
    assert!(matches!(
        h.controller.request_pairing("243858704832").await,
        Err(CoreError::PairingTimeout)
    ));
}

#[tokio::test(start_paused = true)]
async fn slow_open_fails_with_connect_timeout() {
    let h = harness();
    h.connector.set_open_delay(Duration::from_secs(60));
    let err = h.controller.request_pairing("243858704832").await.unwrap_err();
    assert!(matches!(err, CoreError::ConnectTimeout { timeout_secs: 30 }));
    assert!(err.is_retryable());
    assert!(h.controller.status_snapshot().wait_seconds > 0);
}

#[tokio::test(start_paused = true)]
async fn silent_connection_fails_with_not_ready() {
    let h = harness();
    // The `Connecting` published on install is not an event from the connection.
    h.connector.set_initial_events(Vec::new());
    assert!(matches!(
        h.controller.request_pairing("243858704832").await,
        Err(CoreError::NotReady { timeout_secs: 30 })
    ));
}

#[tokio::test(start_paused = true)]
async fn early_close_fails_without_scheduling_reconnect() {
    let h = harness();
    h.connector.set_initial_events(vec![close(408)]);
    assert!(matches!(
        h.controller.request_pairing("243858704832").await,
        Err(CoreError::ConnectionClosedEarly)
    ));
    assert_eq!(h.controller.status(), SessionStatus::Disconnected);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.connector.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn logout_during_pairing_reports_invalidated_session() {
    let h = harness();
    h.connector.set_initial_events(vec![close(401)]);
    assert!(matches!(
        h.controller.request_pairing("243858704832").await,
        Err(CoreError::SessionInvalidated)
    ));
}

// ── Connection state machine ─────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn awaiting_pairing_close_does_not_reconnect() {
    let h = harness();
    h.controller.request_pairing("243858704832").await.unwrap();
    h.connector.last_session().unwrap().emit(close(428)).await;
    h.wait_status(SessionStatus::WaitingPairing).await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.connector.open_count(), 1);
    assert_eq!(h.controller.status(), SessionStatus::WaitingPairing);
}

#[tokio::test(start_paused = true)]
async fn stream_end_after_quiescent_close_does_not_reconnect() {
    for (code, expected) in [
        (428, SessionStatus::WaitingPairing),
        (515, SessionStatus::NeedsRestart),
    ] {
        let h = harness();
        h.controller.request_pairing("243858704832").await.unwrap();
        let session = h.connector.last_session().unwrap();
        session.emit(close(code)).await;
        session.end();
        h.wait_status(expected).await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.connector.open_count(), 1, "close {code}");
        assert_eq!(h.controller.status(), expected, "close {code}");
    }
}

#[tokio::test(start_paused = true)]
async fn stream_end_after_drop_counts_as_one_failure() {
    let h = harness_with(|config| {
        config.reconnect = ReconnectPolicy {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
        };
    });
    h.connected().await;

    let dropped_at = Instant::now();
    let session = h.connector.session(0).unwrap();
    session.emit(close(408)).await;
    session.end();

    h.connector.wait_for_opens(2).await;
    // A second close for the same drop would have doubled the delay.
    assert!(dropped_at.elapsed() < Duration::from_secs(2));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.connector.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn silent_stream_end_still_reconnects() {
    let h = harness();
    h.connected().await;
    h.connector.session(0).unwrap().end();
    h.wait_status(SessionStatus::Disconnected).await;

    h.connector.wait_for_opens(2).await;
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.connector.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn drop_schedules_exactly_one_reconnect_after_delay() {
    let h = harness();
    h.connected().await;
    let first = h.controller.subscribe_status().borrow().generation;

    let dropped_at = Instant::now();
    h.connector.session(0).unwrap().emit(close(408)).await;
    h.wait_status(SessionStatus::Disconnected).await;

    tokio::time::advance(Duration::from_millis(4_900)).await;
    settle().await;
    assert_eq!(h.connector.open_count(), 1);

    h.connector.wait_for_opens(2).await;
    assert!(dropped_at.elapsed() >= Duration::from_secs(5));
    let cell = h.wait_for(|cell| cell.generation == first + 1).await;
    assert_eq!(cell.status, SessionStatus::Connecting);
    assert!(h.connector.session(0).unwrap().is_closed());

    // Late events from the discarded generation change nothing.
    h.connector.session(0).unwrap().emit(ConnectionEvent::Open).await;
    settle().await;
    let cell = *h.controller.subscribe_status().borrow();
    assert_eq!(cell.generation, first + 1);
    assert_eq!(cell.status, SessionStatus::Connecting);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.connector.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn rapid_drops_collapse_into_one_reconnect() {
    let h = harness();
    h.connected().await;
    let session = h.connector.session(0).unwrap();

    session.emit(close(408)).await;
    settle().await;
    tokio::time::advance(Duration::from_secs(2)).await;
    session.emit(close(503)).await;
    settle().await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.connector.open_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn failed_reconnect_is_retried() {
    let h = harness();
    h.connected().await;
    h.connector.fail_next_open("connection refused");
    h.connector.session(0).unwrap().emit(ConnectionEvent::Close { code: None }).await;

    let started = Instant::now();
    h.connector.wait_for_opens(2).await;
    assert!(started.elapsed() >= Duration::from_secs(10));
}

#[tokio::test(start_paused = true)]
async fn backoff_grows_between_failed_reconnects() {
    let h = harness_with(|config| {
        config.reconnect.initial_delay = Duration::from_secs(1);
        config.reconnect.max_delay = Duration::from_secs(60);
    });
    h.connected().await;
    h.connector.fail_next_open("down");
    h.connector.fail_next_open("down");
    h.connector.session(0).unwrap().emit(close(503)).await;

    let started = Instant::now();
    h.connector.wait_for_opens(2).await;
    // 1s + 2s + 4s
    assert!(started.elapsed() >= Duration::from_secs(7));
}

#[tokio::test(start_paused = true)]
async fn restart_required_waits_for_manual_reconnect() {
    let h = harness();
    h.connected().await;
    h.connector.session(0).unwrap().emit(close(515)).await;
    h.wait_status(SessionStatus::NeedsRestart).await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.connector.open_count(), 1);

    h.store_credentials();
    h.controller.reconnect_now().await.unwrap();
    assert_eq!(h.connector.open_count(), 2);
    assert!(h.auth_dir().join("creds.json").exists(), "credentials kept");
    assert!(h.connector.session(0).unwrap().is_closed());
}

#[tokio::test(start_paused = true)]
async fn slow_manual_reconnect_yields_to_pairing() {
    let h = harness();
    // The manual open outlasts the pairing's teardown pause and open.
    h.connector.push_open_delay(Duration::from_secs(4));

    let controller = h.controller.clone();
    let manual = tokio::spawn(async move { controller.reconnect_now().await });
    settle().await;

    let code = h.controller.request_pairing("243858704832").await.unwrap();
    assert_eq!(code.code, "ABCD1234");
    assert!(matches!(manual.await.unwrap(), Err(CoreError::AlreadyInFlight)));

    assert_eq!(h.connector.open_count(), 2);
    let pairing_session = h.connector.session(0).unwrap();
    let manual_session = h.connector.session(1).unwrap();
    assert_eq!(pairing_session.pairing_requests(), vec!["243858704832".to_string()]);
    assert!(!pairing_session.is_closed());
    assert!(manual_session.is_closed(), "discarded session is closed");

    let snapshot = h.controller.status_snapshot();
    assert_eq!(snapshot.generation, 1);
    assert!(snapshot.pairing_code_valid);
}

#[tokio::test(start_paused = true)]
async fn invalid_credentials_are_destroyed() {
    let h = harness();
    h.connected().await;
    h.store_credentials();

    h.connector.session(0).unwrap().emit(close(401)).await;
    h.wait_for(|cell| {
        cell.status == SessionStatus::Disconnected && cell.last_close.is_some()
    })
    .await;

    assert!(!h.auth_dir().exists());
    assert!(h.connector.session(0).unwrap().is_closed());
    assert_eq!(h.controller.status_snapshot().pairing_code, None);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.connector.open_count(), 1);
}

// ── Administrative ───────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn clear_session_lifts_cooldown_and_is_idempotent() {
    let h = harness();
    h.connected().await;
    h.store_credentials();
    assert!(!h.controller.status_snapshot().can_request_now);

    h.controller.clear_session().await.unwrap();
    let snapshot = h.controller.status_snapshot();
    assert!(snapshot.can_request_now);
    assert_eq!(snapshot.wait_seconds, 0);
    assert_eq!(snapshot.status, SessionStatus::Disconnected);
    assert_eq!(snapshot.pairing_code, None);
    assert!(!h.auth_dir().exists());
    assert!(h.connector.session(0).unwrap().is_closed());

    h.controller.clear_session().await.unwrap();

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.connector.open_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn clear_session_resets_cooldown_even_when_wipe_fails() {
    let h = harness();
    h.connected().await;
    // A plain file where the credential directory should be cannot be removed as a directory.
    std::fs::remove_dir_all(h.auth_dir()).unwrap();
    std::fs::write(h.auth_dir(), "not a directory").unwrap();

    assert!(matches!(
        h.controller.clear_session().await,
        Err(CoreError::Credentials { .. })
    ));
    let snapshot = h.controller.status_snapshot();
    assert!(snapshot.can_request_now);
    assert_eq!(snapshot.wait_seconds, 0);
    assert_eq!(snapshot.pairing_code, None);
    assert_eq!(snapshot.status, SessionStatus::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn start_resumes_stored_session() {
    let h = harness();
    h.store_credentials();
    h.controller.start().await.unwrap();
    assert_eq!(h.connector.open_count(), 1);
    assert!(h.auth_dir().join("creds.json").exists());

    h.connector.session(0).unwrap().emit(ConnectionEvent::Open).await;
    h.wait_status(SessionStatus::Connected).await;
}

#[tokio::test(start_paused = true)]
async fn start_without_credentials_stays_idle() {
    let h = harness();
    h.controller.start().await.unwrap();
    assert_eq!(h.connector.open_count(), 0);
    assert_eq!(h.controller.status(), SessionStatus::Disconnected);

    let h = harness_with(|config| config.resume_on_start = false);
    h.store_credentials();
    h.controller.start().await.unwrap();
    assert_eq!(h.connector.open_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_closes_everything() {
    let h = harness();
    h.connected().await;
    h.controller.shutdown().await;

    assert_eq!(h.controller.status(), SessionStatus::Closed);
    assert!(h.connector.session(0).unwrap().is_closed());
    assert!(matches!(
        h.controller.request_pairing("243858704832").await,
        Err(CoreError::ShutDown)
    ));
    assert!(matches!(
        h.controller.reconnect_now().await,
        Err(CoreError::ShutDown)
    ));
}

// ── Messaging ────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn send_requires_connected_session() {
    let h = harness();
    assert!(matches!(
        h.controller.send_message("243858704832", "hi").await,
        Err(CoreError::NotConnected)
    ));
    assert_eq!(CoreError::NotConnected.user_message(), "not connected");

    h.connected().await;
    h.controller.send_message("+243 858 704 832", "hi").await.unwrap();
    h.controller
        .send_message("12036304@g.us", "hello group")
        .await
        .unwrap();
    assert_eq!(
        h.connector.session(0).unwrap().recorded(),
        vec![
            Recorded::Text {
                to: "243858704832@s.whatsapp.net".into(),
                text: "hi".into(),
            },
            Recorded::Text {
                to: "12036304@g.us".into(),
                text: "hello group".into(),
            },
        ]
    );
}

fn message(from: &str, text: &str) -> ConnectionEvent {
    ConnectionEvent::Message(IncomingMessage {
        from: from.into(),
        text: text.into(),
        from_me: false,
    })
}

#[tokio::test(start_paused = true)]
async fn ping_gets_a_reply() {
    let h = harness();
    h.connected().await;
    let session = h.connector.session(0).unwrap();
    session.emit(message("111@s.whatsapp.net", " !PING ")).await;
    session.emit(message("111@s.whatsapp.net", "hello there")).await;
    settle().await;

    let recorded = session.recorded();
    assert_eq!(recorded.len(), 1);
    assert!(matches!(
        &recorded[0],
        Recorded::Text { to, text } if to == "111@s.whatsapp.net" && text.contains("Pong")
    ));
}

#[tokio::test(start_paused = true)]
async fn quit_hands_group_to_admin_before_leaving() {
    let h = harness_with(|config| config.admin_number = Some("243858704832".into()));
    let group = "12036304@g.us";
    h.connector.set_own_id("999:7@s.whatsapp.net");
    h.connector.set_group(GroupMetadata {
        id: group.into(),
        subject: "Team".into(),
        participants: vec![Participant {
            id: "999@s.whatsapp.net".into(),
            role: ParticipantRole::Admin,
        }],
    });
    h.connected().await;

    let session = h.connector.session(0).unwrap();
    session.emit(message(group, "!quit")).await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    let admin = vec!["243858704832@s.whatsapp.net".to_string()];
    let actions: Vec<_> = session
        .recorded()
        .into_iter()
        .filter(|r| !matches!(r, Recorded::Text { .. }))
        .collect();
    assert_eq!(
        actions,
        vec![
            Recorded::Participants {
                group: group.into(),
                participants: admin.clone(),
                action: ParticipantAction::Add,
            },
            Recorded::Participants {
                group: group.into(),
                participants: admin,
                action: ParticipantAction::Promote,
            },
            Recorded::Leave {
                group: group.into()
            },
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn quit_without_admin_rights_just_leaves() {
    let h = harness_with(|config| config.admin_number = Some("243858704832".into()));
    let group = "12036304@g.us";
    h.connector.set_own_id("999@s.whatsapp.net");
    h.connector.set_group(GroupMetadata {
        id: group.into(),
        subject: "Team".into(),
        participants: vec![Participant {
            id: "999@s.whatsapp.net".into(),
            role: ParticipantRole::Member,
        }],
    });
    h.connected().await;

    let session = h.connector.session(0).unwrap();
    session.emit(message(group, "!quit")).await;
    tokio::time::sleep(Duration::from_secs(10)).await;

    let recorded = session.recorded();
    assert_eq!(recorded.len(), 2);
    assert!(matches!(&recorded[0], Recorded::Text { text, .. } if text.contains("not an admin")));
    assert_eq!(
        recorded[1],
        Recorded::Leave {
            group: group.into()
        }
    );
}

#[tokio::test(start_paused = true)]
async fn commands_are_ignored_until_connected() {
    let h = harness();
    h.controller.request_pairing("243858704832").await.unwrap();
    let session = h.connector.session(0).unwrap();
    session.emit(message("111@s.whatsapp.net", "!ping")).await;
    settle().await;
    assert!(session.recorded().is_empty());
}
