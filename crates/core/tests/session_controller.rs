use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use pairlink::testing::{FakeProtocolClient, MemoryCredentialStore};
use pairlink::{ClientEvent, Credentials, DisconnectReason, SessionConfig, SessionController, SessionError, SessionState};
use serde_json::json;
use tokio::time::Instant;

struct Harness {
	client: FakeProtocolClient,
	store: Arc<MemoryCredentialStore>,
	controller: SessionController,
}

impl Harness {
	fn new() -> Self {
		Self::with_store(MemoryCredentialStore::new())
	}

	fn with_store(store: MemoryCredentialStore) -> Self {
		let client = FakeProtocolClient::new();
		let store = Arc::new(store);
		let controller = SessionController::spawn(Arc::new(client.clone()), store.clone(), SessionConfig::default());
		Self { client, store, controller }
	}

	async fn connected() -> Self {
		let harness = Self::new();
		harness.controller.start_session().await.expect("start should succeed");
		settle().await;
		harness.client.emit(ClientEvent::Open);
		settle().await;
		assert_eq!(harness.controller.current_status().state, SessionState::Connected);
		harness
	}
}

/// Lets queued tasks run. Time is paused, so this only advances the clock once everything is idle.
async fn settle() {
	tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn at_most_one_live_handle_across_start_and_shutdown() {
	let h = Harness::new();

	for round in 0..5 {
		h.controller.start_session().await.unwrap();
		if round % 2 == 0 {
			settle().await;
		}
		h.controller.start_session().await.unwrap();
		settle().await;
		assert_eq!(h.client.live_handles(), 1, "round {round}");
		h.controller.shutdown().await.unwrap();
		assert_eq!(h.client.live_handles(), 0, "round {round}");
	}

	assert_eq!(h.client.max_live_handles(), 1);
}

#[tokio::test(start_paused = true)]
async fn concurrent_starts_are_serialized() {
	let h = Harness::new();

	let starts: Vec<_> = (0..8)
		.map(|_| {
			let controller = h.controller.clone();
			tokio::spawn(async move { controller.start_session().await })
		})
		.collect();
	for start in starts {
		start.await.unwrap().unwrap();
	}
	settle().await;

	assert_eq!(h.client.live_handles(), 1);
	assert_eq!(h.client.max_live_handles(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_is_idempotent() {
	let h = Harness::connected().await;

	h.controller.shutdown().await.unwrap();
	let first = h.controller.current_status();
	h.controller.shutdown().await.unwrap();
	let second = h.controller.current_status();

	assert_eq!(first, second);
	assert_eq!(second.state, SessionState::Disconnected);
	assert_eq!(second.qr, None);
	assert_eq!(h.client.logouts(), 1);
	assert_eq!(h.client.live_handles(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_without_session_is_a_no_op() {
	let h = Harness::new();

	h.controller.shutdown().await.unwrap();

	assert_eq!(h.controller.current_status().state, SessionState::Disconnected);
	assert_eq!(h.client.connects(), 0);
	assert_eq!(h.client.logouts(), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_logout_falls_back_to_terminate() {
	let h = Harness::connected().await;
	h.client.fail_logout("stream errored");

	h.controller.shutdown().await.unwrap();

	assert_eq!(h.client.logouts(), 1);
	assert_eq!(h.client.terminates(), 1);
	assert_eq!(h.client.live_handles(), 0);
	assert_eq!(h.controller.current_status().state, SessionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn hung_logout_is_bounded() {
	let h = Harness::connected().await;
	h.client.hang_logout();
	let started = Instant::now();

	h.controller.shutdown().await.unwrap();

	assert_eq!(started.elapsed(), SessionConfig::default().logout_timeout);
	assert_eq!(h.client.terminates(), 1);
	assert_eq!(h.client.live_handles(), 0);
	assert_eq!(h.controller.current_status().state, SessionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn challenge_then_open_clears_qr() {
	let h = Harness::new();
	h.controller.start_session().await.unwrap();
	settle().await;

	h.client.emit(ClientEvent::Challenge("2@Yq0F1dSBV0,Qm9vaw==,c2Vzc2lvbg==".into()));
	settle().await;
	let status = h.controller.current_status();
	assert_eq!(status.state, SessionState::Connecting);
	let qr = status.qr.expect("challenge should be visible while connecting");
	assert!(qr.starts_with("data:image/svg+xml;base64,"), "{qr}");

	h.client.emit(ClientEvent::Open);
	settle().await;
	let status = h.controller.current_status();
	assert_eq!(status.state, SessionState::Connected);
	assert_eq!(status.qr, None);
}

#[tokio::test(start_paused = true)]
async fn challenge_after_open_is_not_stored() {
	let h = Harness::connected().await;

	h.client.emit(ClientEvent::Challenge("2@late".into()));
	settle().await;

	assert_eq!(h.controller.current_status().qr, None);
}

#[tokio::test(start_paused = true)]
async fn subscribers_observe_transitions() {
	let h = Harness::new();
	let mut status = h.controller.subscribe();

	h.controller.start_session().await.unwrap();
	settle().await;
	h.client.emit(ClientEvent::Open);

	let seen = tokio::time::timeout(Duration::from_secs(1), status.wait_for(|s| s.state == SessionState::Connected))
		.await
		.expect("connected status should be published")
		.unwrap()
		.clone();
	assert_eq!(seen.qr, None);
}

#[tokio::test(start_paused = true)]
async fn connecting_event_sets_connecting() {
	let h = Harness::connected().await;

	h.client.emit(ClientEvent::Connecting);
	settle().await;

	assert_eq!(h.controller.current_status().state, SessionState::Connecting);
	assert_eq!(h.client.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn empty_phone_is_rejected_without_connecting() {
	let h = Harness::new();

	for phone in ["", "   "] {
		let err = h.controller.request_pairing(phone).await.unwrap_err();
		assert!(matches!(err, SessionError::Validation(_)), "{err:?}");
	}
	settle().await;

	assert_eq!(h.client.connects(), 0);
	assert_eq!(h.controller.current_status().state, SessionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn pairing_times_out_after_configured_window() {
	let h = Harness::new();
	let started = Instant::now();

	let err = h.controller.request_pairing("15550100").await.unwrap_err();

	assert_eq!(started.elapsed(), Duration::from_secs(30));
	match err {
		SessionError::ConnectionTimeout { attempts, waited } => {
			assert_eq!(attempts, 15);
			assert_eq!(waited, Duration::from_secs(30));
		}
		other => panic!("expected connection timeout, got {other:?}"),
	}
	assert_eq!(h.client.pairing_requests(), 0);

	h.client.set_pairing_ready(true);
	tokio::time::sleep(Duration::from_secs(10)).await;
	assert_eq!(h.client.pairing_requests(), 0, "no polls after the deadline");
}

#[tokio::test(start_paused = true)]
async fn pairing_returns_code_once_ready() {
	let h = Harness::new();
	h.client.set_pairing_code("K7Q2M9XW");
	h.client.set_pairing_ready(true);
	let started = Instant::now();

	let code = h.controller.request_pairing(" 15550100 ").await.unwrap();

	assert_eq!(code, "K7Q2M9XW");
	assert_eq!(started.elapsed(), Duration::from_secs(2));
	assert_eq!(h.client.pairing_requests(), 1);
	assert_eq!(h.client.connects(), 1);
}

#[tokio::test(start_paused = true)]
async fn pairing_waits_through_connecting_flaps() {
	let h = Harness::new();
	let client = h.client.clone();
	tokio::spawn(async move {
		for _ in 0..3 {
			tokio::time::sleep(Duration::from_millis(1500)).await;
			client.emit(ClientEvent::Connecting);
		}
		client.set_pairing_ready(true);
	});
	let started = Instant::now();

	let code = h.controller.request_pairing("15550100").await.unwrap();

	assert_eq!(code, "ABCD1234");
	assert_eq!(started.elapsed(), Duration::from_secs(6));
	assert_eq!(h.client.pairing_requests(), 1);
}

#[tokio::test(start_paused = true)]
async fn pairing_replaces_existing_session() {
	let h = Harness::connected().await;
	h.client.set_pairing_ready(true);

	h.controller.request_pairing("15550100").await.unwrap();

	assert_eq!(h.client.logouts(), 1);
	assert_eq!(h.client.connects(), 2);
	assert_eq!(h.client.max_live_handles(), 1);
}

#[tokio::test(start_paused = true)]
async fn pairing_failure_is_reported() {
	let h = Harness::new();
	h.client.set_pairing_ready(true);
	h.client.fail_pairing("rate-overlimit");

	let err = h.controller.request_pairing("15550100").await.unwrap_err();

	assert!(matches!(err, SessionError::PairingRequest(_)), "{err:?}");
	assert_eq!(h.client.pairing_requests(), 1);
}

#[tokio::test(start_paused = true)]
async fn update_requires_connected_session() {
	let h = Harness::new();
	let image = Bytes::from_static(b"\x89PNG\r\n\x1a\n");

	let err = h.controller.update_profile_picture(image.clone()).await.unwrap_err();
	assert!(matches!(err, SessionError::NotConnected), "{err:?}");

	h.controller.start_session().await.unwrap();
	settle().await;
	let err = h.controller.update_profile_picture(image).await.unwrap_err();
	assert!(matches!(err, SessionError::NotConnected), "{err:?}");

	assert!(h.client.profile_updates().is_empty());
	assert_eq!(h.client.logouts(), 0);
}

#[tokio::test(start_paused = true)]
async fn update_rejects_empty_image() {
	let h = Harness::connected().await;

	let err = h.controller.update_profile_picture(Bytes::new()).await.unwrap_err();

	assert!(matches!(err, SessionError::Validation(_)), "{err:?}");
	assert!(h.client.profile_updates().is_empty());
}

#[tokio::test(start_paused = true)]
async fn update_submits_once_then_tears_down_and_wipes() {
	let h = Harness::connected().await;
	let image = Bytes::from((0..=255u8).cycle().take(4096).collect::<Vec<u8>>());

	h.controller.update_profile_picture(image.clone()).await.unwrap();

	assert_eq!(h.client.profile_updates(), vec![image]);
	assert_eq!(h.client.logouts(), 0, "teardown waits for the delay");
	assert_eq!(h.controller.current_status().state, SessionState::Connected);

	tokio::time::sleep(Duration::from_millis(2900)).await;
	assert_eq!(h.client.logouts(), 0);

	tokio::time::sleep(Duration::from_millis(200)).await;
	assert_eq!(h.client.logouts(), 1);
	assert_eq!(h.store.clears(), 1);
	assert_eq!(h.client.live_handles(), 0);
	assert_eq!(h.controller.current_status().state, SessionState::Disconnected);

	tokio::time::sleep(Duration::from_secs(30)).await;
	assert_eq!(h.client.profile_updates().len(), 1);
	assert_eq!(h.client.logouts(), 1);
	assert_eq!(h.store.clears(), 1);
}

#[tokio::test(start_paused = true)]
async fn wipe_failure_is_swallowed() {
	let h = Harness::connected().await;
	h.store.fail_clear();

	h.controller.update_profile_picture(Bytes::from_static(b"jpeg")).await.unwrap();
	tokio::time::sleep(Duration::from_secs(10)).await;

	assert_eq!(h.store.clears(), 1);
	assert_eq!(h.client.logouts(), 1);
	assert_eq!(h.controller.current_status().state, SessionState::Disconnected);
	h.controller.start_session().await.expect("controller should keep serving");
}

#[tokio::test(start_paused = true)]
async fn failed_update_schedules_nothing() {
	let h = Harness::connected().await;
	h.client.fail_profile_update("item-not-found");

	let err = h.controller.update_profile_picture(Bytes::from_static(b"jpeg")).await.unwrap_err();
	tokio::time::sleep(Duration::from_secs(10)).await;

	assert!(matches!(err, SessionError::ProfileUpdate(_)), "{err:?}");
	assert_eq!(h.client.profile_updates().len(), 1);
	assert_eq!(h.client.logouts(), 0);
	assert_eq!(h.store.clears(), 0);
	assert_eq!(h.controller.current_status().state, SessionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn logged_out_close_does_not_reconnect() {
	let h = Harness::connected().await;

	h.client.emit(ClientEvent::Closed(DisconnectReason::LoggedOut));
	settle().await;
	tokio::time::sleep(Duration::from_secs(5)).await;

	assert_eq!(h.controller.current_status().state, SessionState::Disconnected);
	assert_eq!(h.client.connects(), 1);
	assert_eq!(h.client.live_handles(), 0);
}

#[tokio::test(start_paused = true)]
async fn other_close_reconnects_exactly_once() {
	for reason in [
		DisconnectReason::RestartRequired,
		DisconnectReason::ConnectionLost,
		DisconnectReason::ConnectionReplaced,
		DisconnectReason::Other(None),
	] {
		let h = Harness::connected().await;

		h.client.emit(ClientEvent::Closed(reason));
		settle().await;
		tokio::time::sleep(Duration::from_secs(5)).await;

		assert_eq!(h.client.connects(), 2, "{reason}");
		assert_eq!(h.client.live_handles(), 1, "{reason}");
		assert_eq!(h.client.max_live_handles(), 1, "{reason}");
		assert_eq!(h.client.logouts(), 0, "{reason}");
		assert_eq!(h.controller.current_status().state, SessionState::Connecting, "{reason}");
	}
}

#[tokio::test(start_paused = true)]
async fn connect_failure_sets_error() {
	let h = Harness::new();
	h.client.fail_connect(Some("bridge unreachable"));

	h.controller.start_session().await.unwrap();
	settle().await;
	assert_eq!(h.controller.current_status().state, SessionState::Error);
	assert_eq!(h.client.live_handles(), 0);

	h.client.fail_connect(None);
	h.controller.start_session().await.unwrap();
	settle().await;
	assert_eq!(h.controller.current_status().state, SessionState::Connecting);
	assert_eq!(h.client.live_handles(), 1);
}

#[tokio::test(start_paused = true)]
async fn credential_updates_are_persisted_in_order() {
	let h = Harness::new();
	h.controller.start_session().await.unwrap();
	settle().await;

	for n in 0..3 {
		h.client.emit(ClientEvent::CredentialsUpdated(Credentials::new(json!({"registered": false, "n": n}))));
	}
	settle().await;

	assert_eq!(h.store.saves(), 3);
	assert_eq!(h.store.current(), Some(Credentials::new(json!({"registered": false, "n": 2}))));
}

#[tokio::test(start_paused = true)]
async fn credentials_from_retired_session_are_ignored() {
	let h = Harness::connected().await;
	h.controller.shutdown().await.unwrap();

	h.client.emit(ClientEvent::CredentialsUpdated(Credentials::new(json!({"registered": true}))));
	settle().await;

	assert_eq!(h.store.saves(), 0);
	assert_eq!(h.store.current(), None);
}

#[tokio::test(start_paused = true)]
async fn stored_credentials_are_used_on_connect() {
	let h = Harness::with_store(MemoryCredentialStore::with_credentials(Credentials::new(json!({"registered": true}))));

	h.controller.start_session().await.unwrap();
	settle().await;

	let seen = h.client.credentials_seen();
	assert_eq!(seen.len(), 1);
	assert!(seen[0].as_ref().is_some_and(Credentials::is_registered));
}

#[tokio::test(start_paused = true)]
async fn close_terminates_without_logout() {
	let h = Harness::connected().await;

	h.controller.close().await.unwrap();

	assert_eq!(h.client.logouts(), 0);
	assert_eq!(h.client.terminates(), 1);
	assert_eq!(h.client.live_handles(), 0);
	let err = h.controller.start_session().await.unwrap_err();
	assert!(matches!(err, SessionError::ControllerClosed), "{err:?}");
}
