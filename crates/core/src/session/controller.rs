use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use pairlink_protocol::{METHOD_PAIRING_REQUEST, METHOD_PROFILE_PICTURE_SET};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{Instant, interval_at};
use tracing::{debug, error, info, warn};

use super::state::{SessionState, SessionStatus};
use crate::client::{ClientEvent, EventSink, ProtocolClient, ProtocolHandle};
use crate::config::SessionConfig;
use crate::credentials::CredentialStore;
use crate::error::{ClientError, Result, SessionError, StoreError};
use crate::qr;

type Handle = Box<dyn ProtocolHandle>;

#[derive(Debug, thiserror::Error)]
enum ConnectFailure {
	#[error("loading credentials failed: {0}")]
	Store(#[from] StoreError),
	#[error(transparent)]
	Client(#[from] ClientError),
}

type ConnectOutcome = std::result::Result<Handle, ConnectFailure>;

enum Envelope {
	Start {
		done: oneshot::Sender<()>,
	},
	Shutdown {
		done: oneshot::Sender<()>,
	},
	PairingCode {
		phone: String,
		reply: oneshot::Sender<std::result::Result<Option<String>, ClientError>>,
	},
	UpdateProfilePicture {
		image: Bytes,
		reply: oneshot::Sender<Result<()>>,
	},
	TeardownAndWipe,
	Close {
		done: oneshot::Sender<()>,
	},
	Event {
		generation: u64,
		event: ClientEvent,
	},
}

/// Handle to the task that owns the session.
///
/// Clones share the same session. Operations are queued and applied one at a
/// time together with protocol events, so a caller never observes a
/// half-replaced session.
#[derive(Clone)]
pub struct SessionController {
	inbox: mpsc::UnboundedSender<Envelope>,
	status: watch::Receiver<SessionStatus>,
	config: Arc<SessionConfig>,
}

impl SessionController {
	/// Starts the controller task. Must be called inside a Tokio runtime.
	pub fn spawn(client: Arc<dyn ProtocolClient>, store: Arc<dyn CredentialStore>, config: SessionConfig) -> Self {
		let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
		let (status_tx, status_rx) = watch::channel(SessionStatus::default());
		let config = Arc::new(config);

		let actor = Actor {
			client,
			store,
			config: Arc::clone(&config),
			inbox: inbox_tx.downgrade(),
			status: status_tx,
			state: SessionState::Disconnected,
			challenge: None,
			handle: None,
			connecting: None,
			generation: 0,
		};
		tokio::spawn(actor.run(inbox_rx));

		Self {
			inbox: inbox_tx,
			status: status_rx,
			config,
		}
	}

	/// Snapshot of the session. Never waits on the controller task.
	pub fn current_status(&self) -> SessionStatus {
		self.status.borrow().clone()
	}

	/// Receiver that observes every published status.
	pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
		self.status.clone()
	}

	/// Replaces any existing session with a fresh connection attempt.
	///
	/// Resolves once the previous session is gone and the new one is
	/// `CONNECTING`; the connection itself is established in the background.
	pub async fn start_session(&self) -> Result<()> {
		self.ask(|done| Envelope::Start { done }).await
	}

	/// Logs out (or terminates) the current session. No-op without one.
	pub async fn shutdown(&self) -> Result<()> {
		self.ask(|done| Envelope::Shutdown { done }).await
	}

	/// Starts a fresh session and polls until it can accept a pairing-code
	/// request, then returns the code.
	pub async fn request_pairing(&self, phone: &str) -> Result<String> {
		let phone = phone.trim();
		if phone.is_empty() {
			return Err(SessionError::Validation("phone number is required".into()));
		}

		self.start_session().await?;

		let policy = self.config.pairing;
		let period = policy.interval.max(Duration::from_millis(1));
		let started = Instant::now();
		let deadline = started + policy.timeout();
		let mut ticker = interval_at(started + period, period);

		for attempt in 1..=policy.max_attempts {
			ticker.tick().await;
			if Instant::now() > deadline {
				break;
			}

			let phone = phone.to_string();
			match self.ask(|reply| Envelope::PairingCode { phone, reply }).await? {
				Ok(Some(code)) => {
					info!(target = "pairlink.session", attempt, "pairing code issued");
					return Ok(code);
				}
				Ok(None) => debug!(target = "pairlink.session", attempt, "connection not ready for pairing"),
				Err(err) => {
					warn!(target = "pairlink.session", attempt, error = %err, "pairing code request failed");
					return Err(SessionError::PairingRequest(err));
				}
			}
		}

		let waited = started.elapsed();
		warn!(target = "pairlink.session", attempts = policy.max_attempts, ?waited, "pairing readiness timed out");
		Err(SessionError::ConnectionTimeout {
			attempts: policy.max_attempts,
			waited,
		})
	}

	/// Submits `image` unchanged as the new profile picture.
	///
	/// On success the session is torn down and credentials are wiped after
	/// the configured delay.
	pub async fn update_profile_picture(&self, image: Bytes) -> Result<()> {
		self.ask(|reply| Envelope::UpdateProfilePicture { image, reply }).await?
	}

	/// Terminates any live connection without logging out and stops the task.
	pub async fn close(&self) -> Result<()> {
		self.ask(|done| Envelope::Close { done }).await
	}

	async fn ask<T>(&self, envelope: impl FnOnce(oneshot::Sender<T>) -> Envelope) -> Result<T> {
		let (tx, rx) = oneshot::channel();
		self.inbox.send(envelope(tx)).map_err(|_| SessionError::ControllerClosed)?;
		rx.await.map_err(|_| SessionError::ControllerClosed)
	}
}

struct Actor {
	client: Arc<dyn ProtocolClient>,
	store: Arc<dyn CredentialStore>,
	config: Arc<SessionConfig>,
	inbox: mpsc::WeakUnboundedSender<Envelope>,
	status: watch::Sender<SessionStatus>,
	state: SessionState,
	challenge: Option<String>,
	handle: Option<Handle>,
	connecting: Option<JoinHandle<ConnectOutcome>>,
	/// Bumped whenever a session ends; events tagged with an older value are dropped.
	generation: u64,
}

async fn connect(client: Arc<dyn ProtocolClient>, store: Arc<dyn CredentialStore>, sink: EventSink) -> ConnectOutcome {
	let credentials = store.load().await?;
	Ok(client.connect(credentials, sink).await?)
}

async fn connect_outcome(task: &mut Option<JoinHandle<ConnectOutcome>>) -> std::result::Result<ConnectOutcome, JoinError> {
	match task.as_mut() {
		Some(task) => task.await,
		None => std::future::pending().await,
	}
}

impl Actor {
	async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<Envelope>) {
		loop {
			tokio::select! {
				envelope = inbox.recv() => {
					let Some(envelope) = envelope else {
						self.drop_session().await;
						break;
					};
					if !self.dispatch(envelope).await {
						break;
					}
				}
				outcome = connect_outcome(&mut self.connecting), if self.connecting.is_some() => {
					self.connecting = None;
					self.on_connect_outcome(outcome).await;
				}
			}
		}
		debug!(target = "pairlink.session", "controller stopped");
	}

	async fn dispatch(&mut self, envelope: Envelope) -> bool {
		match envelope {
			Envelope::Start { done } => {
				self.start_session().await;
				let _ = done.send(());
			}
			Envelope::Shutdown { done } => {
				self.shutdown().await;
				let _ = done.send(());
			}
			Envelope::PairingCode { phone, reply } => {
				let _ = reply.send(self.pairing_code(&phone).await);
			}
			Envelope::UpdateProfilePicture { image, reply } => {
				let _ = reply.send(self.update_profile_picture(image).await);
			}
			Envelope::TeardownAndWipe => self.teardown_and_wipe().await,
			Envelope::Close { done } => {
				self.drop_session().await;
				let _ = done.send(());
				return false;
			}
			Envelope::Event { generation, event } => self.on_event(generation, event).await,
		}
		true
	}

	fn publish(&self) {
		self.status.send_replace(SessionStatus {
			state: self.state,
			qr: self.challenge.clone(),
		});
	}

	fn set_status(&mut self, state: SessionState, challenge: Option<String>) {
		self.state = state;
		self.challenge = challenge;
		self.publish();
	}

	fn has_session(&self) -> bool {
		self.handle.is_some() || self.connecting.is_some() || matches!(self.state, SessionState::Connecting | SessionState::Connected)
	}

	fn event_sink(&self, generation: u64) -> EventSink {
		let inbox = self.inbox.clone();
		EventSink::new(move |event| inbox.upgrade().is_some_and(|tx| tx.send(Envelope::Event { generation, event }).is_ok()))
	}

	/// Aborts an in-flight connect. A connect that already finished has its handle terminated.
	async fn cancel_connect(&mut self) {
		let Some(task) = self.connecting.take() else {
			return;
		};
		task.abort();
		if let Ok(Ok(handle)) = task.await {
			handle.terminate().await;
		}
	}

	async fn logout(&self, handle: Handle) {
		match tokio::time::timeout(self.config.logout_timeout, handle.logout()).await {
			Ok(Ok(())) => info!(target = "pairlink.session", generation = self.generation, "logged out"),
			Ok(Err(err)) => {
				warn!(target = "pairlink.session", error = %err, "logout failed; terminating connection");
				handle.terminate().await;
			}
			Err(_) => {
				warn!(target = "pairlink.session", timeout = ?self.config.logout_timeout, "logout timed out; terminating connection");
				handle.terminate().await;
			}
		}
	}

	async fn shutdown(&mut self) {
		if !self.has_session() {
			debug!(target = "pairlink.session", state = %self.state, "shutdown: no session");
			return;
		}

		self.generation += 1;
		self.cancel_connect().await;
		if let Some(handle) = self.handle.take() {
			self.logout(handle).await;
		}
		self.set_status(SessionState::Disconnected, None);
		info!(target = "pairlink.session", generation = self.generation, "session shut down");
	}

	/// Ends the session without protocol traffic.
	async fn drop_session(&mut self) {
		self.generation += 1;
		self.cancel_connect().await;
		if let Some(handle) = self.handle.take() {
			handle.terminate().await;
		}
		self.set_status(SessionState::Disconnected, None);
	}

	async fn start_session(&mut self) {
		self.shutdown().await;

		self.generation += 1;
		let generation = self.generation;
		self.set_status(SessionState::Connecting, None);
		info!(target = "pairlink.session", generation, "starting session");

		let client = Arc::clone(&self.client);
		let store = Arc::clone(&self.store);
		let sink = self.event_sink(generation);
		self.connecting = Some(tokio::spawn(connect(client, store, sink)));
	}

	async fn on_connect_outcome(&mut self, outcome: std::result::Result<ConnectOutcome, JoinError>) {
		match outcome {
			Ok(Ok(handle)) => {
				debug!(target = "pairlink.session", generation = self.generation, "protocol client connected");
				self.handle = Some(handle);
			}
			Ok(Err(err)) => {
				error!(target = "pairlink.session", generation = self.generation, error = %err, "connection failed");
				self.generation += 1;
				self.set_status(SessionState::Error, None);
			}
			Err(err) if err.is_panic() => {
				error!(target = "pairlink.session", generation = self.generation, "connect task panicked");
				self.generation += 1;
				self.set_status(SessionState::Error, None);
			}
			Err(_) => {}
		}
	}

	async fn on_event(&mut self, generation: u64, event: ClientEvent) {
		if generation != self.generation {
			debug!(target = "pairlink.session", generation, current = self.generation, "dropping stale event");
			return;
		}

		match event {
			ClientEvent::Challenge(challenge) => {
				if self.state != SessionState::Connecting {
					debug!(target = "pairlink.session", state = %self.state, "challenge outside CONNECTING ignored");
					return;
				}
				match qr::render_data_uri(&challenge) {
					Ok(uri) => {
						self.challenge = Some(uri);
						self.publish();
						info!(target = "pairlink.session", generation, "pairing challenge issued");
					}
					Err(err) => warn!(target = "pairlink.session", error = %err, "could not render challenge"),
				}
			}
			ClientEvent::Connecting => {
				if self.state != SessionState::Connecting {
					self.state = SessionState::Connecting;
					self.publish();
				}
			}
			ClientEvent::Open => {
				self.set_status(SessionState::Connected, None);
				info!(target = "pairlink.session", generation, "connection open");
			}
			ClientEvent::Closed(reason) if reason.is_logged_out() => {
				info!(target = "pairlink.session", generation, %reason, "logged out remotely");
				self.drop_session().await;
			}
			ClientEvent::Closed(reason) => {
				info!(target = "pairlink.session", generation, %reason, "connection closed; reconnecting");
				self.drop_session().await;
				self.start_session().await;
			}
			ClientEvent::CredentialsUpdated(credentials) => match self.store.save(&credentials).await {
				Ok(()) => debug!(target = "pairlink.session", generation, "credentials persisted"),
				Err(err) => warn!(target = "pairlink.session", generation, error = %err, "failed to persist credentials"),
			},
		}
	}

	async fn pairing_code(&self, phone: &str) -> std::result::Result<Option<String>, ClientError> {
		let Some(handle) = self.handle.as_ref().filter(|handle| handle.is_pairing_ready()) else {
			return Ok(None);
		};
		match tokio::time::timeout(self.config.request_timeout, handle.request_pairing_code(phone)).await {
			Ok(result) => result.map(Some),
			Err(_) => Err(ClientError::Timeout {
				method: METHOD_PAIRING_REQUEST,
				after: self.config.request_timeout,
			}),
		}
	}

	async fn update_profile_picture(&self, image: Bytes) -> Result<()> {
		let handle = match (&self.handle, self.state) {
			(Some(handle), SessionState::Connected) => handle,
			_ => return Err(SessionError::NotConnected),
		};
		if image.is_empty() {
			return Err(SessionError::Validation("image is empty".into()));
		}

		let bytes = image.len();
		match tokio::time::timeout(self.config.request_timeout, handle.submit_profile_picture(image)).await {
			Ok(Ok(())) => {}
			Ok(Err(err)) => return Err(SessionError::ProfileUpdate(err)),
			Err(_) => {
				return Err(SessionError::ProfileUpdate(ClientError::Timeout {
					method: METHOD_PROFILE_PICTURE_SET,
					after: self.config.request_timeout,
				}));
			}
		}

		info!(target = "pairlink.session", bytes, delay = ?self.config.teardown_delay, "profile picture updated; scheduling teardown");
		self.schedule_teardown();
		Ok(())
	}

	fn schedule_teardown(&self) {
		let inbox = self.inbox.clone();
		let delay = self.config.teardown_delay;
		tokio::spawn(async move {
			tokio::time::sleep(delay).await;
			if let Some(tx) = inbox.upgrade() {
				let _ = tx.send(Envelope::TeardownAndWipe);
			}
		});
	}

	async fn teardown_and_wipe(&mut self) {
		self.shutdown().await;
		match self.store.clear().await {
			Ok(removed) => info!(target = "pairlink.session", removed, "credentials wiped"),
			Err(err) => {
				let err = SessionError::CredentialWipe(err);
				error!(target = "pairlink.session", error = %err, "credential wipe failed");
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use pairlink_protocol::DisconnectReason;

	use super::*;
	use crate::testing::{FakeProtocolClient, MemoryCredentialStore};

	fn controller(client: &FakeProtocolClient) -> SessionController {
		SessionController::spawn(Arc::new(client.clone()), Arc::new(MemoryCredentialStore::new()), SessionConfig::default())
	}

	async fn settle() {
		tokio::time::sleep(Duration::from_millis(1)).await;
	}

	#[tokio::test(start_paused = true)]
	async fn start_publishes_connecting_then_stores_handle() {
		let client = FakeProtocolClient::new();
		let controller = controller(&client);

		controller.start_session().await.unwrap();
		assert_eq!(controller.current_status().state, SessionState::Connecting);

		settle().await;
		assert_eq!(client.connects(), 1);
		assert_eq!(client.live_handles(), 1);
	}

	#[tokio::test(start_paused = true)]
	async fn restart_before_connect_completes_leaves_one_handle() {
		let client = FakeProtocolClient::new();
		let controller = controller(&client);

		controller.start_session().await.unwrap();
		controller.start_session().await.unwrap();
		controller.start_session().await.unwrap();
		settle().await;

		assert_eq!(client.live_handles(), 1);
		assert!(client.max_live_handles() <= 1);
	}

	#[tokio::test(start_paused = true)]
	async fn events_from_replaced_session_are_ignored() {
		let client = FakeProtocolClient::new();
		let controller = controller(&client);

		controller.start_session().await.unwrap();
		settle().await;
		controller.start_session().await.unwrap();
		settle().await;

		client.emit_on(0, ClientEvent::Open);
		client.emit_on(0, ClientEvent::Closed(DisconnectReason::RestartRequired));
		settle().await;

		assert_eq!(controller.current_status().state, SessionState::Connecting);
		assert_eq!(client.connects(), 2);
	}

	#[tokio::test(start_paused = true)]
	async fn controller_stops_when_all_clones_drop() {
		let client = FakeProtocolClient::new();
		let controller = controller(&client);
		controller.start_session().await.unwrap();
		settle().await;
		assert_eq!(client.live_handles(), 1);

		drop(controller);
		settle().await;

		assert_eq!(client.live_handles(), 0);
		assert_eq!(client.logouts(), 0);
	}
}
