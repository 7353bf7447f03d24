//! In-memory collaborators for exercising the session controller.
//!
//! [`FakeProtocolClient`] hands out handles that count every call and track
//! how many are alive at once. Events are injected with
//! [`FakeProtocolClient::emit`]. [`MemoryCredentialStore`] keeps the blob in
//! memory and can be told to fail its wipe.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use pairlink_protocol::Credentials;
use parking_lot::Mutex;

use crate::client::{ClientEvent, EventSink, ProtocolClient, ProtocolHandle};
use crate::credentials::CredentialStore;
use crate::error::{ClientError, StoreError};

#[derive(Default)]
struct FakeState {
	connects: AtomicUsize,
	logouts: AtomicUsize,
	terminates: AtomicUsize,
	pairing_requests: AtomicUsize,
	live: AtomicUsize,
	max_live: AtomicUsize,
	pairing_ready: AtomicBool,
	hang_logout: AtomicBool,
	connect_error: Mutex<Option<String>>,
	logout_error: Mutex<Option<String>>,
	pairing_error: Mutex<Option<String>>,
	update_error: Mutex<Option<String>>,
	pairing_code: Mutex<String>,
	images: Mutex<Vec<Bytes>>,
	credentials_seen: Mutex<Vec<Option<Credentials>>>,
	sinks: Mutex<Vec<EventSink>>,
}

/// Scriptable [`ProtocolClient`]. Clones share state.
#[derive(Clone)]
pub struct FakeProtocolClient {
	state: Arc<FakeState>,
}

impl Default for FakeProtocolClient {
	fn default() -> Self {
		Self::new()
	}
}

impl FakeProtocolClient {
	pub fn new() -> Self {
		let state = FakeState::default();
		*state.pairing_code.lock() = "ABCD1234".to_string();
		Self { state: Arc::new(state) }
	}

	pub fn set_pairing_ready(&self, ready: bool) {
		self.state.pairing_ready.store(ready, Ordering::SeqCst);
	}

	pub fn set_pairing_code(&self, code: &str) {
		*self.state.pairing_code.lock() = code.to_string();
	}

	pub fn fail_pairing(&self, message: &str) {
		*self.state.pairing_error.lock() = Some(message.to_string());
	}

	pub fn fail_connect(&self, message: Option<&str>) {
		*self.state.connect_error.lock() = message.map(str::to_string);
	}

	pub fn fail_logout(&self, message: &str) {
		*self.state.logout_error.lock() = Some(message.to_string());
	}

	/// Makes `logout` never resolve.
	pub fn hang_logout(&self) {
		self.state.hang_logout.store(true, Ordering::SeqCst);
	}

	pub fn fail_profile_update(&self, message: &str) {
		*self.state.update_error.lock() = Some(message.to_string());
	}

	/// Emits on the most recent connection's sink.
	pub fn emit(&self, event: ClientEvent) -> bool {
		let sink = self.state.sinks.lock().last().cloned();
		sink.is_some_and(|sink| sink.emit(event))
	}

	/// Emits on the sink of the `index`th connection (zero based).
	pub fn emit_on(&self, index: usize, event: ClientEvent) -> bool {
		let sink = self.state.sinks.lock().get(index).cloned();
		sink.is_some_and(|sink| sink.emit(event))
	}

	pub fn connects(&self) -> usize {
		self.state.connects.load(Ordering::SeqCst)
	}

	pub fn logouts(&self) -> usize {
		self.state.logouts.load(Ordering::SeqCst)
	}

	pub fn terminates(&self) -> usize {
		self.state.terminates.load(Ordering::SeqCst)
	}

	pub fn pairing_requests(&self) -> usize {
		self.state.pairing_requests.load(Ordering::SeqCst)
	}

	/// Images passed to `submit_profile_picture`, in call order.
	pub fn profile_updates(&self) -> Vec<Bytes> {
		self.state.images.lock().clone()
	}

	pub fn live_handles(&self) -> usize {
		self.state.live.load(Ordering::SeqCst)
	}

	/// Highest number of handles alive at the same time.
	pub fn max_live_handles(&self) -> usize {
		self.state.max_live.load(Ordering::SeqCst)
	}

	/// Credentials passed to each `connect`, in call order.
	pub fn credentials_seen(&self) -> Vec<Option<Credentials>> {
		self.state.credentials_seen.lock().clone()
	}
}

#[async_trait]
impl ProtocolClient for FakeProtocolClient {
	async fn connect(&self, credentials: Option<Credentials>, events: EventSink) -> Result<Box<dyn ProtocolHandle>, ClientError> {
		self.state.connects.fetch_add(1, Ordering::SeqCst);
		self.state.credentials_seen.lock().push(credentials);
		if let Some(message) = self.state.connect_error.lock().clone() {
			return Err(ClientError::Connect(message));
		}

		self.state.sinks.lock().push(events);
		let live = self.state.live.fetch_add(1, Ordering::SeqCst) + 1;
		self.state.max_live.fetch_max(live, Ordering::SeqCst);

		Ok(Box::new(FakeHandle {
			state: Arc::clone(&self.state),
			released: AtomicBool::new(false),
		}))
	}
}

struct FakeHandle {
	state: Arc<FakeState>,
	released: AtomicBool,
}

impl FakeHandle {
	fn release(&self) {
		if !self.released.swap(true, Ordering::SeqCst) {
			self.state.live.fetch_sub(1, Ordering::SeqCst);
		}
	}
}

#[async_trait]
impl ProtocolHandle for FakeHandle {
	fn is_pairing_ready(&self) -> bool {
		!self.released.load(Ordering::SeqCst) && self.state.pairing_ready.load(Ordering::SeqCst)
	}

	async fn request_pairing_code(&self, _phone: &str) -> Result<String, ClientError> {
		self.state.pairing_requests.fetch_add(1, Ordering::SeqCst);
		match self.state.pairing_error.lock().clone() {
			Some(message) => Err(ClientError::Rejected(message)),
			None => Ok(self.state.pairing_code.lock().clone()),
		}
	}

	async fn submit_profile_picture(&self, image: Bytes) -> Result<(), ClientError> {
		self.state.images.lock().push(image);
		match self.state.update_error.lock().clone() {
			Some(message) => Err(ClientError::Rejected(message)),
			None => Ok(()),
		}
	}

	async fn logout(&self) -> Result<(), ClientError> {
		self.state.logouts.fetch_add(1, Ordering::SeqCst);
		if self.state.hang_logout.load(Ordering::SeqCst) {
			std::future::pending::<()>().await;
		}
		if let Some(message) = self.state.logout_error.lock().clone() {
			return Err(ClientError::Rejected(message));
		}
		self.release();
		Ok(())
	}

	async fn terminate(&self) {
		self.state.terminates.fetch_add(1, Ordering::SeqCst);
		self.release();
	}
}

impl Drop for FakeHandle {
	fn drop(&mut self) {
		self.release();
	}
}

/// [`CredentialStore`] backed by memory.
#[derive(Default)]
pub struct MemoryCredentialStore {
	credentials: Mutex<Option<Credentials>>,
	saves: AtomicUsize,
	clears: AtomicUsize,
	fail_clear: AtomicBool,
}

impl MemoryCredentialStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_credentials(credentials: Credentials) -> Self {
		let store = Self::default();
		*store.credentials.lock() = Some(credentials);
		store
	}

	pub fn current(&self) -> Option<Credentials> {
		self.credentials.lock().clone()
	}

	pub fn saves(&self) -> usize {
		self.saves.load(Ordering::SeqCst)
	}

	pub fn clears(&self) -> usize {
		self.clears.load(Ordering::SeqCst)
	}

	/// Makes every `clear` fail without touching the stored blob.
	pub fn fail_clear(&self) {
		self.fail_clear.store(true, Ordering::SeqCst);
	}
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
	async fn load(&self) -> Result<Option<Credentials>, StoreError> {
		Ok(self.current())
	}

	async fn save(&self, credentials: &Credentials) -> Result<(), StoreError> {
		self.saves.fetch_add(1, Ordering::SeqCst);
		*self.credentials.lock() = Some(credentials.clone());
		Ok(())
	}

	async fn exists(&self) -> Result<bool, StoreError> {
		Ok(self.credentials.lock().is_some())
	}

	async fn clear(&self) -> Result<bool, StoreError> {
		self.clears.fetch_add(1, Ordering::SeqCst);
		if self.fail_clear.load(Ordering::SeqCst) {
			return Err(StoreError::Unavailable("simulated wipe failure".into()));
		}
		Ok(self.credentials.lock().take().is_some())
	}
}
