//! [`ProtocolClient`] backed by the protocol bridge.
//!
//! The bridge is a sidecar process that owns the messaging protocol. Each
//! connection is one WebSocket speaking JSON-RPC:
//!
//! 1. `session.open` binds the socket to the stored credentials
//! 2. `connection.update` and `creds.update` events flow back
//! 3. `pairing.request`, `profile.picture.set` and `session.logout` are plain requests
//!
//! If the socket goes away without a `close` update, the handle reports
//! `closed(connection lost)` so the controller reconnects.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use pairlink_protocol::{
	BridgeEvent, ConnectionPhase, Credentials, DisconnectReason, EventMessage, METHOD_PAIRING_REQUEST, METHOD_PROFILE_PICTURE_SET,
	METHOD_SESSION_LOGOUT, METHOD_SESSION_OPEN, PairingCode,
};
use pairlink_runtime::{Connection, TransportParts, WebSocketTransport};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::client::{ClientEvent, EventSink, ProtocolClient, ProtocolHandle};
use crate::error::ClientError;

/// Connects to a protocol bridge at a WebSocket endpoint.
#[derive(Debug, Clone)]
pub struct BridgeClient {
	endpoint: String,
	request_timeout: Duration,
}

impl BridgeClient {
	pub fn new(endpoint: impl Into<String>, request_timeout: Duration) -> Self {
		Self {
			endpoint: endpoint.into(),
			request_timeout,
		}
	}

	pub fn endpoint(&self) -> &str {
		&self.endpoint
	}

	/// Opens a session over already-established transport parts.
	pub async fn connect_with(&self, parts: TransportParts, credentials: Option<Credentials>, events: EventSink) -> Result<BridgeHandle, ClientError> {
		let registered = credentials.as_ref().is_some_and(Credentials::is_registered);
		let (connection, event_rx) = Connection::new(parts);
		let connection = Arc::new(connection);

		let run_task = tokio::spawn({
			let conn = Arc::clone(&connection);
			async move { conn.run().await }
		});

		let link = Arc::new(LinkState {
			open: AtomicBool::new(false),
			registered: AtomicBool::new(registered),
			terminated: AtomicBool::new(false),
		});
		tokio::spawn(pump_events(event_rx, Arc::clone(&link), events));

		let handle = BridgeHandle {
			connection,
			link,
			request_timeout: self.request_timeout,
			run_task,
		};

		if let Err(e) = handle.call(METHOD_SESSION_OPEN, json!({ "credentials": credentials })).await {
			handle.terminate().await;
			return Err(e);
		}
		handle.link.open.store(true, Ordering::SeqCst);
		debug!(target = "pairlink.bridge", registered, "bridge session opened");

		Ok(handle)
	}
}

#[async_trait]
impl ProtocolClient for BridgeClient {
	async fn connect(&self, credentials: Option<Credentials>, events: EventSink) -> Result<Box<dyn ProtocolHandle>, ClientError> {
		let parts = match tokio::time::timeout(self.request_timeout, WebSocketTransport::connect(&self.endpoint)).await {
			Ok(result) => result.map_err(|e| ClientError::Connect(e.to_string()))?,
			Err(_) => {
				return Err(ClientError::Connect(format!(
					"no handshake from {} within {:?}",
					self.endpoint, self.request_timeout
				)));
			}
		};
		let handle = self.connect_with(parts, credentials, events).await?;
		Ok(Box::new(handle))
	}
}

struct LinkState {
	open: AtomicBool,
	registered: AtomicBool,
	terminated: AtomicBool,
}

/// Live bridge session. Dropping it closes the socket.
pub struct BridgeHandle {
	connection: Arc<Connection>,
	link: Arc<LinkState>,
	request_timeout: Duration,
	run_task: JoinHandle<()>,
}

impl BridgeHandle {
	async fn call(&self, method: &'static str, params: Value) -> Result<Value, ClientError> {
		match tokio::time::timeout(self.request_timeout, self.connection.send_request(method, params)).await {
			Ok(Ok(value)) => Ok(value),
			Ok(Err(e)) if e.is_closed() => Err(ClientError::Closed),
			Ok(Err(e)) => Err(e.into()),
			Err(_) => Err(ClientError::Timeout {
				method,
				after: self.request_timeout,
			}),
		}
	}

	fn mark_terminated(&self) -> bool {
		self.link.open.store(false, Ordering::SeqCst);
		!self.link.terminated.swap(true, Ordering::SeqCst)
	}
}

#[async_trait]
impl ProtocolHandle for BridgeHandle {
	fn is_pairing_ready(&self) -> bool {
		self.link.open.load(Ordering::SeqCst) && !self.connection.is_closed() && !self.link.registered.load(Ordering::SeqCst)
	}

	async fn request_pairing_code(&self, phone: &str) -> Result<String, ClientError> {
		let result = self.call(METHOD_PAIRING_REQUEST, json!({ "phone": phone })).await?;
		let code: PairingCode = serde_json::from_value(result).map_err(|e| ClientError::InvalidResponse {
			method: METHOD_PAIRING_REQUEST,
			message: e.to_string(),
		})?;
		Ok(code.code)
	}

	async fn submit_profile_picture(&self, image: Bytes) -> Result<(), ClientError> {
		let encoded = STANDARD.encode(&image);
		self.call(METHOD_PROFILE_PICTURE_SET, json!({ "image": encoded })).await?;
		info!(target = "pairlink.bridge", bytes = image.len(), "profile picture submitted");
		Ok(())
	}

	async fn logout(&self) -> Result<(), ClientError> {
		// The bridge answers a logout with a 401 close; that close is ours, not news.
		self.mark_terminated();
		let result = self.call(METHOD_SESSION_LOGOUT, json!({})).await;
		self.connection.close().await;
		result.map(|_| ())
	}

	async fn terminate(&self) {
		self.mark_terminated();
		self.connection.close().await;
	}
}

impl Drop for BridgeHandle {
	fn drop(&mut self) {
		if !self.mark_terminated() {
			return;
		}
		match tokio::runtime::Handle::try_current() {
			Ok(runtime) => {
				let connection = Arc::clone(&self.connection);
				runtime.spawn(async move { connection.close().await });
			}
			Err(_) => self.run_task.abort(),
		}
	}
}

async fn pump_events(mut events: mpsc::UnboundedReceiver<EventMessage>, link: Arc<LinkState>, sink: EventSink) {
	let mut close_reported = false;

	while let Some(message) = events.recv().await {
		let event = match BridgeEvent::parse(&message.method, message.params) {
			Ok(event) => event,
			Err(e) => {
				warn!(target = "pairlink.bridge", method = %message.method, error = %e, "malformed bridge event");
				continue;
			}
		};

		match event {
			BridgeEvent::Connection(update) => {
				if let Some(qr) = update.qr {
					sink.emit(ClientEvent::Challenge(qr));
				}
				match update.connection {
					Some(ConnectionPhase::Connecting) => {
						sink.emit(ClientEvent::Connecting);
					}
					Some(ConnectionPhase::Open) => {
						sink.emit(ClientEvent::Open);
					}
					Some(ConnectionPhase::Close) => {
						link.open.store(false, Ordering::SeqCst);
						close_reported = true;
						let reason = update
							.last_disconnect
							.as_ref()
							.map(DisconnectReason::from)
							.unwrap_or(DisconnectReason::Other(None));
						debug!(target = "pairlink.bridge", %reason, "bridge reported close");
						sink.emit(ClientEvent::Closed(reason));
					}
					None => {}
				}
			}
			BridgeEvent::Creds(update) => {
				link.registered.store(update.creds.is_registered(), Ordering::SeqCst);
				sink.emit(ClientEvent::CredentialsUpdated(update.creds));
			}
			BridgeEvent::Unknown { method, .. } => {
				trace!(target = "pairlink.bridge", %method, "ignoring bridge event");
			}
		}
	}

	link.open.store(false, Ordering::SeqCst);
	if !close_reported && !link.terminated.load(Ordering::SeqCst) {
		debug!(target = "pairlink.bridge", "bridge connection lost");
		sink.emit(ClientEvent::Closed(DisconnectReason::ConnectionLost));
	}
}
