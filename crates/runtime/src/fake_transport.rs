//! In-memory transport for exercising the bridge protocol without a bridge.
//!
//! # Example
//!
//! ```ignore
//! let (parts, controller) = FakeTransportBuilder::new().build();
//! let (connection, events) = Connection::new(parts);
//! let connection = Arc::new(connection);
//!
//! tokio::spawn({
//!     let conn = Arc::clone(&connection);
//!     async move { conn.run().await }
//! });
//!
//! let fut = connection.send_request("pairing.request", json!({"phone": "1555"}));
//! controller.inject_response(0, json!({"code": "ABCD1234"}));
//! let result = fut.await?;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::sync::{Mutex, mpsc};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportParts, TransportReceiver};

enum Inbound {
	Message(Value),
	Disconnect,
}

/// Builder for fake transport instances.
#[derive(Default)]
pub struct FakeTransportBuilder {}

impl FakeTransportBuilder {
	pub fn new() -> Self {
		Self {}
	}

	/// Returns [`TransportParts`] for a connection and a controller that
	/// plays the bridge's side.
	pub fn build(self) -> (TransportParts, FakeTransportController) {
		let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		let (sent_tx, sent_rx) = mpsc::unbounded_channel();
		let sent = Arc::new(Mutex::new(Vec::new()));
		let closed = Arc::new(AtomicBool::new(false));

		let sender = FakeTransportSender {
			sent: Arc::clone(&sent),
			sent_tx,
			closed: Arc::clone(&closed),
		};
		let receiver = FakeTransportReceiver { inbound_rx, message_tx };
		let controller = FakeTransportController {
			inbound_tx,
			sent,
			sent_rx: Mutex::new(sent_rx),
			closed,
		};

		let parts = TransportParts {
			sender: Box::new(sender),
			receiver: Box::new(receiver),
			message_rx,
		};
		(parts, controller)
	}
}

/// Bridge-side handle of a fake transport.
pub struct FakeTransportController {
	inbound_tx: mpsc::UnboundedSender<Inbound>,
	sent: Arc<Mutex<Vec<Value>>>,
	sent_rx: Mutex<mpsc::UnboundedReceiver<Value>>,
	closed: Arc<AtomicBool>,
}

impl FakeTransportController {
	/// Injects a raw JSON message as if the bridge sent it.
	pub fn inject(&self, message: Value) {
		let _ = self.inbound_tx.send(Inbound::Message(message));
	}

	pub fn inject_response(&self, id: u32, result: Value) {
		self.inject(serde_json::json!({ "id": id, "result": result }));
	}

	pub fn inject_error(&self, id: u32, message: &str, code: Option<u16>) {
		self.inject(serde_json::json!({
			"id": id,
			"error": { "message": message, "code": code }
		}));
	}

	pub fn inject_event(&self, method: &str, params: Value) {
		self.inject(serde_json::json!({ "method": method, "params": params }));
	}

	/// Ends the inbound stream as if the socket dropped.
	pub fn disconnect(&self) {
		let _ = self.inbound_tx.send(Inbound::Disconnect);
	}

	/// Takes every message sent so far, clearing the log.
	pub async fn take_sent(&self) -> Vec<Value> {
		std::mem::take(&mut *self.sent.lock().await)
	}

	/// Waits for the next outbound message.
	pub async fn next_sent(&self) -> Option<Value> {
		self.sent_rx.lock().await.recv().await
	}

	/// Whether the connection closed its sending half.
	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}
}

struct FakeTransportSender {
	sent: Arc<Mutex<Vec<Value>>>,
	sent_tx: mpsc::UnboundedSender<Value>,
	closed: Arc<AtomicBool>,
}

impl Transport for FakeTransportSender {
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			if self.closed.load(Ordering::SeqCst) {
				return Err(Error::ConnectionClosed);
			}
			self.sent.lock().await.push(message.clone());
			let _ = self.sent_tx.send(message);
			Ok(())
		})
	}

	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		self.closed.store(true, Ordering::SeqCst);
		Box::pin(async { Ok(()) })
	}
}

struct FakeTransportReceiver {
	inbound_rx: mpsc::UnboundedReceiver<Inbound>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl TransportReceiver for FakeTransportReceiver {
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			while let Some(Inbound::Message(message)) = self.inbound_rx.recv().await {
				if self.message_tx.send(message).is_err() {
					break;
				}
			}
			Ok(())
		})
	}
}
