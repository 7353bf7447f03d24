//! JSON-RPC connection to the protocol bridge.
//!
//! Correlates responses with pending requests and forwards unsolicited
//! events to a channel owned by the caller.
//!
//! # Message Flow
//!
//! 1. Caller invokes [`Connection::send_request`] with a method and params
//! 2. Connection allocates an ID and parks a oneshot sender under it
//! 3. Request is serialized and written to the transport
//! 4. [`Connection::run`] reads inbound messages
//! 5. Responses complete the parked oneshot; events go to the event channel
//!
//! When the run loop ends, every pending request fails with
//! [`Error::ConnectionClosed`] and the event channel closes.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use pairlink_protocol::{EventMessage, Message, Request};
use serde_json::Value;
use tokio::sync::{Mutex, Notify, mpsc, oneshot};

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportParts, TransportReceiver};

type CallbackMap = Arc<Mutex<HashMap<u32, oneshot::Sender<Result<Value>>>>>;

/// Request/response correlation over a [`Transport`].
///
/// Shared across tasks behind an `Arc`. [`run`](Self::run) must be spawned
/// exactly once for requests to complete.
pub struct Connection {
	last_id: AtomicU32,
	callbacks: CallbackMap,
	sender: Mutex<Box<dyn Transport>>,
	receiver: Mutex<Option<Box<dyn TransportReceiver>>>,
	message_rx: Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
	event_tx: Mutex<Option<mpsc::UnboundedSender<EventMessage>>>,
	closed: AtomicBool,
	shutdown: Notify,
}

impl Connection {
	/// Creates a connection and the receiver for bridge events.
	pub fn new(parts: TransportParts) -> (Self, mpsc::UnboundedReceiver<EventMessage>) {
		let TransportParts {
			sender,
			receiver,
			message_rx,
		} = parts;
		let (event_tx, event_rx) = mpsc::unbounded_channel();

		let connection = Self {
			last_id: AtomicU32::new(0),
			callbacks: Arc::new(Mutex::new(HashMap::new())),
			sender: Mutex::new(sender),
			receiver: Mutex::new(Some(receiver)),
			message_rx: Mutex::new(Some(message_rx)),
			event_tx: Mutex::new(Some(event_tx)),
			closed: AtomicBool::new(false),
			shutdown: Notify::new(),
		};
		(connection, event_rx)
	}

	pub fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	/// Sends a request and waits for the bridge's answer.
	pub async fn send_request(&self, method: &str, params: Value) -> Result<Value> {
		if self.is_closed() {
			return Err(Error::ConnectionClosed);
		}

		let id = self.last_id.fetch_add(1, Ordering::SeqCst);
		tracing::debug!(target = "pairlink.bridge", id, method, "sending request");

		let (tx, rx) = oneshot::channel();
		self.callbacks.lock().await.insert(id, tx);

		// The run loop may have drained callbacks between the check above and the insert.
		if self.is_closed() {
			self.callbacks.lock().await.remove(&id);
			return Err(Error::ConnectionClosed);
		}

		let request = Request {
			id,
			method: method.to_string(),
			params,
		};
		let sent = match serde_json::to_value(&request) {
			Ok(value) => self.sender.lock().await.send(value).await,
			Err(e) => Err(e.into()),
		};
		if let Err(e) = sent {
			self.callbacks.lock().await.remove(&id);
			return Err(e);
		}

		rx.await.map_err(|_| Error::ConnectionClosed).and_then(|result| result)
	}

	/// Drives the transport until it ends or [`close`](Self::close) is called.
	pub async fn run(&self) {
		let (Some(receiver), Some(mut message_rx), Some(event_tx)) = (
			self.receiver.lock().await.take(),
			self.message_rx.lock().await.take(),
			self.event_tx.lock().await.take(),
		) else {
			tracing::warn!(target = "pairlink.bridge", "connection loop already started");
			return;
		};

		let reader = tokio::spawn(async move {
			if let Err(e) = receiver.run().await {
				tracing::warn!(target = "pairlink.bridge", error = %e, "transport read failed");
			}
		});

		loop {
			tokio::select! {
				message = message_rx.recv() => match message {
					Some(value) => self.dispatch(value, &event_tx).await,
					None => break,
				},
				_ = self.shutdown.notified() => break,
			}
		}

		self.closed.store(true, Ordering::SeqCst);
		reader.abort();

		let pending: Vec<_> = self.callbacks.lock().await.drain().collect();
		for (id, callback) in pending {
			tracing::debug!(target = "pairlink.bridge", id, "failing pending request");
			let _ = callback.send(Err(Error::ConnectionClosed));
		}

		tracing::debug!(target = "pairlink.bridge", "connection loop ended");
	}

	/// Closes the transport and stops the run loop. Idempotent.
	pub async fn close(&self) {
		if let Err(e) = self.sender.lock().await.close().await {
			tracing::debug!(target = "pairlink.bridge", error = %e, "transport close failed");
		}
		self.shutdown.notify_one();
	}

	async fn dispatch(&self, value: Value, event_tx: &mpsc::UnboundedSender<EventMessage>) {
		let message = match serde_json::from_value::<Message>(value) {
			Ok(message) => message,
			Err(e) => {
				tracing::warn!(target = "pairlink.bridge", error = %e, "unparseable bridge message");
				return;
			}
		};

		match message {
			Message::Response(response) => {
				let Some(callback) = self.callbacks.lock().await.remove(&response.id) else {
					tracing::warn!(target = "pairlink.bridge", id = response.id, "response for unknown request");
					return;
				};
				let result = match response.error {
					Some(error) => Err(Error::Remote {
						message: error.message,
						code: error.code,
					}),
					None => Ok(response.result.unwrap_or(Value::Null)),
				};
				let _ = callback.send(result);
			}
			Message::Event(event) => {
				tracing::trace!(target = "pairlink.bridge", method = %event.method, "event");
				let _ = event_tx.send(event);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use serde_json::json;

	use super::*;
	use crate::fake_transport::FakeTransportBuilder;

	fn spawn_connection() -> (Arc<Connection>, mpsc::UnboundedReceiver<EventMessage>, crate::FakeTransportController) {
		let (parts, controller) = FakeTransportBuilder::new().build();
		let (connection, events) = Connection::new(parts);
		let connection = Arc::new(connection);
		tokio::spawn({
			let conn = Arc::clone(&connection);
			async move { conn.run().await }
		});
		(connection, events, controller)
	}

	#[tokio::test]
	async fn responses_correlate_out_of_order() {
		let (connection, _events, controller) = spawn_connection();

		let first = tokio::spawn({
			let conn = Arc::clone(&connection);
			async move { conn.send_request("a", json!({})).await }
		});
		let first_sent = controller.next_sent().await.expect("first request should be sent");
		let second = tokio::spawn({
			let conn = Arc::clone(&connection);
			async move { conn.send_request("b", json!({})).await }
		});
		let second_sent = controller.next_sent().await.expect("second request should be sent");

		controller.inject_response(second_sent["id"].as_u64().unwrap() as u32, json!("b"));
		controller.inject_response(first_sent["id"].as_u64().unwrap() as u32, json!("a"));

		assert_eq!(first.await.unwrap().unwrap(), json!("a"));
		assert_eq!(second.await.unwrap().unwrap(), json!("b"));
	}

	#[tokio::test]
	async fn error_response_becomes_remote_error() {
		let (connection, _events, controller) = spawn_connection();

		let fut = tokio::spawn({
			let conn = Arc::clone(&connection);
			async move { conn.send_request("pairing.request", json!({"phone": "1"})).await }
		});
		let sent = controller.next_sent().await.unwrap();
		controller.inject_error(sent["id"].as_u64().unwrap() as u32, "not ready", Some(428));

		let err = fut.await.unwrap().unwrap_err();
		assert!(matches!(err, Error::Remote { code: Some(428), .. }), "{err:?}");
	}

	#[tokio::test]
	async fn events_are_forwarded() {
		let (_connection, mut events, controller) = spawn_connection();

		controller.inject_event("connection.update", json!({"connection": "open"}));

		let event = events.recv().await.expect("event should be forwarded");
		assert_eq!(event.method, "connection.update");
		assert_eq!(event.params["connection"], "open");
	}

	#[tokio::test]
	async fn transport_loss_fails_pending_and_closes_events() {
		let (connection, mut events, controller) = spawn_connection();

		let fut = tokio::spawn({
			let conn = Arc::clone(&connection);
			async move { conn.send_request("session.logout", json!({})).await }
		});
		controller.next_sent().await.unwrap();
		controller.disconnect();

		let err = fut.await.unwrap().unwrap_err();
		assert!(err.is_closed(), "{err:?}");
		assert!(events.recv().await.is_none());
		assert!(connection.is_closed());

		let err = connection.send_request("session.logout", json!({})).await.unwrap_err();
		assert!(err.is_closed());
	}

	#[tokio::test(start_paused = true)]
	async fn close_stops_loop_and_closes_sender() {
		let (connection, mut events, controller) = spawn_connection();

		connection.close().await;

		let ended = tokio::time::timeout(Duration::from_secs(1), events.recv()).await;
		assert!(matches!(ended, Ok(None)), "event stream should end after close");
		assert!(controller.is_closed());
	}
}
