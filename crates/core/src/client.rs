//! Protocol Client seam.
//!
//! The session controller never speaks the messaging protocol itself. It asks
//! a [`ProtocolClient`] for a connection, receives lifecycle events through an
//! [`EventSink`], and drives the returned [`ProtocolHandle`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use pairlink_protocol::{Credentials, DisconnectReason};

use crate::error::ClientError;

/// Lifecycle events emitted by a live connection.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
	/// A QR challenge string to show the user.
	Challenge(String),
	Connecting,
	Open,
	Closed(DisconnectReason),
	/// The full, most recent credential blob.
	CredentialsUpdated(Credentials),
}

/// Where a connection delivers its [`ClientEvent`]s.
///
/// Cheap to clone. Emitting after the receiving side went away is a no-op.
#[derive(Clone)]
pub struct EventSink {
	emit: Arc<dyn Fn(ClientEvent) -> bool + Send + Sync>,
}

impl EventSink {
	pub fn new(emit: impl Fn(ClientEvent) -> bool + Send + Sync + 'static) -> Self {
		Self { emit: Arc::new(emit) }
	}

	/// Delivers an event. Returns `false` once nobody is listening.
	pub fn emit(&self, event: ClientEvent) -> bool {
		(self.emit)(event)
	}
}

impl fmt::Debug for EventSink {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("EventSink").finish_non_exhaustive()
	}
}

/// Establishes connections to the messaging service.
#[async_trait]
pub trait ProtocolClient: Send + Sync {
	/// Connects with the given credentials (or none, to start pairing).
	///
	/// Events for the new connection flow into `events`, possibly before
	/// this future resolves.
	async fn connect(&self, credentials: Option<Credentials>, events: EventSink) -> Result<Box<dyn ProtocolHandle>, ClientError>;
}

/// Exclusive reference to one live connection.
///
/// Dropping a handle must release the connection.
#[async_trait]
pub trait ProtocolHandle: Send + Sync {
	/// Transport is up and the credentials are not yet registered.
	fn is_pairing_ready(&self) -> bool;

	async fn request_pairing_code(&self, phone: &str) -> Result<String, ClientError>;

	/// Replaces the account's profile picture with `image`, byte for byte.
	async fn submit_profile_picture(&self, image: Bytes) -> Result<(), ClientError>;

	/// Logs the account out, invalidating its credentials, and closes the connection.
	async fn logout(&self) -> Result<(), ClientError>;

	/// Closes the connection without any protocol traffic.
	async fn terminate(&self);
}

#[cfg(test)]
mod tests {
	use std::sync::Mutex;

	use super::*;

	#[test]
	fn sink_reports_listener_state() {
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = EventSink::new({
			let seen = Arc::clone(&seen);
			move |event| {
				seen.lock().unwrap().push(event);
				true
			}
		});

		assert!(sink.clone().emit(ClientEvent::Open));
		assert_eq!(*seen.lock().unwrap(), vec![ClientEvent::Open]);

		let gone = EventSink::new(|_| false);
		assert!(!gone.emit(ClientEvent::Connecting));
	}
}
