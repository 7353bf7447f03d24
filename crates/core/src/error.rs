use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures reported by a [`ProtocolClient`](crate::client::ProtocolClient)
/// or one of its handles.
#[derive(Debug, Error)]
pub enum ClientError {
	#[error("could not reach the messaging service: {0}")]
	Connect(String),

	#[error(transparent)]
	Bridge(#[from] pairlink_runtime::Error),

	#[error("{method} timed out after {after:?}")]
	Timeout { method: &'static str, after: Duration },

	#[error("unexpected response to {method}: {message}")]
	InvalidResponse { method: &'static str, message: String },

	#[error("connection is closed")]
	Closed,

	#[error("request rejected: {0}")]
	Rejected(String),
}

/// Failures of a [`CredentialStore`](crate::credentials::CredentialStore).
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("credential store I/O failed at {}: {source}", path.display())]
	Io {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("credential blob at {} is not valid JSON: {source}", path.display())]
	Json {
		path: PathBuf,
		#[source]
		source: serde_json::Error,
	},

	#[error("{0}")]
	Unavailable(String),
}

/// Errors surfaced by [`SessionController`](crate::session::SessionController) operations.
#[derive(Debug, Error)]
pub enum SessionError {
	#[error("{0}")]
	Validation(String),

	#[error("not connected to the messaging service")]
	NotConnected,

	#[error("connection not ready after {attempts} attempts ({waited:?})")]
	ConnectionTimeout { attempts: u32, waited: Duration },

	#[error("pairing code request failed: {0}")]
	PairingRequest(#[source] ClientError),

	#[error("profile picture update failed: {0}")]
	ProfileUpdate(#[source] ClientError),

	/// Only ever logged; the teardown task swallows it.
	#[error("failed to wipe credentials: {0}")]
	CredentialWipe(#[source] StoreError),

	#[error("session controller has stopped")]
	ControllerClosed,
}

pub type Result<T, E = SessionError> = std::result::Result<T, E>;
