//! Error types for the bridge runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while talking to the protocol bridge.
#[derive(Debug, Error)]
pub enum Error {
	/// Failed to establish the WebSocket connection.
	#[error("Failed to connect to bridge at {url}: {message}")]
	ConnectionFailed { url: String, message: String },

	/// Transport-level error (WebSocket framing, socket I/O).
	#[error("Transport error: {0}")]
	TransportError(String),

	/// The bridge answered a request with an error.
	#[error("Bridge error{}: {message}", code.map(|c| format!(" ({c})")).unwrap_or_default())]
	Remote { message: String, code: Option<u16> },

	/// JSON serialization/deserialization error.
	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	/// The connection loop ended before a response arrived.
	#[error("Connection closed")]
	ConnectionClosed,
}

impl Error {
	/// Whether the error means the connection is gone for good.
	pub fn is_closed(&self) -> bool {
		matches!(self, Error::ConnectionClosed)
	}
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
	fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
		Error::TransportError(err.to_string())
	}
}
