use serde::Serialize;

/// Lifecycle state of the single session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
	#[default]
	Disconnected,
	Connecting,
	Connected,
	Error,
}

impl SessionState {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Disconnected => "DISCONNECTED",
			Self::Connecting => "CONNECTING",
			Self::Connected => "CONNECTED",
			Self::Error => "ERROR",
		}
	}
}

impl std::fmt::Display for SessionState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Immutable snapshot of the session as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SessionStatus {
	pub state: SessionState,
	/// Pending QR challenge as an image data URI.
	pub qr: Option<String>,
}
