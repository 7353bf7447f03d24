//! Bridge event payloads and disconnect reason codes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Credentials;

/// Event method for connection lifecycle updates.
pub const EVENT_CONNECTION_UPDATE: &str = "connection.update";
/// Event method for credential material changes.
pub const EVENT_CREDS_UPDATE: &str = "creds.update";

/// Transport phase reported in a connection update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionPhase {
	Connecting,
	Open,
	Close,
}

/// Why the previous connection ended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastDisconnect {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status_code: Option<u16>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
}

/// Params of [`EVENT_CONNECTION_UPDATE`].
///
/// A single update may carry a QR challenge and a phase change together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionUpdate {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub connection: Option<ConnectionPhase>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub qr: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub last_disconnect: Option<LastDisconnect>,
}

/// Params of [`EVENT_CREDS_UPDATE`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredsUpdate {
	pub creds: Credentials,
}

/// Typed bridge event.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
	Connection(ConnectionUpdate),
	Creds(CredsUpdate),
	/// Method this build does not know; kept for logging.
	Unknown { method: String, params: Value },
}

impl BridgeEvent {
	/// Parses an event from its method name and params.
	pub fn parse(method: &str, params: Value) -> Result<Self, serde_json::Error> {
		Ok(match method {
			EVENT_CONNECTION_UPDATE => BridgeEvent::Connection(serde_json::from_value(params)?),
			EVENT_CREDS_UPDATE => BridgeEvent::Creds(serde_json::from_value(params)?),
			other => BridgeEvent::Unknown {
				method: other.to_string(),
				params,
			},
		})
	}
}

/// Disconnect reasons, keyed by the status code in [`LastDisconnect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
	/// 401: the account was logged out; credentials are dead.
	LoggedOut,
	/// 403
	Forbidden,
	/// 408: connection lost or timed out.
	ConnectionLost,
	/// 411
	MultideviceMismatch,
	/// 428
	ConnectionClosed,
	/// 440: another client took over the session.
	ConnectionReplaced,
	/// 500
	BadSession,
	/// 503
	UnavailableService,
	/// 515: the server asks for a fresh connection, typically right after pairing.
	RestartRequired,
	/// Any other code, or none at all.
	Other(Option<u16>),
}

impl DisconnectReason {
	pub fn from_status_code(code: Option<u16>) -> Self {
		match code {
			Some(401) => Self::LoggedOut,
			Some(403) => Self::Forbidden,
			Some(408) => Self::ConnectionLost,
			Some(411) => Self::MultideviceMismatch,
			Some(428) => Self::ConnectionClosed,
			Some(440) => Self::ConnectionReplaced,
			Some(500) => Self::BadSession,
			Some(503) => Self::UnavailableService,
			Some(515) => Self::RestartRequired,
			other => Self::Other(other),
		}
	}

	pub fn status_code(self) -> Option<u16> {
		match self {
			Self::LoggedOut => Some(401),
			Self::Forbidden => Some(403),
			Self::ConnectionLost => Some(408),
			Self::MultideviceMismatch => Some(411),
			Self::ConnectionClosed => Some(428),
			Self::ConnectionReplaced => Some(440),
			Self::BadSession => Some(500),
			Self::UnavailableService => Some(503),
			Self::RestartRequired => Some(515),
			Self::Other(code) => code,
		}
	}

	pub fn is_logged_out(self) -> bool {
		matches!(self, Self::LoggedOut)
	}
}

impl From<&LastDisconnect> for DisconnectReason {
	fn from(last: &LastDisconnect) -> Self {
		Self::from_status_code(last.status_code)
	}
}

impl std::fmt::Display for DisconnectReason {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let name = match self {
			Self::LoggedOut => "logged out",
			Self::Forbidden => "forbidden",
			Self::ConnectionLost => "connection lost",
			Self::MultideviceMismatch => "multi-device mismatch",
			Self::ConnectionClosed => "connection closed",
			Self::ConnectionReplaced => "connection replaced",
			Self::BadSession => "bad session",
			Self::UnavailableService => "service unavailable",
			Self::RestartRequired => "restart required",
			Self::Other(Some(code)) => return write!(f, "status {code}"),
			Self::Other(None) => "unknown",
		};
		f.write_str(name)
	}
}
