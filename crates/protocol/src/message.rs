//! Request, response, and event envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Bind the connection to stored credentials. Params: `{credentials}`.
pub const METHOD_SESSION_OPEN: &str = "session.open";
/// Ask the bridge for a numeric pairing code. Params: `{phone}`.
pub const METHOD_PAIRING_REQUEST: &str = "pairing.request";
/// Replace the account's profile picture. Params: `{image}` (base64).
pub const METHOD_PROFILE_PICTURE_SET: &str = "profile.picture.set";
/// Log the account out and invalidate the credentials server-side.
pub const METHOD_SESSION_LOGOUT: &str = "session.logout";

/// Request sent to the bridge.
///
/// ```json
/// { "id": 3, "method": "pairing.request", "params": { "phone": "15550100" } }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	/// Unique request ID for correlating responses
	pub id: u32,
	pub method: String,
	pub params: Value,
}

/// Response from the bridge, correlated by `id`.
///
/// Exactly one of `result` and `error` is present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	pub id: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<RemoteError>,
}

/// Error payload attached to a failed response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
	pub message: String,
	/// Protocol status code when the bridge has one (e.g. 401, 428).
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub code: Option<u16>,
}

/// Unsolicited event from the bridge. Events carry no `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
	pub method: String,
	#[serde(default)]
	pub params: Value,
}

/// Any inbound message. Responses are recognised by their `id` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	Response(Response),
	Event(EventMessage),
}

/// Result payload of [`METHOD_PAIRING_REQUEST`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingCode {
	pub code: String,
}
