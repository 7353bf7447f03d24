//! Opaque credential blob.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Authentication material issued and updated by the bridge.
///
/// The content is opaque to pairlink. The only field read is `registered`,
/// which tells whether the device already completed pairing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credentials(pub Value);

impl Credentials {
	pub fn new(value: Value) -> Self {
		Self(value)
	}

	/// Whether these credentials belong to a paired device.
	pub fn is_registered(&self) -> bool {
		self.0.get("registered").and_then(Value::as_bool).unwrap_or(false)
	}

	pub fn as_value(&self) -> &Value {
		&self.0
	}

	pub fn into_value(self) -> Value {
		self.0
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn registered_defaults_to_false() {
		assert!(!Credentials::new(json!({})).is_registered());
		assert!(!Credentials::new(json!({"registered": "yes"})).is_registered());
		assert!(Credentials::new(json!({"registered": true})).is_registered());
	}

	#[test]
	fn serializes_transparently() {
		let creds = Credentials::new(json!({"registered": false, "me": null}));
		assert_eq!(serde_json::to_value(&creds).unwrap(), json!({"registered": false, "me": null}));
	}
}
