//! Session lifecycle core for pairlink.
//!
//! pairlink keeps exactly one logged-in messaging session alive, pairs it via
//! QR challenge or numeric code, replaces the account's profile picture, and
//! then tears the session down and wipes its credentials.
//!
//! * [`session::SessionController`] owns the session and serializes every
//!   operation and protocol event
//! * [`client::ProtocolClient`] is the seam to the messaging protocol;
//!   [`bridge::BridgeClient`] implements it against the protocol bridge
//! * [`credentials::CredentialStore`] persists the opaque credential blob

pub mod bridge;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod qr;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use bridge::BridgeClient;
pub use client::{ClientEvent, EventSink, ProtocolClient, ProtocolHandle};
pub use config::{PairingPolicy, SessionConfig};
pub use credentials::{CredentialStore, FileCredentialStore};
pub use error::{ClientError, Result, SessionError, StoreError};
pub use pairlink_protocol::{Credentials, DisconnectReason};
pub use session::{SessionController, SessionState, SessionStatus};
