//! Transport and JSON-RPC plumbing for the pairlink protocol bridge.
//!
//! [`WebSocketTransport`] opens the socket, [`Connection`] correlates
//! requests with responses and surfaces bridge events. With the `testing`
//! feature, [`FakeTransportBuilder`] provides an in-memory bridge.

pub mod connection;
pub mod error;
#[cfg(any(test, feature = "testing"))]
pub mod fake_transport;
pub mod transport;

pub use connection::Connection;
pub use error::{Error, Result};
#[cfg(any(test, feature = "testing"))]
pub use fake_transport::{FakeTransportBuilder, FakeTransportController};
pub use transport::{Transport, TransportParts, TransportReceiver, WebSocketTransport};
