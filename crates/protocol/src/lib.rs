//! Wire types for the pairlink protocol bridge.
//!
//! The messaging protocol itself lives in an external bridge process. This
//! crate contains the serde-serializable shapes exchanged with that bridge
//! over its JSON-RPC style WebSocket channel.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: no behavior beyond serialization and small accessors
//! * 1:1 with the wire: field names match what the bridge sends
//! * Stable: changes only when the bridge protocol changes
//!
//! Session semantics are built on top of these types in `pairlink-rs`.

pub mod credentials;
pub mod events;
pub mod message;

pub use credentials::*;
pub use events::*;
pub use message::*;
