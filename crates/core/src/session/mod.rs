//! Single-session lifecycle.
//!
//! One [`SessionController`] owns the only session in the process. All
//! operations and all protocol events are queued on one inbox and applied
//! in order by a single task, so replacing the active session is serialized
//! and at most one protocol handle is alive at a time.

mod controller;
mod state;

pub use controller::SessionController;
pub use state::{SessionState, SessionStatus};
