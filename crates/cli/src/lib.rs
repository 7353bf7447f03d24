//! HTTP gateway for pairlink.
//!
//! Routes:
//! * `GET /` landing page
//! * `GET /connect-qr` start a session that pairs by QR challenge
//! * `GET /status` current `{state, qr}`
//! * `GET /pair-code?phone=` start a session and return a numeric pairing code
//! * `POST /update-pp` multipart `profilePic`: replace the profile picture, then log out

pub mod cli;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod server;
