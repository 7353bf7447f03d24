use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use pairlink::{PairingPolicy, SessionConfig};

#[derive(Parser, Debug, Clone)]
#[command(name = "pairlink")]
#[command(about = "HTTP gateway that pairs a messaging account and replaces its profile picture")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug)
	#[arg(short, long, action = ArgAction::Count)]
	pub verbose: u8,

	/// Address to bind the HTTP server to
	#[arg(long, env = "PAIRLINK_HOST", default_value = "0.0.0.0")]
	pub host: IpAddr,

	/// Port to bind the HTTP server to
	#[arg(long, env = "PORT", default_value_t = 8000)]
	pub port: u16,

	/// Directory holding the persisted credentials
	#[arg(long, env = "PAIRLINK_AUTH_DIR", default_value = "auth_info")]
	pub auth_dir: PathBuf,

	/// WebSocket endpoint of the protocol bridge
	#[arg(long, env = "PAIRLINK_BRIDGE_URL", default_value = "ws://127.0.0.1:8787")]
	pub bridge_url: String,

	/// Readiness polls before a pairing-code request gives up
	#[arg(long, default_value_t = 15)]
	pub pair_attempts: u32,

	/// Milliseconds between readiness polls
	#[arg(long, default_value_t = 2000)]
	pub pair_interval_ms: u64,

	/// Milliseconds between a profile update and session teardown
	#[arg(long, default_value_t = 3000)]
	pub teardown_delay_ms: u64,

	/// Milliseconds a logout may take before the connection is terminated
	#[arg(long, default_value_t = 10_000)]
	pub logout_timeout_ms: u64,

	/// Milliseconds allowed for pairing-code and profile-update requests
	#[arg(long, default_value_t = 60_000)]
	pub request_timeout_ms: u64,

	/// Largest accepted upload body in bytes
	#[arg(long, default_value_t = 10 * 1024 * 1024)]
	pub max_upload_bytes: usize,
}

impl Cli {
	pub fn bind_addr(&self) -> SocketAddr {
		SocketAddr::new(self.host, self.port)
	}

	pub fn session_config(&self) -> SessionConfig {
		SessionConfig {
			pairing: PairingPolicy::new(self.pair_attempts, Duration::from_millis(self.pair_interval_ms)),
			teardown_delay: Duration::from_millis(self.teardown_delay_ms),
			logout_timeout: Duration::from_millis(self.logout_timeout_ms),
			request_timeout: Duration::from_millis(self.request_timeout_ms),
		}
	}
}
