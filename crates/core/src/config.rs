//! Controller timings.

use std::time::Duration;

/// Bounded readiness polling used by pairing-code requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PairingPolicy {
	pub max_attempts: u32,
	pub interval: Duration,
}

impl PairingPolicy {
	pub fn new(max_attempts: u32, interval: Duration) -> Self {
		Self { max_attempts, interval }
	}

	/// Wall-clock window after which polling gives up.
	pub fn timeout(&self) -> Duration {
		self.interval.saturating_mul(self.max_attempts)
	}
}

impl Default for PairingPolicy {
	fn default() -> Self {
		Self::new(15, Duration::from_secs(2))
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
	pub pairing: PairingPolicy,
	/// Delay between a successful profile update and teardown plus wipe.
	pub teardown_delay: Duration,
	/// Bound on a graceful logout before the connection is terminated.
	pub logout_timeout: Duration,
	/// Bound on pairing-code and profile-update requests.
	pub request_timeout: Duration,
}

impl Default for SessionConfig {
	fn default() -> Self {
		Self {
			pairing: PairingPolicy::default(),
			teardown_delay: Duration::from_secs(3),
			logout_timeout: Duration::from_secs(10),
			request_timeout: Duration::from_secs(60),
		}
	}
}
