use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use pairlink::{BridgeClient, FileCredentialStore, SessionController};
use tracing::{debug, info, warn};

use crate::cli::Cli;
use crate::handlers;

#[derive(Clone)]
pub struct AppState {
	pub controller: SessionController,
}

pub fn router(state: AppState, max_upload_bytes: usize) -> Router {
	Router::new()
		.route("/", get(handlers::index))
		.route("/connect-qr", get(handlers::connect_qr))
		.route("/status", get(handlers::status))
		.route("/pair-code", get(handlers::pair_code))
		.route("/update-pp", post(handlers::update_profile_picture))
		.layer(DefaultBodyLimit::max(max_upload_bytes))
		.with_state(state)
}

/// Runs the gateway until Ctrl-C, then closes the session without logging out.
pub async fn serve(cli: &Cli) -> anyhow::Result<()> {
	let config = cli.session_config();
	let client = Arc::new(BridgeClient::new(cli.bridge_url.clone(), config.request_timeout));
	let store = Arc::new(FileCredentialStore::new(&cli.auth_dir));
	let controller = SessionController::spawn(client.clone(), store.clone(), config);

	let app = router(
		AppState {
			controller: controller.clone(),
		},
		cli.max_upload_bytes,
	);

	let addr = cli.bind_addr();
	let listener = tokio::net::TcpListener::bind(addr)
		.await
		.with_context(|| format!("Failed to bind to {addr}"))?;
	info!(
		target = "pairlink.http",
		%addr,
		bridge = client.endpoint(),
		auth_dir = %store.dir().display(),
		"gateway listening"
	);

	axum::serve(listener, app)
		.with_graceful_shutdown(shutdown_signal())
		.await
		.context("Server error")?;

	if let Err(err) = controller.close().await {
		debug!(target = "pairlink.http", error = %err, "controller already stopped");
	}
	info!(target = "pairlink.http", "gateway stopped");
	Ok(())
}

async fn shutdown_signal() {
	match tokio::signal::ctrl_c().await {
		Ok(()) => info!(target = "pairlink.http", "shutdown requested"),
		Err(err) => {
			warn!(target = "pairlink.http", error = %err, "cannot listen for Ctrl-C; running until killed");
			std::future::pending::<()>().await;
		}
	}
}
