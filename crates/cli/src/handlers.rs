//! Route handlers. Each one maps a request onto a single controller call.

use axum::Json;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::QueryRejection;
use axum::extract::{Multipart, Query, State};
use axum::response::Html;
use bytes::Bytes;
use pairlink::{SessionError, SessionState, SessionStatus};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::error::ApiError;
use crate::server::AppState;

const INDEX_HTML: &str = include_str!("../assets/index.html");

/// Multipart field carrying the new picture.
pub const PROFILE_PIC_FIELD: &str = "profilePic";

pub async fn index() -> Html<&'static str> {
	Html(INDEX_HTML)
}

pub async fn connect_qr(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
	info!(target = "pairlink.http", "QR connection requested");
	state.controller.start_session().await.map_err(ApiError::Request)?;
	Ok(Json(json!({ "message": "QR connection process initiated." })))
}

pub async fn status(State(state): State<AppState>) -> Json<SessionStatus> {
	Json(state.controller.current_status())
}

#[derive(Debug, Deserialize)]
pub struct PairCodeQuery {
	phone: Option<String>,
}

pub async fn pair_code(State(state): State<AppState>, query: Result<Query<PairCodeQuery>, QueryRejection>) -> Result<Json<Value>, ApiError> {
	let Query(query) = query?;
	let phone = query
		.phone
		.filter(|phone| !phone.trim().is_empty())
		.ok_or(ApiError::MissingPhone)?;

	info!(target = "pairlink.http", "pairing code requested");
	let code = state.controller.request_pairing(&phone).await.map_err(ApiError::Request)?;
	Ok(Json(json!({ "code": code })))
}

pub async fn update_profile_picture(
	State(state): State<AppState>,
	multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
	// Not being connected wins over a malformed body.
	if state.controller.current_status().state != SessionState::Connected {
		return Err(ApiError::Upload(SessionError::NotConnected));
	}
	let mut multipart = multipart?;

	let mut image: Option<Bytes> = None;
	while let Some(field) = multipart.next_field().await? {
		if field.name() == Some(PROFILE_PIC_FIELD) {
			image = Some(field.bytes().await?);
			break;
		}
	}
	let image = image.filter(|image| !image.is_empty()).ok_or(ApiError::MissingFile)?;

	info!(target = "pairlink.http", bytes = image.len(), "profile picture upload received");
	state.controller.update_profile_picture(image).await.map_err(ApiError::Upload)?;
	Ok(Json(json!({
		"success": true,
		"message": "Profile picture updated successfully. Logging out...",
	})))
}
