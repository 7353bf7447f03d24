use axum::Json;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::QueryRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use pairlink::SessionError;
use serde_json::{Value, json};
use thiserror::Error;

/// Failures rendered by the HTTP gateway.
///
/// Query endpoints answer `{error}`; the upload endpoint answers
/// `{success: false, message}`.
#[derive(Debug, Error)]
pub enum ApiError {
	#[error("phone number is required")]
	MissingPhone,

	#[error("invalid query string: {0}")]
	Query(#[from] QueryRejection),

	#[error("no image file uploaded")]
	MissingFile,

	#[error("not a multipart upload: {0}")]
	NotMultipart(#[from] MultipartRejection),

	#[error("invalid upload: {0}")]
	Multipart(#[from] MultipartError),

	#[error(transparent)]
	Request(SessionError),

	#[error(transparent)]
	Upload(SessionError),
}

impl ApiError {
	pub fn status(&self) -> StatusCode {
		match self {
			ApiError::MissingPhone | ApiError::Query(_) | ApiError::MissingFile | ApiError::NotMultipart(_) => StatusCode::BAD_REQUEST,
			ApiError::Multipart(err) => err.status(),
			ApiError::Request(err) | ApiError::Upload(err) => match err {
				SessionError::Validation(_) | SessionError::NotConnected => StatusCode::BAD_REQUEST,
				_ => StatusCode::INTERNAL_SERVER_ERROR,
			},
		}
	}

	fn body(&self) -> Value {
		match self {
			ApiError::MissingPhone | ApiError::Query(_) => json!({ "error": "Phone number is required" }),
			ApiError::Request(err) => json!({ "error": request_message(err) }),
			ApiError::MissingFile | ApiError::NotMultipart(_) | ApiError::Upload(SessionError::Validation(_)) => {
				upload_failure("No image file uploaded.")
			}
			ApiError::Multipart(_) => upload_failure("Invalid upload."),
			ApiError::Upload(SessionError::NotConnected) => upload_failure("Not connected to the messaging service."),
			ApiError::Upload(_) => upload_failure("Failed to update profile picture."),
		}
	}
}

fn request_message(err: &SessionError) -> &'static str {
	match err {
		SessionError::Validation(_) => "Phone number is required",
		SessionError::ConnectionTimeout { .. } => "Connection timed out. Please try again.",
		SessionError::NotConnected => "Not connected to the messaging service.",
		SessionError::ControllerClosed => "Service is shutting down.",
		_ => "Failed to request pairing code.",
	}
}

fn upload_failure(message: &str) -> Value {
	json!({ "success": false, "message": message })
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let status = self.status();
		if status.is_server_error() {
			tracing::error!(target = "pairlink.http", error = %self, "request failed");
		} else {
			tracing::debug!(target = "pairlink.http", error = %self, "request rejected");
		}
		(status, Json(self.body())).into_response()
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use pairlink::ClientError;

	use super::*;

	#[test]
	fn session_errors_map_to_status_codes() {
		let cases = [
			(ApiError::MissingPhone, StatusCode::BAD_REQUEST),
			(ApiError::MissingFile, StatusCode::BAD_REQUEST),
			(ApiError::Upload(SessionError::NotConnected), StatusCode::BAD_REQUEST),
			(ApiError::Request(SessionError::Validation("x".into())), StatusCode::BAD_REQUEST),
			(
				ApiError::Request(SessionError::ConnectionTimeout {
					attempts: 15,
					waited: Duration::from_secs(30),
				}),
				StatusCode::INTERNAL_SERVER_ERROR,
			),
			(
				ApiError::Request(SessionError::PairingRequest(ClientError::Closed)),
				StatusCode::INTERNAL_SERVER_ERROR,
			),
			(
				ApiError::Upload(SessionError::ProfileUpdate(ClientError::Closed)),
				StatusCode::INTERNAL_SERVER_ERROR,
			),
		];
		for (err, status) in cases {
			assert_eq!(err.status(), status, "{err:?}");
		}
	}

	#[test]
	fn bodies_never_leak_protocol_detail() {
		let err = ApiError::Upload(SessionError::ProfileUpdate(ClientError::Rejected("internal-server-error 0xdead".into())));
		assert_eq!(err.body(), json!({"success": false, "message": "Failed to update profile picture."}));

		let err = ApiError::Request(SessionError::PairingRequest(ClientError::Rejected("rate-overlimit".into())));
		assert_eq!(err.body(), json!({"error": "Failed to request pairing code."}));
	}
}
