//! QR challenge rendering.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use qrcode::QrCode;
use qrcode::render::svg;
use qrcode::types::QrError;

const DATA_URI_PREFIX: &str = "data:image/svg+xml;base64,";

/// Renders a pairing challenge as a `data:image/svg+xml;base64,...` URI.
pub fn render_data_uri(challenge: &str) -> Result<String, QrError> {
	let code = QrCode::new(challenge.as_bytes())?;
	let image = code
		.render::<svg::Color>()
		.min_dimensions(256, 256)
		.dark_color(svg::Color("#000000"))
		.light_color(svg::Color("#ffffff"))
		.build();

	Ok(format!("{DATA_URI_PREFIX}{}", STANDARD.encode(image)))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn renders_svg_data_uri() {
		let uri = render_data_uri("2@Yq0F1d,abc,def,ghi").unwrap();
		let encoded = uri.strip_prefix(DATA_URI_PREFIX).expect("uri should carry svg prefix");
		let svg = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
		assert!(svg.contains("<svg"), "{svg}");
	}

	#[test]
	fn oversized_challenge_is_an_error() {
		let huge = "x".repeat(8000);
		assert!(render_data_uri(&huge).is_err());
	}
}
