//! Message transport to the protocol bridge.
//!
//! A transport is split into a sending half and a receiving half. The
//! receiving half is driven by [`TransportReceiver::run`], which forwards
//! every decoded JSON message into `message_rx`. The stream ends when the
//! peer closes the socket or the receiver fails.

use std::future::Future;
use std::pin::Pin;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use crate::error::{Error, Result};

/// Sending half of a transport.
pub trait Transport: Send {
	/// Sends one JSON message.
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;

	/// Closes the outbound side. Idempotent.
	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Receiving half of a transport.
pub trait TransportReceiver: Send {
	/// Reads until the peer goes away, pushing messages into the channel
	/// handed out with [`TransportParts::message_rx`].
	fn run(self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>>;
}

/// Both halves of a transport plus the inbound message stream.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<Value>,
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport carrying one JSON document per text frame.
pub struct WebSocketTransport;

impl WebSocketTransport {
	/// Opens a WebSocket to `url` and splits it into [`TransportParts`].
	pub async fn connect(url: &str) -> Result<TransportParts> {
		tracing::debug!(target = "pairlink.bridge", url, "opening websocket");
		let (stream, _response) = connect_async(url).await.map_err(|e| Error::ConnectionFailed {
			url: url.to_string(),
			message: e.to_string(),
		})?;

		let (sink, stream) = stream.split();
		let (message_tx, message_rx) = mpsc::unbounded_channel();

		Ok(TransportParts {
			sender: Box::new(WebSocketSender { sink, closed: false }),
			receiver: Box::new(WebSocketReceiver { stream, message_tx }),
			message_rx,
		})
	}
}

struct WebSocketSender {
	sink: SplitSink<WsStream, WsMessage>,
	closed: bool,
}

impl Transport for WebSocketSender {
	fn send(&mut self, message: Value) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			if self.closed {
				return Err(Error::ConnectionClosed);
			}
			self.sink.send(WsMessage::Text(message.to_string())).await?;
			Ok(())
		})
	}

	fn close(&mut self) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
		Box::pin(async move {
			if std::mem::replace(&mut self.closed, true) {
				return Ok(());
			}
			self.sink.close().await?;
			Ok(())
		})
	}
}

struct WebSocketReceiver {
	stream: SplitStream<WsStream>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl TransportReceiver for WebSocketReceiver {
	fn run(mut self: Box<Self>) -> Pin<Box<dyn Future<Output = Result<()>> + Send>> {
		Box::pin(async move {
			while let Some(frame) = self.stream.next().await {
				let payload = match frame? {
					WsMessage::Text(text) => serde_json::from_str::<Value>(&text),
					WsMessage::Binary(bytes) => serde_json::from_slice::<Value>(&bytes),
					WsMessage::Close(frame) => {
						tracing::debug!(target = "pairlink.bridge", ?frame, "bridge closed websocket");
						break;
					}
					_ => continue,
				};

				match payload {
					Ok(value) => {
						if self.message_tx.send(value).is_err() {
							break;
						}
					}
					Err(e) => tracing::warn!(target = "pairlink.bridge", error = %e, "dropping undecodable frame"),
				}
			}
			Ok(())
		})
	}
}
