//! Client representation
//!
//! `BrokerClient` opens one WebSocket connection per call, mirroring how the
//! broker serves them. Streaming calls hand back a value that owns the
//! connection: `Subscription` for Subscribe, `PublishStream` for Publish.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tungstenite::protocol::Message as WsMessage;

use crate::broker::message::{Message, WireMessage};
use crate::broker::tag::Tag;
use crate::transport::message::{ClientFrame, ServerFrame};
use crate::utils::error::{BrokerError, Result};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct BrokerClient {
    url: String,
}

impl BrokerClient {
    /// Create a client for the broker at `url`, e.g. `ws://127.0.0.1:50051`.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Announce that this process will publish under `tag`.
    pub async fn register(&self, tag: Tag) -> Result<()> {
        let mut ws = self.start(&ClientFrame::Register {
            tag: tag.as_str().to_string(),
        })
        .await?;

        match read_frame(&mut ws).await? {
            Some(ServerFrame::Ack { .. }) => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Fetch the broker's tag list, in the order the broker reports it.
    pub async fn request_tags(&self) -> Result<Vec<String>> {
        let mut ws = self.start(&ClientFrame::RequestTags).await?;

        match read_frame(&mut ws).await? {
            Some(ServerFrame::Tags { list }) => Ok(list
                .split(',')
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()),
            other => Err(unexpected(other)),
        }
    }

    /// Start a Subscribe call. Retained messages arrive first, then live ones.
    pub async fn subscribe(&self, tag: &str) -> Result<Subscription> {
        let ws = self
            .start(&ClientFrame::Subscribe {
                tag: tag.to_string(),
            })
            .await?;
        Ok(Subscription { ws })
    }

    /// Start a Publish call.
    pub async fn publisher(&self) -> Result<PublishStream> {
        let ws = self.start(&ClientFrame::Publish).await?;
        Ok(PublishStream { ws, sent: 0 })
    }

    async fn start(&self, frame: &ClientFrame) -> Result<WsStream> {
        let (mut ws, _response) = connect_async(self.url.as_str()).await?;
        send_frame(&mut ws, frame).await?;
        Ok(ws)
    }
}

/// An open Subscribe call.
pub struct Subscription {
    ws: WsStream,
}

impl Subscription {
    /// Next delivered message. `None` once the broker ends the call.
    pub async fn next_message(&mut self) -> Option<Result<Message>> {
        match read_frame(&mut self.ws).await {
            Ok(Some(ServerFrame::Message(message))) => Some(Ok(message)),
            Ok(None) => None,
            Ok(other) => Some(Err(unexpected(other))),
            Err(e) => Some(Err(e)),
        }
    }

    /// Disconnect, which ends the call on the broker side.
    pub async fn close(mut self) -> Result<()> {
        self.ws.close(None).await?;
        Ok(())
    }
}

/// An open Publish call.
pub struct PublishStream {
    ws: WsStream,
    sent: u64,
}

impl PublishStream {
    pub async fn send(&mut self, message: WireMessage) -> Result<()> {
        send_frame(&mut self.ws, &ClientFrame::Message(message)).await?;
        self.sent += 1;
        Ok(())
    }

    pub fn sent(&self) -> u64 {
        self.sent
    }

    /// Close the stream and wait for the broker's acknowledgement. Returns
    /// the number of messages the broker accepted.
    pub async fn finish(mut self) -> Result<u64> {
        // The broker may already have ended the call with an error frame, in
        // which case this send fails and the error frame is still readable.
        let _ = send_frame(&mut self.ws, &ClientFrame::Done).await;

        match read_frame(&mut self.ws).await? {
            Some(ServerFrame::Ack { accepted }) => Ok(accepted.unwrap_or(self.sent)),
            other => Err(unexpected(other)),
        }
    }
}

async fn send_frame(ws: &mut WsStream, frame: &ClientFrame) -> Result<()> {
    let text = serde_json::to_string(frame)?;
    ws.send(WsMessage::text(text)).await?;
    Ok(())
}

async fn read_frame(ws: &mut WsStream) -> Result<Option<ServerFrame>> {
    while let Some(msg) = ws.next().await {
        match msg? {
            WsMessage::Text(text) => return Ok(Some(serde_json::from_str(text.as_str())?)),
            WsMessage::Close(_) => return Ok(None),
            _ => continue,
        }
    }
    Ok(None)
}

fn unexpected(frame: Option<ServerFrame>) -> BrokerError {
    match frame {
        Some(ServerFrame::Error { message }) => BrokerError::Rejected(message),
        Some(other) => BrokerError::protocol(format!("unexpected reply {other:?}")),
        None => BrokerError::protocol("connection closed before a reply"),
    }
}
