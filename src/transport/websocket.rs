//! WebSocket transport
//!
//! This file implements the broker's network surface. Responsibilities:
//! - Accept TCP/WebSocket connections, bounded by `server.max_connections`
//! - Read the first frame of each connection and dispatch the call it names
//! - Adapt inbound `message` frames into the stream a Publish call consumes
//! - Forward a Subscribe call's output to the socket, and cancel the call
//!   as soon as the peer goes away
//!
//! One task serves one connection, and one connection carries one call. The
//! peer identity handed to the coordinator is the remote socket address.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{Sink, SinkExt, Stream, StreamExt, stream};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, mpsc};
use tokio_tungstenite::accept_async;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::broker::engine::BrokerCoordinator;
use crate::broker::message::{Message, WireMessage};
use crate::config::Settings;
use crate::transport::message::{ClientFrame, ServerFrame};
use crate::utils::error::{BrokerError, Result};

pub async fn start_websocket_server(
    coordinator: Arc<BrokerCoordinator>,
    settings: Settings,
) -> Result<()> {
    let listener = TcpListener::bind(settings.addr()).await?;
    serve(listener, coordinator, settings.server.max_connections).await
}

/// Accept connections on an already bound listener. Runs until the task
/// driving it is dropped.
pub async fn serve(
    listener: TcpListener,
    coordinator: Arc<BrokerCoordinator>,
    max_connections: usize,
) -> Result<()> {
    info!("WebSocket server listening on ws://{}", listener.local_addr()?);
    let limit = Arc::new(Semaphore::new(max_connections));

    loop {
        let (stream, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                error!(error = %e, "failed to accept connection");
                continue;
            }
        };

        let Ok(permit) = limit.clone().try_acquire_owned() else {
            warn!(%peer_addr, max_connections, "connection limit reached, dropping peer");
            continue;
        };

        let coordinator = coordinator.clone();
        let span = info_span!("call", peer = %peer_addr, id = %Uuid::new_v4());
        tokio::spawn(
            async move {
                let _permit = permit;
                if let Err(e) = handle_connection(stream, peer_addr, coordinator).await {
                    warn!(error = %e, "call failed");
                }
            }
            .instrument(span),
        );
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    coordinator: Arc<BrokerCoordinator>,
) -> Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let peer = peer_addr.to_string();

    let Some(first) = next_frame(&mut ws_receiver).await else {
        debug!("peer closed before starting a call");
        return Ok(());
    };

    match first {
        Ok(ClientFrame::Register { tag }) => {
            let outcome = coordinator
                .register(&tag, &peer)
                .map(|_| Some(ServerFrame::Ack { accepted: None }));
            finish(&mut ws_sender, outcome).await
        }
        Ok(ClientFrame::RequestTags) => {
            info!("received request for tags");
            let reply = ServerFrame::Tags {
                list: coordinator.request_tags().to_string(),
            };
            finish(&mut ws_sender, Ok(Some(reply))).await
        }
        Ok(ClientFrame::Publish) => {
            let inbound = publish_stream(&mut ws_receiver);
            let outcome = coordinator
                .publish(&peer, inbound)
                .await
                .map(|accepted| Some(ServerFrame::Ack { accepted: Some(accepted) }));
            finish(&mut ws_sender, outcome).await
        }
        Ok(ClientFrame::Subscribe { tag }) => {
            subscribe_call(&coordinator, &tag, &peer, &mut ws_sender, &mut ws_receiver).await
        }
        Ok(other) => {
            let err = BrokerError::protocol(format!("'{}' cannot start a call", other.kind()));
            finish(&mut ws_sender, Err(err)).await
        }
        Err(e) => finish(&mut ws_sender, Err(e)).await,
    }
}

/// Run a Subscribe call on an open connection.
async fn subscribe_call<Tx, Rx>(
    coordinator: &BrokerCoordinator,
    tag: &str,
    peer: &str,
    ws_sender: &mut Tx,
    ws_receiver: &mut Rx,
) -> Result<()>
where
    Tx: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
    Rx: Stream<Item = std::result::Result<WsMessage, tungstenite::Error>> + Unpin,
{
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
    let cancel = CancellationToken::new();

    let call = async {
        let result = coordinator.subscribe(tag, peer, out_tx, cancel.clone()).await;
        cancel.cancel();
        result
    };

    let watch = async {
        tokio::select! {
            _ = cancel.cancelled() => {}
            _ = wait_for_close(&mut *ws_receiver) => {
                debug!("subscriber connection closed");
                cancel.cancel();
            }
        }
    };

    let forward = async {
        while let Some(message) = out_rx.recv().await {
            if let Err(e) = send_frame(&mut *ws_sender, &ServerFrame::Message(message)).await {
                debug!(error = %e, "failed to write to subscriber");
                cancel.cancel();
                break;
            }
        }
    };

    let (result, (), ()) = tokio::join!(call, watch, forward);
    finish(ws_sender, result.map(|_| None)).await
}

/// Adapt the rest of a publish connection into a stream of inbound messages.
/// Ends at `done` or when the peer closes.
fn publish_stream<Rx>(ws_receiver: &mut Rx) -> impl Stream<Item = Result<WireMessage>> + '_
where
    Rx: Stream<Item = std::result::Result<WsMessage, tungstenite::Error>> + Unpin,
{
    stream::unfold(ws_receiver, |rx| async move {
        let item = match next_frame(&mut *rx).await? {
            Ok(ClientFrame::Done) => return None,
            Ok(ClientFrame::Message(wire)) => Ok(wire),
            Ok(other) => Err(BrokerError::protocol(format!(
                "unexpected '{}' frame during publish",
                other.kind()
            ))),
            Err(e) => Err(e),
        };
        Some((item, rx))
    })
}

/// Read the next client frame, skipping control frames. `None` once the peer
/// has closed the connection.
async fn next_frame<Rx>(ws_receiver: &mut Rx) -> Option<Result<ClientFrame>>
where
    Rx: Stream<Item = std::result::Result<WsMessage, tungstenite::Error>> + Unpin,
{
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(WsMessage::Text(text)) => {
                return Some(serde_json::from_str(text.as_str()).map_err(BrokerError::from));
            }
            Ok(WsMessage::Binary(_)) => {
                return Some(Err(BrokerError::protocol("binary frames are not supported")));
            }
            Ok(WsMessage::Close(_)) => return None,
            Ok(_) => continue,
            Err(e) => return Some(Err(e.into())),
        }
    }
    None
}

async fn wait_for_close<Rx>(ws_receiver: &mut Rx)
where
    Rx: Stream<Item = std::result::Result<WsMessage, tungstenite::Error>> + Unpin,
{
    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(WsMessage::Close(_)) | Err(_) => return,
            Ok(_) => {}
        }
    }
}

async fn send_frame<Tx>(ws_sender: &mut Tx, frame: &ServerFrame) -> Result<()>
where
    Tx: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
{
    let text = serde_json::to_string(frame)?;
    ws_sender.send(WsMessage::text(text)).await?;
    Ok(())
}

/// Send the call's final frame (an error frame if it failed) and close.
async fn finish<Tx>(ws_sender: &mut Tx, outcome: Result<Option<ServerFrame>>) -> Result<()>
where
    Tx: Sink<WsMessage, Error = tungstenite::Error> + Unpin,
{
    let (frame, result) = match outcome {
        Ok(frame) => (frame, Ok(())),
        Err(e) => (
            Some(ServerFrame::Error {
                message: e.to_string(),
            }),
            Err(e),
        ),
    };

    if let Some(frame) = frame {
        if let Err(e) = send_frame(ws_sender, &frame).await {
            debug!(error = %e, "could not deliver final frame");
        }
    }
    let _ = ws_sender.close().await;

    result
}
