//! Broker engine
//!
//! `BrokerCoordinator` implements the four calls of the broker API on top of
//! the `RetentionStore` and the `TagRouter`:
//! - `register`: advisory, validates and logs a publisher's tag
//! - `publish`: consumes a stream of inbound messages; each one is stored
//!   and then broadcast, in that order
//! - `subscribe`: registers a sink, replays retained history, then forwards
//!   live messages until the call is cancelled
//! - `request_tags`: the comma-joined tag list
//!
//! Concurrency and usage notes:
//! - The coordinator is shared as `Arc<BrokerCoordinator>`; every method takes
//!   `&self`. All locking is per tag inside the store and the router, and no
//!   lock is held across an `.await`.
//! - A subscriber is registered before its replay snapshot is read, so a
//!   message published in between can arrive both ways. Live envelopes whose
//!   sequence number is not newer than the last replayed one are dropped, so
//!   each retained message is delivered to a subscriber once.

use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broker::message::{Envelope, Message, WireMessage};
use crate::broker::router::{Delivery, TagRouter};
use crate::broker::tag::Tag;
use crate::retention::RetentionStore;
use crate::utils::error::Result;

/// What a finished Subscribe call delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscribeSummary {
    pub tag: Tag,
    pub replayed: usize,
    pub live: usize,
    pub duplicates_skipped: usize,
}

#[derive(Debug)]
pub struct BrokerCoordinator {
    store: Arc<RetentionStore>,
    router: TagRouter,
    tags_reply: String,
}

impl BrokerCoordinator {
    pub fn new(ttl: Duration) -> Self {
        Self::with_store(Arc::new(RetentionStore::new(ttl)))
    }

    pub fn with_store(store: Arc<RetentionStore>) -> Self {
        Self {
            store,
            router: TagRouter::new(),
            tags_reply: Tag::joined(),
        }
    }

    pub fn store(&self) -> &Arc<RetentionStore> {
        &self.store
    }

    pub fn router(&self) -> &TagRouter {
        &self.router
    }

    /// Record that `peer` intends to publish under `tag`. Does not gate
    /// later publishes.
    pub fn register(&self, tag: &str, peer: &str) -> Result<Tag> {
        let tag = tag.parse::<Tag>()?;
        info!(%peer, %tag, "registered publisher");
        Ok(tag)
    }

    /// Store and broadcast a single inbound message.
    pub fn publish_one(&self, peer: &str, wire: WireMessage) -> Result<Delivery> {
        let message = wire.resolve()?;
        let tag = message.tag;
        let id = message.id;

        let seq = self.store.write(tag, message.clone());
        let envelope = Envelope { seq, message };
        let delivery = self.router.broadcast(tag, &envelope);

        debug!(
            %peer,
            %tag,
            id,
            seq,
            delivered = delivery.delivered,
            failed = delivery.failed,
            retained = self.store.size(tag),
            "broadcast message"
        );
        Ok(delivery)
    }

    /// Drive a Publish call. Returns the number of accepted messages once the
    /// publisher closes its stream.
    ///
    /// The first unresolvable tag (or stream error) ends the call; nothing
    /// after it is processed.
    pub async fn publish<S>(&self, peer: &str, inbound: S) -> Result<u64>
    where
        S: Stream<Item = Result<WireMessage>>,
    {
        let mut inbound = std::pin::pin!(inbound);
        let mut accepted = 0u64;

        while let Some(next) = inbound.next().await {
            let wire = next?;
            if let Err(e) = self.publish_one(peer, wire) {
                warn!(%peer, accepted, error = %e, "publish rejected");
                return Err(e);
            }
            accepted += 1;
        }

        info!(%peer, accepted, "publisher disconnected");
        Ok(accepted)
    }

    /// Drive a Subscribe call: replay retained messages for `tag` into `out`,
    /// then forward live messages until `cancel` fires or `out` is closed.
    pub async fn subscribe(
        &self,
        tag: &str,
        peer: &str,
        out: UnboundedSender<Message>,
        cancel: CancellationToken,
    ) -> Result<SubscribeSummary> {
        let tag = tag.parse::<Tag>()?;
        let (live_tx, mut live_rx) = mpsc::unbounded_channel();

        self.router.register(tag, peer, live_tx);
        info!(%peer, %tag, subscribers = self.router.subscriber_count(tag), "subscriber connected");

        let mut summary = SubscribeSummary {
            tag,
            replayed: 0,
            live: 0,
            duplicates_skipped: 0,
        };

        let replay = self.store.read(tag);
        let last_replayed = replay.last().map_or(0, |e| e.seq);
        debug!(%peer, %tag, count = replay.len(), "replaying retained messages");

        let mut open = true;
        for envelope in replay {
            if out.send(envelope.message).is_err() {
                open = false;
                break;
            }
            summary.replayed += 1;
        }

        while open {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = out.closed() => break,
                next = live_rx.recv() => match next {
                    Some(envelope) if envelope.seq <= last_replayed => {
                        summary.duplicates_skipped += 1;
                    }
                    Some(envelope) => {
                        if out.send(envelope.message).is_err() {
                            break;
                        }
                        summary.live += 1;
                    }
                    None => break,
                },
            }
        }

        self.router.unregister(tag, peer);
        info!(
            %peer,
            %tag,
            replayed = summary.replayed,
            live = summary.live,
            "subscriber disconnected"
        );
        Ok(summary)
    }

    /// Comma-joined list of every tag, computed once at construction.
    pub fn request_tags(&self) -> &str {
        &self.tags_reply
    }
}
