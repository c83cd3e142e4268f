//! Per-tag subscriber registry and fan-out
//!
//! A `TagRouter` holds, for each tag, the list of live subscriptions in
//! registration order. Each list has its own mutex, so tags never contend
//! with each other.
//!
//! Delivery notes:
//! - `broadcast` enqueues onto every sink while holding the tag lock. Sinks
//!   are unbounded channels, so an enqueue never waits on the network; all
//!   broadcasts for one tag are therefore totally ordered without one slow
//!   subscriber stalling the rest.
//! - A failed enqueue (receiver dropped) is only counted. The entry stays
//!   registered until the owning Subscribe call unregisters it.
//! - `unregister` removes every entry with the given peer identity, not just
//!   the first.

use std::sync::Mutex;

use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use crate::broker::message::Envelope;
use crate::broker::tag::{Tag, TagMap};
use crate::utils::lock;

pub type PeerId = String;
pub type Sink = UnboundedSender<Envelope>;

#[derive(Debug, Clone)]
pub struct Subscriber {
    pub peer: PeerId,
    pub sink: Sink,
}

/// Outcome of a single broadcast.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct TagRouter {
    subscribers: TagMap<Mutex<Vec<Subscriber>>>,
}

impl TagRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscription. It receives every broadcast that starts after
    /// this returns.
    pub fn register(&self, tag: Tag, peer: impl Into<PeerId>, sink: Sink) {
        let peer = peer.into();
        let mut subs = lock(&self.subscribers[tag]);
        subs.push(Subscriber { peer, sink });
    }

    /// Remove every subscription of `peer` on `tag`. Returns how many were
    /// removed.
    pub fn unregister(&self, tag: Tag, peer: &str) -> usize {
        let mut subs = lock(&self.subscribers[tag]);
        let before = subs.len();
        subs.retain(|s| s.peer != peer);
        before - subs.len()
    }

    /// Deliver `envelope` to every subscriber of `tag`, in registration order.
    pub fn broadcast(&self, tag: Tag, envelope: &Envelope) -> Delivery {
        let subs = lock(&self.subscribers[tag]);
        let mut delivery = Delivery::default();

        for sub in subs.iter() {
            debug!(peer = %sub.peer, %tag, seq = envelope.seq, "sending");
            match sub.sink.send(envelope.clone()) {
                Ok(()) => delivery.delivered += 1,
                Err(_) => {
                    warn!(peer = %sub.peer, %tag, "subscriber sink closed, dropping message");
                    delivery.failed += 1;
                }
            }
        }

        delivery
    }

    pub fn subscriber_count(&self, tag: Tag) -> usize {
        lock(&self.subscribers[tag]).len()
    }

    /// Snapshot of the peers registered on `tag`, in registration order.
    pub fn peers(&self, tag: Tag) -> Vec<PeerId> {
        lock(&self.subscribers[tag])
            .iter()
            .map(|s| s.peer.clone())
            .collect()
    }
}
