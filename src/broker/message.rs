//! Message definitions for the broker
//!
//! `Message` is the canonical representation stored and delivered by the
//! broker. It is created once by a publisher and never mutated afterwards.
//!
//! Notes on fields:
//! - `id`: per-publisher monotonic sequence number
//! - `tag`: partition the message belongs to
//! - `timestamp`: seconds since UNIX epoch, set by the publisher at creation
//! - `payload`: opaque text
//!
//! `WireMessage` is the inbound shape of a publish frame. Its tag is still a
//! raw string; the coordinator resolves it and rejects unknown tags.

use serde::{Deserialize, Serialize};

use crate::broker::tag::Tag;
use crate::utils::error::Result;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub tag: Tag,
    pub timestamp: i64,
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub id: u64,
    pub tag: String,
    pub timestamp: i64,
    pub payload: String,
}

impl WireMessage {
    /// Resolve the declared tag, producing a routable `Message`.
    pub fn resolve(self) -> Result<Message> {
        let tag = self.tag.parse::<Tag>()?;
        Ok(Message {
            id: self.id,
            tag,
            timestamp: self.timestamp,
            payload: self.payload,
        })
    }
}

/// A stored message stamped with its per-tag sequence number.
///
/// `seq` is assigned by the retention store under the tag lock, so it orders
/// every write for one tag. It never leaves the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub seq: u64,
    pub message: Message,
}
