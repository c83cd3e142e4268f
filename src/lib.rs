//! # tagsub
//!
//! `tagsub` is a tag-partitioned, in-memory publish/subscribe broker. Every
//! message carries one of a small fixed set of tags. Subscribers pick a tag
//! and get the messages retained for it within the TTL, followed by a live
//! stream of new ones until they disconnect.
//!
//! ## Core Modules
//!
//! - `broker`: tags, messages, the subscriber router and the coordinator that
//!   implements Register, Publish, Subscribe and RequestTags.
//! - `retention`: the per-tag, time-bounded message store used for replay.
//! - `transport`: the WebSocket server and its JSON frames.
//! - `client`: a WebSocket client for the broker, used by the demo commands.
//! - `config`: loading server and broker settings.
//! - `utils`: error type and logging setup.

pub mod broker;
pub mod client;
pub mod config;
pub mod retention;
pub mod transport;
pub mod utils;

pub use broker::{BrokerCoordinator, Message, Tag};
pub use utils::error::{BrokerError, Result};
