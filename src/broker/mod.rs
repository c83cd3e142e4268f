//! The broker crate module contains the tag model, the subscriber router and
//! the coordinator that implements Register, Publish, Subscribe and
//! RequestTags on top of the retention store.

pub mod engine;
pub mod message;
pub mod router;
pub mod tag;

pub use engine::{BrokerCoordinator, SubscribeSummary};
pub use message::{Envelope, Message, WireMessage};
pub use router::{Delivery, TagRouter};
pub use tag::{Tag, TagMap};
