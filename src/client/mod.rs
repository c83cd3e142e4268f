//! The `client` module talks to a running broker over WebSockets.
//!
//! It provides `BrokerClient`, used by the `publisher` and `subscriber`
//! commands of the binary, and `PoissonSchedule`, which spaces out the
//! demo publisher's messages.

pub mod generator;
pub mod pubsub_client;

pub use generator::PoissonSchedule;
pub use pubsub_client::{BrokerClient, PublishStream, Subscription};
