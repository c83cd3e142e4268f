//! The `retention` module keeps recently published messages per tag so that
//! new subscribers can be replayed the history that is still within the TTL.
//!
//! Nothing here survives a restart; the store is purely in memory.

pub mod clock;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use store::RetentionStore;
