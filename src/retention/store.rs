//! Time-bounded retention store
//!
//! Each tag owns an append-only log of `Envelope`s in arrival order, guarded
//! by its own mutex. Entries are evicted from the front once
//! `now - timestamp >= ttl`:
//! - lazily, whenever the tag is read for replay
//! - periodically, by the background sweep started with
//!   `start_eviction_loop`, so tags that nobody subscribes to do not grow
//!   without bound
//!
//! Eviction stops at the first unexpired entry. This relies on publishers
//! stamping timestamps in the order their messages arrive; an out-of-order
//! timestamp shields everything behind it until it expires itself.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

use crate::broker::message::{Envelope, Message};
use crate::broker::tag::{Tag, TagMap};
use crate::retention::clock::{Clock, SystemClock};
use crate::utils::lock;

#[derive(Debug, Default)]
struct Log {
    entries: VecDeque<Envelope>,
    last_seq: u64,
}

#[derive(Debug, Default)]
struct Partition {
    log: Mutex<Log>,
    /// Mirror of `log.entries.len()`, updated under the lock. Lets `read`
    /// skip locking an empty tag.
    len: AtomicUsize,
}

#[derive(Debug)]
pub struct RetentionStore {
    partitions: TagMap<Partition>,
    ttl_secs: i64,
    clock: Arc<dyn Clock>,
}

impl RetentionStore {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            partitions: TagMap::default(),
            ttl_secs: i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX),
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs as u64)
    }

    /// Append `message` to its tag's log and return the sequence number it
    /// was stamped with. Never evicts and never rejects.
    pub fn write(&self, tag: Tag, message: Message) -> u64 {
        let partition = &self.partitions[tag];
        let mut log = lock(&partition.log);

        log.last_seq += 1;
        let seq = log.last_seq;
        log.entries.push_back(Envelope { seq, message });
        partition.len.store(log.entries.len(), Ordering::Release);

        seq
    }

    /// Evict expired entries for `tag` and return a copy of what remains,
    /// oldest first.
    pub fn read(&self, tag: Tag) -> Vec<Envelope> {
        let partition = &self.partitions[tag];
        if partition.len.load(Ordering::Acquire) == 0 {
            return Vec::new();
        }

        let mut log = lock(&partition.log);
        let evicted = self.evict_locked(&mut log.entries);
        partition.len.store(log.entries.len(), Ordering::Release);
        if evicted > 0 {
            trace!(%tag, evicted, "evicted expired messages on read");
        }

        log.entries.iter().cloned().collect()
    }

    /// Number of retained entries for `tag`, expired or not.
    pub fn size(&self, tag: Tag) -> usize {
        self.partitions[tag].len.load(Ordering::Acquire)
    }

    /// Evict expired entries for a single tag without copying anything out.
    pub fn evict_expired(&self, tag: Tag) -> usize {
        let partition = &self.partitions[tag];
        if partition.len.load(Ordering::Acquire) == 0 {
            return 0;
        }

        let mut log = lock(&partition.log);
        let evicted = self.evict_locked(&mut log.entries);
        partition.len.store(log.entries.len(), Ordering::Release);
        evicted
    }

    /// Evict expired entries across every tag. Tags are locked one at a time.
    pub fn sweep(&self) -> usize {
        Tag::ALL.into_iter().map(|tag| self.evict_expired(tag)).sum()
    }

    /// Run `sweep` every `interval` until the task is dropped or aborted.
    /// `interval` must be non-zero.
    pub async fn start_eviction_loop(store: Arc<RetentionStore>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let evicted = store.sweep();
            if evicted > 0 {
                debug!(evicted, "retention sweep evicted expired messages");
            }
        }
    }

    fn evict_locked(&self, entries: &mut VecDeque<Envelope>) -> usize {
        let now = self.clock.now();
        let mut evicted = 0;

        while let Some(front) = entries.front() {
            if now.saturating_sub(front.message.timestamp) < self.ttl_secs {
                break;
            }
            entries.pop_front();
            evicted += 1;
        }

        evicted
    }
}
