//! Shared crawl frontier: the work queue and the dedup set

use std::collections::VecDeque;

use dashmap::DashSet;
use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::canonical::CanonicalUrl;

/// Unbounded FIFO of canonical URLs waiting to be fetched
///
/// Producers never block. Consumers either poll with
/// [`try_dequeue`](Self::try_dequeue) or park on [`dequeue`](Self::dequeue)
/// until an item arrives.
#[derive(Debug, Default)]
pub struct WorkQueue {
    items: Mutex<VecDeque<CanonicalUrl>>,
    available: Notify,
}

impl WorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `item` to the tail and wake one waiting consumer
    pub fn enqueue(&self, item: CanonicalUrl) {
        self.items.lock().push_back(item);
        self.available.notify_one();
    }

    /// Remove the head, or return `None` immediately when empty
    pub fn try_dequeue(&self) -> Option<CanonicalUrl> {
        self.items.lock().pop_front()
    }

    /// Remove the head, waiting for one to be enqueued if necessary
    ///
    /// Cancel-safe: dropping the future before it resolves loses no item.
    pub async fn dequeue(&self) -> CanonicalUrl {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register before checking so an enqueue between the check and
            // the await still wakes us.
            notified.as_mut().enable();

            if let Some(item) = self.try_dequeue() {
                return item;
            }

            notified.await;
        }
    }

    /// Approximate number of queued items
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

/// Set of canonical URLs that have already been scheduled
///
/// The set only grows. [`try_claim`](Self::try_claim) is the single gate for
/// putting a URL on the [`WorkQueue`].
#[derive(Debug, Default)]
pub struct DedupSet {
    seen: DashSet<CanonicalUrl>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically mark `item` as seen
    ///
    /// Returns `true` for exactly one caller per URL; every other caller gets
    /// `false` and must drop the item.
    pub fn try_claim(&self, item: &CanonicalUrl) -> bool {
        self.seen.insert(item.clone())
    }

    /// Number of claimed URLs, for reporting only
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
