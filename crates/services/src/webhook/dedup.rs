use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use classmeet_db::models::WebhookReceipt;
use parking_lot::Mutex;
use tracing::warn;

use super::event::WebhookEvent;
use crate::dao::{ReceiptStore, StoreResult};

/// Bounded set of recently seen keys; the oldest key is evicted first.
pub struct RecentKeys {
    capacity: usize,
    inner: Mutex<RecentInner>,
}

#[derive(Default)]
struct RecentInner {
    order: VecDeque<String>,
    keys: HashSet<String>,
}

impl RecentKeys {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(RecentInner::default()),
        }
    }

    /// Returns `false` if the key was already present.
    pub fn insert(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        if inner.keys.contains(key) {
            return false;
        }
        if inner.order.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.keys.remove(&oldest);
            }
        }
        inner.order.push_back(key.to_string());
        inner.keys.insert(key.to_string());
        true
    }

    pub fn remove(&self, key: &str) {
        let mut inner = self.inner.lock();
        if inner.keys.remove(key) {
            inner.order.retain(|k| k != key);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.lock().keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Two layers: the in-process recent set catches fast redeliveries, the
/// persisted receipts catch redeliveries across restarts and instances.
pub struct Deduplicator {
    recent: RecentKeys,
    receipts: Arc<dyn ReceiptStore>,
}

impl Deduplicator {
    pub fn new(receipts: Arc<dyn ReceiptStore>, capacity: usize) -> Self {
        Self {
            recent: RecentKeys::new(capacity),
            receipts,
        }
    }

    /// Claims the event's key. `Ok(false)` means it was already processed.
    pub async fn claim(&self, event: &WebhookEvent) -> StoreResult<bool> {
        if !self.recent.insert(&event.key) {
            return Ok(false);
        }
        let receipt = WebhookReceipt::new(&event.key, &event.event_type, &event.room_name);
        match self.receipts.claim(receipt).await {
            Ok(claimed) => Ok(claimed),
            Err(e) => {
                self.recent.remove(&event.key);
                Err(e)
            }
        }
    }

    /// Forgets a claim so a redelivery is processed again.
    pub async fn release(&self, key: &str) {
        self.recent.remove(key);
        if let Err(e) = self.receipts.release(key).await {
            warn!(key, error = %e, "Failed to release webhook receipt");
        }
    }
}
