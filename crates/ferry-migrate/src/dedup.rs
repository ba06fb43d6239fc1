//! Collapses concurrent identical requests into one round trip.

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A pending call that any number of callers can await.
pub type SharedCall<T> = Shared<BoxFuture<'static, T>>;

struct InFlight<T: Clone> {
    id: u64,
    started_at: Instant,
    call: SharedCall<T>,
}

/// Stable key for an `(endpoint, params)` pair.
///
/// `serde_json` objects serialise with sorted keys, so parameter order at the
/// call site does not change the key.
pub fn request_key(endpoint: &str, params: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(endpoint.as_bytes());
    hasher.update(b"\n");
    hasher.update(params.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Process-wide map of in-flight calls.
pub struct RequestDeduplicator<T: Clone> {
    inflight: Arc<Mutex<HashMap<String, InFlight<T>>>>,
    timeout: Duration,
    next_id: AtomicU64,
}

impl<T> RequestDeduplicator<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a deduplicator that evicts entries older than `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
            timeout,
            next_id: AtomicU64::new(0),
        }
    }

    /// Join the in-flight call for `key`, or start one with `producer`.
    ///
    /// The entry is removed as soon as the call resolves, whether it
    /// succeeded or failed, so the next caller issues a fresh request.
    pub fn dedupe<F, Fut>(&self, key: String, producer: F) -> SharedCall<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let now = Instant::now();
        let mut inflight = self.inflight.lock();

        let timeout = self.timeout;
        inflight.retain(|stale_key, entry| {
            let fresh = now.saturating_duration_since(entry.started_at) < timeout;
            if !fresh {
                tracing::debug!(key = %stale_key, "Evicting stale in-flight request");
            }
            fresh
        });

        if let Some(entry) = inflight.get(&key) {
            tracing::trace!(key = %key, "Joining in-flight request");
            return entry.call.clone();
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let registry = Arc::clone(&self.inflight);
        let entry_key = key.clone();
        let request = producer();

        let call = async move {
            let output = request.await;
            let mut inflight = registry.lock();
            if inflight.get(&entry_key).is_some_and(|entry| entry.id == id) {
                inflight.remove(&entry_key);
            }
            output
        }
        .boxed()
        .shared();

        inflight.insert(
            key,
            InFlight {
                id,
                started_at: now,
                call: call.clone(),
            },
        );
        call
    }

    /// Number of calls currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().len()
    }
}
