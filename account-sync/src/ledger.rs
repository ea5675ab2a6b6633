//! In-memory record of webhook deliveries already seen.
//!
//! The identity provider delivers at least once, so the same `svix-id` may
//! arrive more than once. A delivery is claimed before dispatch through a
//! [`DeliveryClaim`]; the claim is kept only once committed after a
//! successful dispatch. A failed or cancelled dispatch drops the claim, which
//! releases the id so the provider's retry is processed. The ledger is local
//! to one process.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Entries are swept once the map grows past this many ids.
const PURGE_THRESHOLD: usize = 10_000;

/// Longest time an id is remembered (one year).
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Time-bounded set of claimed delivery ids.
#[derive(Clone)]
pub struct DeliveryLedger {
    inner: Arc<LedgerInner>,
}

struct LedgerInner {
    ttl: Duration,
    seen: Mutex<HashMap<String, Instant>>,
}

impl DeliveryLedger {
    /// Create a ledger that remembers ids for `ttl`, capped at [`MAX_TTL_SECS`].
    pub fn new(ttl: Duration) -> Self {
        let max = Duration::from_secs(MAX_TTL_SECS);
        if ttl > max {
            warn!(
                ttl_secs = ttl.as_secs(),
                max_ttl_secs = MAX_TTL_SECS,
                "ledger_ttl_capped"
            );
        }

        Self {
            inner: Arc::new(LedgerInner {
                ttl: ttl.min(max),
                seen: Mutex::new(HashMap::new()),
            }),
        }
    }

    // Critical sections never await, so a plain mutex is enough and lets
    // `DeliveryClaim` release from `Drop`.
    fn seen(&self) -> MutexGuard<'_, HashMap<String, Instant>> {
        self.inner
            .seen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark `id` as seen. Returns `true` when the id was unseen or expired and
    /// the caller should process the delivery, `false` for a duplicate.
    pub fn begin(&self, id: &str) -> bool {
        let now = Instant::now();
        let mut seen = self.seen();

        if seen.len() >= PURGE_THRESHOLD {
            let before = seen.len();
            seen.retain(|_, expires| *expires > now);
            info!(
                removed = before - seen.len(),
                remaining = seen.len(),
                "ledger_purged"
            );
        }

        match seen.get(id) {
            Some(expires) if *expires > now => {
                debug!(delivery_id = %id, "ledger_duplicate");
                false
            }
            _ => {
                seen.insert(id.to_string(), now + self.inner.ttl);
                true
            }
        }
    }

    /// Claim `id` for the duration of a dispatch. `None` for a duplicate.
    ///
    /// The id is released when the returned claim is dropped without
    /// [`DeliveryClaim::commit`], including when the owning future is cancelled.
    pub fn claim(&self, id: &str) -> Option<DeliveryClaim> {
        self.begin(id).then(|| DeliveryClaim {
            ledger: self.clone(),
            id: id.to_string(),
            committed: false,
        })
    }

    /// Forget `id` so a later redelivery is processed again.
    pub fn release(&self, id: &str) {
        self.seen().remove(id);
        debug!(delivery_id = %id, "ledger_released");
    }

    /// Drop every expired entry and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut seen = self.seen();
        let before = seen.len();
        seen.retain(|_, expires| *expires > now);
        before - seen.len()
    }

    /// Number of ids currently remembered, expired or not.
    pub fn len(&self) -> usize {
        self.seen().len()
    }

    /// Whether the ledger holds no ids.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An in-flight delivery id. Released on drop unless committed.
pub struct DeliveryClaim {
    ledger: DeliveryLedger,
    id: String,
    committed: bool,
}

impl DeliveryClaim {
    /// Keep the id for the ledger TTL; later redeliveries are duplicates.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for DeliveryClaim {
    fn drop(&mut self) {
        if !self.committed {
            self.ledger.release(&self.id);
        }
    }
}
