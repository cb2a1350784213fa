//! Writer lease — arbitrates which console instance is the legitimate
//! envelope writer when two operator sessions run at once.
//!
//! The lease lives on its own storage key and is load-bearing for
//! publication: the engine refuses to write envelopes while another
//! instance holds an unexpired lease.  A crashed console's lease expires
//! naturally within one lease window, after which any instance can
//! reacquire.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use onair_proto::envelope::{LEASE_KEY, LEASE_MS};
use onair_proto::store::{read_json, write_json, SharedStore};
use onair_proto::track::generate_id;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseRecord {
    pub owner: String,
    pub lease_until: i64,
    pub heartbeat_at: i64,
}

pub struct LeaseManager {
    /// Random opaque identity, generated once per session (never persisted
    /// across restarts).
    id: String,
    store: Arc<dyn SharedStore>,
}

impl LeaseManager {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self {
            id: generate_id("console"),
            store,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn current(&self) -> Option<LeaseRecord> {
        read_json(self.store.as_ref(), LEASE_KEY)
    }

    /// True only while the stored owner is this instance and the lease has
    /// not lapsed.
    pub fn has_lease(&self, now: i64) -> bool {
        self.current()
            .is_some_and(|rec| rec.owner == self.id && now <= rec.lease_until)
    }

    /// Claim the lease when it is free or expired.  Never overwrites a live
    /// foreign lease.  Returns whether this instance is (now) the owner.
    pub fn acquire(&self, now: i64) -> bool {
        if let Some(rec) = self.current() {
            if rec.owner != self.id && now <= rec.lease_until {
                return false;
            }
        }
        self.claim(now);
        info!("writer lease acquired by {}", self.id);
        true
    }

    /// Extend the lease.  No-op unless this instance currently holds it.
    pub fn renew(&self, now: i64) -> bool {
        if !self.has_lease(now) {
            return false;
        }
        self.claim(now);
        true
    }

    /// True when the lease is held and past half its window — the renewal
    /// point for a healthy owner.
    pub fn due_for_renewal(&self, now: i64) -> bool {
        self.current()
            .is_some_and(|rec| rec.owner == self.id && rec.lease_until - now <= LEASE_MS / 2)
    }

    fn claim(&self, now: i64) {
        write_json(
            self.store.as_ref(),
            LEASE_KEY,
            &LeaseRecord {
                owner: self.id.clone(),
                lease_until: now + LEASE_MS,
                heartbeat_at: now,
            },
        );
    }
}
