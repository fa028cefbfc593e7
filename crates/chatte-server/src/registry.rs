//! Identity → connection map.
//!
//! Identity assignment and insertion happen under one lock, so concurrent
//! registrations never observe the same counter value. Lookups clone the
//! `Arc` out and release the lock before any await.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chatte_core::Identity;
use parking_lot::Mutex;

use crate::connection::Connection;
use crate::errors::RegisterError;

/// Result of one [`Registry::sweep`] pass.
#[derive(Debug, Default)]
pub struct SweepOutcome {
    /// Identities whose connections had already stopped and were removed.
    pub removed: Vec<Identity>,
    /// Still-running connections idle for longer than the threshold.
    pub expired: Vec<Arc<Connection>>,
}

#[derive(Default)]
struct Inner {
    connections: HashMap<Identity, Arc<Connection>>,
    next_id: u64,
}

/// Registered connections keyed by identity.
#[derive(Default)]
pub struct Registry {
    inner: Mutex<Inner>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign the next identity, build the connection with it and insert.
    ///
    /// `start` runs under the lock; it must not block.
    pub(crate) fn admit<F>(&self, limit: usize, start: F) -> Result<Identity, RegisterError>
    where
        F: FnOnce(Identity) -> Connection,
    {
        let mut inner = self.inner.lock();
        if inner.connections.len() >= limit {
            return Err(RegisterError::AtCapacity { limit });
        }
        inner.next_id += 1;
        let identity = Identity::numbered(inner.next_id);
        let connection = Arc::new(start(identity.clone()));
        let _ = inner.connections.insert(identity.clone(), connection);
        Ok(identity)
    }

    /// Look up a connection by display name.
    pub fn get(&self, identity: &str) -> Option<Arc<Connection>> {
        self.inner.lock().connections.get(identity).cloned()
    }

    /// Whether `identity` is registered.
    pub fn contains(&self, identity: &str) -> bool {
        self.inner.lock().connections.contains_key(identity)
    }

    /// All registered connections at this instant.
    pub fn snapshot(&self) -> Vec<Arc<Connection>> {
        self.inner.lock().connections.values().cloned().collect()
    }

    /// Registered identities, sorted.
    pub fn identities(&self) -> Vec<Identity> {
        let mut ids: Vec<Identity> = self.inner.lock().connections.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.inner.lock().connections.len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove stopped connections and collect those idle past `threshold`.
    ///
    /// Expired connections stay registered; the caller stops them outside
    /// the lock and a later pass removes them.
    pub fn sweep(&self, threshold: Duration) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();
        let mut inner = self.inner.lock();
        inner.connections.retain(|identity, conn| {
            if !conn.is_running() {
                outcome.removed.push(identity.clone());
                return false;
            }
            if conn.idle_for() > threshold {
                outcome.expired.push(Arc::clone(conn));
            }
            true
        });
        outcome
    }

    /// Remove every entry, returning them.
    pub fn drain(&self) -> Vec<Arc<Connection>> {
        self.inner
            .lock()
            .connections
            .drain()
            .map(|(_, conn)| conn)
            .collect()
    }
}
