//! Process-wide set of connected peers.
//!
//! Every read and write of the peer list happens under one mutex, and the
//! mutex is only held while the list itself is touched: closing a transport
//! and sending to one always happen after the guard is dropped.
use chrono::{DateTime, Local};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::RegistryError;
use crate::net::Transport;
use crate::types::{Direction, Endpoint, PeerId};

/// Live view of one peer, handed out by [`PeerRegistry::snapshot_live`].
#[derive(Clone)]
pub struct PeerEntry {
    pub id: PeerId,
    pub endpoint: Endpoint,
    pub direction: Direction,
    pub connected_at: DateTime<Local>,
    pub handle: Arc<dyn Transport>,
}

struct PeerRecord {
    id: PeerId,
    endpoint: Endpoint,
    direction: Direction,
    connected_at: DateTime<Local>,
    // `None` once the peer is dead; the handle is never handed out again.
    handle: Option<Arc<dyn Transport>>,
}

impl PeerRecord {
    fn is_live(&self) -> bool {
        self.handle.is_some()
    }
}

struct Inner {
    next_id: u64,
    // Sorted by id, which is also insertion order.
    peers: Vec<PeerRecord>,
}

pub struct PeerRegistry {
    inner: Mutex<Inner>,
    max_live: Option<usize>,
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new(None)
    }
}

impl PeerRegistry {
    pub fn new(max_live: Option<usize>) -> Self {
        Self { inner: Mutex::new(Inner { next_id: 0, peers: Vec::new() }), max_live }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a freshly connected peer as live.
    pub fn add(
        &self,
        endpoint: Endpoint,
        direction: Direction,
        handle: Arc<dyn Transport>,
    ) -> Result<PeerId, RegistryError> {
        let mut inner = self.lock();
        if let Some(limit) = self.max_live {
            if inner.peers.iter().filter(|p| p.is_live()).count() >= limit {
                return Err(RegistryError::Full { limit });
            }
        }
        let id = PeerId(inner.next_id);
        inner.next_id += 1;
        inner.peers.push(PeerRecord {
            id,
            endpoint,
            direction,
            connected_at: Local::now(),
            handle: Some(handle),
        });
        Ok(id)
    }

    /// Flip the peer to dead and close its transport. Only the first call for
    /// a given id closes anything; returns whether this call did.
    pub fn mark_dead(&self, id: PeerId) -> bool {
        let handle = {
            let mut inner = self.lock();
            match find(&inner.peers, id) {
                Some(idx) => inner.peers[idx].handle.take(),
                None => None,
            }
        };
        match handle {
            Some(handle) => {
                handle.close();
                true
            }
            None => false,
        }
    }

    pub fn is_live(&self, id: PeerId) -> bool {
        let inner = self.lock();
        find(&inner.peers, id).is_some_and(|idx| inner.peers[idx].is_live())
    }

    /// Live peers in insertion order. Taken under the lock, used outside it.
    pub fn snapshot_live(&self) -> Vec<PeerEntry> {
        let inner = self.lock();
        inner
            .peers
            .iter()
            .filter_map(|p| {
                p.handle.as_ref().map(|handle| PeerEntry {
                    id: p.id,
                    endpoint: p.endpoint,
                    direction: p.direction,
                    connected_at: p.connected_at,
                    handle: Arc::clone(handle),
                })
            })
            .collect()
    }

    pub fn live_count(&self) -> usize {
        self.lock().peers.iter().filter(|p| p.is_live()).count()
    }

    /// Number of records, dead ones included.
    pub fn len(&self) -> usize {
        self.lock().peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().peers.is_empty()
    }

    /// Forget dead records. Ids of the remaining peers do not change.
    pub fn prune_dead(&self) -> usize {
        let mut inner = self.lock();
        let before = inner.peers.len();
        inner.peers.retain(PeerRecord::is_live);
        before - inner.peers.len()
    }

    /// Mark every peer dead and close every handle still open.
    pub fn close_all(&self) -> usize {
        let handles: Vec<Arc<dyn Transport>> = {
            let mut inner = self.lock();
            inner.peers.iter_mut().filter_map(|p| p.handle.take()).collect()
        };
        for handle in &handles {
            handle.close();
        }
        handles.len()
    }
}

fn find(peers: &[PeerRecord], id: PeerId) -> Option<usize> {
    peers.binary_search_by_key(&id, |p| p.id).ok()
}
