//! Fan-out of one payload to every live peer but one.
//!
//! Sends are best effort. A failed send is logged and skipped; the peer's own
//! reader notices the broken connection on its next read and marks it dead.
use tracing::debug;

use crate::net::Framing;
use crate::registry::PeerRegistry;
use crate::types::{Message, PeerId};

/// What a broadcast attempted, for logging and tests. Not an error channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub attempted: usize,
    pub failed: usize,
}

impl BroadcastReport {
    pub fn delivered(&self) -> usize {
        self.attempted - self.failed
    }
}

/// Send already-encoded bytes to all live peers except `exclude`.
pub fn broadcast_bytes(registry: &PeerRegistry, bytes: &[u8], exclude: Option<PeerId>) -> BroadcastReport {
    let mut report = BroadcastReport::default();
    for peer in registry.snapshot_live() {
        if Some(peer.id) == exclude {
            continue;
        }
        report.attempted += 1;
        if let Err(e) = peer.handle.send(bytes) {
            report.failed += 1;
            debug!(peer = %peer.endpoint, error = %e, "send failed, leaving it to the reader");
        }
    }
    report
}

/// Encode `message` once and send it to all live peers except `exclude`.
pub fn broadcast_message(
    registry: &PeerRegistry,
    framing: Framing,
    message: &Message,
    exclude: Option<PeerId>,
) -> BroadcastReport {
    let bytes = framing.encode(&message.wire_bytes());
    broadcast_bytes(registry, &bytes, exclude)
}
