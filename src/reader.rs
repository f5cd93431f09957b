//! One reader thread per peer.
//!
//! A reader owns the read half of its peer's socket and nothing else. It
//! loops until the node stops or the peer goes away; a failed or empty read
//! is the peer's terminal state, there is no reconnect.
use std::io::{self, Read};
use std::net::TcpStream;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

use crate::broadcast::{broadcast_bytes, broadcast_message};
use crate::error::ConnectError;
use crate::net::{FrameReader, TcpTransport, Transport};
use crate::node::Shared;
use crate::types::{Direction, Endpoint, Event, Message, Mode, PeerId};

/// Register a connected socket and start its reader. Used for both accepted
/// and dialed connections. On error nothing stays registered.
pub(crate) fn attach(
    shared: &Arc<Shared>,
    stream: TcpStream,
    endpoint: Endpoint,
    direction: Direction,
) -> Result<PeerId, ConnectError> {
    let io_err = |source: io::Error| ConnectError::Io { addr: endpoint, source };
    stream.set_read_timeout(shared.config.read_timeout()).map_err(io_err)?;
    stream.set_write_timeout(shared.config.write_timeout()).map_err(io_err)?;
    let read_half = stream.try_clone().map_err(io_err)?;

    register(shared, endpoint, Arc::new(TcpTransport::new(stream)), direction, |id| {
        spawn_reader(shared, id, endpoint, direction, read_half).map(drop)
    })
}

/// Add `handle` to the registry and run `start` for it. The record is marked
/// dead again if the node stopped meanwhile or `start` fails.
fn register<F>(
    shared: &Shared,
    endpoint: Endpoint,
    handle: Arc<dyn Transport>,
    direction: Direction,
    start: F,
) -> Result<PeerId, ConnectError>
where
    F: FnOnce(PeerId) -> io::Result<()>,
{
    let id = shared.registry.add(endpoint, direction, handle)?;
    // A dial may complete after shutdown has already closed every peer.
    if !shared.is_running() {
        shared.registry.mark_dead(id);
        return Err(ConnectError::Stopped);
    }
    if let Err(source) = start(id) {
        shared.registry.mark_dead(id);
        return Err(ConnectError::Io { addr: endpoint, source });
    }
    Ok(id)
}

fn spawn_reader(
    shared: &Arc<Shared>,
    id: PeerId,
    endpoint: Endpoint,
    direction: Direction,
    stream: TcpStream,
) -> io::Result<JoinHandle<()>> {
    let shared = Arc::clone(shared);
    thread::Builder::new().name(format!("peer-{}", endpoint)).spawn(move || {
        // Announced from the reader itself so the join always precedes the
        // matching PeerLeft.
        if shared.mode == Mode::Mesh {
            shared.inbox.push(Event::PeerJoined { endpoint, direction });
        }
        let frames = FrameReader::new(stream, shared.config.framing, shared.config.read_chunk);
        read_loop(&shared, id, endpoint, frames);
    })
}

pub(crate) fn read_loop<R: Read>(shared: &Shared, id: PeerId, endpoint: Endpoint, mut frames: FrameReader<R>) {
    while shared.is_running() && shared.registry.is_live(id) {
        match frames.next_frame() {
            Ok(Some(frame)) => deliver(shared, id, endpoint, &frame),
            Ok(None) => {
                disconnected(shared, id, endpoint, "end of stream");
                return;
            }
            Err(e) => {
                disconnected(shared, id, endpoint, &e.to_string());
                return;
            }
        }
    }
    shared.registry.mark_dead(id);
}

fn deliver(shared: &Shared, id: PeerId, endpoint: Endpoint, frame: &[u8]) {
    match shared.mode {
        Mode::Mesh => {
            let msg = Message::from_peer(frame, endpoint);
            shared.inbox.push(Event::Chat(msg.clone()));
            let report = broadcast_message(&shared.registry, shared.config.framing, &msg, Some(id));
            debug!(peer = %endpoint, relayed = report.delivered(), "message received");
        }
        Mode::Relay => {
            info!(peer = %endpoint, "relaying message from {}: {}", endpoint, String::from_utf8_lossy(frame));
            let bytes = shared.config.framing.encode(frame);
            broadcast_bytes(&shared.registry, &bytes, Some(id));
        }
    }
}

fn disconnected(shared: &Shared, id: PeerId, endpoint: Endpoint, reason: &str) {
    // Only the call that actually flips the peer reports it; after a
    // shutdown the registry already closed everything.
    if !shared.registry.mark_dead(id) {
        return;
    }
    info!(peer = %endpoint, reason, "peer disconnected");
    match shared.mode {
        Mode::Mesh => shared.inbox.push(Event::PeerLeft { endpoint }),
        Mode::Relay => {
            shared.registry.prune_dead();
        }
    }
}
