//! A running chat node: listener, peer registry, readers and dispatcher.
//!
//! The same machinery serves both modes. A mesh node shows what it receives
//! and re-broadcasts it to its other peers; a relay hub only forwards between
//! its clients.
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{info, warn};

use crate::broadcast::{broadcast_message, BroadcastReport};
use crate::config::NodeConfig;
use crate::connector;
use crate::error::{ConnectError, StartupError};
use crate::listener::{self, Listener};
use crate::queue::{run_dispatcher, MessageQueue};
use crate::registry::{PeerEntry, PeerRegistry};
use crate::types::{Event, Message, Mode, PeerId};

/// State shared by every thread of one node.
pub(crate) struct Shared {
    pub(crate) config: NodeConfig,
    pub(crate) mode: Mode,
    pub(crate) registry: PeerRegistry,
    pub(crate) inbox: MessageQueue<Event>,
    running: AtomicBool,
}

impl Shared {
    pub(crate) fn new(config: NodeConfig, mode: Mode) -> Self {
        let registry = PeerRegistry::new(config.max_peers);
        Self { config, mode, registry, inbox: MessageQueue::new(), running: AtomicBool::new(true) }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Clear the running flag and release the dispatcher. Returns whether
    /// this call did it.
    pub(crate) fn stop(&self) -> bool {
        let was_running = self.running.swap(false, Ordering::SeqCst);
        self.inbox.stop();
        was_running
    }
}

pub struct Node {
    shared: Arc<Shared>,
    local_addr: SocketAddr,
    accept_thread: Option<JoinHandle<()>>,
    dispatcher_thread: Option<JoinHandle<()>>,
}

impl Node {
    /// Bind the listening socket and start accepting peers.
    pub fn start(config: NodeConfig, mode: Mode) -> Result<Self, StartupError> {
        config.validate()?;
        let listener = Listener::bind(config.listen_addr())?;
        let local_addr = listener.local_addr();
        let shared = Arc::new(Shared::new(config, mode));
        let accept_thread = listener.spawn(Arc::clone(&shared))?;
        info!(addr = %local_addr, ?mode, "listening");
        Ok(Self { shared, local_addr, accept_thread: Some(accept_thread), dispatcher_thread: None })
    }

    /// Start the thread that hands queued events to `deliver`, in order.
    pub fn spawn_dispatcher<F>(&mut self, deliver: F) -> Result<(), StartupError>
    where
        F: FnMut(Event) + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name("dispatcher".to_string())
            .spawn(move || run_dispatcher(&shared.inbox, deliver))
            .map_err(|source| StartupError::Spawn { what: "dispatcher", source })?;
        self.dispatcher_thread = Some(handle);
        Ok(())
    }

    pub fn connect(&self, address: &str, port: u16) -> Result<PeerId, ConnectError> {
        connector::connect(&self.shared, address, port)
    }

    /// Broadcast a locally typed line to every live peer.
    pub fn send_text(&self, text: &str) -> (Message, BroadcastReport) {
        let msg = Message::new(text, self.shared.config.username.clone());
        let report = broadcast_message(&self.shared.registry, self.shared.config.framing, &msg, None);
        (msg, report)
    }

    /// Live peers in connection order.
    pub fn peers(&self) -> Vec<PeerEntry> {
        self.shared.registry.snapshot_live()
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.shared.registry
    }

    pub fn config(&self) -> &NodeConfig {
        &self.shared.config
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Block until the accept loop ends.
    pub fn wait(&mut self) {
        if let Some(handle) = self.accept_thread.take() {
            if handle.join().is_err() {
                warn!("accept thread panicked");
            }
        }
    }

    /// Stop accepting, close every peer and join the node's own threads.
    /// Pending events are not flushed. Safe to call more than once.
    pub fn shutdown(&mut self) {
        if self.shared.stop() {
            info!(addr = %self.local_addr, "shutting down");
            listener::wake(self.local_addr);
        }
        self.wait();
        let closed = self.shared.registry.close_all();
        if closed > 0 {
            info!(closed, "closed peer connections");
        }
        if let Some(handle) = self.dispatcher_thread.take() {
            if handle.join().is_err() {
                warn!("dispatcher thread panicked");
            }
        }
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.shutdown();
    }
}
