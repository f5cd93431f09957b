//! Accept loop for inbound peers.
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::error::StartupError;
use crate::node::Shared;
use crate::reader::attach;
use crate::types::Direction;

pub struct Listener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind the listening socket. Failure here is fatal for the node.
    pub fn bind(addr: SocketAddr) -> Result<Self, StartupError> {
        let bind_err = |source: std::io::Error| StartupError::Bind { addr, source };
        let listener = TcpListener::bind(addr).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;
        Ok(Self { listener, local_addr })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run the accept loop on its own thread.
    pub(crate) fn spawn(self, shared: Arc<Shared>) -> Result<JoinHandle<()>, StartupError> {
        thread::Builder::new()
            .name("accept".to_string())
            .spawn(move || accept_loop(self.listener, &shared))
            .map_err(|source| StartupError::Spawn { what: "accept", source })
    }
}

fn accept_loop(listener: TcpListener, shared: &Arc<Shared>) {
    for stream in listener.incoming() {
        if !shared.is_running() {
            break;
        }
        match stream {
            Ok(stream) => admit(shared, stream),
            // One bad accept must not take the node down.
            Err(e) => warn!(error = %e, "failed to accept connection"),
        }
    }
    debug!("accept loop stopped");
}

fn admit(shared: &Arc<Shared>, stream: TcpStream) {
    let endpoint = match stream.peer_addr() {
        Ok(addr) => addr,
        Err(e) => {
            warn!(error = %e, "dropping connection without a peer address");
            return;
        }
    };
    match attach(shared, stream, endpoint, Direction::Inbound) {
        Ok(id) => info!(peer = %endpoint, %id, "new peer connected"),
        Err(e) => warn!(peer = %endpoint, error = %e, "refused connection"),
    }
}

/// Unblock an accept loop waiting on `addr` so it can observe the stop flag.
pub(crate) fn wake(addr: SocketAddr) {
    let mut target = addr;
    if target.ip().is_unspecified() {
        target.set_ip([127, 0, 0, 1].into());
    }
    if let Err(e) = TcpStream::connect_timeout(&target, std::time::Duration::from_secs(1)) {
        debug!(error = %e, "accept loop wake-up connection failed");
    }
}
