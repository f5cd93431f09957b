//! Outbound connections. One attempt per call, no retry.
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::sync::Arc;
use tracing::info;

use crate::error::ConnectError;
use crate::node::Shared;
use crate::reader::attach;
use crate::types::{Direction, PeerId};

/// Dial `address:port`, register the peer and start its reader. On any
/// failure nothing is registered.
pub(crate) fn connect(shared: &Arc<Shared>, address: &str, port: u16) -> Result<PeerId, ConnectError> {
    if !shared.is_running() {
        return Err(ConnectError::Stopped);
    }
    let ip: Ipv4Addr = address
        .trim()
        .parse()
        .map_err(|_| ConnectError::InvalidAddress(address.to_string()))?;
    let addr = SocketAddr::from((ip, port));

    let stream = match shared.config.connect_timeout() {
        Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
        None => TcpStream::connect(addr),
    }
    .map_err(|source| ConnectError::Io { addr, source })?;

    let id = attach(shared, stream, addr, Direction::Outbound)?;
    info!(peer = %addr, %id, "connected to peer");
    Ok(id)
}
