//! Shared types used across the project to keep signatures concise.
use chrono::{DateTime, Local};
use std::fmt;
use std::net::SocketAddr;

/// Remote endpoint of a peer connection (address and port).
pub type Endpoint = SocketAddr;

/// Stable identifier of a peer record inside the registry.
///
/// Ids are handed out in increasing order and never reused, so a reader
/// thread can keep using its id after other peers come and go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PeerId(pub u64);

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which side opened the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => f.write_str("inbound"),
            Direction::Outbound => f.write_str("outbound"),
        }
    }
}

/// Whether a node displays and re-broadcasts messages itself (mesh) or only
/// forwards them between its clients (relay hub).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Mesh,
    Relay,
}

/// One logical chat line. Immutable once built.
///
/// `payload` holds the bytes exactly as they arrived and is what gets
/// relayed; `content` is its lossy UTF-8 decoding, for display only.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    payload: Vec<u8>,
    content: String,
    sender: String,
    timestamp: DateTime<Local>,
}

impl Message {
    /// Build a message stamped with the current local time.
    pub fn new(content: impl Into<String>, sender: impl Into<String>) -> Self {
        Self::at(content, sender, Local::now())
    }

    pub fn at(content: impl Into<String>, sender: impl Into<String>, timestamp: DateTime<Local>) -> Self {
        let content = content.into();
        Self { payload: content.clone().into_bytes(), content, sender: sender.into(), timestamp }
    }

    /// Message received from a remote peer. The bytes are kept untouched;
    /// only the display text replaces sequences that are not UTF-8, such as a
    /// character split across two reads.
    pub fn from_peer(bytes: &[u8], endpoint: Endpoint) -> Self {
        Self {
            payload: bytes.to_vec(),
            content: String::from_utf8_lossy(bytes).into_owned(),
            sender: endpoint.to_string(),
            timestamp: Local::now(),
        }
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    /// Display form: `[HH:MM:SS] sender: content`.
    pub fn formatted(&self) -> String {
        format!("[{}] {}: {}", format_time(&self.timestamp), self.sender, self.content)
    }

    /// Wire form: the `[HH:MM:SS] sender: ` prefix followed by the payload
    /// bytes as received.
    pub fn wire_bytes(&self) -> Vec<u8> {
        let mut bytes = format!("[{}] {}: ", format_time(&self.timestamp), self.sender).into_bytes();
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}

/// Items delivered to the local consumer of a mesh node, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Chat(Message),
    PeerJoined { endpoint: Endpoint, direction: Direction },
    PeerLeft { endpoint: Endpoint },
}

impl Event {
    /// Single display line for console-style front ends.
    pub fn display_line(&self) -> String {
        match self {
            Event::Chat(msg) => msg.formatted(),
            Event::PeerJoined { endpoint, direction: Direction::Inbound } => {
                format!("[SYSTEM] New peer connected: {}", endpoint)
            }
            Event::PeerJoined { endpoint, direction: Direction::Outbound } => {
                format!("[SYSTEM] Connected to peer {}", endpoint)
            }
            Event::PeerLeft { endpoint } => format!("[SYSTEM] Peer {} disconnected", endpoint),
        }
    }
}

pub fn format_time(ts: &DateTime<Local>) -> String {
    ts.format("%H:%M:%S").to_string()
}
