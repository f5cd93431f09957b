//! meshchat - minimal peer-to-peer text chat over TCP.
//!
//! Every node listens for peers and can dial others; each line a peer sends
//! is shown locally and flooded to the node's other peers. A relay hub runs
//! the same engine headless and only forwards between its clients.
//!
//! Threads: one accept loop, one reader per peer, one dispatcher feeding the
//! local front end. The peer registry is the only shared mutable structure
//! besides the inbound queue.

pub mod broadcast;
pub mod commands;
pub mod config;
mod connector;
pub mod console;
pub mod error;
mod listener;
pub mod logging;
pub mod net;
pub mod node;
pub mod queue;
mod reader;
pub mod registry;
pub mod tui;
pub mod types;

pub use config::NodeConfig;
pub use error::{CommandError, ConfigError, ConnectError, RegistryError, StartupError};
pub use net::Framing;
pub use node::Node;
pub use registry::{PeerEntry, PeerRegistry};
pub use types::{Direction, Endpoint, Event, Message, Mode, PeerId};
