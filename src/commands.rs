//! Line commands typed by the local user.
use crate::error::CommandError;
use crate::node::Node;
use crate::types::format_time;

pub const HELP: &str = "\
Available commands:
  /connect <address> <port> - Connect to a peer
  /peers                    - List connected peers
  /help                     - Show this help message
  /quit or /exit            - Exit the application
  <message>                 - Send a message to all peers";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Connect { address: String, port: u16 },
    Peers,
    Help,
    Quit,
    Say(String),
    Empty,
}

pub fn parse(line: &str) -> Result<Command, CommandError> {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return Ok(Command::Empty);
    }
    if !line.starts_with('/') {
        return Ok(Command::Say(line.to_string()));
    }
    let mut parts = line.split_whitespace();
    let cmd = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();
    match cmd {
        "/quit" | "/exit" => Ok(Command::Quit),
        "/peers" => Ok(Command::Peers),
        "/help" => Ok(Command::Help),
        "/connect" => match args.as_slice() {
            [address, port] => {
                let port = port.parse::<u16>().map_err(|_| CommandError::InvalidPort(port.to_string()))?;
                Ok(Command::Connect { address: address.to_string(), port })
            }
            _ => Err(CommandError::Usage("/connect <address> <port>")),
        },
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

/// What a front end should do after running a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Lines(Vec<String>),
    Quit,
}

impl Reply {
    fn line(text: impl Into<String>) -> Self {
        Reply::Lines(vec![text.into()])
    }
}

/// Run one typed line against `node`. Errors become reply lines; nothing is
/// fatal from here.
pub fn execute(node: &Node, line: &str) -> Reply {
    let command = match parse(line) {
        Ok(command) => command,
        Err(e) => return Reply::line(e.to_string()),
    };
    match command {
        Command::Empty => Reply::Lines(Vec::new()),
        Command::Quit => Reply::Quit,
        Command::Help => Reply::Lines(HELP.lines().map(str::to_string).collect()),
        Command::Peers => {
            let peers = node.peers();
            if peers.is_empty() {
                return Reply::line("No connected peers");
            }
            let mut lines = vec!["Connected peers:".to_string()];
            lines.extend(peers.iter().map(|p| {
                format!("  - {} ({}, since {})", p.endpoint, p.direction, format_time(&p.connected_at))
            }));
            Reply::Lines(lines)
        }
        Command::Connect { address, port } => match node.connect(&address, port) {
            // The dispatcher reports the new peer.
            Ok(_) => Reply::Lines(Vec::new()),
            Err(e) => Reply::line(format!("Failed to connect to {}:{} - {}", address, port, e)),
        },
        Command::Say(text) => {
            let (msg, _) = node.send_text(&text);
            Reply::line(format!("[{}] You: {}", format_time(&msg.timestamp()), msg.content()))
        }
    }
}
