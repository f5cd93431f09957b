//! meshchat binary.
//!
//! Parses the command line, builds the node configuration and hands over to
//! a front end (`tui` or `console`) for a mesh node, or runs a relay hub in
//! the foreground.
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, IsTerminal, Write};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};

use meshchat::logging::{self, LogTarget};
use meshchat::{console, tui, Framing, Mode, Node, NodeConfig};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct Common {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,
    /// IPv4 address to listen on
    #[arg(long)]
    bind: Option<Ipv4Addr>,
    /// How messages are delimited on the wire
    #[arg(long, value_enum)]
    framing: Option<Framing>,
    /// Refuse peers beyond this many live connections
    #[arg(long)]
    max_peers: Option<usize>,
    /// Idle read timeout in milliseconds
    #[arg(long)]
    read_timeout_ms: Option<u64>,
    /// Write timeout in milliseconds
    #[arg(long)]
    write_timeout_ms: Option<u64>,
    /// Append logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a mesh node: listen for peers and chat interactively.
    Node {
        /// Display name
        name: Option<String>,
        /// Port to listen on
        port: Option<u16>,
        /// Peer to dial at startup, as address:port (repeatable)
        #[arg(long = "peer")]
        peers: Vec<String>,
        /// Connect timeout in milliseconds
        #[arg(long)]
        connect_timeout_ms: Option<u64>,
        /// Line-based console instead of the terminal UI
        #[arg(long)]
        plain: bool,
        #[command(flatten)]
        common: Common,
    },
    /// Run a relay hub that forwards every client's messages to the others.
    Relay {
        /// Port to listen on
        port: Option<u16>,
        #[command(flatten)]
        common: Common,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Commands::Node { name, port, peers, connect_timeout_ms, plain, common } => {
            let mut config = match build_config(&common, port) {
                Ok(c) => c,
                Err(code) => return code,
            };
            match name.filter(|n| !n.trim().is_empty()) {
                Some(name) => config.username = name,
                None if io::stdin().is_terminal() => {
                    match prompt_username(io::stdin().lock(), io::stdout(), &config.username) {
                        Ok(name) => config.username = name,
                        Err(e) => eprintln!("Error: cannot read username: {}", e),
                    }
                }
                None => {}
            }
            config.connect_timeout_ms = connect_timeout_ms.or(config.connect_timeout_ms);
            let target = if plain { LogTarget::Stderr } else { LogTarget::FileOnly };
            run_node(config, target, common.verbose, &peers, plain)
        }
        Commands::Relay { port, common } => {
            let config = match build_config(&common, port) {
                Ok(c) => c,
                Err(code) => return code,
            };
            run_relay(config, common.verbose)
        }
    }
}

/// Ask for a display name on the console. An empty answer keeps `default`.
fn prompt_username(mut input: impl BufRead, mut output: impl Write, default: &str) -> io::Result<String> {
    write!(output, "Enter your username [{}]: ", default)?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    let name = line.trim();
    Ok(if name.is_empty() { default.to_string() } else { name.to_string() })
}

fn build_config(common: &Common, port: Option<u16>) -> Result<NodeConfig, ExitCode> {
    let mut config = NodeConfig::load(common.config.as_deref()).map_err(|e| {
        eprintln!("Error: {}", e);
        ExitCode::from(2)
    })?;
    if let Some(port) = port {
        config.port = port;
    }
    if let Some(bind) = common.bind {
        config.bind = bind;
    }
    if let Some(framing) = common.framing {
        config.framing = framing;
    }
    config.max_peers = common.max_peers.or(config.max_peers);
    config.read_timeout_ms = common.read_timeout_ms.or(config.read_timeout_ms);
    config.write_timeout_ms = common.write_timeout_ms.or(config.write_timeout_ms);
    if common.log_file.is_some() {
        config.log.file = common.log_file.clone();
    }
    Ok(config)
}

fn run_node(config: NodeConfig, target: LogTarget, verbose: bool, peers: &[String], plain: bool) -> ExitCode {
    if let Err(e) = logging::init(&config.log, target, verbose) {
        eprintln!("Error: cannot open log file: {}", e);
        return ExitCode::from(2);
    }
    let mut node = match Node::start(config, Mode::Mesh) {
        Ok(node) => node,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    for peer in peers {
        let reply = match peer.rsplit_once(':') {
            Some((addr, port)) => meshchat::commands::execute(&node, &format!("/connect {} {}", addr, port)),
            None => meshchat::commands::Reply::Lines(vec![format!("Invalid peer {}, expected address:port", peer)]),
        };
        if let meshchat::commands::Reply::Lines(lines) = reply {
            for line in lines {
                eprintln!("{}", line);
            }
        }
    }

    let result = if plain {
        console::run(&mut node).map_err(|e| e.to_string())
    } else {
        tui::run(&mut node).map_err(|e| e.to_string())
    };
    node.shutdown();
    match result {
        Ok(()) => {
            println!("\nGoodbye!");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_relay(config: NodeConfig, verbose: bool) -> ExitCode {
    if let Err(e) = logging::init(&config.log, LogTarget::Stderr, verbose) {
        eprintln!("Error: cannot open log file: {}", e);
        return ExitCode::from(2);
    }
    let mut node = match Node::start(config, Mode::Relay) {
        Ok(node) => node,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    println!("Relay hub listening on {}", node.local_addr());
    println!("Clients can connect to this hub and chat through it. Press Ctrl+C to stop.");
    info!("relay hub running");
    node.wait();
    ExitCode::SUCCESS
}
