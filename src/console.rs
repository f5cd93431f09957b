//! Plain line-based front end on stdin/stdout.
use std::io::{self, BufRead, Write};

use crate::commands::{execute, Reply};
use crate::error::StartupError;
use crate::node::Node;

/// Print dispatched events and run typed lines until `/quit` or end of input.
pub fn run(node: &mut Node) -> Result<(), StartupError> {
    node.spawn_dispatcher(|event| {
        let mut out = io::stdout().lock();
        let _ = write!(out, "\r{}\n> ", event.display_line());
        let _ = out.flush();
    })?;

    println!("\n=== P2P Chat ===");
    println!("Listening on: {}", node.local_addr());
    println!("Username: {}", node.config().username);
    println!("Type /help for available commands\n");
    prompt();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        match execute(node, &line) {
            Reply::Quit => break,
            Reply::Lines(lines) => {
                for l in lines {
                    println!("{}", l);
                }
            }
        }
        prompt();
    }
    Ok(())
}

fn prompt() {
    print!("> ");
    io::stdout().flush().ok();
}
