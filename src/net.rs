//! Transport adapter: how bytes are framed on the wire and how a peer's
//! socket is written to and closed.
use serde::Deserialize;
use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Upper bound on a buffered line before it is emitted without a newline.
pub const MAX_LINE: usize = 64 * 1024;

/// How logical messages are delimited in the byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// Legacy behavior: one read is one message, writes carry no terminator.
    /// Messages may be split or coalesced by TCP.
    #[default]
    Raw,
    /// Newline-terminated messages.
    Lines,
}

impl Framing {
    /// Encode one outgoing payload.
    pub fn encode(&self, payload: &[u8]) -> Vec<u8> {
        match self {
            Framing::Raw => payload.to_vec(),
            Framing::Lines => {
                let mut out = Vec::with_capacity(payload.len() + 1);
                out.extend_from_slice(payload);
                out.push(b'\n');
                out
            }
        }
    }
}

/// Pulls logical frames out of a byte source.
pub struct FrameReader<R> {
    inner: R,
    framing: Framing,
    scratch: Vec<u8>,
    pending: Vec<u8>,
    eof: bool,
}

impl<R: Read> FrameReader<R> {
    pub fn new(inner: R, framing: Framing, chunk: usize) -> Self {
        Self { inner, framing, scratch: vec![0u8; chunk.max(1)], pending: Vec::new(), eof: false }
    }

    /// Next frame, `Ok(None)` at end of stream.
    pub fn next_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        match self.framing {
            Framing::Raw => {
                let n = self.fill()?;
                if n == 0 {
                    return Ok(None);
                }
                Ok(Some(self.scratch[..n].to_vec()))
            }
            Framing::Lines => loop {
                if let Some(line) = self.take_line() {
                    if line.is_empty() {
                        continue;
                    }
                    return Ok(Some(line));
                }
                if self.eof {
                    if self.pending.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(std::mem::take(&mut self.pending)));
                }
                if self.pending.len() >= MAX_LINE {
                    return Ok(Some(std::mem::take(&mut self.pending)));
                }
                let n = self.fill()?;
                if n == 0 {
                    self.eof = true;
                } else {
                    self.pending.extend_from_slice(&self.scratch[..n]);
                }
            },
        }
    }

    fn take_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.pending.iter().position(|b| *b == b'\n')?;
        let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
        line.pop();
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        Some(line)
    }

    fn fill(&mut self) -> io::Result<usize> {
        loop {
            match self.inner.read(&mut self.scratch) {
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                other => return other,
            }
        }
    }
}

/// Write side of a peer connection as seen by the registry and broadcaster.
pub trait Transport: Send + Sync {
    fn send(&self, bytes: &[u8]) -> io::Result<()>;

    /// Release the connection. Later sends must fail.
    fn close(&self);
}

/// TCP implementation. Writes are serialized so concurrent broadcasts never
/// interleave bytes of two payloads; closing does not wait for a writer.
pub struct TcpTransport {
    stream: TcpStream,
    write_lock: Mutex<()>,
    closed: AtomicBool,
}

impl TcpTransport {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream, write_lock: Mutex::new(()), closed: AtomicBool::new(false) }
    }
}

impl Transport for TcpTransport {
    fn send(&self, bytes: &[u8]) -> io::Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        if self.closed.load(Ordering::SeqCst) {
            return Err(io::Error::new(ErrorKind::NotConnected, "transport closed"));
        }
        let mut stream = &self.stream;
        stream.write_all(bytes)?;
        stream.flush()
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        // Shutting down both directions also wakes the peer's reader.
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}
