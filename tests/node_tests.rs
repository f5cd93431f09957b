use meshchat::{ConnectError, Event, Framing, Message, Mode, Node, NodeConfig};
use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver};
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

fn test_config(name: &str) -> NodeConfig {
    NodeConfig { port: 0, bind: Ipv4Addr::LOCALHOST, username: name.to_string(), ..NodeConfig::default() }
}

fn start_with_events(config: NodeConfig) -> (Node, Receiver<Event>) {
    let mut node = Node::start(config, Mode::Mesh).unwrap();
    let (tx, rx) = mpsc::channel();
    node.spawn_dispatcher(move |event| {
        let _ = tx.send(event);
    })
    .unwrap();
    (node, rx)
}

fn wait_until(what: &str, cond: impl Fn() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(10));
    }
}

fn next_chat(rx: &Receiver<Event>) -> Message {
    let deadline = Instant::now() + WAIT;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(left).expect("no chat message dispatched") {
            Event::Chat(msg) => return msg,
            _ => continue,
        }
    }
}

fn connect(node: &Node) -> TcpStream {
    TcpStream::connect((Ipv4Addr::LOCALHOST, node.local_addr().port())).unwrap()
}

/// Read until `needle` shows up in the received text.
fn read_until_contains(stream: &mut TcpStream, needle: &str) -> String {
    stream.set_read_timeout(Some(WAIT)).unwrap();
    let mut got = Vec::new();
    let mut buf = [0u8; 1024];
    while !String::from_utf8_lossy(&got).contains(needle) {
        let n = stream.read(&mut buf).unwrap();
        assert!(n > 0, "connection closed before {:?} arrived", needle);
        got.extend_from_slice(&buf[..n]);
    }
    String::from_utf8_lossy(&got).into_owned()
}

/// Join the payloads of relayed raw frames, dropping each
/// `[HH:MM:SS] sender: ` prefix, once `len` payload bytes have arrived.
fn read_relayed_payload(stream: &mut TcpStream, sender: &str, len: usize) -> Vec<u8> {
    stream.set_read_timeout(Some(WAIT)).unwrap();
    let marker = format!("] {}: ", sender).into_bytes();
    let mut got = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let payload = strip_prefixes(&got, &marker);
        if payload.len() >= len {
            return payload;
        }
        let n = stream.read(&mut buf).unwrap();
        assert!(n > 0, "connection closed after {} payload bytes", payload.len());
        got.extend_from_slice(&buf[..n]);
    }
}

fn strip_prefixes(received: &[u8], marker: &[u8]) -> Vec<u8> {
    // Length of the "[HH:MM:SS" stamp in front of each marker.
    const STAMP: usize = 9;
    let starts: Vec<usize> = received
        .windows(marker.len())
        .enumerate()
        .filter(|(_, w)| *w == marker)
        .map(|(i, _)| i)
        .collect();
    let mut payload = Vec::new();
    for (k, &at) in starts.iter().enumerate() {
        let end = starts.get(k + 1).map_or(received.len(), |&next| next - STAMP);
        payload.extend_from_slice(&received[at + marker.len()..end]);
    }
    payload
}

fn next_departure(rx: &Receiver<Event>) -> SocketAddr {
    let deadline = Instant::now() + WAIT;
    loop {
        let left = deadline.saturating_duration_since(Instant::now());
        if let Event::PeerLeft { endpoint } = rx.recv_timeout(left).expect("no departure dispatched") {
            return endpoint;
        }
    }
}

fn assert_silent(stream: &mut TcpStream) {
    stream.set_read_timeout(Some(Duration::from_millis(300))).unwrap();
    let mut buf = [0u8; 64];
    match stream.read(&mut buf) {
        Err(e) => assert!(matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut), "{}", e),
        Ok(n) => panic!("expected nothing, got {:?}", String::from_utf8_lossy(&buf[..n])),
    }
}

#[test]
fn test_mesh_node_displays_and_relays_excluding_sender() {
    let (node, rx) = start_with_events(test_config("alice"));
    let mut b = connect(&node);
    let mut c = connect(&node);
    wait_until("two peers", || node.registry().live_count() == 2);

    b.write_all(b"hello").unwrap();
    let msg = next_chat(&rx);
    assert_eq!(msg.content(), "hello");
    assert_eq!(msg.sender(), b.local_addr().unwrap().to_string());

    let relayed = read_until_contains(&mut c, "hello");
    assert_eq!(relayed, msg.formatted());
    assert_silent(&mut b);
}

#[test]
fn test_mesh_relay_keeps_multibyte_text_split_across_reads() {
    let (node, _rx) = start_with_events(test_config("alice"));
    let mut b = connect(&node);
    let mut c = connect(&node);
    wait_until("two peers", || node.registry().live_count() == 2);

    // 1200 bytes against a 1023-byte read chunk: one 'é' straddles two reads.
    let sent = "é".repeat(600);
    b.write_all(sent.as_bytes()).unwrap();
    let sender = b.local_addr().unwrap().to_string();
    let relayed = read_relayed_payload(&mut c, &sender, sent.len());
    assert_eq!(relayed, sent.as_bytes());
    let text = String::from_utf8(relayed).unwrap();
    assert_eq!(text.chars().filter(|&ch| ch == 'é').count(), 600);
    assert!(!text.contains('\u{fffd}'));
}

#[test]
fn test_relay_hub_forwards_verbatim_to_others_only() {
    let hub = Node::start(test_config("hub"), Mode::Relay).unwrap();
    let mut x = connect(&hub);
    let mut y = connect(&hub);
    wait_until("two clients", || hub.registry().live_count() == 2);

    x.write_all(b"hi").unwrap();
    y.set_read_timeout(Some(WAIT)).unwrap();
    let mut buf = [0u8; 16];
    let n = y.read(&mut buf).unwrap();
    assert_eq!(&buf[..n], b"hi");
    assert_silent(&mut x);
}

#[test]
fn test_relay_hub_prunes_departed_clients() {
    let hub = Node::start(test_config("hub"), Mode::Relay).unwrap();
    let x = connect(&hub);
    let _y = connect(&hub);
    wait_until("two clients", || hub.registry().live_count() == 2);
    drop(x);
    wait_until("client pruned", || hub.registry().len() == 1);
}

#[test]
fn test_connect_to_closed_port_fails_without_registering() {
    let (node, _rx) = start_with_events(test_config("alice"));
    let port = {
        let spare = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        spare.local_addr().unwrap().port()
    };
    let err = node.connect("127.0.0.1", port).unwrap_err();
    assert!(matches!(err, ConnectError::Io { .. }), "{}", err);
    assert!(node.registry().is_empty());

    let err = node.connect("not-an-address", 9001).unwrap_err();
    assert!(matches!(err, ConnectError::InvalidAddress(_)));
    assert!(node.registry().is_empty());
}

#[test]
fn test_two_mesh_nodes_chat() {
    let (a, a_rx) = start_with_events(test_config("alice"));
    let (b, b_rx) = start_with_events(test_config("bob"));
    let id = b.connect("127.0.0.1", a.local_addr().port()).unwrap();
    assert!(b.registry().is_live(id));
    wait_until("a sees b", || a.registry().live_count() == 1);

    let (sent, report) = b.send_text("hello");
    assert_eq!(report.attempted, 1);
    // Legacy behavior: the receiver shows the sender's formatted line as content.
    assert_eq!(next_chat(&a_rx).content(), sent.formatted());

    a.send_text("hi bob");
    assert!(next_chat(&b_rx).content().ends_with("alice: hi bob"));
}

#[test]
fn test_disconnect_is_reported_once_and_peer_skipped() {
    let (node, rx) = start_with_events(test_config("alice"));
    let b = connect(&node);
    let mut c = connect(&node);
    wait_until("two peers", || node.registry().live_count() == 2);
    let b_addr = b.local_addr().unwrap();
    drop(b);

    assert_eq!(next_departure(&rx), b_addr);
    assert_eq!(node.registry().live_count(), 1);
    // Retained for diagnostics in mesh mode.
    assert_eq!(node.registry().len(), 2);

    let (_, report) = node.send_text("still here?");
    assert_eq!(report.attempted, 1);
    read_until_contains(&mut c, "still here?");

    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err(), "no second departure");
}

#[test]
fn test_lines_framing_splits_coalesced_writes() {
    let config = NodeConfig { framing: Framing::Lines, ..test_config("alice") };
    let (node, rx) = start_with_events(config);
    let mut b = connect(&node);
    let mut c = connect(&node);
    wait_until("two peers", || node.registry().live_count() == 2);

    b.write_all(b"one\ntwo\n").unwrap();
    assert_eq!(next_chat(&rx).content(), "one");
    assert_eq!(next_chat(&rx).content(), "two");
    let relayed = read_until_contains(&mut c, "two\n");
    assert_eq!(relayed.lines().count(), 2);
}

#[test]
fn test_peer_cap_refuses_extra_connections() {
    let config = NodeConfig { max_peers: Some(1), ..test_config("alice") };
    let (node, _rx) = start_with_events(config);
    let _first = connect(&node);
    wait_until("first peer", || node.registry().live_count() == 1);

    let mut second = connect(&node);
    second.set_read_timeout(Some(WAIT)).unwrap();
    let mut buf = [0u8; 8];
    match second.read(&mut buf) {
        Ok(n) => assert_eq!(n, 0),
        Err(e) => assert_eq!(e.kind(), ErrorKind::ConnectionReset),
    }
    assert_eq!(node.registry().len(), 1);
}

#[test]
fn test_shutdown_closes_peers_and_stops_accepting() {
    let (mut node, _rx) = start_with_events(test_config("alice"));
    let mut b = connect(&node);
    wait_until("peer", || node.registry().live_count() == 1);

    node.shutdown();
    assert!(!node.is_running());
    assert_eq!(node.registry().live_count(), 0);

    b.set_read_timeout(Some(WAIT)).unwrap();
    let mut buf = [0u8; 8];
    match b.read(&mut buf) {
        Ok(n) => assert_eq!(n, 0),
        Err(e) => assert_eq!(e.kind(), ErrorKind::ConnectionReset),
    }
    assert!(matches!(node.connect("127.0.0.1", 1), Err(ConnectError::Stopped)));
    // A second call is harmless.
    node.shutdown();
}

#[test]
fn test_bind_conflict_is_a_startup_error() {
    let taken = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    let config = NodeConfig { port: taken.local_addr().unwrap().port(), ..test_config("alice") };
    let err = Node::start(config, Mode::Mesh).err().expect("bind must fail");
    assert!(err.to_string().contains("failed to bind"), "{}", err);
}

#[test]
fn test_command_executor_reports_without_changing_state() {
    use meshchat::commands::{execute, Reply};

    let (node, _rx) = start_with_events(test_config("alice"));
    assert_eq!(execute(&node, "/peers"), Reply::Lines(vec!["No connected peers".to_string()]));
    assert_eq!(execute(&node, "/quit"), Reply::Quit);

    let Reply::Lines(lines) = execute(&node, "/connect 127.0.0.1") else { panic!("expected lines") };
    assert_eq!(lines, vec!["Usage: /connect <address> <port>".to_string()]);
    let Reply::Lines(lines) = execute(&node, "/connect nowhere 9001") else { panic!("expected lines") };
    assert!(lines[0].starts_with("Failed to connect to nowhere:9001"));
    assert!(node.registry().is_empty());

    let _b = connect(&node);
    wait_until("peer", || node.registry().live_count() == 1);
    let Reply::Lines(lines) = execute(&node, "/peers") else { panic!("expected lines") };
    assert_eq!(lines.len(), 2);
    assert!(lines[1].contains("inbound"));
}

#[test]
fn test_idle_peer_times_out_and_leaves_once() {
    let config = NodeConfig { read_timeout_ms: Some(200), ..test_config("alice") };
    let (node, rx) = start_with_events(config);
    let started = Instant::now();
    let mut idle = connect(&node);
    let idle_addr = idle.local_addr().unwrap();

    assert_eq!(next_departure(&rx), idle_addr);
    assert!(started.elapsed() >= Duration::from_millis(200));
    assert_eq!(node.registry().live_count(), 0);
    assert!(rx.recv_timeout(Duration::from_millis(500)).is_err(), "no second departure");

    idle.set_read_timeout(Some(WAIT)).unwrap();
    let mut buf = [0u8; 8];
    match idle.read(&mut buf) {
        Ok(n) => assert_eq!(n, 0),
        Err(e) => assert_eq!(e.kind(), ErrorKind::ConnectionReset),
    }
}

#[test]
fn test_connect_timeout_bounds_an_unanswered_dial() {
    let config = NodeConfig { connect_timeout_ms: Some(300), ..test_config("alice") };
    let (node, _rx) = start_with_events(config);
    let started = Instant::now();
    // TEST-NET-1 is never routed: the dial hangs until the timeout, or the
    // local stack rejects it at once.
    let err = node.connect("192.0.2.1", 9).unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(3), "dial took {:?}", started.elapsed());
    assert!(matches!(err, ConnectError::Io { .. }), "{}", err);
    assert!(node.registry().is_empty());
}

#[test]
fn test_write_timeout_bounds_a_stalled_peer() {
    let config = NodeConfig { write_timeout_ms: Some(200), ..test_config("alice") };
    let (node, _rx) = start_with_events(config);
    // Never reads, so its receive buffer and our send buffer fill up.
    let _stalled = connect(&node);
    wait_until("peer", || node.registry().live_count() == 1);

    let text = "x".repeat(64 * 1024);
    let mut refused = false;
    for _ in 0..1024 {
        let started = Instant::now();
        let (_, report) = node.send_text(&text);
        assert!(started.elapsed() < Duration::from_secs(2), "broadcast held for {:?}", started.elapsed());
        if report.failed == 1 {
            refused = true;
            break;
        }
    }
    assert!(refused, "send buffers never filled");
}
