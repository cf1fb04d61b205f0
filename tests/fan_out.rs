use std::io::Read;
use std::net::{SocketAddr, TcpListener, TcpStream, UdpSocket};
use std::sync::{Arc, mpsc};
use std::thread;
use std::time::{Duration, Instant};

use multi_conn::{CollectingReporter, Connection, Diagnostic, MultiConnection, NetDialer, UdpConnection};

const TIMEOUT: Duration = Duration::from_secs(2);

fn listener() -> (TcpListener, String) {
    let l = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = l.local_addr().unwrap().to_string();
    (l, addr)
}

// A port that was just released, so dialing it is refused.
fn dead_address() -> String {
    let (l, addr) = listener();
    drop(l);
    addr
}

fn accept(l: &TcpListener) -> TcpStream {
    let (s, _) = l.accept().unwrap();
    s.set_read_timeout(Some(TIMEOUT)).unwrap();
    s
}

#[test]
fn dial_keeps_reachable_upstreams_in_order() {
    let (la, a) = listener();
    let b = dead_address();
    let (lc, c) = listener();
    let reporter = Arc::new(CollectingReporter::new());

    let conn = MultiConnection::dial_with(&NetDialer, reporter.clone(), "tcp", &[&a, &b, &c], TIMEOUT);

    assert_eq!(conn.len(), 2);
    assert_eq!(conn.remote_addr().unwrap(), a.parse::<SocketAddr>().unwrap());
    let _ = (accept(&la), accept(&lc));

    let report = reporter.snapshot();
    assert_eq!(report.len(), 2);
    assert!(matches!(&report[0], Diagnostic::DialFailed { address, .. } if *address == b));
    assert_eq!(report[1].to_string(), "only 2 of 3 upstreams connected");
}

#[test]
fn dial_with_nothing_reachable_returns_empty_adapter() {
    let reporter = Arc::new(CollectingReporter::new());
    let addresses = [dead_address(), "not-a-host-name.invalid:1".to_string()];

    let conn = MultiConnection::dial_with(&NetDialer, reporter.clone(), "tcp", &addresses, TIMEOUT);

    assert!(conn.is_empty());
    assert_eq!(reporter.snapshot().len(), 3);
    assert!(conn.local_addr().is_err());
}

#[test]
fn tcp_write_reaches_every_upstream() {
    let (la, a) = listener();
    let (lb, b) = listener();
    let reporter = Arc::new(CollectingReporter::new());
    let mut conn = MultiConnection::dial_with(&NetDialer, reporter.clone(), "tcp", &[a, b], TIMEOUT);
    let mut peers = [accept(&la), accept(&lb)];

    assert_eq!(conn.write(b"gorets:1|c\n").unwrap(), 22);
    conn.close().unwrap();

    for peer in peers.iter_mut() {
        let mut received = String::new();
        peer.read_to_string(&mut received).unwrap();
        assert_eq!(received, "gorets:1|c\n");
    }
    assert!(reporter.snapshot().is_empty());
}

#[test]
fn udp_write_reaches_every_upstream() {
    let peers: Vec<UdpSocket> = (0..3).map(|_| UdpSocket::bind("127.0.0.1:0").unwrap()).collect();
    let addresses: Vec<String> = peers.iter().map(|p| p.local_addr().unwrap().to_string()).collect();

    let mut conn = MultiConnection::dial_timeout("udp", &addresses, TIMEOUT);
    assert_eq!(conn.len(), 3);
    assert_eq!(conn.write(b"glork:320|ms").unwrap(), 36);

    for peer in &peers {
        peer.set_read_timeout(Some(TIMEOUT)).unwrap();
        let mut buf = [0u8; 64];
        let n = peer.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"glork:320|ms");
    }

    conn.close().unwrap();
    let err = conn.close().unwrap_err();
    assert_eq!(err.messages().len(), 3);
    assert!(err.to_string().starts_with("error closing upstreams: use of closed connection; "));
}

#[test]
fn udp_write_after_close_fails_everywhere() {
    let peers: Vec<UdpSocket> = (0..2).map(|_| UdpSocket::bind("127.0.0.1:0").unwrap()).collect();
    let addresses: Vec<String> = peers.iter().map(|p| p.local_addr().unwrap().to_string()).collect();
    let mut conn = MultiConnection::dial_timeout("udp4", &addresses, TIMEOUT);

    conn.close().unwrap();
    let err = conn.write(b"x").unwrap_err();
    assert_eq!(
        err.to_string(),
        "error writing to all upstreams: use of closed connection; use of closed connection"
    );
    assert!(conn.set_deadline(None).is_err());
}

#[test]
fn read_leaves_caller_buffer_untouched() {
    let (la, a) = listener();
    let (lb, b) = listener();
    let mut conn = MultiConnection::dial_timeout("tcp", &[a, b], TIMEOUT);
    let _peers = (accept(&la), accept(&lb));

    let mut buf = [7u8; 16];
    assert_eq!(conn.read(&mut buf).unwrap(), 0);
    assert_eq!(buf, [7u8; 16]);
}

#[test]
fn udp_read_returns_without_consuming_datagrams() {
    let peer = UdpSocket::bind("127.0.0.1:0").unwrap();
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.connect(peer.local_addr().unwrap()).unwrap();
    peer.connect(socket.local_addr().unwrap()).unwrap();
    let observer = socket.try_clone().unwrap();
    observer.set_read_timeout(Some(TIMEOUT)).unwrap();

    let upstreams: Vec<Box<dyn Connection>> = vec![Box::new(UdpConnection::new(socket))];
    let mut conn = MultiConnection::from_upstreams(upstreams, Arc::new(CollectingReporter::new()));
    peer.send(b"pending").unwrap();

    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut buf = [3u8; 8];
        let n = conn.read(&mut buf);
        let _ = tx.send((n, buf));
    });
    let (n, buf) = rx.recv_timeout(TIMEOUT).expect("read on a UDP upstream did not return");
    assert_eq!(n, Ok(0));
    assert_eq!(buf, [3u8; 8]);

    let mut data = [0u8; 16];
    let len = observer.recv(&mut data).unwrap();
    assert_eq!(&data[..len], b"pending");
}

#[test]
fn deadlines_apply_to_tcp_upstreams() {
    let (la, a) = listener();
    let (lb, b) = listener();
    let conn = MultiConnection::dial_timeout("tcp", &[a, b], TIMEOUT);
    let _peers = (accept(&la), accept(&lb));

    conn.set_deadline(Some(Instant::now() + TIMEOUT)).unwrap();
    conn.set_read_deadline(Some(Instant::now())).unwrap();
    conn.set_write_deadline(None).unwrap();
}

#[test]
fn adapter_nests_as_a_connection() {
    let (la, a) = listener();
    let (lb, b) = listener();
    let inner = MultiConnection::dial_timeout("tcp", &[a, b], TIMEOUT);
    let reporter = Arc::new(CollectingReporter::new());
    let mut outer = MultiConnection::from_upstreams(vec![Box::new(inner) as Box<dyn Connection>], reporter);
    let mut peers = [accept(&la), accept(&lb)];

    assert_eq!(Connection::write(&mut outer, b"abc").unwrap(), 6);
    Connection::close(&mut outer).unwrap();
    for peer in peers.iter_mut() {
        let mut received = Vec::new();
        peer.read_to_end(&mut received).unwrap();
        assert_eq!(received, b"abc");
    }
}
