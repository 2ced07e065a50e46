//! End-to-end tests over real loopback sockets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::*;

const DEADLINE: Duration = Duration::from_secs(5);

fn pool() -> Pool {
    Pool::new(
        PoolConfig::new()
            .poll_timeout(Duration::from_millis(50))
            .thread_name("e2e-poller"),
    )
    .unwrap()
}

fn loopback() -> SockAddr {
    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    SockAddr::from(addr)
}

/// Poll `f` until it yields or the deadline passes.
fn wait_for<T>(mut f: impl FnMut() -> Option<T>) -> Option<T> {
    let deadline = Instant::now() + DEADLINE;
    loop {
        if let Some(v) = f() {
            return Some(v);
        }
        if Instant::now() >= deadline {
            return None;
        }
        thread::sleep(Duration::from_millis(1));
    }
}

/// Next message, treating the retry signal as "keep waiting".
fn recv_next(sock: &Socket) -> Option<Vec<u8>> {
    wait_for(|| {
        let message = sock.recv();
        assert!(message.is_some() || sock.last_error() == 0, "recv failed: {}", sock.error_string());
        message
    })
}

fn listener(pool: &Pool, backlog: i32) -> Socket {
    let sock = pool.create_tcp();
    assert!(sock.bind(&loopback()), "{}", sock.error_string());
    assert!(sock.listen(backlog), "{}", sock.error_string());
    sock
}

/// Connected (client, server) pair.
fn tcp_pair(pool: &Pool) -> (Socket, Socket) {
    let listener = listener(pool, 8);
    let client = pool.create_tcp();
    assert!(client.connect(&listener.local().unwrap()), "{}", client.error_string());
    let server = wait_for(|| listener.accept()).expect("accept timed out");
    (client, server)
}

#[test]
fn test_stream_message_then_retry_signal() {
    let pool = pool();
    let (a, b) = tcp_pair(&pool);

    assert_eq!(a.state(), SocketState::Connected);
    assert_eq!(b.state(), SocketState::Connected);

    assert!(a.send(b"hello\0"));
    assert_eq!(recv_next(&b), Some(b"hello".to_vec()));

    // nothing more: no data, no error
    assert_eq!(b.recv(), None);
    assert_eq!(b.last_error(), 0);
    assert!(b.is_valid());

    assert!(a.send(b"again\0"));
    assert_eq!(recv_next(&b), Some(b"again".to_vec()));
    assert!(pool.stats().bytes_in >= 12);
}

#[test]
fn test_message_split_across_sends() {
    let pool = pool();
    let (a, b) = tcp_pair(&pool);

    assert!(a.send(b"hel"));
    assert!(wait_for(|| (b.buffered() == 3).then_some(())).is_some());
    assert!(a.send(b"lo\0wor"));
    assert!(wait_for(|| (b.buffered() == 9).then_some(())).is_some());

    assert_eq!(b.recv(), Some(b"hello".to_vec()));
    // unterminated tail comes back as-is
    assert_eq!(b.recv(), Some(b"wor".to_vec()));
    assert_eq!(b.recv(), None);
}

#[test]
fn test_recv_data_keeps_delimiters() {
    let pool = pool();
    let (a, b) = tcp_pair(&pool);

    assert!(a.send(b"a\0b\0"));
    assert!(wait_for(|| (b.buffered() == 4).then_some(())).is_some());
    assert_eq!(b.recv_data(), Some(b"a\0b\0".to_vec()));
    assert_eq!(b.recv_data(), None);
    assert_eq!(b.last_error(), 0);
}

#[test]
fn test_graceful_close_leaves_unread_data_drainable() {
    let pool = pool();
    let (a, b) = tcp_pair(&pool);

    assert!(a.send(b"one\0two\0"));
    a.close();
    assert!(wait_for(|| (!a.is_valid()).then_some(())).is_some());
    assert_eq!(a.state(), SocketState::Invalid);

    assert_eq!(recv_next(&b), Some(b"one".to_vec()));
    assert_eq!(recv_next(&b), Some(b"two".to_vec()));

    // orderly close signal: empty message and the socket goes invalid
    assert_eq!(recv_next(&b), Some(Vec::new()));
    assert!(!b.is_valid());
    assert_eq!(b.last_error(), 0);

    assert_eq!(b.recv(), None);
    assert_ne!(b.last_error(), 0);
}

#[test]
fn test_graceful_close_is_bounded() {
    let pool = Pool::new(PoolConfig::new().close_linger(Duration::from_millis(20))).unwrap();
    let (a, _b) = tcp_pair(&pool);

    let start = Instant::now();
    a.close();
    assert!(start.elapsed() < Duration::from_secs(1));
    assert!(!a.is_valid());
}

#[test]
fn test_partial_send_is_not_resumable() {
    use std::io::Read;

    let pool = pool();
    let peer = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let sock = pool.create_tcp();
    assert!(sock.connect(&SockAddr::from(peer.local_addr().unwrap())));
    // the peer does not read until the send gave up
    let (mut held, _) = peer.accept().unwrap();

    let payload = vec![b'x'; 32 << 20];
    assert!(!sock.send(&payload));
    assert_eq!(sock.last_error(), 0);
    assert!(sock.is_valid());
    assert_eq!(sock.state(), SocketState::Connected);

    // a prefix already went out even though the call reported failure
    let mut head = [0u8; 16];
    assert!(held.read(&mut head).unwrap() > 0);
    assert_eq!(head[0], b'x');
}

#[test]
fn test_async_connect_failure_surfaces_on_recv() {
    let pool = pool();
    let spare = pool.create_tcp();
    assert!(spare.bind(&loopback()));
    let target = SockAddr::from(spare.local().unwrap().to_socket_addr().unwrap());
    spare.close();

    let sock = pool.create_tcp();
    assert!(!sock.connect_async(&target));
    assert_eq!(sock.last_error(), 0);
    assert_eq!(sock.state(), SocketState::Connected);

    // the poller parks the refusal; the next recv reports it once
    let error = wait_for(|| match sock.recv() {
        Some(m) => panic!("unexpected message {:?}", m),
        None if sock.last_error() != 0 => Some(sock.last_error()),
        None => None,
    });
    assert_eq!(error, Some(libc::ECONNREFUSED));
    assert!(!sock.is_valid());
    assert_eq!(pool.active_count(), 0);
}

#[test]
fn test_peer_close_evicts_without_busy_loop() {
    let pool = pool();
    let (a, b) = tcp_pair(&pool);
    assert_eq!(pool.active_count(), 2);

    a.close();
    assert!(wait_for(|| (pool.active_count() == 0).then_some(())).is_some());

    // the eof marker is still waiting for b
    assert_eq!(recv_next(&b), Some(Vec::new()));
    assert!(!b.is_valid());
}

#[test]
fn test_accept_under_load() {
    let pool = pool();
    let listener = listener(&pool, 1);
    let target = listener.local().unwrap();

    let c1 = pool.create_tcp();
    let c2 = pool.create_tcp();
    for c in [&c1, &c2] {
        if !c.connect_async(&target) {
            assert_eq!(c.last_error(), 0, "{}", c.error_string());
        }
    }

    let s1 = wait_for(|| listener.accept()).expect("first accept");
    let s2 = wait_for(|| listener.accept()).expect("second accept");
    assert_ne!(s1.fd(), s2.fd());
    assert_eq!(s1.sock_type(), libc::SOCK_STREAM);
    assert_eq!(s1.domain(), libc::AF_INET);

    assert!(listener.accept().is_none());
    assert_eq!(listener.last_error(), 0);

    // both clients and both accepted sockets are polled; the listener is not
    assert_eq!(pool.active_count(), 4);
    assert_eq!(pool.connection_count(), 5);

    // accepted sockets resolve their peer lazily
    let peer = s1.remote().unwrap().to_socket_addr().unwrap();
    assert!(peer.ip().is_loopback());
}

#[test]
fn test_udp_datagrams() {
    let pool = pool();
    let a = pool.create_udp();
    let b = pool.create_udp();
    assert!(a.bind(&loopback()));
    assert!(b.bind(&loopback()));
    assert_eq!(b.framing(), Framing::Datagram);

    let a_addr = a.local().unwrap();
    let b_addr = b.local().unwrap();

    // unconnected: direct reads with the source address
    assert!(a.send_to(b"dgram-1", &b_addr));
    let (data, source) = wait_for(|| b.recv_from()).expect("recv_from");
    assert_eq!(data, b"dgram-1");
    assert_eq!(source.to_socket_addr(), a_addr.to_socket_addr());

    assert!(b.recv_from().is_none());
    assert_eq!(b.last_error(), 0);

    // connected: the poller buffers whole datagrams
    assert!(b.connect(&a_addr));
    assert!(a.send_to(b"x\0y", &b_addr));
    assert!(a.send_to(b"", &b_addr));
    assert!(a.send_to(b"z", &b_addr));

    assert_eq!(recv_next(&b), Some(b"x\0y".to_vec()));
    // a zero-length datagram is data, not a close
    assert_eq!(recv_next(&b), Some(Vec::new()));
    assert!(b.is_valid());
    assert_eq!(recv_next(&b), Some(b"z".to_vec()));
}

#[test]
fn test_concurrent_receivers_keep_order() {
    const PAIRS: usize = 4;
    const K: usize = 500;

    let pool = pool();
    let mut senders = Vec::new();
    let mut receivers = Vec::new();
    for _ in 0..PAIRS {
        let (a, b) = tcp_pair(&pool);
        senders.push(a);
        receivers.push(b);
    }

    let drains: Vec<_> = receivers
        .into_iter()
        .map(|sock| {
            thread::spawn(move || {
                let mut got = Vec::with_capacity(K);
                let deadline = Instant::now() + Duration::from_secs(20);
                while got.len() < K && Instant::now() < deadline {
                    match sock.recv() {
                        Some(m) => got.push(String::from_utf8(m).unwrap().parse::<usize>().unwrap()),
                        None => {
                            assert_eq!(sock.last_error(), 0, "{}", sock.error_string());
                            thread::yield_now();
                        }
                    }
                }
                got
            })
        })
        .collect();

    let sends: Vec<_> = senders
        .into_iter()
        .map(|sock| {
            thread::spawn(move || {
                for i in 1..=K {
                    let message = format!("{}\0", i);
                    while !sock.send(message.as_bytes()) {
                        assert_eq!(sock.last_error(), 0, "{}", sock.error_string());
                        thread::yield_now();
                    }
                }
                sock
            })
        })
        .collect();

    let senders: Vec<Socket> = sends.into_iter().map(|h| h.join().unwrap()).collect();
    for handle in drains {
        let got = handle.join().unwrap();
        assert_eq!(got, (1..=K).collect::<Vec<_>>());
    }
    drop(senders);
}

#[test]
fn test_force_close_idempotent() {
    let pool = pool();
    let (a, _b) = tcp_pair(&pool);
    let udp = pool.create_udp();
    assert!(udp.connect(&loopback_peer(&pool)));
    let active = pool.active_count();

    udp.close();
    assert!(!udp.is_valid());
    assert_eq!(udp.fd(), -1);
    assert_eq!(pool.active_count(), active - 1);

    udp.close();
    assert_eq!(udp.state(), SocketState::Invalid);
    assert_eq!(pool.active_count(), active - 1);

    drop(udp);
    assert!(a.is_valid());
}

fn loopback_peer(pool: &Pool) -> AddrRef {
    let peer = pool.create_udp();
    assert!(peer.bind(&loopback()));
    peer.local().unwrap()
}

#[test]
fn test_snapshot_restore_contract() {
    let pool = pool();
    let (a, _b) = tcp_pair(&pool);
    a.set_tag("client");
    let remote = a.remote().unwrap();

    let registry = AddrRegistry::new();
    let record = a.snapshot(&registry).encode();
    let snap = SocketSnapshot::decode(&record).unwrap();
    assert_eq!(snap.sock_type, libc::SOCK_STREAM);
    assert!(snap.remote.is_some());

    // a host that has not restored the address yet gets a loud failure
    let empty = AddrRegistry::new();
    assert!(matches!(
        pool.restore(&snap, &empty),
        Err(SockError::AddressNotRestored(_))
    ));

    let restored = pool.restore(&snap, &registry).unwrap();
    assert!(!restored.is_valid());
    assert_eq!(restored.tag(), "client");
    assert!(Arc::ptr_eq(&restored.remote().unwrap(), &remote));
}

#[test]
fn test_shutdown_keeps_sockets_usable() {
    let mut pool = pool();
    let (a, b) = tcp_pair(&pool);

    let start = Instant::now();
    assert!(pool.shutdown());
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(!pool.is_running());

    // writes still go out; nothing is buffered without the poller
    assert!(a.send(b"late\0"));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(b.recv(), None);
    assert_eq!(b.last_error(), 0);
}
