//! Sockpool Echo
//!
//! NUL-framed TCP echo server on top of a `Pool`. Every message received
//! (bytes up to a NUL) is sent back with its NUL. The client mode sends a
//! batch of messages and checks the echoes.
//!
//! Usage:
//!     cargo build --release -p sock-echo
//!     ./target/release/sock-echo [port]                 # server
//!     ./target/release/sock-echo client [port] [count]  # client
//!
//! Test with:
//!     printf 'hello\0world\0' | nc localhost 9998 | tr '\0' '\n'

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use sockpool::{log_error, log_info, log_println, log_warn, Pool, PoolConfig, SockAddr, Socket};

const DEFAULT_PORT: u16 = 9998;
const IDLE_SLEEP: Duration = Duration::from_micros(200);

static RUNNING: AtomicBool = AtomicBool::new(true);

extern "C" fn handle_sigint(_: libc::c_int) {
    RUNNING.store(false, Ordering::Relaxed);
}

// ── Stats ──
#[derive(Default)]
struct Stats {
    accepts: u64,
    messages: u64,
    closes: u64,
    retries: u64,
    errors: u64,
}

impl Stats {
    fn print(&self, conns: usize, pool: &Pool, elapsed_secs: f64) {
        let ps = pool.stats();
        log_println!(
            "[{:.1}s] conns={} accepts={} msgs={} close={} retry={} err={} | polls={} wakeups={} bytes_in={} evictions={}",
            elapsed_secs,
            conns,
            self.accepts, self.messages, self.closes, self.retries, self.errors,
            ps.iterations, ps.wakeups, ps.bytes_in, ps.evictions,
        );
    }
}

fn parse_port(arg: Option<&String>) -> u16 {
    arg.and_then(|s| s.parse().ok()).unwrap_or(DEFAULT_PORT)
}

fn framed(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + 1);
    out.extend_from_slice(message);
    out.push(0);
    out
}

/// Send, retrying while the socket reports would-block.
fn send_all(sock: &Socket, data: &[u8], stats: &mut Stats) -> bool {
    loop {
        if sock.send(data) {
            return true;
        }
        if sock.last_error() != 0 {
            return false;
        }
        stats.retries += 1;
        thread::sleep(IDLE_SLEEP);
    }
}

fn run_server(port: u16) -> i32 {
    let mut pool = match Pool::new(PoolConfig::from_env()) {
        Ok(pool) => pool,
        Err(e) => {
            log_error!("pool setup failed: {}", e);
            return 1;
        }
    };

    let listener = pool.create_tcp();
    listener.set_option(libc::SOL_SOCKET, libc::SO_REUSEADDR, 1);
    let bind_to = SockAddr::from(SocketAddr::from(([0, 0, 0, 0], port)));
    if !listener.bind(&bind_to) || !listener.listen_default() {
        log_error!("cannot listen on port {}: {}", port, listener.error_string());
        return 1;
    }
    pool.config().print();
    log_println!("sock-echo: listening on 0.0.0.0:{} (backlog {})", port, pool.config().listen_backlog);

    let mut conns: Vec<Socket> = Vec::new();
    let mut stats = Stats::default();
    let start = Instant::now();
    let mut last_stats = start;

    while RUNNING.load(Ordering::Relaxed) {
        let mut busy = false;

        while let Some(conn) = listener.accept() {
            stats.accepts += 1;
            log_info!("accepted {:?}", conn.remote().and_then(|a| a.to_socket_addr()));
            conns.push(conn);
            busy = true;
        }
        if listener.last_error() != 0 {
            log_warn!("accept failed: {}", listener.error_string());
            stats.errors += 1;
        }

        conns.retain(|conn| {
            while let Some(message) = conn.recv() {
                busy = true;
                if !conn.is_valid() {
                    // peer's orderly close
                    stats.closes += 1;
                    return false;
                }
                stats.messages += 1;
                if !send_all(conn, &framed(&message), &mut stats) {
                    stats.errors += 1;
                    conn.close();
                    return false;
                }
            }
            if conn.last_error() != 0 {
                log_warn!("dropping connection: {}", conn.error_string());
                stats.errors += 1;
                return false;
            }
            true
        });

        let now = Instant::now();
        if now.duration_since(last_stats).as_secs() >= 5 {
            stats.print(conns.len(), &pool, now.duration_since(start).as_secs_f64());
            last_stats = now;
        }

        if !busy {
            thread::sleep(IDLE_SLEEP);
        }
    }

    log_println!("\nsock-echo: shutting down...");
    stats.print(conns.len(), &pool, start.elapsed().as_secs_f64());
    for conn in &conns {
        conn.close();
    }
    drop(conns);
    listener.close();
    if !pool.shutdown() {
        log_error!("poller did not stop in time");
    }
    log_println!("sock-echo: done.");
    0
}

fn run_client(port: u16, count: usize) -> i32 {
    let pool = match Pool::new(PoolConfig::from_env()) {
        Ok(pool) => pool,
        Err(e) => {
            log_error!("pool setup failed: {}", e);
            return 1;
        }
    };

    let sock = pool.create_tcp();
    let target = SockAddr::from(SocketAddr::from(([127, 0, 0, 1], port)));
    if !sock.connect(&target) {
        log_error!("connect to port {} failed: {}", port, sock.error_string());
        return 1;
    }

    let mut stats = Stats::default();
    let start = Instant::now();
    for i in 0..count {
        if !send_all(&sock, &framed(format!("ping {}", i).as_bytes()), &mut stats) {
            log_error!("send failed: {}", sock.error_string());
            return 1;
        }
    }

    let deadline = Instant::now() + Duration::from_secs(10);
    let mut echoed = 0;
    while echoed < count && Instant::now() < deadline {
        match sock.recv() {
            Some(message) => {
                let expected = format!("ping {}", echoed);
                if message != expected.as_bytes() {
                    log_error!(
                        "out of order: got {:?}, want {:?}",
                        String::from_utf8_lossy(&message),
                        expected
                    );
                    return 1;
                }
                echoed += 1;
            }
            None if sock.last_error() == 0 => thread::sleep(IDLE_SLEEP),
            None => {
                log_error!("recv failed: {}", sock.error_string());
                return 1;
            }
        }
    }

    sock.close();
    log_println!(
        "sock-echo: {}/{} echoes in {:.3}s (retries {})",
        echoed,
        count,
        start.elapsed().as_secs_f64(),
        stats.retries
    );
    if echoed == count { 0 } else { 1 }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    // SIGINT handler for clean shutdown
    unsafe {
        libc::signal(libc::SIGINT, handle_sigint as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle_sigint as libc::sighandler_t);
    }

    let code = match args.get(1).map(String::as_str) {
        Some("client") => {
            let count = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(100);
            run_client(parse_port(args.get(2)), count)
        }
        _ => run_server(parse_port(args.get(1))),
    };
    std::process::exit(code);
}
