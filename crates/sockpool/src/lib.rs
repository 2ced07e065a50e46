//! # sockpool - non-blocking socket pool
//!
//! Many short-lived socket handles doing concurrent network I/O without
//! ever blocking the calling thread. One background poller owns all
//! readiness waiting and fills each connection's inbound buffer; foreground
//! calls only drain buffers and write.
//!
//! ## Quick Start
//!
//! ```ignore
//! use sockpool::{Pool, PoolConfig, SockAddr};
//!
//! let pool = Pool::new(PoolConfig::from_env())?;
//! let sock = pool.create_tcp();
//! sock.connect(&SockAddr::from("127.0.0.1:9998".parse::<std::net::SocketAddr>()?));
//! sock.send(b"hello\0");
//!
//! loop {
//!     match sock.recv() {
//!         Some(message) => break println!("{:?}", message),
//!         None if sock.last_error() == 0 => continue, // nothing yet
//!         None => panic!("{}", sock.error_string()),
//!     }
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │            Foreground callers (any thread)               │
//! │     create / bind / connect / accept / send / recv       │
//! └──────────────────────────────────────────────────────────┘
//!                 │  pool lock          ▲ drain Buffer
//!                 ▼                     │
//! ┌──────────────────────────────────────────────────────────┐
//! │  Pool: active set + per-connection state + Buffers       │
//! └──────────────────────────────────────────────────────────┘
//!                 ▲ append                │ wake signal
//!                 │                       ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │  Poller thread: poll(2) → recv → append → evict          │
//! └──────────────────────────────────────────────────────────┘
//! ```

pub use sockpool_core::{
    buffer::Buffer,
    cancel::CancellationToken,
    collab::{ObjectKey, ObjectKeys},
    constants,
    error::{SockError, SockResult},
    log,
    state::{Framing, SocketState},
};
pub use sockpool_core::{
    log_debug, log_error, log_info, log_println, log_trace, log_warn,
};

pub use sockpool_runtime::{
    config, AddrRef, AddrRegistry, BackgroundTask, Pool, PoolConfig, PoolStats, RawAddr, SockAddr,
    Socket, SocketSnapshot, TaskContext, WakeSignal,
};

#[cfg(test)]
mod e2e;
