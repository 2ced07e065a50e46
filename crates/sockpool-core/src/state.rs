//! Connection lifecycle state and framing mode

use core::fmt;

/// How received bytes are cut into messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Framing {
    /// Byte stream, NUL-delimited messages (TCP)
    Stream,
    /// One message per datagram (UDP)
    Datagram,
}

impl Framing {
    #[inline]
    pub fn is_stream(self) -> bool {
        self == Framing::Stream
    }
}

/// Lifecycle state of a connection.
///
/// ```text
/// Unbound -> Bound -> Listening -> (accept produces Connected)
///    |         |
///    +---------+--> Connected -> ClosingGraceful -> Invalid
/// ```
///
/// Datagram connections never enter `Listening` or `ClosingGraceful`.
/// `Invalid` is terminal.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketState {
    /// Freshly created descriptor
    Unbound = 0,
    /// Bound to a local address
    Bound = 1,
    /// Accepting incoming connections
    Listening = 2,
    /// Connected (or connecting asynchronously), registered with the pool
    Connected = 3,
    /// Send side shut down, waiting for the peer to finish
    ClosingGraceful = 4,
    /// Descriptor released
    Invalid = 5,
}

impl SocketState {
    /// Whether a connection in this state takes part in readiness waiting.
    ///
    /// Listeners stay out of the poll set: their readiness means "accept
    /// pending", which `accept` picks up on its own.
    #[inline]
    pub fn is_pollable(self) -> bool {
        matches!(self, SocketState::Connected | SocketState::ClosingGraceful)
    }
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SocketState::Unbound => "unbound",
            SocketState::Bound => "bound",
            SocketState::Listening => "listening",
            SocketState::Connected => "connected",
            SocketState::ClosingGraceful => "closing",
            SocketState::Invalid => "invalid",
        };
        f.write_str(name)
    }
}
