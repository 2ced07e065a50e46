//! Inbound chunk buffer
//!
//! Every connection owns one `Buffer`. The background poller is the only
//! producer (`append`); foreground receive calls are the only consumers
//! (`extract` / `pop`). Both sides access it under the pool lock.
//!
//! # Framing
//!
//! - **Stream**: appends coalesce into the last chunk so the buffer mirrors
//!   the TCP byte stream. `extract` cuts the front chunk at the first NUL
//!   byte and consumes the delimiter.
//! - **Datagram**: every append is its own chunk and `pop` hands it back
//!   verbatim, one datagram per call.
//!
//! An empty append is the end-of-stream marker. It always gets its own chunk
//! so buffered data can never swallow it.

use std::collections::VecDeque;

use crate::constants::{FRAME_DELIMITER, NO_ERROR};
use crate::state::Framing;

/// Ordered queue of received byte chunks plus a sticky read error.
#[derive(Debug, Clone)]
pub struct Buffer {
    chunks: VecDeque<Vec<u8>>,
    framing: Framing,
    /// Most recent read failure observed by the poller (0 = none)
    error: i32,
}

impl Buffer {
    /// Create an empty buffer for the given framing mode.
    pub fn new(framing: Framing) -> Self {
        Self {
            chunks: VecDeque::new(),
            framing,
            error: NO_ERROR,
        }
    }

    #[inline]
    pub fn framing(&self) -> Framing {
        self.framing
    }

    /// Queue received bytes.
    pub fn append(&mut self, data: &[u8]) {
        if data.is_empty() {
            self.chunks.push_back(Vec::new());
            return;
        }

        match (self.framing, self.chunks.back_mut()) {
            (Framing::Stream, Some(last)) if !last.is_empty() => last.extend_from_slice(data),
            _ => self.chunks.push_back(data.to_vec()),
        }
    }

    /// Take the next NUL-delimited message from the front chunk.
    ///
    /// Returns the bytes before the first NUL and consumes the NUL itself.
    /// Without a NUL the whole front chunk is returned. The front chunk is
    /// dropped once nothing is left of it. Returns `None` when empty.
    pub fn extract(&mut self) -> Option<Vec<u8>> {
        let front = self.chunks.front_mut()?;

        match front.iter().position(|&b| b == FRAME_DELIMITER) {
            None => self.chunks.pop_front(),
            Some(pos) => {
                let message = front[..pos].to_vec();
                front.drain(..=pos);
                if front.is_empty() {
                    self.chunks.pop_front();
                }
                Some(message)
            }
        }
    }

    /// Remove and return the whole front chunk. Returns `None` when empty.
    #[inline]
    pub fn pop(&mut self) -> Option<Vec<u8>> {
        self.chunks.pop_front()
    }

    /// Take the next unit according to the buffer's framing mode.
    pub fn next_message(&mut self) -> Option<Vec<u8>> {
        match self.framing {
            Framing::Stream => self.extract(),
            Framing::Datagram => self.pop(),
        }
    }

    /// Whether the front chunk is the end-of-stream marker.
    ///
    /// Only meaningful in stream mode; a datagram buffer may legitimately
    /// hold zero-length datagrams.
    #[inline]
    pub fn front_is_eof(&self) -> bool {
        self.framing == Framing::Stream && self.chunks.front().is_some_and(|c| c.is_empty())
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Number of queued chunks.
    #[inline]
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Total number of buffered bytes across all chunks.
    pub fn buffered_bytes(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Sticky read error (0 = none).
    #[inline]
    pub fn error(&self) -> i32 {
        self.error
    }

    /// Record a read failure. Set by the poller only.
    #[inline]
    pub fn set_error(&mut self, code: i32) {
        self.error = code;
    }

    /// Take the sticky error, resetting it to 0.
    #[inline]
    pub fn take_error(&mut self) -> i32 {
        std::mem::replace(&mut self.error, NO_ERROR)
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new(Framing::Stream)
    }
}
