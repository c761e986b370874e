//! Message framing over a byte stream.
//!
//! TCP delivers bytes with no regard for message boundaries: one read may hold
//! half a header block, or the tail of one request followed by the whole of the
//! next. [`FrameBuffer`] accumulates whatever arrives and hands back complete
//! messages (header block plus exactly `Content-Length` body bytes) one at a time.
//!
//! # Examples
//!
//! ```
//! use termcp::http::FrameBuffer;
//!
//! let mut buffer = FrameBuffer::new();
//! buffer.add_bytes(b"POST / HTTP/1.1\r\nContent-Length: 2\r\n\r\n");
//! assert!(buffer.extract().is_none()); // body not here yet
//!
//! buffer.add_bytes(b"{}GET / HTTP/1.1\r\n\r\n");
//! let first = buffer.extract().unwrap();
//! assert!(first.ends_with(b"\r\n\r\n{}"));
//! let second = buffer.extract().unwrap();
//! assert_eq!(second, b"GET / HTTP/1.1\r\n\r\n");
//! assert!(buffer.is_empty());
//! ```

use super::{HEADER_TERMINATOR, find_header_end};

/// A per-connection buffer of bytes not yet consumed as messages.
///
/// After every successful [`extract`](FrameBuffer::extract) the buffer holds
/// exactly the unconsumed trailing bytes, starting at index zero.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    bytes: Vec<u8>,
}

impl FrameBuffer {
    /// Creates an empty buffer.
    pub fn new() -> FrameBuffer {
        FrameBuffer { bytes: Vec::new() }
    }

    /// Appends bytes received from the stream.
    pub fn add_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Removes and returns the next complete message, if the buffer holds one.
    ///
    /// Returns `None` when either the header block or the body is still
    /// incomplete; the caller should read more bytes and try again. Call this in
    /// a loop after each [`add_bytes`](FrameBuffer::add_bytes), since a single
    /// read can carry several messages.
    ///
    /// Empty lines in front of a request line are skipped, so a stray CRLF
    /// after a body does not end up glued to the next request.
    pub fn extract(&mut self) -> Option<Vec<u8>> {
        self.skip_leading_blank_lines();
        let total = self.declared_length()?;
        if self.bytes.len() < total {
            return None;
        }
        // the tail becomes a fresh allocation so no offsets survive the split
        let rest = self.bytes.split_off(total);
        Some(std::mem::replace(&mut self.bytes, rest))
    }

    fn skip_leading_blank_lines(&mut self) {
        let blank = self
            .bytes
            .iter()
            .take_while(|b| matches!(b, b'\r' | b'\n'))
            .count();
        if blank > 0 {
            self.bytes.drain(..blank);
        }
    }

    /// Total length of the message at the front of the buffer, once its header
    /// block is complete.
    ///
    /// Saturates rather than overflowing on absurd `Content-Length` values, so
    /// callers can compare the result against a size limit.
    pub fn declared_length(&self) -> Option<usize> {
        let header_end = find_header_end(&self.bytes)? + HEADER_TERMINATOR.len();
        Some(header_end.saturating_add(content_length(&self.bytes[..header_end])))
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Reads `Content-Length` from a header block.
///
/// Missing, negative, or non-numeric values count as zero. When the header
/// repeats, the last occurrence wins.
fn content_length(header_block: &[u8]) -> usize {
    let text = String::from_utf8_lossy(header_block);
    let mut length = 0;
    for line in text.split("\r\n").skip(1) {
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("content-length") {
                length = value.trim().parse::<usize>().unwrap_or(0);
            }
        }
    }
    length
}
