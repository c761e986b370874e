//! HTTP/1.1 message handling.
//!
//! The control-plane endpoint speaks a tiny subset of HTTP/1.1: sequential
//! keep-alive requests, bodies delimited by `Content-Length`, and no chunked
//! transfer encoding. This module splits that work into three parts:
//!
//! - [`frame`]: finds complete messages in a growing per-connection buffer
//! - [`request`]: splits one complete message into method, headers and body
//! - [`response`]: builds and serializes responses

pub mod frame;
pub mod request;
pub mod response;

pub use frame::FrameBuffer;
pub use request::{HttpMethod, ParsedRequest};
pub use response::HttpResponse;

/// The byte sequence that ends an HTTP header block.
pub(crate) const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Name of the header that carries the session token, lowercased.
pub const SESSION_HEADER: &str = "mcp-session-id";

/// Errors produced while parsing an extracted message.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    /// The header block is not valid UTF-8.
    #[error("header block is not valid UTF-8")]
    NotUtf8,
    /// The message has no `\r\n\r\n` separating headers from body.
    #[error("message has no header terminator")]
    MissingTerminator,
    /// The request line has fewer than two space-separated tokens.
    #[error("malformed request line: {0:?}")]
    MalformedRequestLine(String),
}

/// Returns the offset of the first header terminator in `bytes`, if any.
pub(crate) fn find_header_end(bytes: &[u8]) -> Option<usize> {
    bytes
        .windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
}
