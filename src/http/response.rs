//! Response construction and serialization.

use std::io::Write;

pub(crate) const CONTENT_TYPE_JSON: &str = "application/json";
pub(crate) const CONTENT_TYPE_EVENT_STREAM: &str = "text/event-stream";
pub(crate) const CONTENT_TYPE_TEXT: &str = "text/plain";

/// An HTTP response, ready to be written to the connection.
///
/// Every response carries `Content-Type`, `Content-Length` and `Connection`
/// headers. Use [`close`](HttpResponse::close) to ask the connection loop to
/// hang up after writing.
///
/// # Examples
///
/// ```
/// use termcp::http::HttpResponse;
///
/// let response = HttpResponse::json(200, b"{}".to_vec()).with_session_id("abc".to_string());
/// let bytes = String::from_utf8(response.to_bytes()).unwrap();
/// assert!(bytes.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(bytes.contains("Mcp-Session-Id: abc\r\n"));
/// assert!(bytes.contains("Connection: keep-alive\r\n"));
/// assert!(bytes.ends_with("\r\n\r\n{}"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
    pub keep_alive: bool,
    pub session_id: Option<String>,
    pub allow: Option<&'static str>,
}

impl HttpResponse {
    pub fn new(status: u16, content_type: &'static str, body: Vec<u8>) -> HttpResponse {
        HttpResponse {
            status,
            content_type,
            body,
            keep_alive: true,
            session_id: None,
            allow: None,
        }
    }

    pub fn json(status: u16, body: Vec<u8>) -> HttpResponse {
        HttpResponse::new(status, CONTENT_TYPE_JSON, body)
    }

    /// A response with an empty body.
    pub fn empty(status: u16) -> HttpResponse {
        HttpResponse::new(status, CONTENT_TYPE_JSON, Vec::new())
    }

    /// A short plain-text response, for statuses that carry no JSON-RPC payload.
    pub fn text(status: u16, text: &str) -> HttpResponse {
        HttpResponse::new(status, CONTENT_TYPE_TEXT, text.as_bytes().to_vec())
    }

    /// The stub answer to a long-poll `GET` for a known session.
    pub fn event_stream() -> HttpResponse {
        HttpResponse::new(200, CONTENT_TYPE_EVENT_STREAM, Vec::new())
    }

    /// Marks the response as the last one on its connection.
    pub fn close(mut self) -> HttpResponse {
        self.keep_alive = false;
        self
    }

    pub fn with_session_id(mut self, session_id: String) -> HttpResponse {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_allow(mut self, allow: &'static str) -> HttpResponse {
        self.allow = Some(allow);
        self
    }

    /// Serializes status line, headers and body.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: {}\r\n",
            self.status,
            reason_phrase(self.status),
            self.content_type,
            self.body.len(),
            if self.keep_alive { "keep-alive" } else { "close" },
        );
        if let Some(session_id) = &self.session_id {
            head.push_str(&format!("Mcp-Session-Id: {session_id}\r\n"));
        }
        if let Some(allow) = self.allow {
            head.push_str(&format!("Allow: {allow}\r\n"));
        }
        head.push_str("\r\n");
        let mut bytes = head.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }

    /// Writes the serialized response and flushes.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.to_bytes())?;
        writer.flush()
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        202 => "Accepted",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        _ => "Unknown",
    }
}
