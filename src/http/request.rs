//! Parsing of complete request messages.

use super::{FrameError, HEADER_TERMINATOR, find_header_end};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};

/// The request verb.
///
/// Only the verbs the control-plane endpoint serves get their own variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Delete,
    Other(String),
}

impl From<&str> for HttpMethod {
    fn from(value: &str) -> Self {
        match value {
            "GET" => HttpMethod::Get,
            "POST" => HttpMethod::Post,
            "DELETE" => HttpMethod::Delete,
            other => HttpMethod::Other(other.to_string()),
        }
    }
}

impl Display for HttpMethod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => f.write_str("GET"),
            HttpMethod::Post => f.write_str("POST"),
            HttpMethod::Delete => f.write_str("DELETE"),
            HttpMethod::Other(other) => f.write_str(other),
        }
    }
}

/// One request, split into its parts.
///
/// Header names are trimmed and lowercased. When a header repeats, the last
/// line wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub method: HttpMethod,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl ParsedRequest {
    /// Parses a complete message as produced by [`FrameBuffer::extract`](super::FrameBuffer::extract).
    ///
    /// # Examples
    ///
    /// ```
    /// use termcp::http::{HttpMethod, ParsedRequest};
    ///
    /// let request = ParsedRequest::parse(
    ///     b"DELETE /mcp HTTP/1.1\r\nMcp-Session-Id: 42\r\n\r\n",
    /// ).unwrap();
    /// assert_eq!(request.method, HttpMethod::Delete);
    /// assert_eq!(request.header("MCP-Session-Id"), Some("42"));
    /// assert!(request.body.is_empty());
    /// ```
    pub fn parse(message: &[u8]) -> Result<ParsedRequest, FrameError> {
        let header_end = find_header_end(message).ok_or(FrameError::MissingTerminator)?;
        let header_text =
            std::str::from_utf8(&message[..header_end]).map_err(|_| FrameError::NotUtf8)?;
        let body = message[header_end + HEADER_TERMINATOR.len()..].to_vec();

        let mut lines = header_text.split("\r\n");
        let request_line = lines.next().unwrap_or_default();
        let mut tokens = request_line.split(' ').filter(|t| !t.is_empty());
        let method = match (tokens.next(), tokens.next()) {
            (Some(method), Some(_path)) => HttpMethod::from(method),
            _ => return Err(FrameError::MalformedRequestLine(request_line.to_string())),
        };

        let mut headers = HashMap::new();
        for line in lines {
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
            }
        }

        Ok(ParsedRequest {
            method,
            headers,
            body,
        })
    }

    /// Looks up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Whether the client asked for the connection to be closed after this request.
    pub fn wants_close(&self) -> bool {
        self.header("connection")
            .is_some_and(|v| v.eq_ignore_ascii_case("close"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_method_headers_and_body() {
        let request = ParsedRequest::parse(
            b"POST /mcp HTTP/1.1\r\nContent-Type: application/json\r\n  X-Thing :  value \r\nContent-Length: 2\r\n\r\n{}",
        )
        .unwrap();
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert_eq!(request.header("x-thing"), Some("value"));
        assert_eq!(request.body, b"{}");
    }

    #[test]
    fn duplicate_headers_last_wins() {
        let request =
            ParsedRequest::parse(b"GET / HTTP/1.1\r\nMcp-Session-Id: a\r\nmcp-session-id: b\r\n\r\n")
                .unwrap();
        assert_eq!(request.header("Mcp-Session-Id"), Some("b"));
        assert_eq!(request.headers.len(), 1);
    }

    #[test]
    fn header_values_keep_inner_colons() {
        let request =
            ParsedRequest::parse(b"GET / HTTP/1.1\r\nHost: localhost:11218\r\n\r\n").unwrap();
        assert_eq!(request.header("host"), Some("localhost:11218"));
    }

    #[test]
    fn other_verbs_are_preserved() {
        let request = ParsedRequest::parse(b"PATCH / HTTP/1.1\r\n\r\n").unwrap();
        assert_eq!(request.method, HttpMethod::Other("PATCH".to_string()));
        assert_eq!(request.method.to_string(), "PATCH");
    }

    #[test]
    fn rejects_invalid_utf8_headers() {
        let err = ParsedRequest::parse(b"POST / HTTP/1.1\r\nX: \xff\xfe\r\n\r\n").unwrap_err();
        assert_eq!(err, FrameError::NotUtf8);
    }

    #[test]
    fn body_need_not_be_utf8() {
        let request =
            ParsedRequest::parse(b"POST / HTTP/1.1\r\nContent-Length: 2\r\n\r\n\xff\xfe").unwrap();
        assert_eq!(request.body, vec![0xff, 0xfe]);
    }

    #[test]
    fn rejects_short_request_line() {
        let err = ParsedRequest::parse(b"POST\r\n\r\n").unwrap_err();
        assert_eq!(err, FrameError::MalformedRequestLine("POST".to_string()));
        let err = ParsedRequest::parse(b"\r\n\r\n").unwrap_err();
        assert!(matches!(err, FrameError::MalformedRequestLine(_)));
    }

    #[test]
    fn connection_close_is_detected() {
        let request = ParsedRequest::parse(b"POST / HTTP/1.1\r\nConnection: Close\r\n\r\n").unwrap();
        assert!(request.wants_close());
        let request =
            ParsedRequest::parse(b"POST / HTTP/1.1\r\nConnection: keep-alive\r\n\r\n").unwrap();
        assert!(!request.wants_close());
    }
}
