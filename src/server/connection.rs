//! The per-connection read/dispatch/write loop.

use super::Service;
use crate::config::READ_CHUNK_SIZE;
use crate::http::{FrameBuffer, HttpResponse};
use std::io::{ErrorKind, Read, Write};

/// Why a connection loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CloseReason {
    /// The peer closed its side.
    Eof,
    /// No bytes arrived within the idle timeout.
    Idle,
    /// A response was sent with `Connection: close`.
    Requested,
    /// The buffered message outgrew the size limit.
    TooLarge,
    /// Reading or writing failed.
    Transport(ErrorKind),
}

/// One client connection and its unconsumed bytes.
pub(crate) struct Connection<'a, S> {
    stream: S,
    buffer: FrameBuffer,
    service: &'a Service,
}

impl<'a, S: Read + Write> Connection<'a, S> {
    pub(crate) fn new(stream: S, service: &'a Service) -> Self {
        Connection {
            stream,
            buffer: FrameBuffer::new(),
            service,
        }
    }

    /// Serves requests until the connection should close.
    ///
    /// Requests are handled strictly in the order they were framed; each
    /// response is flushed before the next request is looked at.
    pub(crate) fn run(&mut self) -> CloseReason {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            let n = match self.stream.read(&mut chunk) {
                Ok(0) => return CloseReason::Eof,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return CloseReason::Idle;
                }
                Err(e) => return CloseReason::Transport(e.kind()),
            };
            self.buffer.add_bytes(&chunk[..n]);

            while let Some(message) = self.buffer.extract() {
                let response = self.service.handle(&message);
                if let Err(e) = response.write_to(&mut self.stream) {
                    return CloseReason::Transport(e.kind());
                }
                if !response.keep_alive {
                    return CloseReason::Requested;
                }
            }

            let pending = self
                .buffer
                .declared_length()
                .unwrap_or_else(|| self.buffer.len());
            if pending > self.service.max_message_size() {
                let response = HttpResponse::text(413, "Payload Too Large").close();
                // closing either way
                let _ = response.write_to(&mut self.stream);
                return CloseReason::TooLarge;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::ParsedRequest;
    use crate::server::tests::service;
    use std::collections::VecDeque;
    use std::io;

    /// Replays scripted reads, then reports EOF (or an error, if scripted).
    struct ScriptedStream {
        reads: VecDeque<io::Result<Vec<u8>>>,
        written: Vec<u8>,
    }

    impl ScriptedStream {
        fn new<I: IntoIterator<Item = Vec<u8>>>(reads: I) -> Self {
            ScriptedStream {
                reads: reads.into_iter().map(Ok).collect(),
                written: Vec::new(),
            }
        }

        fn responses(&self) -> Vec<ParsedRequest> {
            let mut buffer = FrameBuffer::new();
            buffer.add_bytes(&self.written);
            let mut out = Vec::new();
            while let Some(message) = buffer.extract() {
                out.push(ParsedRequest::parse(&message).unwrap());
            }
            assert!(buffer.is_empty(), "trailing bytes in output");
            out
        }
    }

    impl Read for ScriptedStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.reads.pop_front() {
                None => Ok(0),
                Some(Err(e)) => Err(e),
                Some(Ok(mut bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    if n < bytes.len() {
                        self.reads.push_front(Ok(bytes.split_off(n)));
                    }
                    Ok(n)
                }
            }
        }
    }

    impl Write for ScriptedStream {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn post(body: &str, extra_headers: &str) -> Vec<u8> {
        format!(
            "POST /mcp HTTP/1.1\r\nContent-Type: application/json\r\n{extra_headers}Content-Length: {}\r\n\r\n{body}",
            body.len()
        )
        .into_bytes()
    }

    #[test]
    fn pipelined_requests_in_one_read() {
        let service = service();
        let bytes = [
            post(r#"{"jsonrpc":"2.0","id":1,"method":"initialize"}"#, ""),
            post(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#, ""),
            post(r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#, ""),
        ]
        .concat();
        let mut connection = Connection::new(ScriptedStream::new([bytes]), &service);
        assert_eq!(connection.run(), CloseReason::Eof);
        let responses = connection.stream.responses();
        assert_eq!(responses.len(), 3);
        assert!(responses[0].header("mcp-session-id").is_some());
        assert!(responses[1].body.is_empty());
        assert_eq!(responses[1].header("content-length"), Some("0"));
        let list: serde_json::Value = serde_json::from_slice(&responses[2].body).unwrap();
        assert_eq!(list["id"], 2);
        assert!(list["result"]["tools"].is_array());
    }

    #[test]
    fn request_split_at_every_offset() {
        let service = service();
        let request = post(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#, "");
        for split in 1..request.len() {
            let reads = [request[..split].to_vec(), request[split..].to_vec()];
            let mut connection = Connection::new(ScriptedStream::new(reads), &service);
            assert_eq!(connection.run(), CloseReason::Eof);
            let responses = connection.stream.responses();
            assert_eq!(responses.len(), 1, "split at {split}");
            let body: serde_json::Value = serde_json::from_slice(&responses[0].body).unwrap();
            assert_eq!(body["id"], 1);
        }
    }

    #[test]
    fn stray_crlf_between_requests_is_ignored() {
        let service = service();
        let bytes = [
            post(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#, ""),
            b"\r\n".to_vec(),
            post(r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#, ""),
        ]
        .concat();
        let mut connection = Connection::new(ScriptedStream::new([bytes]), &service);
        assert_eq!(connection.run(), CloseReason::Eof);
        let responses = connection.stream.responses();
        assert_eq!(responses.len(), 2);
        for (response, id) in responses.iter().zip(1i64..) {
            let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
            assert_eq!(body["id"], id);
        }
        assert!(!String::from_utf8_lossy(&connection.stream.written).contains(" 400 "));
    }

    #[test]
    fn connection_close_stops_after_response() {
        let service = service();
        let bytes = [
            post(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#, "Connection: close\r\n"),
            post(r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#, ""),
        ]
        .concat();
        let mut connection = Connection::new(ScriptedStream::new([bytes]), &service);
        assert_eq!(connection.run(), CloseReason::Requested);
        let responses = connection.stream.responses();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].header("connection"), Some("close"));
    }

    #[test]
    fn malformed_request_does_not_poison_the_next() {
        let service = service();
        let bytes = [
            b"NONSENSE\r\nContent-Length: 0\r\n\r\n".to_vec(),
            post(r#"{"jsonrpc":"2.0","id":5,"method":"ping"}"#, ""),
        ]
        .concat();
        let mut connection = Connection::new(ScriptedStream::new([bytes]), &service);
        assert_eq!(connection.run(), CloseReason::Eof);
        let responses = connection.stream.responses();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].header("connection"), Some("keep-alive"));
        let first_line = String::from_utf8_lossy(&connection.stream.written)
            .lines()
            .next()
            .unwrap_or_default()
            .to_string();
        assert_eq!(first_line, "HTTP/1.1 400 Bad Request");
        let body: serde_json::Value = serde_json::from_slice(&responses[1].body).unwrap();
        assert_eq!(body["id"], 5);
    }

    #[test]
    fn oversized_messages_are_refused() {
        let service = service();
        let bytes = b"POST / HTTP/1.1\r\nContent-Length: 999999999\r\n\r\n{".to_vec();
        let mut connection = Connection::new(ScriptedStream::new([bytes]), &service);
        assert_eq!(connection.run(), CloseReason::TooLarge);
        let written = String::from_utf8(connection.stream.written.clone()).unwrap();
        assert!(written.starts_with("HTTP/1.1 413 Payload Too Large\r\n"));
        assert!(written.contains("Connection: close\r\n"));
    }

    #[test]
    fn read_timeouts_close_as_idle() {
        let service = service();
        let mut stream = ScriptedStream::new([]);
        stream
            .reads
            .push_back(Err(io::Error::new(ErrorKind::WouldBlock, "idle")));
        let mut connection = Connection::new(stream, &service);
        assert_eq!(connection.run(), CloseReason::Idle);
    }

    #[test]
    fn resets_are_transport_errors() {
        let service = service();
        let mut stream = ScriptedStream::new([b"POST / HTTP/1.1\r\n".to_vec()]);
        stream
            .reads
            .push_back(Err(io::Error::new(ErrorKind::ConnectionReset, "reset")));
        let mut connection = Connection::new(stream, &service);
        assert_eq!(
            connection.run(),
            CloseReason::Transport(ErrorKind::ConnectionReset)
        );
        assert!(connection.stream.written.is_empty());
    }
}
