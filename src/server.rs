//! The HTTP server.
//!
//! [`Server::new`] binds a TCP listener and spawns an accept thread. Every
//! accepted connection gets its own thread, which reads bytes, frames HTTP
//! messages by `Content-Length`, and answers them in order over the same
//! connection until the peer hangs up, asks to close, or goes idle.
//!
//! All requests share one endpoint; the request path is not inspected.
//!
//! * `POST` carries a JSON-RPC message.
//! * `GET` with a live `Mcp-Session-Id` opens an (empty) event stream.
//! * `DELETE` with a live `Mcp-Session-Id` ends that session.
//! * Anything else is answered with 405.

mod connection;

use crate::config::Config;
use crate::http::{HttpMethod, HttpResponse, ParsedRequest, SESSION_HEADER};
use crate::mcp::Dispatcher;
use crate::mcp::executor::{DedicatedThread, Executor, PrivilegedContext};
use crate::mcp::tools::ToolRegistry;
use crate::session::SessionStore;
use connection::{CloseReason, Connection};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

/// Methods a client may use on the endpoint, for the `Allow` header.
pub const ALLOWED_METHODS: &str = "GET, POST, DELETE";

/// Pause after a failed `accept`, so persistent errors don't spin the thread.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("permission denied binding {addr}; you may be running in a sandbox")]
    PermissionDenied { addr: String },
    #[error("can't bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Answers framed HTTP messages.
///
/// This is everything a connection needs besides its socket; it is shared by
/// all connection threads.
pub struct Service {
    dispatcher: Dispatcher,
    max_message_size: usize,
}

impl Service {
    pub fn new(dispatcher: Dispatcher, max_message_size: usize) -> Service {
        Service {
            dispatcher,
            max_message_size,
        }
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    pub fn sessions(&self) -> &SessionStore {
        self.dispatcher.sessions()
    }

    /// Builds the response to one complete HTTP message.
    pub fn handle(&self, message: &[u8]) -> HttpResponse {
        let request = match ParsedRequest::parse(message) {
            Ok(request) => request,
            Err(e) => {
                logwise::warn_sync!(
                    "Malformed HTTP request: {error}",
                    error = logwise::privacy::LogIt(&e)
                );
                return HttpResponse::text(400, "Bad Request");
            }
        };
        let response = match &request.method {
            HttpMethod::Post => self.post(&request),
            HttpMethod::Get => self.get(&request),
            HttpMethod::Delete => self.delete(&request),
            HttpMethod::Other(_) => {
                HttpResponse::text(405, "Method Not Allowed").with_allow(ALLOWED_METHODS)
            }
        };
        if request.wants_close() {
            response.close()
        } else {
            response
        }
    }

    fn post(&self, request: &ParsedRequest) -> HttpResponse {
        let dispatch = self.dispatcher.dispatch(&request.body);
        let response = if dispatch.body.is_empty() {
            HttpResponse::empty(dispatch.status)
        } else {
            HttpResponse::json(dispatch.status, dispatch.body)
        };
        match dispatch.session_id {
            Some(session_id) => response.with_session_id(session_id),
            None => response,
        }
    }

    fn get(&self, request: &ParsedRequest) -> HttpResponse {
        match request.header(SESSION_HEADER) {
            Some(id) if self.sessions().exists(id) => HttpResponse::event_stream(),
            _ => HttpResponse::text(404, "Not Found"),
        }
    }

    fn delete(&self, request: &ParsedRequest) -> HttpResponse {
        let response = match request.header(SESSION_HEADER) {
            None => HttpResponse::text(400, "Missing Mcp-Session-Id"),
            Some(id) if self.sessions().remove(id) => {
                logwise::info_sync!(
                    "Removed session {session}",
                    session = logwise::privacy::LogIt(&id)
                );
                HttpResponse::empty(200)
            }
            Some(_) => HttpResponse::text(404, "Not Found"),
        };
        response.close()
    }
}

/// A running server.
///
/// Dropping the server (or calling [`Server::shutdown`]) stops accepting new
/// connections and ends every session. Connections already being served run
/// until their peer hangs up or their idle timeout expires.
///
/// # Examples
///
/// ```
/// use termcp::config::Config;
/// use termcp::mcp::tools::ToolRegistry;
/// use termcp::server::Server;
///
/// let server = Server::with_dedicated_thread(
///     Config::default().with_addr("127.0.0.1:0"),
///     ToolRegistry::new(),
/// )
/// .unwrap();
/// assert!(server.local_addr().port() != 0);
/// server.shutdown();
/// ```
pub struct Server {
    local_addr: SocketAddr,
    stopping: Arc<AtomicBool>,
    service: Arc<Service>,
    accept_thread: Option<JoinHandle<()>>,
}

impl Server {
    /// Binds `config.addr` and starts serving `registry`.
    ///
    /// Tools that require [`ExecutionContext::Privileged`](crate::mcp::executor::ExecutionContext::Privileged)
    /// are handed to `privileged`.
    pub fn new(
        config: Config,
        registry: ToolRegistry,
        privileged: Arc<dyn PrivilegedContext>,
    ) -> Result<Server, Error> {
        let listener = match TcpListener::bind(&config.addr) {
            Ok(listener) => listener,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                return Err(Error::PermissionDenied { addr: config.addr });
            }
            Err(source) => {
                return Err(Error::Bind {
                    addr: config.addr,
                    source,
                });
            }
        };
        let local_addr = listener.local_addr()?;
        logwise::info_sync!(
            "Listening on {addr}",
            addr = logwise::privacy::LogIt(&local_addr)
        );

        let sessions = Arc::new(SessionStore::new(config.session_ttl));
        let executor = Executor::new(privileged, config.tool_timeout);
        let dispatcher = Dispatcher::new(Arc::new(registry), sessions, executor);
        let service = Arc::new(Service::new(dispatcher, config.max_message_size));
        let stopping = Arc::new(AtomicBool::new(false));

        let accept_thread = {
            let service = Arc::clone(&service);
            let stopping = Arc::clone(&stopping);
            let idle_timeout = config.idle_timeout;
            std::thread::Builder::new()
                .name("termcp::listen".to_string())
                .spawn(move || {
                    for stream in listener.incoming() {
                        if stopping.load(Ordering::Acquire) {
                            break;
                        }
                        match stream {
                            Ok(stream) => accept(stream, &service, idle_timeout),
                            Err(e) => {
                                logwise::warn_sync!(
                                    "Failed to accept connection: {error}",
                                    error = logwise::privacy::LogIt(&e)
                                );
                                std::thread::sleep(ACCEPT_BACKOFF);
                            }
                        }
                    }
                })?
        };

        Ok(Server {
            local_addr,
            stopping,
            service,
            accept_thread: Some(accept_thread),
        })
    }

    /// Like [`Server::new`], running privileged tools on a new thread named
    /// `termcp::privileged`.
    pub fn with_dedicated_thread(config: Config, registry: ToolRegistry) -> Result<Server, Error> {
        let privileged = DedicatedThread::spawn("termcp::privileged")?;
        Server::new(config, registry, Arc::new(privileged))
    }

    /// The address actually bound, useful when `config.addr` asked for port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn sessions(&self) -> &SessionStore {
        self.service.sessions()
    }

    /// Stops the accept loop and ends all sessions.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.stopping.swap(true, Ordering::AcqRel) {
            return;
        }
        // accept() blocks; a throwaway connection wakes it up to see the flag
        let mut wake = self.local_addr;
        match wake.ip() {
            IpAddr::V4(ip) if ip.is_unspecified() => wake.set_ip(Ipv4Addr::LOCALHOST.into()),
            IpAddr::V6(ip) if ip.is_unspecified() => wake.set_ip(Ipv6Addr::LOCALHOST.into()),
            _ => {}
        }
        match TcpStream::connect(wake) {
            Ok(_) => {
                if let Some(thread) = self.accept_thread.take() {
                    let _ = thread.join();
                }
            }
            Err(e) => {
                // the thread is left to exit on its next accept
                logwise::warn_sync!(
                    "Could not wake the accept loop: {error}",
                    error = logwise::privacy::LogIt(&e)
                );
            }
        }
        self.sessions().clear();
        logwise::info_sync!(
            "Stopped listening on {addr}",
            addr = logwise::privacy::LogIt(&self.local_addr)
        );
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept(stream: TcpStream, service: &Arc<Service>, idle_timeout: Duration) {
    let peer = stream
        .peer_addr()
        .map(|addr| addr.to_string())
        .unwrap_or_else(|_| "unknown peer".to_string());
    if let Err(e) = stream.set_read_timeout(Some(idle_timeout)) {
        logwise::warn_sync!(
            "Can't set idle timeout for {peer}: {error}",
            peer = logwise::privacy::LogIt(&peer),
            error = logwise::privacy::LogIt(&e)
        );
        return;
    }
    logwise::info_sync!(
        "Accepted connection from {peer}",
        peer = logwise::privacy::LogIt(&peer)
    );
    let service = Arc::clone(service);
    let spawned = std::thread::Builder::new()
        .name("termcp::connection".to_string())
        .spawn(move || {
            let reason = Connection::new(stream, &service).run();
            match reason {
                CloseReason::Eof | CloseReason::Requested => {
                    logwise::info_sync!(
                        "Closed connection from {peer}",
                        peer = logwise::privacy::LogIt(&peer)
                    );
                }
                CloseReason::Idle => {
                    logwise::info_sync!(
                        "Connection from {peer} idle, closing",
                        peer = logwise::privacy::LogIt(&peer)
                    );
                }
                CloseReason::TooLarge => {
                    logwise::warn_sync!(
                        "Message from {peer} exceeded the size limit, closing",
                        peer = logwise::privacy::LogIt(&peer)
                    );
                }
                CloseReason::Transport(kind) => {
                    logwise::warn_sync!(
                        "Transport error on connection from {peer}: {kind}",
                        peer = logwise::privacy::LogIt(&peer),
                        kind = logwise::privacy::LogIt(&kind)
                    );
                }
            }
        });
    if let Err(e) = spawned {
        logwise::error_sync!(
            "Can't spawn a connection thread: {error}",
            error = logwise::privacy::LogIt(&e)
        );
    }
}
