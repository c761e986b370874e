//! Server configuration.
//!
//! [`Config`] collects the handful of knobs the control-plane server exposes. The
//! defaults are chosen for a server embedded in a desktop application and reached
//! only from the local machine.
//!
//! # Examples
//!
//! ```
//! use termcp::config::Config;
//! use std::time::Duration;
//!
//! let config = Config::default()
//!     .with_addr("127.0.0.1:0")
//!     .with_tool_timeout(Duration::from_secs(5));
//! assert_eq!(config.addr, "127.0.0.1:0");
//! assert_eq!(config.tool_timeout, Duration::from_secs(5));
//! ```

use std::time::Duration;

/// The default listen address.
pub const DEFAULT_ADDR: &str = "127.0.0.1:11218";
/// How long a connection may sit without receiving bytes before it is closed.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(120);
/// How long a `tools/call` may run before it is reported as timed out.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);
/// Upper bound on the bytes buffered for a single message.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;
/// Size of each socket read.
pub const READ_CHUNK_SIZE: usize = 1024;

/// Configuration for [`Server`](crate::server::Server).
#[derive(Debug, Clone)]
pub struct Config {
    /// Address to bind, in any form accepted by `ToSocketAddrs`.
    pub addr: String,
    /// Idle timeout applied to each connection's reads.
    pub idle_timeout: Duration,
    /// Timeout applied to each tool invocation.
    pub tool_timeout: Duration,
    /// Sessions older than this are treated as closed. `None` keeps them until
    /// they are deleted or the server shuts down.
    pub session_ttl: Option<Duration>,
    /// Largest message (header block plus body) a connection will buffer.
    pub max_message_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            addr: DEFAULT_ADDR.to_string(),
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            session_ttl: None,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }
}

impl Config {
    pub fn with_addr(mut self, addr: impl Into<String>) -> Self {
        self.addr = addr.into();
        self
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn with_tool_timeout(mut self, tool_timeout: Duration) -> Self {
        self.tool_timeout = tool_timeout;
        self
    }

    pub fn with_session_ttl(mut self, session_ttl: Duration) -> Self {
        self.session_ttl = Some(session_ttl);
        self
    }

    pub fn with_max_message_size(mut self, max_message_size: usize) -> Self {
        self.max_message_size = max_message_size;
        self
    }
}
