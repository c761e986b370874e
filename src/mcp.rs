//! Model Context Protocol method dispatch.
//!
//! [`Dispatcher`] takes the body of a `POST`, decodes the JSON-RPC envelope and
//! routes it to `initialize`, `ping`, `tools/list` or `tools/call`. It returns
//! the HTTP status, the response body and, for `initialize`, the freshly minted
//! session id that the HTTP layer sends back in `Mcp-Session-Id`.

use crate::jrpc::{Envelope, Error, Response};
use crate::session::SessionStore;
use executor::Executor;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tools::{ToolCallParams, ToolCallResponse, ToolRegistry};

pub mod executor;
pub mod tools;

/// The protocol revision advertised by `initialize`.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// The methods this server answers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Initialize,
    Ping,
    ToolsList,
    ToolsCall,
    Unknown(String),
}

impl From<&str> for Method {
    fn from(value: &str) -> Self {
        match value {
            "initialize" => Method::Initialize,
            "ping" => Method::Ping,
            "tools/list" => Method::ToolsList,
            "tools/call" => Method::ToolsCall,
            other => Method::Unknown(other.to_string()),
        }
    }
}

/// What the HTTP layer should send back for one `POST` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub status: u16,
    /// Serialized JSON-RPC response; empty for notifications.
    pub body: Vec<u8>,
    /// Set when the request minted a session.
    pub session_id: Option<String>,
}

impl Dispatch {
    fn accepted() -> Dispatch {
        Dispatch {
            status: 202,
            body: Vec::new(),
            session_id: None,
        }
    }

    fn reply(status: u16, response: Response<Value>, session_id: Option<String>) -> Dispatch {
        let body = serde_json::to_vec(&response).unwrap_or_else(|_| {
            br#"{"jsonrpc":"2.0","error":{"code":-32603,"message":"Internal error"}}"#.to_vec()
        });
        Dispatch {
            status,
            body,
            session_id,
        }
    }
}

/// Routes JSON-RPC requests to their handlers.
pub struct Dispatcher {
    registry: Arc<ToolRegistry>,
    sessions: Arc<SessionStore>,
    executor: Executor,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ToolRegistry>,
        sessions: Arc<SessionStore>,
        executor: Executor,
    ) -> Dispatcher {
        Dispatcher {
            registry,
            sessions,
            executor,
        }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Handles one `POST` body.
    ///
    /// Bodies that cannot be decoded get a parse error; without a recoverable id
    /// that error goes out with HTTP 400 and no `id` field. Notifications are
    /// acknowledged with 202 and are never executed.
    pub fn dispatch(&self, body: &[u8]) -> Dispatch {
        let envelope = match Envelope::parse(body) {
            Ok(envelope) => envelope,
            Err((error, Some(id))) => return Dispatch::reply(200, Response::err(error, Some(id)), None),
            Err((error, None)) => return Dispatch::reply(400, Response::err(error, None), None),
        };
        if envelope.is_notification() {
            return Dispatch::accepted();
        }
        let id = envelope.id;
        match Method::from(envelope.method.as_str()) {
            Method::Initialize => {
                let session_id = self.sessions.create();
                logwise::info_sync!(
                    "Created session {session}",
                    session = logwise::privacy::LogIt(&session_id)
                );
                Dispatch::reply(
                    200,
                    Response::new(InitializeResult::new(), id).erase(),
                    Some(session_id),
                )
            }
            Method::Ping => Dispatch::reply(200, Response::new(Value::Object(Default::default()), id), None),
            Method::ToolsList => Dispatch::reply(200, Response::new(self.registry.list(), id).erase(), None),
            Method::ToolsCall => Dispatch::reply(200, self.tools_call(envelope.params, id), None),
            Method::Unknown(method) => {
                logwise::warn_sync!(
                    "Unknown method {method}",
                    method = logwise::privacy::LogIt(&method)
                );
                Dispatch::reply(200, Response::err(Error::method_not_found(), id), None)
            }
        }
    }

    fn tools_call(&self, params: Option<Value>, id: Option<Value>) -> Response<Value> {
        let result = ToolCallParams::from_params(params).and_then(|params| {
            self.registry
                .call(&params.name, params.arguments, &self.executor)
        });
        match result {
            Ok(text) => Response::new(ToolCallResponse::text(text), id).erase(),
            Err(e) => {
                logwise::warn_sync!(
                    "tools/call failed: {error}",
                    error = logwise::privacy::LogIt(&e)
                );
                Response::err(e.into(), id)
            }
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    protocol_version: String,
    capabilities: HashMap<String, HashMap<String, Value>>,
    #[serde(rename = "serverInfo")]
    server_info: HashMap<String, Value>,
}

impl InitializeResult {
    fn new() -> Self {
        let mut server_info = HashMap::new();
        server_info.insert("name".to_string(), env!("CARGO_PKG_NAME").into());
        server_info.insert("version".to_string(), env!("CARGO_PKG_VERSION").into());

        let mut capabilities = HashMap::new();
        let mut tool_capabilities = HashMap::new();
        tool_capabilities.insert("listChanged".to_string(), false.into());
        capabilities.insert("tools".to_string(), tool_capabilities);
        InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities,
            server_info,
        }
    }
}
