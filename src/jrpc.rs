//! JSON-RPC 2.0 envelopes.
//!
//! This module holds the wire types exchanged with the automation client:
//!
//! - [`Envelope`]: an inbound message, which is either a request or a notification
//! - [`Response`]: the reply to a request
//! - [`Error`]: the error object carried by a failed response
//!
//! A message is a *notification* when its `id` is absent or null, or when its
//! method lives under `notifications/`. Notifications never get a response.
//!
//! # Examples
//!
//! ```
//! use termcp::jrpc::{Envelope, Response, Error};
//! use serde_json::json;
//!
//! let envelope = Envelope::parse(br#"{"jsonrpc":"2.0","id":7,"method":"tools/list"}"#).unwrap();
//! assert!(!envelope.is_notification());
//!
//! let response: Response<serde_json::Value> =
//!     Response::err(Error::method_not_found(), envelope.id.clone());
//! let text = serde_json::to_string(&response).unwrap();
//! assert_eq!(text, r#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"Method not found"},"id":7}"#);
//! ```

use serde::Serialize;
use serde_json::Value;
use std::fmt::{Display, Formatter};

/// Prefix shared by all notification methods.
pub const NOTIFICATION_PREFIX: &str = "notifications/";

/// An inbound JSON-RPC message.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// The request id; `None` when absent or null.
    pub id: Option<Value>,
    pub method: String,
    pub params: Option<Value>,
}

impl Envelope {
    /// Decodes a request body.
    ///
    /// On failure the error comes back with whatever id could be recovered, so
    /// the caller can still address its reply. Ids must be strings, numbers or
    /// null; any other id is an invalid request and is not echoed.
    pub fn parse(body: &[u8]) -> Result<Envelope, (Error, Option<Value>)> {
        if body.is_empty() {
            return Err((Error::parse_error(), None));
        }
        let value: Value =
            serde_json::from_slice(body).map_err(|e| (Error::parse_error_detail(e.to_string()), None))?;
        let Value::Object(mut object) = value else {
            return Err((
                Error::parse_error_detail("expected a JSON object".to_string()),
                None,
            ));
        };
        let id = object.remove("id").filter(|id| !id.is_null());
        if id.as_ref().is_some_and(|id| !(id.is_string() || id.is_number())) {
            return Err((Error::invalid_request(), None));
        }
        let method = match object.remove("method") {
            Some(Value::String(method)) => method,
            Some(_) => {
                return Err((
                    Error::parse_error_detail("method must be a string".to_string()),
                    id,
                ));
            }
            None => return Err((Error::parse_error_detail("missing method".to_string()), id)),
        };
        Ok(Envelope {
            id,
            method,
            params: object.remove("params"),
        })
    }

    /// Whether the sender expects no reply.
    pub fn is_notification(&self) -> bool {
        self.id.is_none() || self.method.starts_with(NOTIFICATION_PREFIX)
    }
}

/// A JSON-RPC 2.0 response.
///
/// Holds either `result` or `error`, never both. The `id` echoes the request;
/// it is omitted only for errors that could not be tied to a request.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct Response<R> {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<R>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<Error>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl<R> Response<R> {
    /// Creates a successful response.
    pub fn new(result: R, id: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    /// Creates an error response.
    pub fn err(e: Error, id: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(e),
            id,
        }
    }

    /// Converts a typed response into one carrying a `serde_json::Value`.
    ///
    /// Lets handlers with different result types share one dispatch path. A
    /// result that fails to serialize turns into an internal error.
    pub fn erase(self) -> Response<Value>
    where
        R: Serialize,
    {
        match self.result.map(serde_json::to_value).transpose() {
            Ok(result) => Response {
                jsonrpc: self.jsonrpc,
                result,
                error: self.error,
                id: self.id,
            },
            Err(e) => Response::err(Error::from_error(e), self.id),
        }
    }
}

/// A JSON-RPC 2.0 error object.
///
/// # Standard Error Codes
///
/// * `-32700` - Parse error
/// * `-32600` - Invalid Request
/// * `-32601` - Method not found
/// * `-32602` - Invalid params
/// * `-32603` - Internal error
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Error {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for Error {}

impl Error {
    pub fn new(code: i32, message: String, data: Option<Value>) -> Self {
        Self {
            code,
            message,
            data,
        }
    }

    /// Creates a "Parse error" (code -32700).
    ///
    /// ```
    /// use termcp::jrpc::Error;
    ///
    /// let error = Error::parse_error();
    /// assert_eq!(error.code, -32700);
    /// assert_eq!(error.message, "Parse error");
    /// ```
    pub fn parse_error() -> Self {
        Self::new(PARSE_ERROR, "Parse error".to_string(), None)
    }

    /// A parse error with the reason attached as `data`.
    pub fn parse_error_detail(detail: String) -> Self {
        Self::new(PARSE_ERROR, "Parse error".to_string(), Some(detail.into()))
    }

    /// Creates an "Invalid Request" (code -32600).
    pub fn invalid_request() -> Self {
        Self::new(INVALID_REQUEST, "Invalid Request".to_string(), None)
    }

    pub fn method_not_found() -> Self {
        Self::new(METHOD_NOT_FOUND, "Method not found".to_string(), None)
    }

    /// Creates an "Invalid params" error (code -32602) whose message names the problem.
    ///
    /// ```
    /// use termcp::jrpc::Error;
    ///
    /// let error = Error::invalid_params("missing tool name".to_string());
    /// assert_eq!(error.code, -32602);
    /// assert_eq!(error.message, "Invalid params: missing tool name");
    /// ```
    pub fn invalid_params(detail: String) -> Self {
        Self::new(INVALID_PARAMS, format!("Invalid params: {detail}"), None)
    }

    /// Creates an "Internal error" (code -32603) from any error.
    pub fn from_error<E: std::error::Error>(error: E) -> Self {
        Self::internal_error(error.to_string())
    }

    pub fn internal_error(message: String) -> Self {
        Self::new(INTERNAL_ERROR, message, None)
    }
}
