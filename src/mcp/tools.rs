//! Tool registration, discovery and invocation.
//!
//! A tool is a named, schema-described unit of work the client can invoke with
//! `tools/call`. Tools are collected into a [`ToolRegistry`] while the host
//! starts up; once the registry is handed to the server it is read-only.
//!
//! # Examples
//!
//! ## Implementing a tool
//!
//! ```
//! use termcp::mcp::tools::{Argument, InputSchema, Tool, ToolCallError, ToolRegistry};
//! use std::collections::HashMap;
//!
//! struct EchoTool;
//!
//! impl Tool for EchoTool {
//!     fn name(&self) -> &str {
//!         "echo"
//!     }
//!
//!     fn description(&self) -> &str {
//!         "Echoes back the input message"
//!     }
//!
//!     fn input_schema(&self) -> InputSchema {
//!         InputSchema::new(vec![Argument::new("message", "string", "Message to echo", true)])
//!     }
//!
//!     fn call(&self, params: HashMap<String, serde_json::Value>) -> Result<String, ToolCallError> {
//!         params
//!             .get("message")
//!             .and_then(|v| v.as_str())
//!             .map(|m| format!("Echo: {m}"))
//!             .ok_or_else(|| ToolCallError::new("missing message"))
//!     }
//! }
//!
//! let mut registry = ToolRegistry::new();
//! registry.register(EchoTool).unwrap();
//! assert!(registry.get("echo").is_some());
//! ```
//!
//! ## Closure tools
//!
//! ```
//! use termcp::mcp::executor::ExecutionContext;
//! use termcp::mcp::tools::{FnTool, InputSchema, ToolRegistry};
//!
//! let mut registry = ToolRegistry::new();
//! registry
//!     .register(FnTool::new(
//!         "version",
//!         "Reports the host version",
//!         InputSchema::empty(),
//!         ExecutionContext::Any,
//!         |_| Ok("1.0".to_string()),
//!     ))
//!     .unwrap();
//! assert_eq!(registry.list().tools.len(), 1);
//! ```

use super::executor::{ExecutionContext, Executor};
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Trait for implementing tools.
///
/// Tools must be `Send + Sync` since calls arrive from many connection threads
/// and may run on the host's privileged context.
pub trait Tool: Send + Sync + 'static {
    /// The unique name used in `tools/call`.
    fn name(&self) -> &str;

    /// A human-readable description, shown to agents in `tools/list`.
    fn description(&self) -> &str;

    /// The schema describing the tool's arguments.
    fn input_schema(&self) -> InputSchema;

    /// Where [`call`](Tool::call) must run. Defaults to any thread.
    fn execution_context(&self) -> ExecutionContext {
        ExecutionContext::Any
    }

    /// Executes the tool.
    ///
    /// The arguments have already been checked against
    /// [`input_schema`](Tool::input_schema). The returned text becomes a single
    /// text content block in the response.
    fn call(&self, params: HashMap<String, Value>) -> Result<String, ToolCallError>;
}

/// A failure reported by a tool's own logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallError {
    pub message: String,
}

impl ToolCallError {
    pub fn new(message: impl Into<String>) -> Self {
        ToolCallError {
            message: message.into(),
        }
    }
}

impl fmt::Display for ToolCallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ToolCallError {}

impl From<String> for ToolCallError {
    fn from(message: String) -> Self {
        ToolCallError { message }
    }
}

impl From<&str> for ToolCallError {
    fn from(message: &str) -> Self {
        ToolCallError::new(message)
    }
}

/// Errors from resolving or running a tool call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidArguments(String),
    #[error("Tool execution failed: {0}")]
    ExecutionFailed(String),
}

impl From<ToolError> for crate::jrpc::Error {
    fn from(error: ToolError) -> Self {
        match error {
            ToolError::InvalidArguments(detail) => crate::jrpc::Error::invalid_params(detail),
            other => crate::jrpc::Error::internal_error(other.to_string()),
        }
    }
}

/// Errors from building a registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("a tool named {0:?} is already registered")]
    Duplicate(String),
}

/// The fixed set of tools a server exposes.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> ToolRegistry {
        ToolRegistry { tools: Vec::new() }
    }

    /// Adds a tool. Names must be unique.
    pub fn register<T: Tool>(&mut self, tool: T) -> Result<(), RegistryError> {
        self.register_arc(Arc::new(tool))
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) -> Result<(), RegistryError> {
        if self.get(tool.name()).is_some() {
            return Err(RegistryError::Duplicate(tool.name().to_string()));
        }
        self.tools.push(tool);
        Ok(())
    }

    /// Looks a tool up by exact name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    /// Metadata for every tool, in registration order.
    pub fn list(&self) -> ToolList {
        ToolList {
            tools: self
                .tools
                .iter()
                .map(|tool| ToolInfo::from_tool(tool.as_ref()))
                .collect(),
        }
    }

    /// Resolves `name`, validates `arguments` and runs the tool through `executor`.
    pub fn call(
        &self,
        name: &str,
        arguments: HashMap<String, Value>,
        executor: &Executor,
    ) -> Result<String, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.input_schema()
            .validate(&arguments)
            .map_err(ToolError::InvalidArguments)?;
        let tool = Arc::clone(tool);
        executor.run(tool.execution_context(), move || tool.call(arguments))
    }
}

/// The `tools/list` result.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ToolList {
    pub tools: Vec<ToolInfo>,
}

/// Metadata about a tool, as advertised by `tools/list`.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: InputSchema,
}

impl ToolInfo {
    pub fn from_tool(tool: &dyn Tool) -> Self {
        ToolInfo {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            input_schema: tool.input_schema(),
        }
    }
}

/// JSON schema of a tool's arguments.
///
/// Always an object schema: a map of named properties with a type and
/// description each, plus the list of required names.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct InputSchema {
    r#type: String,
    properties: HashMap<String, HashMap<String, Value>>,
    required: Vec<String>,
}

/// A single parameter, used to build an [`InputSchema`].
pub struct Argument {
    name: String,
    r#type: String,
    description: String,
    required: bool,
}

impl Argument {
    /// Creates an argument specification.
    ///
    /// `type` is a JSON schema type: `"string"`, `"integer"`, `"number"`,
    /// `"boolean"`, `"object"` or `"array"`.
    pub fn new(
        name: impl Into<String>,
        r#type: impl Into<String>,
        description: impl Into<String>,
        required: bool,
    ) -> Self {
        Self {
            name: name.into(),
            r#type: r#type.into(),
            description: description.into(),
            required,
        }
    }
}

impl InputSchema {
    pub fn new<A: IntoIterator<Item = Argument>>(arguments: A) -> Self {
        let mut properties = HashMap::new();
        let mut required = Vec::new();
        for argument in arguments {
            let mut inner_map: HashMap<String, Value> = HashMap::new();
            inner_map.insert("type".to_string(), argument.r#type.into());
            inner_map.insert("description".to_string(), argument.description.into());
            if argument.required {
                required.push(argument.name.clone());
            }
            properties.insert(argument.name, inner_map);
        }
        InputSchema {
            r#type: "object".to_string(),
            properties,
            required,
        }
    }

    /// A schema for tools that take no arguments.
    pub fn empty() -> Self {
        InputSchema::new(Vec::new())
    }

    /// Checks that required arguments are present and declared ones have the right type.
    ///
    /// Undeclared arguments pass through untouched.
    ///
    /// ```
    /// use termcp::mcp::tools::{Argument, InputSchema};
    /// use serde_json::json;
    /// use std::collections::HashMap;
    ///
    /// let schema = InputSchema::new(vec![Argument::new("terminalId", "integer", "Terminal", true)]);
    /// let mut args = HashMap::new();
    /// assert!(schema.validate(&args).is_err());
    /// args.insert("terminalId".to_string(), json!("one"));
    /// assert!(schema.validate(&args).is_err());
    /// args.insert("terminalId".to_string(), json!(1));
    /// assert!(schema.validate(&args).is_ok());
    /// ```
    pub fn validate(&self, arguments: &HashMap<String, Value>) -> Result<(), String> {
        for name in &self.required {
            if !arguments.contains_key(name) {
                return Err(format!("missing required argument '{name}'"));
            }
        }
        for (name, value) in arguments {
            let expected = self
                .properties
                .get(name)
                .and_then(|p| p.get("type"))
                .and_then(Value::as_str);
            if let Some(expected) = expected {
                if !matches_type(expected, value) {
                    return Err(format!("argument '{name}' must be of type {expected}"));
                }
            }
        }
        Ok(())
    }
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

/// Parameters of a `tools/call` request.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ToolCallParams {
    pub(crate) name: String,
    pub(crate) arguments: HashMap<String, Value>,
}

impl ToolCallParams {
    /// Extracts `name` and `arguments` from request params.
    ///
    /// `arguments` may be absent or null, which means no arguments.
    pub(crate) fn from_params(params: Option<Value>) -> Result<ToolCallParams, ToolError> {
        let Some(Value::Object(mut params)) = params else {
            return Err(ToolError::InvalidArguments(
                "params must be an object".to_string(),
            ));
        };
        let name = match params.remove("name") {
            Some(Value::String(name)) => name,
            _ => {
                return Err(ToolError::InvalidArguments(
                    "missing tool name".to_string(),
                ));
            }
        };
        let arguments = match params.remove("arguments") {
            None | Some(Value::Null) => HashMap::new(),
            Some(Value::Object(arguments)) => arguments.into_iter().collect(),
            Some(_) => {
                return Err(ToolError::InvalidArguments(
                    "arguments must be an object".to_string(),
                ));
            }
        };
        Ok(ToolCallParams { name, arguments })
    }
}

/// The `tools/call` result.
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ToolCallResponse {
    pub content: Vec<ToolContent>,
}

impl ToolCallResponse {
    /// Wraps a tool's output as a single text block.
    pub fn text(text: String) -> Self {
        ToolCallResponse {
            content: vec![ToolContent::Text(text)],
        }
    }
}

/// Content returned by a tool.
#[derive(Debug, PartialEq)]
#[non_exhaustive]
pub enum ToolContent {
    Text(String),
}

impl Serialize for ToolContent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        match self {
            ToolContent::Text(text) => {
                let mut s = serializer.serialize_struct("ToolContent", 2)?;
                s.serialize_field("type", "text")?;
                s.serialize_field("text", text)?;
                s.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for ToolContent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        use serde::de;
        struct ToolContentVisitor;

        impl<'de> Visitor<'de> for ToolContentVisitor {
            type Value = ToolContent;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a tool content object with type and text")
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut content_type: Option<String> = None;
                let mut text: Option<String> = None;
                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "type" => {
                            if content_type.is_some() {
                                return Err(de::Error::duplicate_field("type"));
                            }
                            content_type = Some(map.next_value()?);
                        }
                        "text" => {
                            if text.is_some() {
                                return Err(de::Error::duplicate_field("text"));
                            }
                            text = Some(map.next_value()?);
                        }
                        _ => {
                            let _: de::IgnoredAny = map.next_value()?;
                        }
                    }
                }
                match content_type.as_deref() {
                    Some("text") => {
                        let text = text.ok_or_else(|| de::Error::missing_field("text"))?;
                        Ok(ToolContent::Text(text))
                    }
                    Some(other) => Err(de::Error::unknown_variant(other, &["text"])),
                    None => Err(de::Error::missing_field("type")),
                }
            }
        }

        deserializer.deserialize_map(ToolContentVisitor)
    }
}

/// A tool built from a closure.
pub struct FnTool<F> {
    name: String,
    description: String,
    input_schema: InputSchema,
    context: ExecutionContext,
    f: F,
}

impl<F> FnTool<F>
where
    F: Fn(HashMap<String, Value>) -> Result<String, ToolCallError> + Send + Sync + 'static,
{
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: InputSchema,
        context: ExecutionContext,
        f: F,
    ) -> Self {
        FnTool {
            name: name.into(),
            description: description.into(),
            input_schema,
            context,
            f,
        }
    }
}

impl<F> Tool for FnTool<F>
where
    F: Fn(HashMap<String, Value>) -> Result<String, ToolCallError> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> InputSchema {
        self.input_schema.clone()
    }

    fn execution_context(&self) -> ExecutionContext {
        self.context
    }

    fn call(&self, params: HashMap<String, Value>) -> Result<String, ToolCallError> {
        (self.f)(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::executor::DedicatedThread;
    use serde_json::json;
    use std::time::Duration;

    fn executor() -> Executor {
        Executor::new(
            Arc::new(DedicatedThread::spawn("tools-test").unwrap()),
            Duration::from_secs(5),
        )
    }

    fn greeter() -> FnTool<impl Fn(HashMap<String, Value>) -> Result<String, ToolCallError> + Send + Sync + 'static> {
        FnTool::new(
            "greet",
            "Greets someone",
            InputSchema::new(vec![
                Argument::new("name", "string", "Who to greet", true),
                Argument::new("times", "integer", "Repeat count", false),
            ]),
            ExecutionContext::Privileged,
            |params| {
                let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
                let times = params.get("times").and_then(Value::as_u64).unwrap_or(1);
                Ok(vec![format!("hello {name}"); times as usize].join(", "))
            },
        )
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(greeter()).unwrap();
        assert_eq!(
            registry.register(greeter()),
            Err(RegistryError::Duplicate("greet".to_string()))
        );
        assert_eq!(registry.list().tools.len(), 1);
    }

    #[test]
    fn list_serializes_schema() {
        let mut registry = ToolRegistry::new();
        registry.register(greeter()).unwrap();
        let value = serde_json::to_value(registry.list()).unwrap();
        assert_eq!(value["tools"][0]["name"], "greet");
        assert_eq!(value["tools"][0]["inputSchema"]["type"], "object");
        assert_eq!(value["tools"][0]["inputSchema"]["required"], json!(["name"]));
        assert_eq!(
            value["tools"][0]["inputSchema"]["properties"]["times"]["type"],
            "integer"
        );
    }

    #[test]
    fn call_runs_the_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(greeter()).unwrap();
        let mut args = HashMap::new();
        args.insert("name".to_string(), json!("world"));
        args.insert("times".to_string(), json!(2));
        assert_eq!(
            registry.call("greet", args, &executor()),
            Ok("hello world, hello world".to_string())
        );
    }

    #[test]
    fn call_validates_arguments() {
        let mut registry = ToolRegistry::new();
        registry.register(greeter()).unwrap();
        let err = registry.call("greet", HashMap::new(), &executor()).unwrap_err();
        assert_eq!(
            err,
            ToolError::InvalidArguments("missing required argument 'name'".to_string())
        );

        let mut args = HashMap::new();
        args.insert("name".to_string(), json!("world"));
        args.insert("times".to_string(), json!(1.5));
        let err = registry.call("greet", args, &executor()).unwrap_err();
        assert_eq!(
            err,
            ToolError::InvalidArguments("argument 'times' must be of type integer".to_string())
        );
    }

    #[test]
    fn unknown_tools_are_not_found() {
        let registry = ToolRegistry::new();
        let err = registry.call("nope", HashMap::new(), &executor()).unwrap_err();
        assert_eq!(err, ToolError::NotFound("nope".to_string()));
        let rpc: crate::jrpc::Error = err.into();
        assert_eq!(rpc.code, crate::jrpc::INTERNAL_ERROR);
        assert!(rpc.message.contains("not found"));
    }

    #[test]
    fn call_params_parsing() {
        let params = ToolCallParams::from_params(Some(json!({"name": "greet"}))).unwrap();
        assert_eq!(params.name, "greet");
        assert!(params.arguments.is_empty());

        let params = ToolCallParams::from_params(Some(
            json!({"name": "greet", "arguments": {"name": "x"}}),
        ))
        .unwrap();
        assert_eq!(params.arguments.get("name"), Some(&json!("x")));

        for bad in [
            None,
            Some(json!([1])),
            Some(json!({})),
            Some(json!({"name": 3})),
            Some(json!({"name": "greet", "arguments": [1]})),
        ] {
            assert!(
                matches!(
                    ToolCallParams::from_params(bad.clone()),
                    Err(ToolError::InvalidArguments(_))
                ),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn content_round_trips_through_json() {
        let response = ToolCallResponse::text("ok".to_string());
        let text = serde_json::to_string(&response).unwrap();
        assert_eq!(text, r#"{"content":[{"type":"text","text":"ok"}]}"#);
        let back: ToolCallResponse = serde_json::from_str(&text).unwrap();
        assert_eq!(back.content, vec![ToolContent::Text("ok".to_string())]);
    }
}
