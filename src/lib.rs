/*!
An embeddable Model Context Protocol (MCP) server for terminal applications.

termcp lets a terminal emulator expose its windows, tabs and shells to AI agents.
It speaks the MCP "Streamable HTTP" transport over a plain TCP socket: one endpoint,
JSON-RPC 2.0 in `POST` bodies, sessions identified by the `Mcp-Session-Id` header.

# Overview

The server is small on purpose. It needs no async runtime: the accept loop and each
client connection get their own thread, and tool calls block the connection that made
them until they finish or time out. Threads for everyone.

Tools that touch UI state can't run on a connection thread. Each tool declares an
[`ExecutionContext`](mcp::executor::ExecutionContext); privileged tools are handed to a
[`PrivilegedContext`](mcp::executor::PrivilegedContext) the host provides, usually a
shim that posts the job to its main thread.

# Quick Start

## Serving the workspace tools

```no_run
use termcp::config::Config;
use termcp::mcp::tools::ToolRegistry;
use termcp::server::Server;
use termcp::workspace::{self, FocusTarget, WindowInfo, Workspace};
use std::sync::Arc;

struct MyTerminal;

impl Workspace for MyTerminal {
    fn list_sessions(&self) -> Result<Vec<WindowInfo>, String> {
        Ok(Vec::new())
    }

    fn switch_focus(&self, target: FocusTarget, window: Option<u64>) -> Result<(), String> {
        Err(format!("can't focus {target} in {window:?}"))
    }

    fn send_input(&self, terminal_id: u64, text: &str, press_enter: bool) -> Result<(), String> {
        Ok(())
    }
}

let mut registry = ToolRegistry::new();
workspace::register_tools(&mut registry, Arc::new(MyTerminal)).unwrap();

// binds 127.0.0.1:11218
let server = Server::with_dedicated_thread(Config::default(), registry).unwrap();
# drop(server);
```

## Adding a tool of your own

```
use termcp::mcp::executor::ExecutionContext;
use termcp::mcp::tools::{Argument, FnTool, InputSchema, ToolRegistry};

let mut registry = ToolRegistry::new();
registry
    .register(FnTool::new(
        "hello",
        "Greets a user by name",
        InputSchema::new(vec![Argument::new("name", "string", "Name to greet", true)]),
        ExecutionContext::Any,
        |params| {
            let name = params.get("name").and_then(|v| v.as_str()).unwrap_or("stranger");
            Ok(format!("Hello, {name}!"))
        },
    ))
    .unwrap();
```

# Architecture

## Why not keep one connection per session?

Clients are free to open a new TCP connection for every request, or to pipeline
several requests over one connection. Sessions live in a shared
[`SessionStore`](session::SessionStore) and connections only carry bytes.

## What happens to a tool call that takes too long?

The connection stops waiting after the configured tool timeout and answers with a
`-32603` error. The tool itself is not interrupted; its eventual result is dropped.

# Logging

termcp logs through [logwise](https://docs.rs/logwise). Peer addresses, session ids
and error details are wrapped in `logwise::privacy::LogIt`.

# Module Organization

- [`config`] - Listener address, timeouts and limits
- [`http`] - Request framing, parsing and response serialization
- [`jrpc`] - JSON-RPC 2.0 envelopes and error codes
- [`mcp`] - Method dispatch, the tool registry and the tool executor
- [`session`] - Session tokens
- [`server`] - Accept loop and per-connection threads
- [`workspace`] - The terminal workspace trait and its built-in tools
*/
pub mod config;
pub mod http;
pub mod jrpc;
pub mod mcp;
pub mod server;
pub mod session;
pub mod workspace;

pub use config::Config;
pub use server::Server;
