//! The terminal workspace the built-in tools operate on.
//!
//! The host application owns its windows, pages, panels and tabs; this crate
//! only sees them through the [`Workspace`] trait. [`register_tools`] exposes a
//! workspace to MCP clients as the `list_sessions`, `switch_focus` and
//! `send_input` tools. All three run in the privileged execution context,
//! since workspace state normally belongs to the UI thread.
//!
//! The layout is a tree:
//!
//! ```text
//! window
//! └── page (one per window tab)
//!     └── panel (split pane)
//!         └── tab (backed by a terminal)
//! ```

mod tools;

pub use tools::{ListSessions, SendInput, SwitchFocus};

use crate::mcp::tools::{RegistryError, ToolRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A top-level window and its pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowInfo {
    pub number: u64,
    pub pages: Vec<PageInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub id: String,
    pub title: String,
    pub active: bool,
    pub panels: Vec<PanelInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelInfo {
    pub id: String,
    pub tabs: Vec<TabInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TabInfo {
    pub id: String,
    pub title: String,
    pub active: bool,
    /// The terminal behind the tab, if it has one yet.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub terminal_id: Option<u64>,
}

/// What `switch_focus` should bring to the front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FocusTarget {
    Page(String),
    Tab(String),
}

impl FocusTarget {
    /// Builds a target from the tool's `target` and `id` arguments.
    pub fn parse(target: &str, id: &str) -> Option<FocusTarget> {
        match target {
            "page" => Some(FocusTarget::Page(id.to_string())),
            "tab" => Some(FocusTarget::Tab(id.to_string())),
            _ => None,
        }
    }
}

impl std::fmt::Display for FocusTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FocusTarget::Page(id) => write!(f, "page {id}"),
            FocusTarget::Tab(id) => write!(f, "tab {id}"),
        }
    }
}

/// The host's view of its terminal workspace.
///
/// Methods are called from the privileged execution context. Errors are
/// human-readable and are passed to the client as tool failures.
pub trait Workspace: Send + Sync + 'static {
    /// Every window with its full page/panel/tab tree.
    fn list_sessions(&self) -> Result<Vec<WindowInfo>, String>;

    /// Focuses a page or tab, in `window` if given, else in the key window.
    fn switch_focus(&self, target: FocusTarget, window: Option<u64>) -> Result<(), String>;

    /// Writes `text` to a terminal, followed by a carriage return if `press_enter`.
    fn send_input(&self, terminal_id: u64, text: &str, press_enter: bool) -> Result<(), String>;
}

/// Registers `list_sessions`, `switch_focus` and `send_input` backed by `workspace`.
///
/// # Errors
///
/// Fails if the registry already holds a tool with one of these names. Tools
/// registered before the conflicting one stay registered.
pub fn register_tools(
    registry: &mut ToolRegistry,
    workspace: Arc<dyn Workspace>,
) -> Result<(), RegistryError> {
    registry.register(ListSessions::new(Arc::clone(&workspace)))?;
    registry.register(SwitchFocus::new(Arc::clone(&workspace)))?;
    registry.register(SendInput::new(workspace))?;
    Ok(())
}
