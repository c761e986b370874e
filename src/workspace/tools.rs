use super::{FocusTarget, Workspace};
use crate::mcp::executor::ExecutionContext;
use crate::mcp::tools::{Argument, InputSchema, Tool, ToolCallError};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

fn u64_argument(
    params: &HashMap<String, Value>,
    name: &str,
) -> Result<Option<u64>, ToolCallError> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_u64()
            .map(Some)
            .ok_or_else(|| ToolCallError::new(format!("{name} must be a non-negative integer"))),
    }
}

fn str_argument<'a>(params: &'a HashMap<String, Value>, name: &str) -> Result<&'a str, ToolCallError> {
    params
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolCallError::new(format!("Missing required parameter: {name}")))
}

/// `list_sessions`: the window/page/panel/tab tree as pretty-printed JSON.
pub struct ListSessions {
    workspace: Arc<dyn Workspace>,
}

impl ListSessions {
    pub fn new(workspace: Arc<dyn Workspace>) -> Self {
        ListSessions { workspace }
    }
}

impl Tool for ListSessions {
    fn name(&self) -> &str {
        "list_sessions"
    }

    fn description(&self) -> &str {
        "Lists every terminal window with its pages, split panels and tabs.
        Each tab reports its terminalId, which `send_input` accepts, and whether it is active."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::empty()
    }

    fn execution_context(&self) -> ExecutionContext {
        ExecutionContext::Privileged
    }

    fn call(&self, _params: HashMap<String, Value>) -> Result<String, ToolCallError> {
        let windows = self.workspace.list_sessions()?;
        serde_json::to_string_pretty(&windows).map_err(|e| ToolCallError::new(e.to_string()))
    }
}

/// `switch_focus`: brings a page or tab to the front.
pub struct SwitchFocus {
    workspace: Arc<dyn Workspace>,
}

impl SwitchFocus {
    pub fn new(workspace: Arc<dyn Workspace>) -> Self {
        SwitchFocus { workspace }
    }
}

impl Tool for SwitchFocus {
    fn name(&self) -> &str {
        "switch_focus"
    }

    fn description(&self) -> &str {
        "Focuses a page or a tab. Ids come from `list_sessions`.
        Without windowNumber the currently focused window is used."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new(vec![
            Argument::new("target", "string", "What to focus: \"page\" or \"tab\"", true),
            Argument::new("id", "string", "Id of the page or tab", true),
            Argument::new("windowNumber", "integer", "Window containing the target", false),
        ])
    }

    fn execution_context(&self) -> ExecutionContext {
        ExecutionContext::Privileged
    }

    fn call(&self, params: HashMap<String, Value>) -> Result<String, ToolCallError> {
        let target = str_argument(&params, "target")?;
        let id = str_argument(&params, "id")?;
        let target = FocusTarget::parse(target, id).ok_or_else(|| {
            ToolCallError::new(format!("target must be \"page\" or \"tab\", got \"{target}\""))
        })?;
        let window = u64_argument(&params, "windowNumber")?;
        let message = format!("Focused {target}");
        self.workspace.switch_focus(target, window)?;
        Ok(message)
    }
}

/// `send_input`: types text into a terminal.
pub struct SendInput {
    workspace: Arc<dyn Workspace>,
}

impl SendInput {
    pub fn new(workspace: Arc<dyn Workspace>) -> Self {
        SendInput { workspace }
    }
}

impl Tool for SendInput {
    fn name(&self) -> &str {
        "send_input"
    }

    fn description(&self) -> &str {
        "Sends text to a terminal as if typed. Set pressEnter to submit it as a command."
    }

    fn input_schema(&self) -> InputSchema {
        InputSchema::new(vec![
            Argument::new("terminalId", "integer", "Terminal to write to, from `list_sessions`", true),
            Argument::new("text", "string", "Text to send", true),
            Argument::new("pressEnter", "boolean", "Press Enter after the text (default false)", false),
        ])
    }

    fn execution_context(&self) -> ExecutionContext {
        ExecutionContext::Privileged
    }

    fn call(&self, params: HashMap<String, Value>) -> Result<String, ToolCallError> {
        let terminal_id = u64_argument(&params, "terminalId")?
            .ok_or_else(|| ToolCallError::new("Missing required parameter: terminalId"))?;
        let text = str_argument(&params, "text")?;
        let press_enter = params
            .get("pressEnter")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        self.workspace.send_input(terminal_id, text, press_enter)?;
        Ok(format!(
            "Sent {} bytes to terminal {terminal_id}{}",
            text.len(),
            if press_enter { " and pressed Enter" } else { "" }
        ))
    }
}
