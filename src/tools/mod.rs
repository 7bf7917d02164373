//! Local tool execution.
//!
//! - [`Tool`]: the plugin seam; each tool validates and runs one kind of request.
//! - [`ToolRegistry`]: name → tool lookup.
//! - [`coordinator`]: drives one tool request through its status lifecycle
//!   and yields client-facing status updates.
//! - [`fs`]: built-in workspace-confined file tools.

pub mod coordinator;
pub mod fs;
pub mod path_safety;

use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};
use std::path::Path;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use crate::{AppError, Result};

pub use coordinator::{
    ToolCallContent, ToolCallStatus, ToolCallUpdate, ToolCoordinator, ToolExecution, ToolInvocation,
};

/// Structured tool failure, reported to the client and fed back to the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum ToolError {
    /// No tool is registered under the requested name.
    NotFound(String),
    /// The tool rejected its input.
    InvalidInput(String),
    /// The tool failed while running.
    Runtime(String),
}

impl Display for ToolError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(msg) => write!(f, "tool not found: {msg}"),
            Self::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            Self::Runtime(msg) => write!(f, "tool error: {msg}"),
        }
    }
}

impl std::error::Error for ToolError {}

/// Successful tool output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    /// Text returned to the model.
    pub text: String,
}

impl ToolOutput {
    /// Text output.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Ambient information handed to a running tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolContext {
    /// Session the invocation belongs to.
    pub session_id: String,
    /// Backend tool-use identifier.
    pub tool_call_id: String,
}

/// A locally executable tool.
///
/// `call` returns a `'static` future so the coordinator can run it on its
/// own task; a tool that is abandoned mid-flight keeps running and its
/// result is discarded.
pub trait Tool: Send + Sync {
    /// Name the model uses to request this tool.
    fn name(&self) -> &str;

    /// One-line description.
    fn description(&self) -> &str;

    /// Reject malformed input before any side effect.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidInput`] for unusable input. The default
    /// accepts any JSON object.
    fn validate_input(&self, input: &Value) -> std::result::Result<(), ToolError> {
        if input.is_object() {
            Ok(())
        } else {
            Err(ToolError::InvalidInput("input must be a JSON object".into()))
        }
    }

    /// Run the tool.
    fn call(
        &self,
        input: Value,
        context: ToolContext,
    ) -> BoxFuture<'static, std::result::Result<ToolOutput, ToolError>>;
}

/// Registered tools, keyed by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in [`fs`] tools confined to `workspace_root`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Tool` if a built-in name collides (never for a
    /// fresh registry).
    pub fn with_builtin_tools(workspace_root: &Path) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(fs::ReadFileTool::new(workspace_root)))?;
        registry.register(Arc::new(fs::ListDirectoryTool::new(workspace_root)))?;
        Ok(registry)
    }

    /// Add a tool.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Tool` if the name is empty or already registered.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.name().to_owned();
        if name.trim().is_empty() {
            return Err(AppError::Tool("tool name must not be empty".into()));
        }
        if self.tools.contains_key(&name) {
            return Err(AppError::Tool(format!("tool '{name}' already registered")));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Debug for ToolRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
