//! Built-in file tools confined to the workspace root.

use std::path::{Path, PathBuf};

use futures_util::future::BoxFuture;
use serde::Deserialize;
use serde_json::Value;

use super::path_safety::resolve_in_workspace;
use super::{Tool, ToolContext, ToolError, ToolOutput};

/// Largest file `read_file` returns in full.
pub const MAX_READ_BYTES: u64 = 1_048_576;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReadFileInput {
    path: String,
    /// 1-based first line to return.
    #[serde(default)]
    offset: Option<usize>,
    /// Maximum number of lines to return.
    #[serde(default)]
    limit: Option<usize>,
}

/// `read_file`: return a UTF-8 file's contents, optionally a line window.
#[derive(Debug, Clone)]
pub struct ReadFileTool {
    root: PathBuf,
}

impl ReadFileTool {
    /// Tool confined to `root`.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a text file inside the workspace"
    }

    fn validate_input(&self, input: &Value) -> Result<(), ToolError> {
        let parsed: ReadFileInput = serde_json::from_value(input.clone())
            .map_err(|e| ToolError::InvalidInput(e.to_string()))?;
        if parsed.path.trim().is_empty() {
            return Err(ToolError::InvalidInput("path must not be empty".into()));
        }
        if parsed.offset == Some(0) {
            return Err(ToolError::InvalidInput("offset is 1-based".into()));
        }
        Ok(())
    }

    fn call(
        &self,
        input: Value,
        _context: ToolContext,
    ) -> BoxFuture<'static, Result<ToolOutput, ToolError>> {
        let root = self.root.clone();
        Box::pin(async move {
            let parsed: ReadFileInput = serde_json::from_value(input)
                .map_err(|e| ToolError::InvalidInput(e.to_string()))?;
            let path = resolve_in_workspace(&root, &parsed.path)
                .map_err(|e| ToolError::InvalidInput(e.to_string()))?;

            let metadata = tokio::fs::metadata(&path)
                .await
                .map_err(|e| ToolError::Runtime(format!("{}: {e}", parsed.path)))?;
            if !metadata.is_file() {
                return Err(ToolError::Runtime(format!("{} is not a file", parsed.path)));
            }
            if metadata.len() > MAX_READ_BYTES {
                return Err(ToolError::Runtime(format!(
                    "{} exceeds {MAX_READ_BYTES} bytes",
                    parsed.path
                )));
            }

            let contents = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| ToolError::Runtime(format!("{}: {e}", parsed.path)))?;

            if parsed.offset.is_none() && parsed.limit.is_none() {
                return Ok(ToolOutput::text(contents));
            }

            let skip = parsed.offset.map_or(0, |o| o - 1);
            let take = parsed.limit.unwrap_or(usize::MAX);
            let window: Vec<&str> = contents.lines().skip(skip).take(take).collect();
            Ok(ToolOutput::text(window.join("\n")))
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListDirectoryInput {
    #[serde(default)]
    path: Option<String>,
}

/// `list_directory`: sorted entries of a workspace directory, directories
/// suffixed with `/`.
#[derive(Debug, Clone)]
pub struct ListDirectoryTool {
    root: PathBuf,
}

impl ListDirectoryTool {
    /// Tool confined to `root`.
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }
}

impl Tool for ListDirectoryTool {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "List the entries of a directory inside the workspace"
    }

    fn validate_input(&self, input: &Value) -> Result<(), ToolError> {
        serde_json::from_value::<ListDirectoryInput>(input.clone())
            .map(|_| ())
            .map_err(|e| ToolError::InvalidInput(e.to_string()))
    }

    fn call(
        &self,
        input: Value,
        _context: ToolContext,
    ) -> BoxFuture<'static, Result<ToolOutput, ToolError>> {
        let root = self.root.clone();
        Box::pin(async move {
            let parsed: ListDirectoryInput = serde_json::from_value(input)
                .map_err(|e| ToolError::InvalidInput(e.to_string()))?;
            let relative = parsed.path.unwrap_or_else(|| ".".to_owned());
            let path = resolve_in_workspace(&root, &relative)
                .map_err(|e| ToolError::InvalidInput(e.to_string()))?;

            let mut reader = tokio::fs::read_dir(&path)
                .await
                .map_err(|e| ToolError::Runtime(format!("{relative}: {e}")))?;

            let mut entries = Vec::new();
            while let Some(entry) = reader
                .next_entry()
                .await
                .map_err(|e| ToolError::Runtime(format!("{relative}: {e}")))?
            {
                let mut name = entry.file_name().to_string_lossy().into_owned();
                let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
                if is_dir {
                    name.push('/');
                }
                entries.push(name);
            }
            entries.sort();
            Ok(ToolOutput::text(entries.join("\n")))
        })
    }
}
