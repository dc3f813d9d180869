//! File tools: list, read, write, append, delete, mkdir inside a workspace.
//!
//! Listing, reading and writing also leave a `system` note in the run's
//! memory so later prompts can see what the agent already touched.

use async_trait::async_trait;
use gamekit_core::action::{
    Action, ActionCall, ActionHandler, Dependencies, ParamType, ParameterSchema,
};
use gamekit_core::error::ToolError;
use gamekit_core::memory::MemoryEntry;
use serde_json::Value;
use std::io::ErrorKind;
use std::sync::Arc;
use tracing::debug;

use crate::workspace::Workspace;

const TAGS: [&str; 2] = ["file_operations", "general"];
const FILE_NAME_HELP: &str = "Path of the file, relative to the workspace";

/// Record a file operation in the caller's memory, if a context was injected.
fn note(call: &ActionCall, operation: &str, content: String, file_name: Option<&str>) {
    let Some(context) = call.context.as_ref() else {
        return;
    };
    let mut entry = MemoryEntry::system(content).with_field("operation", operation);
    if let Some(name) = file_name {
        entry = entry.with_field("file_name", name);
    }
    context.memory().add(entry);
}

fn io_failure(tool_name: &str, target: &str, err: std::io::Error) -> ToolError {
    let reason = match err.kind() {
        ErrorKind::NotFound => format!("'{target}' not found"),
        _ => format!("'{target}': {err}"),
    };
    ToolError::ExecutionFailed {
        tool_name: tool_name.into(),
        reason,
    }
}

// ── list_files ──────────────────────────────────────────────────────────

pub struct ListFilesTool {
    workspace: Workspace,
}

impl ListFilesTool {
    pub fn action(workspace: Workspace) -> Action {
        Action::new(
            "list_files",
            "List the files (not directories) in a directory of the workspace.",
            Arc::new(Self { workspace }),
        )
        .with_parameters(ParameterSchema::new().optional(
            "directory",
            ParamType::String,
            "Directory to list, relative to the workspace (default \".\")",
        ))
        .with_tags(TAGS)
        .with_dependencies(Dependencies::context())
    }
}

#[async_trait]
impl ActionHandler for ListFilesTool {
    async fn invoke(&self, call: ActionCall) -> Result<Value, ToolError> {
        let directory = call.opt_str("directory").unwrap_or(".");
        let path = self.workspace.resolve("list_files", directory)?;

        let mut entries = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| io_failure("list_files", directory, e))?;
        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| io_failure("list_files", directory, e))?
        {
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if is_file {
                files.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        files.sort();

        let shown = files.iter().take(10).cloned().collect::<Vec<_>>().join(", ");
        let more = if files.len() > 10 { "..." } else { "" };
        note(
            &call,
            "list_files",
            format!("Directory '{directory}' contains {} files: {shown}{more}", files.len()),
            None,
        );

        Ok(Value::from(files))
    }
}

// ── read_file ───────────────────────────────────────────────────────────

pub struct ReadFileTool {
    workspace: Workspace,
}

impl ReadFileTool {
    pub fn action(workspace: Workspace) -> Action {
        Action::new(
            "read_file",
            "Read the contents of a file in the workspace.",
            Arc::new(Self { workspace }),
        )
        .with_parameters(ParameterSchema::new().required(
            "file_name",
            ParamType::String,
            FILE_NAME_HELP,
        ))
        .with_tags(TAGS)
        .with_dependencies(Dependencies::context())
    }
}

#[async_trait]
impl ActionHandler for ReadFileTool {
    async fn invoke(&self, call: ActionCall) -> Result<Value, ToolError> {
        let file_name = call.str_arg("file_name")?;
        let path = self.workspace.resolve("read_file", file_name)?;

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| io_failure("read_file", file_name, e))?;

        note(
            &call,
            "read_file",
            format!("Read file '{file_name}' ({} characters)", content.chars().count()),
            Some(file_name),
        );
        Ok(Value::String(content))
    }
}

// ── write_file ──────────────────────────────────────────────────────────

pub struct WriteFileTool {
    workspace: Workspace,
}

impl WriteFileTool {
    pub fn action(workspace: Workspace) -> Action {
        Action::new(
            "write_file",
            "Write content to a file. Creates the file (and parent directories) if it doesn't \
             exist, overwrites if it does.",
            Arc::new(Self { workspace }),
        )
        .with_parameters(
            ParameterSchema::new()
                .required("file_name", ParamType::String, FILE_NAME_HELP)
                .required("content", ParamType::String, "The content to write"),
        )
        .with_tags(TAGS)
        .with_dependencies(Dependencies::context())
    }
}

#[async_trait]
impl ActionHandler for WriteFileTool {
    async fn invoke(&self, call: ActionCall) -> Result<Value, ToolError> {
        let file_name = call.str_arg("file_name")?;
        let content = call.str_arg("content")?;
        let path = self.workspace.resolve("write_file", file_name)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_failure("write_file", file_name, e))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| io_failure("write_file", file_name, e))?;

        debug!(file = %path.display(), bytes = content.len(), "Wrote file");
        note(
            &call,
            "write_file",
            format!(
                "Created/updated file '{file_name}' with {} characters",
                content.chars().count()
            ),
            Some(file_name),
        );
        Ok(Value::String(format!("File '{file_name}' written successfully.")))
    }
}

// ── append_to_file ──────────────────────────────────────────────────────

pub struct AppendToFileTool {
    workspace: Workspace,
}

impl AppendToFileTool {
    pub fn action(workspace: Workspace) -> Action {
        Action::new(
            "append_to_file",
            "Append content to the end of a file, creating it if needed.",
            Arc::new(Self { workspace }),
        )
        .with_parameters(
            ParameterSchema::new()
                .required("file_name", ParamType::String, FILE_NAME_HELP)
                .required("content", ParamType::String, "The content to append"),
        )
        .with_tags(TAGS)
    }
}

#[async_trait]
impl ActionHandler for AppendToFileTool {
    async fn invoke(&self, call: ActionCall) -> Result<Value, ToolError> {
        use tokio::io::AsyncWriteExt;

        let file_name = call.str_arg("file_name")?;
        let content = call.str_arg("content")?;
        let path = self.workspace.resolve("append_to_file", file_name)?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| io_failure("append_to_file", file_name, e))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| io_failure("append_to_file", file_name, e))?;

        Ok(Value::String(format!(
            "Content appended to file '{file_name}' successfully."
        )))
    }
}

// ── delete_file ─────────────────────────────────────────────────────────

pub struct DeleteFileTool {
    workspace: Workspace,
}

impl DeleteFileTool {
    pub fn action(workspace: Workspace) -> Action {
        Action::new(
            "delete_file",
            "Delete a file from the workspace.",
            Arc::new(Self { workspace }),
        )
        .with_parameters(ParameterSchema::new().required(
            "file_name",
            ParamType::String,
            FILE_NAME_HELP,
        ))
        .with_tags(TAGS)
    }
}

#[async_trait]
impl ActionHandler for DeleteFileTool {
    async fn invoke(&self, call: ActionCall) -> Result<Value, ToolError> {
        let file_name = call.str_arg("file_name")?;
        let path = self.workspace.resolve("delete_file", file_name)?;

        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| io_failure("delete_file", file_name, e))?;

        Ok(Value::String(format!("File '{file_name}' deleted successfully.")))
    }
}

// ── create_directory ────────────────────────────────────────────────────

pub struct CreateDirectoryTool {
    workspace: Workspace,
}

impl CreateDirectoryTool {
    pub fn action(workspace: Workspace) -> Action {
        Action::new(
            "create_directory",
            "Create a directory (and any missing parents) in the workspace.",
            Arc::new(Self { workspace }),
        )
        .with_parameters(ParameterSchema::new().required(
            "directory_name",
            ParamType::String,
            "Directory to create, relative to the workspace",
        ))
        .with_tags(TAGS)
    }
}

#[async_trait]
impl ActionHandler for CreateDirectoryTool {
    async fn invoke(&self, call: ActionCall) -> Result<Value, ToolError> {
        let directory = call.str_arg("directory_name")?;
        let path = self.workspace.resolve("create_directory", directory)?;

        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| io_failure("create_directory", directory, e))?;

        Ok(Value::String(format!("Directory '{directory}' created successfully.")))
    }
}

/// Every file tool, rooted at `workspace`.
pub fn file_actions(workspace: &Workspace) -> Vec<Action> {
    vec![
        ListFilesTool::action(workspace.clone()),
        ReadFileTool::action(workspace.clone()),
        WriteFileTool::action(workspace.clone()),
        AppendToFileTool::action(workspace.clone()),
        DeleteFileTool::action(workspace.clone()),
        CreateDirectoryTool::action(workspace.clone()),
    ]
}
