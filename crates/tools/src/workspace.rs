//! Workspace root for file tools, with path validation.

use std::path::{Component, Path, PathBuf};

use gamekit_core::error::ToolError;

/// A directory every file tool operates inside.
///
/// Paths handed to tools are interpreted relative to the root. Absolute
/// paths and any `..` component are rejected before touching the disk.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a tool-supplied path against the root.
    pub fn resolve(&self, tool_name: &str, path: &str) -> Result<PathBuf, ToolError> {
        let normalized = path.replace('\\', "/");
        let relative = Path::new(&normalized);

        for component in relative.components() {
            match component {
                Component::Normal(_) | Component::CurDir => {}
                Component::ParentDir => {
                    return Err(ToolError::PermissionDenied {
                        tool_name: tool_name.into(),
                        reason: format!("path traversal detected: {path}"),
                    });
                }
                Component::RootDir | Component::Prefix(_) => {
                    return Err(ToolError::PermissionDenied {
                        tool_name: tool_name.into(),
                        reason: format!("absolute paths are not allowed: {path}"),
                    });
                }
            }
        }

        Ok(self.root.join(relative))
    }
}
