//! Tool definitions and execution for the repository-reading agent.
//!
//! Results are fed back to the LLM as `tool_result` blocks. A missing file
//! is reported back to the model; a failure to reach the repository at all
//! is returned as an error and ends the task.

use anyhow::Result;
use serde_json::{Value, json};

use crate::github::{GithubRepo, RepoError};
use crate::llm::ToolDef;

pub const READ_FILE: &str = "read_github_file";
pub const LIST_DIRECTORY: &str = "list_github_directory";

/// Text handed back to the model for one tool call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolReply {
    pub content: String,
    pub is_error: bool,
}

impl ToolReply {
    fn ok(content: String) -> Self {
        Self {
            content,
            is_error: false,
        }
    }

    fn error(content: String) -> Self {
        Self {
            content,
            is_error: true,
        }
    }
}

/// Execute a tool call from the LLM against the repository.
pub async fn execute_tool(repo: &GithubRepo, tool_name: &str, input: &Value) -> Result<ToolReply> {
    match tool_name {
        READ_FILE => {
            let Some(path) = input["path"].as_str().filter(|p| !p.trim().is_empty()) else {
                return Ok(ToolReply::error(
                    "Error: 'path' is required, e.g. 'README.md' or 'src/main.py'.".to_string(),
                ));
            };
            match repo.read_file_or_hint(path).await {
                Ok(text) => Ok(ToolReply::ok(text)),
                Err(RepoError::NotFound(p)) => Ok(ToolReply::error(format!(
                    "Error: Could not read file path '{p}'."
                ))),
                Err(e @ RepoError::Access(_)) => Err(e.into()),
            }
        }

        LIST_DIRECTORY => {
            let path = input["path"].as_str().unwrap_or("");
            let listing = repo.describe_directory(path).await?;
            Ok(ToolReply::ok(listing))
        }

        _ => Ok(ToolReply::error(format!(
            "Error: unknown tool '{tool_name}'. Available: {READ_FILE}, {LIST_DIRECTORY}."
        ))),
    }
}

/// Tool definitions for the repository-reading agent.
pub fn repo_tools() -> Vec<ToolDef> {
    vec![
        ToolDef {
            name: READ_FILE.to_string(),
            description: "Reads the contents of a specific file in the provided GitHub repository. Input MUST be the exact file path (e.g. 'README.md' or 'src/main.py').".to_string(),
            input_schema: json!({
                "type": "object",
                "required": ["path"],
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Repository-relative file path"
                    }
                }
            }),
        },
        ToolDef {
            name: LIST_DIRECTORY.to_string(),
            description: "Lists all files and folders in a specific directory of the GitHub repository. Input should be the directory path (use '' for the root directory).".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {
                        "type": "string",
                        "description": "Repository-relative directory path, '' for the root"
                    }
                }
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_names_are_unique_and_schemas_are_objects() {
        let tools = repo_tools();
        assert_eq!(tools.len(), 2);
        assert_ne!(tools[0].name, tools[1].name);
        for t in &tools {
            assert_eq!(t.input_schema["type"], "object");
        }
        assert_eq!(tools[0].input_schema["required"][0], "path");
    }
}
