//! The read-only safety policy: fixed model instructions plus a structural
//! allow-list over tool names.

use crate::core::config::PolicyConfig;
use std::collections::HashSet;

/// Name prefixes the GitHub tool server uses for operations that only read.
pub const READ_ONLY_PREFIXES: &[&str] = &["get_", "list_", "search_", "read_"];

pub const READ_ONLY_REFUSAL: &str = "I can't do that. I only have read-only access to GitHub, so I can't create, delete, rename, or modify repositories, branches, files, or settings. I can list repositories, search code, read issues and pull requests, and show repository contents.";

/// System instructions bound to every agent. Credentials and host names are
/// never interpolated here.
pub const SAFETY_INSTRUCTIONS: &str = "You are a helpful assistant that helps people find information.
You can use MCP tools from the GitHub MCP server to search repositories,
code, and other GitHub data. Prefer concise answers in a few lines.

READ-ONLY ACCESS ONLY:
- Treat every GitHub tool as read-only.
- Do not create, delete, or rename repositories.
- Do not write, update, or modify any files, branches, or settings in any repository.
- Only perform read operations such as listing repositories, searching code,
  reading issues and pull requests, and viewing repository metadata or file contents.
- If the user asks for any write, create, delete, rename, or modify action, refuse
  and explain that you have read-only access to GitHub.
- Never claim that a write succeeded.

WHEN A TOOL CALL FAILS:
- Do not show raw error text, stack traces, or protocol payloads.
- Summarize the problem in plain language.
- If a repository is empty (for example \"Git Repository is empty\"), say that it
  currently has no commits or content to list, and stop.
- Do not call the same tool with the same arguments again after it failed.
- If a repository, branch, or path is missing or inaccessible, say so and suggest
  checking the repository name, the branch, or the user's permissions.";

/// Decides which catalog tools the model may see and call.
#[derive(Debug, Clone)]
pub struct ToolPolicy {
    enforce_read_only: bool,
    allowed: HashSet<String>,
    blocked: HashSet<String>,
}

impl ToolPolicy {
    pub fn from_config(config: &PolicyConfig) -> Self {
        Self {
            enforce_read_only: config.enforce_read_only,
            allowed: config.allowed_tools.iter().cloned().collect(),
            blocked: config.blocked_tools.iter().cloned().collect(),
        }
    }

    /// Policy that only consults the block list.
    pub fn permissive() -> Self {
        Self {
            enforce_read_only: false,
            allowed: HashSet::new(),
            blocked: HashSet::new(),
        }
    }

    pub fn permits(&self, tool_name: &str) -> bool {
        if self.blocked.contains(tool_name) {
            return false;
        }
        if !self.enforce_read_only {
            return true;
        }
        self.allowed.contains(tool_name) || is_read_only_name(tool_name)
    }
}

impl Default for ToolPolicy {
    fn default() -> Self {
        Self::from_config(&PolicyConfig::default())
    }
}

pub fn is_read_only_name(tool_name: &str) -> bool {
    let lower = tool_name.to_ascii_lowercase();
    READ_ONLY_PREFIXES
        .iter()
        .any(|prefix| lower.starts_with(prefix))
}
