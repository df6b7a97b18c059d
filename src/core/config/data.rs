use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_TOOL_SERVER_COMMAND: &str = "npx";
pub const DEFAULT_TOOL_SERVER_PACKAGE: &str = "@modelcontextprotocol/server-github";
pub const DEFAULT_HOST: &str = "github.com";
pub const DEFAULT_TOKEN_ENV: &str = "GITHUB_ACCESS_TOKEN";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

pub const DEFAULT_MODEL_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o";
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 8;
pub const DEFAULT_MODEL_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub tool_server: ToolServerConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
}

/// How to launch the GitHub MCP server.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ToolServerConfig {
    pub command: String,
    pub args: Vec<String>,
    /// GitHub or GitHub Enterprise host handed to the server as `GH_HOST`.
    pub host: String,
    /// Name of the variable holding the access token. The token itself never
    /// lives in the config file.
    pub token_env: String,
    /// Extra variables for the child process.
    pub env: HashMap<String, String>,
    /// Per-request deadline; 0 disables it.
    pub request_timeout_secs: u64,
    pub protocol_version: Option<String>,
}

impl Default for ToolServerConfig {
    fn default() -> Self {
        Self {
            command: DEFAULT_TOOL_SERVER_COMMAND.to_string(),
            args: vec!["-y".to_string(), DEFAULT_TOOL_SERVER_PACKAGE.to_string()],
            host: DEFAULT_HOST.to_string(),
            token_env: DEFAULT_TOKEN_ENV.to_string(),
            env: HashMap::new(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            protocol_version: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of an OpenAI-compatible API, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub model: String,
    pub api_key_env: String,
    /// Model round-trips allowed per turn before giving up.
    pub max_tool_rounds: usize,
    pub request_timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_MODEL_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
            request_timeout_secs: DEFAULT_MODEL_TIMEOUT_SECS,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PolicyConfig {
    /// Offer only tools whose names mark them as reads.
    pub enforce_read_only: bool,
    /// Tools permitted even without a read prefix.
    pub allowed_tools: Vec<String>,
    /// Tools never offered, whatever their name.
    pub blocked_tools: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            enforce_read_only: true,
            allowed_tools: Vec::new(),
            blocked_tools: Vec::new(),
        }
    }
}

pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}
