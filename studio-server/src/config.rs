//! Server configuration, from flags or environment.

use clap::Parser;

use studio_agents::{github, llm, pipeline};

#[derive(Parser, Debug, Clone)]
#[command(name = "studio-server", about = "Architecture studio backend")]
pub struct ServerConfig {
    /// Address for the HTTP API
    #[arg(long, env = "STUDIO_LISTEN", default_value = "127.0.0.1:8000")]
    pub listen_addr: String,

    /// SQLite database path (":memory:" keeps everything in RAM)
    #[arg(long, env = "STUDIO_DB", default_value = "studio.db")]
    pub db_path: String,

    /// Anthropic API key (or set ANTHROPIC_API_KEY env var)
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    pub anthropic_api_key: String,

    /// Claude model every agent uses
    #[arg(long, env = "STUDIO_MODEL", default_value = llm::DEFAULT_MODEL)]
    pub model: String,

    /// Token cap for each model turn
    #[arg(long, env = "STUDIO_MAX_TOKENS", default_value_t = llm::DEFAULT_MAX_TOKENS)]
    pub max_tokens: u32,

    /// Anthropic API base URL
    #[arg(long, env = "ANTHROPIC_API_URL", default_value = llm::DEFAULT_API_BASE)]
    pub anthropic_api_url: String,

    /// Sampling temperature
    #[arg(long, default_value_t = llm::DEFAULT_TEMPERATURE)]
    pub temperature: f32,

    /// Tool rounds the architect gets before it must answer
    #[arg(long, default_value_t = pipeline::DEFAULT_MAX_TOOL_ROUNDS)]
    pub max_tool_rounds: usize,

    /// GitHub token (or set GITHUB_PERSONAL_ACCESS_TOKEN env var)
    #[arg(long, env = "GITHUB_PERSONAL_ACCESS_TOKEN", hide_env_values = true)]
    pub github_token: Option<String>,

    /// GitHub API base URL
    #[arg(long, env = "GITHUB_API_URL", default_value = github::DEFAULT_API_BASE)]
    pub github_api_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8000".to_string(),
            db_path: ":memory:".to_string(),
            anthropic_api_key: String::new(),
            model: llm::DEFAULT_MODEL.to_string(),
            max_tokens: llm::DEFAULT_MAX_TOKENS,
            anthropic_api_url: llm::DEFAULT_API_BASE.to_string(),
            temperature: llm::DEFAULT_TEMPERATURE,
            max_tool_rounds: pipeline::DEFAULT_MAX_TOOL_ROUNDS,
            github_token: None,
            github_api_url: github::DEFAULT_API_BASE.to_string(),
        }
    }
}
