//! Claude API client with tool-use support.
//!
//! Every agent in the team talks to the same configured model. Callers go
//! through the [`ChatModel`] trait so a run can be driven by any backend
//! that speaks the Messages shape (the HTTP client here, or a scripted
//! model in tests).

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Temperature used by every agent unless configured otherwise.
pub const DEFAULT_TEMPERATURE: f32 = 0.4;

pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

pub const DEFAULT_API_BASE: &str = "https://api.anthropic.com";

pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: MessageContent,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn blocks(role: &str, blocks: Vec<ContentBlock>) -> Self {
        Self {
            role: role.to_string(),
            content: MessageContent::Blocks(blocks),
        }
    }
}

/// Message content: either a simple string or structured blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Extract plain text from the content.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse(ToolUseBlock),
    #[serde(rename = "tool_result")]
    ToolResult(ToolResultBlock),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultBlock {
    pub tool_use_id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

/// Tool definition for Claude.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// Response from Claude API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<String>,
    pub usage: Option<Usage>,
}

impl ApiResponse {
    /// A plain text answer with no tool calls.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::Text { text: text.into() }],
            stop_reason: Some("end_turn".to_string()),
            usage: None,
        }
    }

    /// Concatenated text blocks.
    pub fn joined_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn tool_uses(&self) -> Vec<ToolUseBlock> {
        self.content
            .iter()
            .filter_map(|b| match b {
                ContentBlock::ToolUse(tu) => Some(tu.clone()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Whether the model may call the tools it is shown this turn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ToolChoice {
    #[default]
    Auto,
    /// Tools stay defined (earlier tool blocks need them) but must not be called.
    None,
}

/// Anything that can answer a chat turn for an agent.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Send a conversation and get the model's next turn.
    async fn chat(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolDef],
        choice: ToolChoice,
    ) -> Result<ApiResponse>;
}

/// Claude API client.
pub struct LlmClient {
    api_key: String,
    api_base: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            api_base: DEFAULT_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            http: reqwest::Client::new(),
        }
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request_body(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolDef],
        choice: ToolChoice,
    ) -> Result<serde_json::Value> {
        let mut body = serde_json::json!({
            "model": &self.model,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "system": system,
            "messages": messages,
        });

        if !tools.is_empty() {
            body["tools"] = serde_json::to_value(tools)?;
            if choice == ToolChoice::None {
                body["tool_choice"] = serde_json::json!({ "type": "none" });
            }
        }
        Ok(body)
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn chat(
        &self,
        system: &str,
        messages: &[Message],
        tools: &[ToolDef],
        choice: ToolChoice,
    ) -> Result<ApiResponse> {
        let body = self.request_body(system, messages, tools, choice)?;

        let resp = self
            .http
            .post(format!("{}/v1/messages", self.api_base))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .context("Failed to call Claude API")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Claude API error {status}: {body}");
        }

        let parsed = resp
            .json::<ApiResponse>()
            .await
            .context("Failed to parse Claude response")?;
        if let Some(ref usage) = parsed.usage {
            tracing::debug!(
                model = %self.model,
                input_tokens = usage.input_tokens,
                output_tokens = usage.output_tokens,
                "Claude turn complete"
            );
        }
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_carries_temperature_and_omits_empty_tools() {
        let client = LlmClient::new("k".into()).with_model("m");
        let body = client
            .request_body("sys", &[Message::user("hi")], &[], ToolChoice::Auto)
            .unwrap();
        assert_eq!(body["model"], "m");
        assert_eq!(body["max_tokens"], DEFAULT_MAX_TOKENS);
        assert!((body["temperature"].as_f64().unwrap() - 0.4).abs() < 1e-6);
        assert!(body.get("tools").is_none());
        assert_eq!(body["messages"][0]["content"], "hi");
    }

    #[test]
    fn closing_turn_keeps_tools_but_forbids_calls() {
        let client = LlmClient::new("k".into()).with_max_tokens(1024);
        let tool = ToolDef {
            name: "read_github_file".into(),
            description: "Read a file".into(),
            input_schema: serde_json::json!({"type": "object"}),
        };
        let history = [
            Message::user("Draft the architecture."),
            Message::blocks(
                "assistant",
                vec![ContentBlock::ToolUse(ToolUseBlock {
                    id: "t1".into(),
                    name: "read_github_file".into(),
                    input: serde_json::json!({"path": "README.md"}),
                })],
            ),
            Message::blocks(
                "user",
                vec![ContentBlock::ToolResult(ToolResultBlock {
                    tool_use_id: "t1".into(),
                    content: "# Widgets".into(),
                    is_error: None,
                })],
            ),
        ];

        let open = client
            .request_body("sys", &history, std::slice::from_ref(&tool), ToolChoice::Auto)
            .unwrap();
        assert_eq!(open["tools"][0]["name"], "read_github_file");
        assert!(open.get("tool_choice").is_none());

        let closing = client
            .request_body("sys", &history, std::slice::from_ref(&tool), ToolChoice::None)
            .unwrap();
        assert_eq!(closing["tools"][0]["name"], "read_github_file");
        assert_eq!(closing["tool_choice"], serde_json::json!({"type": "none"}));
        assert_eq!(closing["messages"][1]["content"][0]["type"], "tool_use");
        assert_eq!(closing["max_tokens"], 1024);
    }

    #[test]
    fn api_base_drops_trailing_slash() {
        let client = LlmClient::new("k".into()).with_api_base("http://127.0.0.1:9000/");
        assert_eq!(client.api_base, "http://127.0.0.1:9000");
    }

    #[test]
    fn response_splits_text_and_tool_uses() {
        let raw = serde_json::json!({
            "content": [
                {"type": "text", "text": "Let me look. "},
                {"type": "tool_use", "id": "t1", "name": "list_directory", "input": {"path": ""}},
                {"type": "text", "text": "Done."}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 10, "output_tokens": 5}
        });
        let resp: ApiResponse = serde_json::from_value(raw).unwrap();
        assert_eq!(resp.joined_text(), "Let me look. Done.");
        let uses = resp.tool_uses();
        assert_eq!(uses.len(), 1);
        assert_eq!(uses[0].name, "list_directory");
        assert_eq!(uses[0].input["path"], "");
    }

    #[test]
    fn tool_result_skips_missing_error_flag() {
        let block = ContentBlock::ToolResult(ToolResultBlock {
            tool_use_id: "t1".into(),
            content: "ok".into(),
            is_error: None,
        });
        let v = serde_json::to_value(&block).unwrap();
        assert_eq!(v["type"], "tool_result");
        assert!(v.get("is_error").is_none());
    }
}
