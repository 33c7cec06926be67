//! Remote natural-language risk model over an OpenAI-compatible chat endpoint.

use crate::assessment::RiskAssessment;
use crate::selector::FunctionSelector;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

const SYSTEM_PROMPT: &str = "You are a blockchain security expert. Analyze Ethereum function \
selectors (first 4 bytes of calldata) to determine if a transaction could be malicious.

Consider:
- Common attack patterns (reentrancy, unauthorized transfers, approval exploits)
- Suspicious function signatures (transfer, approve, delegatecall, selfdestruct)
- Ownership transfer and proxy upgrade functions
- High-risk operations (token transfers, contract calls, state changes)

Respond in JSON format with exactly these fields:
{
  \"risk\": \"low\" | \"medium\" | \"high\" | \"critical\",
  \"safe\": true | false,
  \"explanation\": \"brief explanation\",
  \"recommendation\": \"what the user should do\"
}";

#[derive(Debug, Error)]
pub enum RemoteModelError {
    #[error("Remote model not configured: {0}")]
    NotConfigured(String),

    #[error("Remote model request failed: {0}")]
    Transport(String),

    #[error("Remote model returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Remote model response unusable: {0}")]
    InvalidResponse(String),
}

/// A classifier that may fail; the caller owns the fallback.
#[async_trait]
pub trait RiskModel: Send + Sync {
    fn name(&self) -> &str;

    async fn assess(&self, selector: &FunctionSelector) -> Result<RiskAssessment, RemoteModelError>;
}

#[derive(Debug, Clone)]
pub struct RemoteModelConfig {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub request_timeout: Duration,
}

impl RemoteModelConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            request_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

pub struct OpenAiRiskModel {
    client: Client,
    config: RemoteModelConfig,
}

impl OpenAiRiskModel {
    pub fn new(config: RemoteModelConfig) -> Result<Self, RemoteModelError> {
        if config.api_key.trim().is_empty() {
            return Err(RemoteModelError::NotConfigured("empty api key".into()));
        }
        reqwest::Url::parse(&config.endpoint).map_err(|e| {
            RemoteModelError::NotConfigured(format!("endpoint '{}': {e}", config.endpoint))
        })?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| RemoteModelError::NotConfigured(format!("http client: {e}")))?;
        Ok(Self { client, config })
    }

    fn payload(&self, selector: &FunctionSelector) -> serde_json::Value {
        json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": format!(
                        "Analyze this function selector: {selector}\n\nIs this transaction safe to sign?"
                    ),
                },
            ],
            "temperature": self.config.temperature,
            "response_format": { "type": "json_object" },
        })
    }
}

#[async_trait]
impl RiskModel for OpenAiRiskModel {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn assess(&self, selector: &FunctionSelector) -> Result<RiskAssessment, RemoteModelError> {
        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&self.payload(selector))
            .send()
            .await
            .map_err(|e| RemoteModelError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(RemoteModelError::Status {
                status,
                body: truncate(&body, 320),
            });
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| RemoteModelError::InvalidResponse(e.to_string()))?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| RemoteModelError::InvalidResponse("no message content".into()))?;

        parse_assessment(&content)
    }
}

/// Strict parse, then one repair pass that pulls the first JSON object out of the text.
pub fn parse_assessment(raw: &str) -> Result<RiskAssessment, RemoteModelError> {
    if let Ok(assessment) = serde_json::from_str::<RiskAssessment>(raw.trim()) {
        return Ok(assessment);
    }

    let extracted = extract_first_json_object(raw)
        .ok_or_else(|| RemoteModelError::InvalidResponse(format!("no JSON object in '{}'", truncate(raw, 80))))?;
    serde_json::from_str::<RiskAssessment>(&extracted)
        .map_err(|e| RemoteModelError::InvalidResponse(e.to_string()))
}

fn extract_first_json_object(raw: &str) -> Option<String> {
    let start = raw.find('{')?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in raw[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(raw[start..start + idx + 1].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}
