use crate::AGENT_TIMEOUT;
use serde::Deserialize;
use serde_json::json;

/// Structured judgement returned by the agent for one candidate game.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentVerdict {
    pub score: f32,
    #[serde(default)]
    pub themes: Vec<String>,
    #[serde(default)]
    pub explanation: Option<String>,
}

impl AgentVerdict {
    /// used when the agent's output cannot be parsed
    pub fn neutral() -> Self {
        Self {
            score: 0.5,
            themes: Vec::new(),
            explanation: None,
        }
    }

    pub fn clamped(mut self) -> Self {
        self.score = self.score.clamp(0.0, 1.0);
        self
    }
}

/// Raw completion plus token accounting, before verdict parsing.
#[derive(Debug, Clone, Default)]
pub struct AgentReply {
    pub content: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub reasoning_tokens: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("agent network failure: {0}")]
    Network(String),
    #[error("agent rate limited")]
    RateLimited,
    #[error("agent rejected request: {0}")]
    Rejected(String),
}

impl AgentError {
    pub fn retryable(&self) -> bool {
        matches!(self, AgentError::Network(_) | AgentError::RateLimited)
    }
}

/// Abstract completion capability behind the evaluator, substituted by a
/// scripted double in tests.
#[async_trait::async_trait]
pub trait Agent: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<AgentReply, AgentError>;
}

const CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-style chat completion client with reasoning-effort passthrough.
pub struct OpenAiAgent {
    http: reqwest::Client,
    key: String,
    model: String,
    effort: String,
    verbosity: Option<String>,
    url: String,
}

impl OpenAiAgent {
    pub fn new(
        key: &str,
        model: &str,
        effort: &str,
        verbosity: Option<&str>,
    ) -> Result<Self, AgentError> {
        let http = reqwest::Client::builder()
            .timeout(AGENT_TIMEOUT)
            .build()
            .map_err(|e| AgentError::Network(e.to_string()))?;
        Ok(Self {
            http,
            key: key.to_string(),
            model: model.to_string(),
            effort: effort.to_string(),
            verbosity: verbosity.map(str::to_string),
            url: CHAT_URL.to_string(),
        })
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

#[derive(Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
    #[serde(default)]
    completion_tokens_details: Option<CompletionDetails>,
}

#[derive(Deserialize, Default)]
struct CompletionDetails {
    #[serde(default)]
    reasoning_tokens: u64,
}

#[async_trait::async_trait]
impl Agent for OpenAiAgent {
    async fn complete(&self, prompt: &str) -> Result<AgentReply, AgentError> {
        let mut body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "reasoning_effort": self.effort,
        });
        if let Some(verbosity) = &self.verbosity {
            body["verbosity"] = json!(verbosity);
        }
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AgentError::Network(e.to_string()))?;
        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(AgentError::RateLimited);
        }
        if status.is_server_error() {
            return Err(AgentError::Network(format!("agent returned {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AgentError::Rejected(format!("{status}: {body}")));
        }
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| AgentError::Rejected(format!("malformed completion: {e}")))?;
        let usage = parsed.usage.unwrap_or_default();
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();
        Ok(AgentReply {
            content,
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            reasoning_tokens: usage
                .completion_tokens_details
                .map(|d| d.reasoning_tokens)
                .unwrap_or(0),
        })
    }
}

/// Extracts the first JSON object from the completion text. Malformed
/// output is tolerated upstream by falling back to a neutral verdict.
pub fn parse_verdict(content: &str) -> Option<AgentVerdict> {
    let start = content.find('{')?;
    let end = content.rfind('}')?;
    serde_json::from_str::<AgentVerdict>(&content[start..=end])
        .ok()
        .map(AgentVerdict::clamped)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdicts_parse_from_fenced_output() {
        let content = "Here you go:\n```json\n{\"score\": 0.8, \"themes\": [\"king_attack\"], \"explanation\": \"crushing\"}\n```";
        let verdict = parse_verdict(content).unwrap();
        assert_eq!(verdict.score, 0.8);
        assert_eq!(verdict.themes, vec!["king_attack"]);
    }

    #[test]
    fn scores_clamp_to_unit_interval() {
        let verdict = parse_verdict("{\"score\": 3.5}").unwrap();
        assert_eq!(verdict.score, 1.0);
    }

    #[test]
    fn prose_without_json_is_rejected() {
        assert!(parse_verdict("a fine game indeed").is_none());
    }
}
