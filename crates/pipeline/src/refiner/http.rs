//! HTTP refiner backed by a chat-completions endpoint

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{parse_segment_array, RefineError, Refiner};

/// Instruction sent as the system message with every chunk
const SYSTEM_PROMPT: &str = "\
You rewrite article text into narration-ready segments. Given a chunk of \
an article, produce the lines a narrator would read aloud: expand \
abbreviations and numerals, drop bylines, captions, footnote markers and \
other non-spoken matter, and split the text into natural spoken sentences. \
Return ONLY a JSON array of strings, one segment per string, in reading \
order. Return an empty array if the chunk contains nothing to narrate.";

/// HTTP refiner configuration
#[derive(Debug, Clone)]
pub struct RefinerOptions {
    /// Backend base URL, e.g. `http://localhost:11434/v1`
    pub base_url: String,
    /// Bearer token, when the backend requires one
    pub api_key: Option<String>,
    /// Model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Completion token limit
    pub max_tokens: u32,
    /// Connect timeout
    pub connect_timeout: Duration,
    /// Read timeout for one refine call
    pub read_timeout: Duration,
}

impl Default for RefinerOptions {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434/v1".to_string(),
            api_key: None,
            model: "gemma3:12b".to_string(),
            temperature: 0.2,
            max_tokens: 2048,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(120),
        }
    }
}

/// Refiner calling an OpenAI-style `/chat/completions` endpoint
pub struct HttpRefiner {
    client: reqwest::Client,
    options: RefinerOptions,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

impl HttpRefiner {
    /// Create a new HTTP refiner
    pub fn new(options: RefinerOptions) -> Result<Self, RefineError> {
        let client = reqwest::Client::builder()
            .connect_timeout(options.connect_timeout)
            .timeout(options.read_timeout)
            .build()
            .map_err(|e| RefineError::Transport(e.to_string()))?;

        Ok(Self { client, options })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.options.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait]
impl Refiner for HttpRefiner {
    async fn refine(&self, chunk: &str) -> Result<Vec<String>, RefineError> {
        let body = serde_json::json!({
            "model": self.options.model,
            "temperature": self.options.temperature,
            "max_tokens": self.options.max_tokens,
            "stream": false,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": chunk },
            ],
        });

        let mut request = self.client.post(self.endpoint("chat/completions")).json(&body);
        if let Some(key) = &self.options.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RefineError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RefineError::Status(status.as_u16()));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| RefineError::Parse(e.to_string()))?;

        let content = completion
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| RefineError::Parse("completion has no choices".to_string()))?;

        let segments = parse_segment_array(content)?;
        tracing::debug!(
            chunk_chars = chunk.chars().count(),
            segments = segments.len(),
            "chunk refined"
        );
        Ok(segments)
    }

    async fn preflight(&self) -> Result<(), RefineError> {
        // Any HTTP response means the backend is reachable; only transport
        // failures count as unreachable.
        let mut request = self.client.get(self.endpoint("models"));
        if let Some(key) = &self.options.api_key {
            request = request.bearer_auth(key);
        }
        request
            .send()
            .await
            .map_err(|e| RefineError::Transport(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_cleanly() {
        let refiner = HttpRefiner::new(RefinerOptions {
            base_url: "http://host:1234/v1/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(refiner.endpoint("chat/completions"), "http://host:1234/v1/chat/completions");
    }

    #[test]
    fn test_default_timeouts() {
        let options = RefinerOptions::default();
        assert_eq!(options.connect_timeout, Duration::from_secs(10));
        assert_eq!(options.read_timeout, Duration::from_secs(120));
    }
}
