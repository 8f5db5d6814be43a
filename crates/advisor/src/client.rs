use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use cassie_core::config::{AdvisorConfig, AdvisorProvider};

const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Debug, Error)]
pub enum ChatClientError {
    #[error("failed to build http client: {0}")]
    Build(#[source] reqwest::Error),
    #[error("chat request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("chat response had no content")]
    EmptyCompletion,
}

/// OpenAI-compatible `/chat/completions` client with a bounded timeout and
/// bounded retries. Callers treat any error as "advisor unavailable".
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
    model: String,
    max_retries: u32,
}

impl ChatClient {
    pub fn from_config(config: &AdvisorConfig) -> Result<Self, ChatClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(ChatClientError::Build)?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| match config.provider {
                AdvisorProvider::Groq => GROQ_BASE_URL.to_string(),
                AdvisorProvider::OpenAi => OPENAI_BASE_URL.to_string(),
                AdvisorProvider::Ollama => "http://localhost:11434/v1".to_string(),
            })
            .trim_end_matches('/')
            .to_string();

        Ok(Self {
            http,
            base_url,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_retries: config.max_retries,
        })
    }

    pub async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String, ChatClientError> {
        let request = ChatRequest {
            model: &self.model,
            temperature,
            messages: vec![
                ChatMessage { role: "system", content: system },
                ChatMessage { role: "user", content: user },
            ],
        };

        let mut last_error = None;
        for attempt in 0..=self.max_retries {
            match self.send(&request).await {
                Ok(content) => return Ok(content),
                Err(error) => {
                    debug!(
                        event_name = "advisor.request_failed",
                        attempt,
                        error = %error,
                        "chat completion attempt failed"
                    );
                    last_error = Some(error);
                }
            }
        }
        Err(last_error.unwrap_or(ChatClientError::EmptyCompletion))
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<String, ChatClientError> {
        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self.http.post(&url).json(request);
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }

        let response = builder
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(ChatClientError::Request)?;
        let payload: ChatResponse =
            response.json().await.map_err(ChatClientError::Request)?;

        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(ChatClientError::EmptyCompletion)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}
