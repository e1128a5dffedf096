//! AI client adapter for Palaver (OpenAI-compatible chat completions)
//!
//! Provides a `ChatBackend` trait and `OpenAiChatClient`, which sends the
//! running conversation to `{api_base}/chat/completions` and returns the
//! first choice's text. One attempt per call; failures surface as `AiError`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::AiConfig;
use crate::models::{Message, Role};

// ============================================================================
// ChatBackend trait
// ============================================================================

/// Abstraction over chat-completion providers.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Generate a reply to `user_message`. `history` is the conversation so
    /// far, oldest first, normally already ending with `user_message`.
    async fn get_response(&self, user_message: &str, history: &[Message])
        -> Result<String, AiError>;

    /// Timestamp stamped on messages created around a completion.
    fn get_timestamp(&self) -> DateTime<Utc> {
        Utc::now()
    }

    /// Backend name for logging.
    fn name(&self) -> &str;
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum AiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Completion response contained no reply")]
    EmptyReply,

    #[error("Missing API key")]
    MissingApiKey,
}

// ============================================================================
// Config
// ============================================================================

/// Chat-completion client configuration
#[derive(Debug, Clone)]
pub struct ChatClientConfig {
    pub api_key: String,
    pub api_base: String,
    pub model: String,
    pub timeout_secs: u64,
    pub max_tokens: u32,
    pub temperature: f32,
    pub history_window: usize,
    pub system_prompt: String,
}

impl ChatClientConfig {
    /// Falls back to `$OPENAI_API_KEY` when the config has no key.
    pub fn from_config(config: &AiConfig) -> Self {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();

        Self {
            api_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout_secs: config.timeout_seconds,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            history_window: config.history_window,
            system_prompt: config.system_prompt.clone(),
        }
    }
}

// ============================================================================
// OpenAI API structs (private)
// ============================================================================

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, PartialEq)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ============================================================================
// OpenAiChatClient
// ============================================================================

#[derive(Debug, Clone)]
pub struct OpenAiChatClient {
    client: Client,
    config: ChatClientConfig,
}

impl OpenAiChatClient {
    pub fn new(config: ChatClientConfig) -> Result<Self, AiError> {
        if config.api_key.is_empty() {
            return Err(AiError::MissingApiKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { client, config })
    }

    /// Create a client against a custom base URL (for testing / compatible APIs)
    pub fn with_base_url(mut config: ChatClientConfig, base_url: String) -> Result<Self, AiError> {
        config.api_base = base_url.trim_end_matches('/').to_string();
        Self::new(config)
    }

    /// System prompt followed by the last `history_window` turns, ending with the user message.
    fn build_messages<'a>(&'a self, user_message: &'a str, history: &'a [Message]) -> Vec<WireMessage<'a>> {
        let start = history.len().saturating_sub(self.config.history_window);
        let mut messages = Vec::with_capacity(history.len() - start + 2);

        messages.push(WireMessage {
            role: "system",
            content: &self.config.system_prompt,
        });
        messages.extend(history[start..].iter().map(|m| WireMessage {
            role: m.role.as_str(),
            content: &m.content,
        }));

        let ends_with_user = history
            .last()
            .map(|m| m.role == Role::User && m.content == user_message)
            .unwrap_or(false);
        if !ends_with_user {
            messages.push(WireMessage {
                role: Role::User.as_str(),
                content: user_message,
            });
        }

        messages
    }
}

#[async_trait]
impl ChatBackend for OpenAiChatClient {
    async fn get_response(
        &self,
        user_message: &str,
        history: &[Message],
    ) -> Result<String, AiError> {
        let url = format!("{}/chat/completions", self.config.api_base);
        let request = CompletionRequest {
            model: &self.config.model,
            messages: self.build_messages(user_message, history),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorResponse>(&error_body)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .unwrap_or(error_body);

            tracing::error!(code = status.as_u16(), message = %message, "Chat completion API error");

            return Err(AiError::Api {
                code: status.as_u16(),
                message,
            });
        }

        let completion: CompletionResponse = response.json().await?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(AiError::EmptyReply)
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(api_key: &str) -> ChatClientConfig {
        ChatClientConfig {
            api_key: api_key.to_string(),
            api_base: "http://unused".to_string(),
            model: "gpt-4o".to_string(),
            timeout_secs: 5,
            max_tokens: 100,
            temperature: 0.5,
            history_window: 20,
            system_prompt: "Be brief.".to_string(),
        }
    }

    fn completion(text: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-1",
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": text } }]
        })
    }

    #[tokio::test]
    async fn test_get_response_sends_history_and_returns_reply() {
        let mock_server = MockServer::start().await;
        let client = OpenAiChatClient::with_base_url(test_config("sk-test"), mock_server.uri())
            .expect("Failed to create client");

        let history = vec![
            Message::user("hi", Utc::now()),
            Message::assistant("hello!", Utc::now()),
            Message::user("how are you?", Utc::now()),
        ];

        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_json(serde_json::json!({
                "model": "gpt-4o",
                "messages": [
                    { "role": "system", "content": "Be brief." },
                    { "role": "user", "content": "hi" },
                    { "role": "assistant", "content": "hello!" },
                    { "role": "user", "content": "how are you?" }
                ],
                "max_tokens": 100,
                "temperature": 0.5
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("  Fine, thanks.  ")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let reply = client.get_response("how are you?", &history).await.unwrap();
        assert_eq!(reply, "Fine, thanks.");
    }

    #[tokio::test]
    async fn test_api_error_is_single_attempt() {
        let mock_server = MockServer::start().await;
        let client =
            OpenAiChatClient::with_base_url(test_config("sk-test"), mock_server.uri()).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": { "message": "Incorrect API key provided", "type": "invalid_request_error" }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        match client.get_response("hi", &[]).await {
            Err(AiError::Api { code, message }) => {
                assert_eq!(code, 401);
                assert_eq!(message, "Incorrect API key provided");
            }
            other => panic!("Expected Api error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_response_is_error() {
        let mock_server = MockServer::start().await;
        let client =
            OpenAiChatClient::with_base_url(test_config("sk-test"), mock_server.uri()).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
            .mount(&mock_server)
            .await;

        assert!(matches!(
            client.get_response("hi", &[]).await,
            Err(AiError::Http(_))
        ));
    }

    #[tokio::test]
    async fn test_no_choices_is_empty_reply() {
        let mock_server = MockServer::start().await;
        let client =
            OpenAiChatClient::with_base_url(test_config("sk-test"), mock_server.uri()).unwrap();

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "choices": [] })))
            .mount(&mock_server)
            .await;

        assert!(matches!(
            client.get_response("hi", &[]).await,
            Err(AiError::EmptyReply)
        ));
    }

    #[test]
    fn test_missing_api_key_rejected() {
        assert!(matches!(
            OpenAiChatClient::new(test_config("")),
            Err(AiError::MissingApiKey)
        ));
    }

    #[test]
    fn test_build_messages_windows_history_and_appends_user_turn() {
        let mut config = test_config("sk-test");
        config.history_window = 2;
        let client = OpenAiChatClient::new(config).unwrap();

        let history = vec![
            Message::user("one", Utc::now()),
            Message::assistant("two", Utc::now()),
            Message::user("three", Utc::now()),
            Message::assistant("four", Utc::now()),
        ];

        let messages = client.build_messages("five", &history);
        let contents: Vec<&str> = messages.iter().map(|m| m.content).collect();
        assert_eq!(contents, vec!["Be brief.", "three", "four", "five"]);
        assert_eq!(messages.last().unwrap().role, "user");
    }

    #[test]
    fn test_build_messages_does_not_duplicate_trailing_user_turn() {
        let client = OpenAiChatClient::new(test_config("sk-test")).unwrap();
        let history = vec![Message::user("hi", Utc::now())];

        let messages = client.build_messages("hi", &history);
        assert_eq!(messages.len(), 2);
    }

    #[test]
    fn test_from_config_trims_base_and_keeps_explicit_key() {
        let ai = AiConfig {
            api_key: Some("sk-config".to_string()),
            api_base: "http://localhost:8000/v1/".to_string(),
            ..AiConfig::default()
        };
        let config = ChatClientConfig::from_config(&ai);
        assert_eq!(config.api_key, "sk-config");
        assert_eq!(config.api_base, "http://localhost:8000/v1");
    }
}
