use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use atende_core::config::AiConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("llm endpoint returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("llm response had no choices")]
    EmptyChoice,
}

impl LlmError {
    /// Server-side failures and transport errors are worth another attempt; 4xx are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::EmptyChoice => false,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError>;
}

/// Chat-completions client for any OpenAI-compatible endpoint.
pub struct HttpLlmClient {
    client: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
    max_retries: u32,
    backoff: Duration,
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

impl HttpLlmClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<SecretString>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, LlmError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
            model: model.into(),
            max_retries: 0,
            backoff: Duration::from_millis(250),
        })
    }

    pub fn with_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.backoff = backoff;
        self
    }

    /// `None` when the assistant is disabled or no endpoint is configured.
    pub fn from_config(config: &AiConfig) -> Result<Option<Self>, LlmError> {
        let Some(endpoint) = config.endpoint.as_deref().filter(|_| config.enabled) else {
            return Ok(None);
        };
        let client = Self::new(
            endpoint,
            config.api_key.clone(),
            config.model.clone(),
            Duration::from_secs(config.timeout_secs),
        )?
        .with_retries(config.max_retries, Duration::from_millis(250));
        Ok(Some(client))
    }

    async fn attempt(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let url = format!("{}/chat/completions", self.endpoint);
        let mut request = self.client.post(&url).json(&CompletionRequest {
            model: &self.model,
            messages,
            temperature: 0.3,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Status { status, body });
        }

        let payload: CompletionResponse = response.json().await?;
        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(LlmError::EmptyChoice)
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            match self.attempt(messages).await {
                Ok(content) => return Ok(content),
                Err(error) if error.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    tracing::warn!(
                        event_name = "agent.llm_retry",
                        attempt,
                        error = %error,
                        "retrying completion"
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(error) => return Err(error),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use secrecy::SecretString;
    use serde_json::{json, Value};

    use super::{ChatMessage, HttpLlmClient, LlmClient, LlmError};

    #[derive(Clone)]
    struct Upstream {
        calls: Arc<AtomicUsize>,
        failures_before_success: usize,
    }

    async fn completions(
        State(upstream): State<Upstream>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        let call = upstream.calls.fetch_add(1, Ordering::SeqCst);
        if call < upstream.failures_before_success {
            return (StatusCode::BAD_GATEWAY, Json(json!({"error": "upstream"})));
        }
        let authorized = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == "Bearer sk-test");
        if !authorized {
            return (StatusCode::UNAUTHORIZED, Json(json!({"error": "key"})));
        }
        let last = body["messages"]
            .as_array()
            .and_then(|messages| messages.last())
            .and_then(|message| message["content"].as_str())
            .unwrap_or_default()
            .to_string();
        (
            StatusCode::OK,
            Json(json!({
                "model": body["model"],
                "choices": [{"message": {"role": "assistant", "content": format!("eco: {last}")}}]
            })),
        )
    }

    async fn serve(failures_before_success: usize) -> (String, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route("/v1/chat/completions", post(completions))
            .with_state(Upstream { calls: Arc::clone(&calls), failures_before_success });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let address = listener.local_addr().expect("address");
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        (format!("http://{address}/v1/"), calls)
    }

    fn client(endpoint: &str, key: Option<&str>) -> HttpLlmClient {
        HttpLlmClient::new(
            endpoint,
            key.map(|key| SecretString::from(key.to_string())),
            "gpt-test",
            Duration::from_secs(5),
        )
        .expect("client builds")
    }

    #[tokio::test]
    async fn completes_against_an_openai_compatible_endpoint() {
        let (endpoint, calls) = serve(0).await;

        let content = client(&endpoint, Some("sk-test"))
            .complete(&[ChatMessage::system("seja breve"), ChatMessage::user("oi")])
            .await
            .expect("completion");

        assert_eq!(content, "eco: oi");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_server_errors_but_not_client_errors() {
        let (endpoint, calls) = serve(2).await;
        let content = client(&endpoint, Some("sk-test"))
            .with_retries(2, Duration::from_millis(1))
            .complete(&[ChatMessage::user("horário")])
            .await
            .expect("third attempt succeeds");
        assert_eq!(content, "eco: horário");
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let (endpoint, calls) = serve(0).await;
        let error = client(&endpoint, None)
            .with_retries(3, Duration::from_millis(1))
            .complete(&[ChatMessage::user("oi")])
            .await
            .expect_err("missing key is rejected");
        assert!(matches!(error, LlmError::Status { status: 401, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
