//! OpenRouter chat-completions client.

use super::TextGenerator;
use crate::config::PipelineConfig;
use crate::error::ReceiptError;
use crate::registry::Provider;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

const PROVIDER_NAME: &str = "openrouter";
const APP_REFERER: &str = "https://github.com/raphaelmansuy/edgequake-receipt";
const APP_TITLE: &str = "edgequake-receipt";

/// Calls an OpenAI-compatible `/chat/completions` endpoint with one user turn.
pub struct OpenRouterGenerator {
    client: Client,
    api_key: Option<String>,
    model: String,
    url: String,
    timeout: Duration,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 1],
    temperature: f32,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

impl OpenRouterGenerator {
    pub fn new(
        api_key: Option<String>,
        model: impl Into<String>,
        url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = match Client::builder().timeout(timeout).build() {
            Ok(client) => client,
            Err(e) => {
                warn!("Could not build HTTP client ({}); using the default client with per-request timeouts", e);
                Client::new()
            }
        };
        Self {
            client,
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            model: model.into(),
            url: url.into(),
            timeout,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.llm_api_key.clone(),
            config.llm_model.clone(),
            config.llm_base_url.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    fn map_send_error(&self, e: reqwest::Error) -> ReceiptError {
        if e.is_timeout() {
            ReceiptError::llm(format!(
                "OpenRouter request timed out after {}s",
                self.timeout.as_secs_f32()
            ))
        } else {
            ReceiptError::llm(format!("Failed to call OpenRouter API: {}", e))
        }
    }
}

#[async_trait]
impl Provider for OpenRouterGenerator {
    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn is_available(&self) -> bool {
        self.api_key.is_some()
    }
}

#[async_trait]
impl TextGenerator for OpenRouterGenerator {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String, ReceiptError> {
        let api_key = self.api_key.as_deref().ok_or_else(|| {
            ReceiptError::llm("OpenRouter API key is not configured")
        })?;

        let body = ChatRequest {
            model: &self.model,
            messages: [Message {
                role: "user",
                content: prompt,
            }],
            temperature,
        };

        debug!(
            "Sending request to OpenRouter (model: {}, prompt length: {})",
            self.model,
            prompt.len()
        );
        let start = Instant::now();

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(api_key)
            .timeout(self.timeout)
            .header("HTTP-Referer", APP_REFERER)
            .header("X-Title", APP_TITLE)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_send_error(e))?;
        if !status.is_success() {
            error!("OpenRouter API error: {} - {}", status, text);
            return Err(ReceiptError::llm(format!(
                "OpenRouter API error: HTTP {}",
                status
            )));
        }

        let content = extract_content(&text)?;
        debug!(
            "Received {} chars from OpenRouter in {:?}",
            content.len(),
            start.elapsed()
        );
        Ok(content)
    }
}

/// Pull the first choice's message text out of a response body.
fn extract_content(body: &str) -> Result<String, ReceiptError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| ReceiptError::llm(format!("Failed to parse OpenRouter response: {}", e)))?;

    if let Some(err) = parsed.error {
        return Err(ReceiptError::llm(format!(
            "OpenRouter API error: {}",
            err.message
        )));
    }

    let choice = parsed
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ReceiptError::llm("Invalid response format from OpenRouter API"))?;

    match choice.message.content {
        Some(c) if !c.trim().is_empty() => Ok(c.trim().to_string()),
        _ => Err(ReceiptError::llm("Empty response from OpenRouter API")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn extracts_first_choice() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  {\"a\":1}\n"}}]}"#;
        assert_eq!(extract_content(body).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn empty_or_missing_content_is_an_error() {
        for body in [
            r#"{"choices":[{"message":{"content":"   "}}]}"#,
            r#"{"choices":[{"message":{"content":null}}]}"#,
            r#"{"choices":[]}"#,
            r#"{"error":{"message":"No auth credentials found","code":401}}"#,
            "<html>gateway</html>",
        ] {
            assert!(
                matches!(extract_content(body), Err(ReceiptError::LlmFailure { .. })),
                "{body}"
            );
        }
    }

    #[tokio::test]
    async fn blank_key_is_unavailable() {
        let g = OpenRouterGenerator::new(Some("  ".into()), "m", "http://localhost", Duration::from_secs(1));
        assert!(!g.is_available().await);
        assert!(g.generate("p", 0.2).await.is_err());

        let g = OpenRouterGenerator::new(Some("sk-or-1".into()), "m", "http://localhost", Duration::from_secs(1));
        assert!(g.is_available().await);
    }

    const CHAT_PATH: &str = "/api/v1/chat/completions";

    async fn mock_chat(response: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CHAT_PATH))
            .and(header("authorization", "Bearer sk-or-1"))
            .respond_with(response)
            .mount(&server)
            .await;
        server
    }

    fn generator(server: &MockServer, timeout: Duration) -> OpenRouterGenerator {
        OpenRouterGenerator::new(
            Some("sk-or-1".into()),
            "m",
            format!("{}{}", server.uri(), CHAT_PATH),
            timeout,
        )
    }

    #[tokio::test]
    async fn round_trip_against_mock_server() {
        let server = mock_chat(ResponseTemplate::new(200).set_body_raw(
            r#"{"choices":[{"message":{"content":"{\"merchantName\":\"X\"}"}}]}"#,
            "application/json",
        ))
        .await;
        let g = generator(&server, Duration::from_secs(5));
        assert_eq!(g.generate("prompt", 0.2).await.unwrap(), r#"{"merchantName":"X"}"#);

        let requests = server.received_requests().await.unwrap();
        let sent: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(sent["model"], "m");
        assert_eq!(sent["messages"][0]["content"], "prompt");
        assert!((sent["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn http_error_status_is_llm_failure() {
        let server = mock_chat(
            ResponseTemplate::new(500).set_body_raw(r#"{"error":"boom"}"#, "application/json"),
        )
        .await;
        let err = generator(&server, Duration::from_secs(5))
            .generate("prompt", 0.2)
            .await
            .unwrap_err();
        assert!(matches!(err, ReceiptError::LlmFailure { .. }));
        assert!(err.to_string().contains("500"), "{err}");
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = mock_chat(
            ResponseTemplate::new(200)
                .set_body_raw("{}", "application/json")
                .set_delay(Duration::from_secs(3)),
        )
        .await;
        let err = generator(&server, Duration::from_millis(200))
            .generate("prompt", 0.2)
            .await
            .unwrap_err();
        assert!(matches!(err, ReceiptError::LlmFailure { .. }));
        assert!(err.to_string().contains("timed out"), "{err}");
    }
}
