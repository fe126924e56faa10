//! Anthropic adapter (Messages API over HTTPS).
//!
//! Implements the `relay-core` completion backend: one POST per attempt, with
//! failures classified as transient (network, timeouts, 5xx) or permanent
//! (4xx, responses without usable text). Retrying is left to the core client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use relay_core::{
    config::Config,
    errors::Error,
    model::{
        client::CompletionBackend,
        types::{ApiError, CompletionRequest},
    },
    Result,
};

const MAX_ERROR_BODY_CHARS: usize = 200;
const REDACTED: &str = "[REDACTED]";
const SECRET_HEADERS: [&str; 2] = ["x-api-key", "authorization"];

#[derive(Clone, Debug)]
pub struct AnthropicConfig {
    pub api_url: String,
    pub api_key: SecretString,
    pub api_version: String,
    pub timeout: Duration,
}

impl AnthropicConfig {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            api_url: cfg.api_url.clone(),
            api_key: cfg.api_key.clone(),
            api_version: cfg.api_version.clone(),
            timeout: cfg.api_timeout,
        }
    }
}

#[derive(Clone)]
pub struct AnthropicClient {
    api_url: String,
    headers: HeaderMap,
    http: reqwest::Client,
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("api_url", &self.api_url)
            .field("headers", &redacted_headers(&self.headers))
            .finish()
    }
}

impl AnthropicClient {
    pub fn new(cfg: AnthropicConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .user_agent("relay-bot/0.1")
            .build()
            .map_err(|e| Error::Config(format!("http client build failed: {e}")))?;

        let mut headers = HeaderMap::new();
        let mut key = HeaderValue::from_str(cfg.api_key.expose_secret())
            .map_err(|_| Error::Config("ANTHROPIC_API_KEY is not a valid header value".into()))?;
        key.set_sensitive(true);
        headers.insert(HeaderName::from_static("x-api-key"), key);
        headers.insert(
            HeaderName::from_static("anthropic-version"),
            HeaderValue::from_str(&cfg.api_version).map_err(|_| {
                Error::Config("ANTHROPIC_VERSION is not a valid header value".into())
            })?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            api_url: cfg.api_url,
            headers,
            http,
        })
    }
}

#[derive(Debug, Serialize)]
struct MessagesBody<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: [UserMessage<'a>; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct UserMessage<'a> {
    role: &'static str,
    content: &'a str,
}

impl<'a> MessagesBody<'a> {
    fn new(req: &'a CompletionRequest) -> Self {
        Self {
            model: &req.model,
            max_tokens: req.max_tokens,
            messages: [UserMessage {
                role: "user",
                content: &req.prompt,
            }],
            system: req.system_prompt.as_deref(),
            temperature: req.temperature,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl CompletionBackend for AnthropicClient {
    async fn send(&self, req: &CompletionRequest) -> std::result::Result<String, ApiError> {
        let body = MessagesBody::new(req);

        tracing::debug!(
            url = %self.api_url,
            headers = ?redacted_headers(&self.headers),
            body = %serde_json::to_string(&body).unwrap_or_default(),
            "api request"
        );

        let resp = self
            .http
            .post(&self.api_url)
            .headers(self.headers.clone())
            .json(&body)
            .send()
            .await
            .map_err(classify_transport_error)?;

        let status = resp.status();
        let raw = resp.text().await.map_err(classify_transport_error)?;

        tracing::debug!(status = status.as_u16(), body = %raw, "api response");

        if !status.is_success() {
            return Err(ApiError::from_status(
                status.as_u16(),
                format!("request failed: {}", truncate_chars(&raw, MAX_ERROR_BODY_CHARS)),
            ));
        }

        extract_text(&raw)
    }
}

/// Pull the first content block's text out of a success body.
fn extract_text(raw: &str) -> std::result::Result<String, ApiError> {
    let parsed: MessagesResponse = serde_json::from_str(raw)
        .map_err(|e| ApiError::permanent(format!("malformed response: {e}")))?;

    let first = parsed
        .content
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::permanent("no content in response"))?;

    let text = first
        .text
        .ok_or_else(|| ApiError::permanent("first content block has no text"))?;
    if text.trim().is_empty() {
        return Err(ApiError::permanent("empty text in response"));
    }
    Ok(text)
}

fn classify_transport_error(e: reqwest::Error) -> ApiError {
    if e.is_builder() {
        return ApiError::permanent(format!("invalid request: {e}"));
    }
    if e.is_decode() {
        return ApiError::permanent(format!("unreadable response: {e}"));
    }
    ApiError::transient(format!("transport error: {e}"))
}

/// Header pairs safe to log: secret values are replaced.
pub fn redacted_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let name = name.as_str().to_string();
            let value = if SECRET_HEADERS.contains(&name.as_str()) || value.is_sensitive() {
                REDACTED.to_string()
            } else {
                value.to_str().unwrap_or("<binary>").to_string()
            };
            (name, value)
        })
        .collect()
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use relay_core::model::{
        client::{CompletionClient, RetryPolicy},
        types::{ApiErrorKind, CompletionSettings},
    };
    use serde_json::json;
    use wiremock::{
        matchers::{body_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    const KEY: &str = "sk-ant-test-secret";

    fn client_for(url: String) -> AnthropicClient {
        AnthropicClient::new(AnthropicConfig {
            api_url: url,
            api_key: SecretString::from(KEY.to_string()),
            api_version: "2023-06-01".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn request(system: Option<&str>) -> CompletionRequest {
        CompletionRequest::new(
            &CompletionSettings {
                model: "claude-test".to_string(),
                max_tokens: 4000,
                temperature: None,
            },
            "Test message",
            system,
        )
    }

    async fn server_replying(template: ResponseTemplate) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .respond_with(template)
            .mount(&server)
            .await;
        server
    }

    fn success_body(text: &str) -> serde_json::Value {
        json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{"type": "text", "text": text}],
            "stop_reason": "end_turn"
        })
    }

    #[tokio::test]
    async fn sends_wire_contract_and_extracts_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/messages"))
            .and(header("x-api-key", KEY))
            .and(header("anthropic-version", "2023-06-01"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({
                "model": "claude-test",
                "max_tokens": 4000,
                "messages": [{"role": "user", "content": "Test message"}],
                "system": "You are a helpful AI assistant for telegram."
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("Test response")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(format!("{}/v1/messages", server.uri()));
        let text = client
            .send(&request(Some("You are a helpful AI assistant for telegram.")))
            .await
            .unwrap();

        assert_eq!(text, "Test response");
    }

    #[tokio::test]
    async fn system_field_is_omitted_without_system_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(json!({
                "model": "claude-test",
                "max_tokens": 4000,
                "messages": [{"role": "user", "content": "Test message"}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("ok")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(format!("{}/v1/messages", server.uri()));
        assert_eq!(client.send(&request(None)).await.unwrap(), "ok");
    }

    #[tokio::test]
    async fn server_error_is_transient() {
        let server =
            server_replying(ResponseTemplate::new(529).set_body_string("overloaded")).await;
        let err = client_for(format!("{}/v1/messages", server.uri()))
            .send(&request(None))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ApiErrorKind::Transient);
        assert_eq!(err.status, Some(529));
        assert!(err.message.contains("overloaded"));
    }

    #[tokio::test]
    async fn client_error_is_permanent() {
        let server = server_replying(
            ResponseTemplate::new(401)
                .set_body_json(json!({"type": "error", "error": {"type": "authentication_error"}})),
        )
        .await;
        let err = client_for(format!("{}/v1/messages", server.uri()))
            .send(&request(None))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ApiErrorKind::Permanent);
        assert_eq!(err.status, Some(401));
    }

    #[tokio::test]
    async fn empty_content_is_permanent() {
        let server =
            server_replying(ResponseTemplate::new(200).set_body_json(json!({"content": []})))
                .await;
        let err = client_for(format!("{}/v1/messages", server.uri()))
            .send(&request(None))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ApiErrorKind::Permanent);
        assert_eq!(err.status, None);
    }

    #[tokio::test]
    async fn blank_text_is_permanent_and_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body(" \n ")))
            .expect(1)
            .mount(&server)
            .await;

        let backend = Arc::new(client_for(format!("{}/v1/messages", server.uri())));
        let completion = CompletionClient::new(
            backend,
            CompletionSettings {
                model: "claude-test".to_string(),
                max_tokens: 16,
                temperature: None,
            },
            RetryPolicy::default(),
        );

        let err = completion.complete("hi", None).await.unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Permanent);
        assert!(err.message.contains("empty text"));
    }

    #[tokio::test]
    async fn malformed_body_is_permanent() {
        let server =
            server_replying(ResponseTemplate::new(200).set_body_string("<html>oops</html>")).await;
        let err = client_for(format!("{}/v1/messages", server.uri()))
            .send(&request(None))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ApiErrorKind::Permanent);
    }

    #[tokio::test]
    async fn connection_refused_is_transient() {
        // Bind then drop to get a port nobody listens on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let err = client_for(format!("http://127.0.0.1:{port}/v1/messages"))
            .send(&request(None))
            .await
            .unwrap_err();

        assert_eq!(err.kind, ApiErrorKind::Transient);
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(success_body("finally")))
            .expect(1)
            .mount(&server)
            .await;

        let backend = Arc::new(client_for(format!("{}/v1/messages", server.uri())));
        let completion = CompletionClient::new(
            backend,
            CompletionSettings {
                model: "claude-test".to_string(),
                max_tokens: 16,
                temperature: None,
            },
            RetryPolicy {
                max_attempts: 3,
                multiplier: Duration::from_millis(1),
                min_wait: Duration::from_millis(5),
                max_wait: Duration::from_millis(20),
            },
        );

        assert_eq!(completion.complete("hi", None).await.unwrap(), "finally");
    }

    #[tokio::test]
    async fn permanent_failure_makes_one_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400))
            .expect(1)
            .mount(&server)
            .await;

        let backend = Arc::new(client_for(format!("{}/v1/messages", server.uri())));
        let completion = CompletionClient::new(
            backend,
            CompletionSettings {
                model: "claude-test".to_string(),
                max_tokens: 16,
                temperature: None,
            },
            RetryPolicy::default(),
        );

        let err = completion.complete("hi", None).await.unwrap_err();
        assert_eq!(err.status, Some(400));
    }

    #[test]
    fn api_key_never_appears_in_logged_headers() {
        let client = client_for("http://localhost/v1/messages".to_string());
        let logged = redacted_headers(&client.headers);

        assert!(logged.contains(&("x-api-key".to_string(), REDACTED.to_string())));
        assert!(logged.contains(&("anthropic-version".to_string(), "2023-06-01".to_string())));
        assert!(!format!("{logged:?}").contains(KEY));
        assert!(!format!("{client:?}").contains(KEY));

        let cfg = AnthropicConfig {
            api_url: "http://localhost/v1/messages".to_string(),
            api_key: SecretString::from(KEY.to_string()),
            api_version: "2023-06-01".to_string(),
            timeout: Duration::from_secs(5),
        };
        assert!(!format!("{cfg:?}").contains(KEY));
    }

    #[test]
    fn missing_text_field_is_permanent() {
        let err = extract_text(r#"{"content":[{"type":"tool_use"}]}"#).unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Permanent);
        let err = extract_text(r#"{"content":[{"type":"text","text":""}]}"#).unwrap_err();
        assert_eq!(err.kind, ApiErrorKind::Permanent);
        assert_eq!(
            extract_text(r#"{"content":[{"type":"text","text":"a"},{"type":"text","text":"b"}]}"#)
                .unwrap(),
            "a"
        );
    }
}
