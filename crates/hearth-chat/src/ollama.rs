//! Ollama chat client.

use std::sync::Arc;
use std::time::Duration;

use hearth_local::{ManagedService, ServiceError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::history::{ConversationTurn, Role};

/// Errors from a chat request.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Inference service could not be started: {0}")]
    Startup(#[source] ServiceError),
    #[error("Ollama returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("Ollama did not answer within {0:?}")]
    UpstreamTimeout(Duration),
    #[error("Malformed Ollama response: {0}")]
    MalformedResponse(String),
    #[error("Ollama not reachable at {url}: {reason}")]
    Unreachable { url: String, reason: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Sampling options for a chat request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChatOptions {
    pub temperature: f32,
    pub num_predict: i32,
    /// Upper bound on the whole request
    pub timeout: Duration,
}

impl Default for ChatOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            num_predict: 1000,
            timeout: Duration::from_secs(180),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    options: WireOptions,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: Role,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct WireOptions {
    temperature: f32,
    num_predict: i32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Sends conversations to Ollama, starting it first when needed.
pub struct ChatGateway {
    client: reqwest::Client,
    base_url: String,
    model: String,
    service: Arc<dyn ManagedService>,
}

impl ChatGateway {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        service: Arc<dyn ManagedService>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            service,
        }
    }

    /// Ask the model for the next assistant message.
    ///
    /// The request carries the system prompt followed by `history` in order.
    pub async fn converse(
        &self,
        history: &[ConversationTurn],
        system_prompt: &str,
        options: &ChatOptions,
    ) -> Result<String, ChatError> {
        self.service.start().await.map_err(|e| {
            error!("Cannot reach inference service: {}", e);
            ChatError::Startup(e)
        })?;

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(WireMessage {
            role: Role::System,
            content: system_prompt,
        });
        messages.extend(history.iter().map(|turn| WireMessage {
            role: turn.role(),
            content: turn.content(),
        }));

        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: false,
            options: WireOptions {
                temperature: options.temperature,
                num_predict: options.num_predict,
            },
        };

        let url = format!("{}/api/chat", self.base_url);
        debug!("POST {} ({} messages)", url, request.messages.len());

        let response = self
            .client
            .post(&url)
            .timeout(options.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.classify(e, options.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.classify(e, options.timeout))?;
        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| ChatError::MalformedResponse(e.to_string()))?;

        if let Some(err) = parsed.error {
            return Err(ChatError::Upstream {
                status: status.as_u16(),
                body: err,
            });
        }

        let reply = parsed
            .message
            .and_then(|m| m.content)
            .ok_or_else(|| ChatError::MalformedResponse("missing message.content".into()))?;

        info!("Model {} replied with {} chars", self.model, reply.len());
        Ok(reply)
    }

    fn classify(&self, err: reqwest::Error, timeout: Duration) -> ChatError {
        if err.is_timeout() {
            ChatError::UpstreamTimeout(timeout)
        } else if err.is_connect() {
            ChatError::Unreachable {
                url: self.base_url.clone(),
                reason: err.to_string(),
            }
        } else {
            ChatError::Http(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{serve, FakeService};
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::atomic::Ordering;
    use std::sync::Mutex;

    fn gateway(url: String, service: Arc<FakeService>) -> ChatGateway {
        ChatGateway::new(url, "llama3", service)
    }

    #[tokio::test]
    async fn test_request_carries_system_prompt_then_history() {
        let seen: Arc<Mutex<Option<Value>>> = Arc::new(Mutex::new(None));
        let capture = seen.clone();
        let app = Router::new().route(
            "/api/chat",
            post(move |Json(body): Json<Value>| {
                let capture = capture.clone();
                async move {
                    *capture.lock().unwrap() = Some(body);
                    Json(json!({"message": {"role": "assistant", "content": "hi there"}, "done": true}))
                }
            }),
        );
        let url = serve(app).await;
        let service = FakeService::new("ollama", true);

        let history = vec![
            ConversationTurn::user("hello"),
            ConversationTurn::assistant("hey"),
            ConversationTurn::user("how are you?"),
        ];
        let reply = gateway(url, service)
            .converse(&history, "Be kind.", &ChatOptions::default())
            .await
            .unwrap();
        assert_eq!(reply, "hi there");

        let body = seen.lock().unwrap().take().unwrap();
        assert_eq!(body["model"], "llama3");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 1000);
        let messages = body["messages"].as_array().unwrap();
        let pairs: Vec<(&str, &str)> = messages
            .iter()
            .map(|m| (m["role"].as_str().unwrap(), m["content"].as_str().unwrap()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("system", "Be kind."),
                ("user", "hello"),
                ("assistant", "hey"),
                ("user", "how are you?"),
            ]
        );
    }

    #[tokio::test]
    async fn test_non_success_status() {
        let app = Router::new().route(
            "/api/chat",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model not loaded") }),
        );
        let url = serve(app).await;

        let err = gateway(url, FakeService::new("ollama", true))
            .converse(&[], "sys", &ChatOptions::default())
            .await
            .unwrap_err();

        match err {
            ChatError::Upstream { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "model not loaded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out() {
        let app = Router::new().route(
            "/api/chat",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Json(json!({"message": {"content": "late"}}))
            }),
        );
        let url = serve(app).await;
        let options = ChatOptions {
            timeout: Duration::from_millis(300),
            ..ChatOptions::default()
        };

        let err = gateway(url, FakeService::new("ollama", true))
            .converse(&[ConversationTurn::user("hi")], "sys", &options)
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::UpstreamTimeout(_)));
    }

    #[tokio::test]
    async fn test_missing_content_is_malformed() {
        let app = Router::new()
            .route("/api/chat", post(|| async { Json(json!({"done": true})) }));
        let url = serve(app).await;

        let err = gateway(url, FakeService::new("ollama", true))
            .converse(&[], "sys", &ChatOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_non_json_body_is_malformed() {
        let app = Router::new().route("/api/chat", post(|| async { "<html>oops</html>" }));
        let url = serve(app).await;

        let err = gateway(url, FakeService::new("ollama", true))
            .converse(&[], "sys", &ChatOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_startup_failure_is_fatal() {
        let service = FakeService::new("ollama", false);
        service.fail_start.store(true, Ordering::SeqCst);

        let err = gateway("http://127.0.0.1:9".to_string(), service.clone())
            .converse(&[], "sys", &ChatOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, ChatError::Startup(ServiceError::StartupTimeout { .. })));
        assert_eq!(service.starts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_starts_stopped_service_before_request() {
        let app = Router::new().route(
            "/api/chat",
            post(|| async { Json(json!({"message": {"content": "ok"}})) }),
        );
        let url = serve(app).await;
        let service = FakeService::new("ollama", false);

        let reply = gateway(url, service.clone())
            .converse(&[], "sys", &ChatOptions::default())
            .await
            .unwrap();
        assert_eq!(reply, "ok");
        assert!(service.is_up());
    }
}
