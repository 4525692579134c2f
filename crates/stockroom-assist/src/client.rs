//! # Assistant Client
//!
//! One HTTP client shared by three capabilities:
//!
//! ```text
//! ┌──────────────────────┬──────────┬─────────────┬────────────┐
//! │ capability           │ key      │ temperature │ max tokens │
//! ├──────────────────────┼──────────┼─────────────┼────────────┤
//! │ chat                 │ chat     │ 0.7         │ 1024       │
//! │ recognize_product    │ vision   │ 0.5         │ 512        │
//! │ restock_suggestions  │ chat     │ 0.6         │ 1024       │
//! └──────────────────────┴──────────┴─────────────┴────────────┘
//! ```
//!
//! Every call goes through [`AssistClient::complete`], which retries 429,
//! 5xx and transport failures with exponential backoff.

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::StatusCode;
use serde_json::json;
use stockroom_core::Money;
use tracing::{debug, instrument, warn};

use crate::config::AssistConfig;
use crate::error::{AssistError, AssistResult};
use crate::extract::{extract_json, hints_from_json};
use crate::types::{
    ChatMessage, ChatRole, CompletionRequest, CompletionResponse, ErrorEnvelope, InventorySnapshot,
    ProductHints, WireMessage,
};

const CHAT_SYSTEM_PROMPT: &str = "You are the inventory assistant of a small retail store. \
Answer questions about products, stock levels and sales clearly and briefly. \
When inventory data is provided, base your answers on it and say so when it does not cover the question.";

const VISION_PROMPT: &str = "Look at this product photo and identify the product. \
Reply with a single JSON object and nothing else, using these keys: \
\"name\" (product name), \"code\" (barcode or SKU if visible), \"price\" (if a price tag is visible), \
\"category\", \"brand\", \"notes\" (anything else useful). Use null for anything you cannot see.";

const RESTOCK_SYSTEM_PROMPT: &str = "You are an inventory planning analyst for a small retail store. \
Given current stock and recent sales per product, recommend what to reorder and how much, \
flag slow movers, and keep the answer to a short prioritized list.";

/// Maximum accepted image upload.
pub const MAX_IMAGE_BYTES: usize = 4 * 1024 * 1024;

/// Client for the LLM service. Cheap to clone.
#[derive(Clone)]
pub struct AssistClient {
    inner: Arc<AssistClientInner>,
}

struct AssistClientInner {
    http: reqwest::Client,
    config: AssistConfig,
}

impl std::fmt::Debug for AssistClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistClient")
            .field("api_url", &self.inner.config.api_url)
            .field("chat_enabled", &self.chat_enabled())
            .field("vision_enabled", &self.vision_enabled())
            .finish()
    }
}

impl AssistClient {
    pub fn new(config: AssistConfig) -> AssistResult<Self> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(AssistClient {
            inner: Arc::new(AssistClientInner { http, config }),
        })
    }

    pub fn config(&self) -> &AssistConfig {
        &self.inner.config
    }

    pub fn chat_enabled(&self) -> bool {
        self.inner.config.chat_api_key.is_some()
    }

    pub fn vision_enabled(&self) -> bool {
        self.inner.config.vision_key().is_some()
    }

    /// Answers `message` in the context of an ongoing conversation.
    ///
    /// `context` is free-form inventory data appended to the system prompt.
    /// System turns in `history` are dropped.
    #[instrument(skip_all, fields(model = %self.inner.config.chat_model, history = history.len()))]
    pub async fn chat(
        &self,
        message: &str,
        context: Option<&str>,
        history: Vec<ChatMessage>,
    ) -> AssistResult<String> {
        let key = self
            .inner
            .config
            .chat_api_key
            .as_deref()
            .ok_or(AssistError::Disabled("chat"))?;
        let message = message.trim();
        if message.is_empty() {
            return Err(AssistError::InvalidInput("message is empty".to_string()));
        }

        let system = match context.map(str::trim).filter(|c| !c.is_empty()) {
            Some(context) => format!("{CHAT_SYSTEM_PROMPT}\n\nCurrent inventory data:\n{context}"),
            None => CHAT_SYSTEM_PROMPT.to_string(),
        };

        let mut messages = vec![WireMessage::from(ChatMessage::system(system))];
        messages.extend(
            history
                .into_iter()
                .filter(|m| m.role != ChatRole::System && !m.content.trim().is_empty())
                .map(WireMessage::from),
        );
        messages.push(ChatMessage::user(message).into());

        let request = CompletionRequest {
            model: &self.inner.config.chat_model,
            messages,
            temperature: 0.7,
            max_tokens: 1024,
        };
        self.complete(key, &request).await
    }

    /// Reads product attributes off a photo.
    ///
    /// Returns empty hints rather than an error when the reply holds no
    /// usable JSON.
    #[instrument(skip(self, image), fields(model = %self.inner.config.vision_model, bytes = image.len()))]
    pub async fn recognize_product(&self, image: &[u8], media_type: &str) -> AssistResult<ProductHints> {
        let key = self.inner.config.vision_key().ok_or(AssistError::Disabled("vision"))?;
        if !media_type.starts_with("image/") {
            return Err(AssistError::InvalidInput(format!(
                "expected an image, got {media_type}"
            )));
        }
        if image.is_empty() || image.len() > MAX_IMAGE_BYTES {
            return Err(AssistError::InvalidInput(format!(
                "image must be between 1 and {MAX_IMAGE_BYTES} bytes"
            )));
        }

        let data_url = format!("data:{media_type};base64,{}", BASE64.encode(image));
        let content = json!([
            { "type": "text", "text": VISION_PROMPT },
            { "type": "image_url", "image_url": { "url": data_url } },
        ]);

        let request = CompletionRequest {
            model: &self.inner.config.vision_model,
            messages: vec![WireMessage { role: ChatRole::User, content }],
            temperature: 0.5,
            max_tokens: 512,
        };
        let reply = self.complete(key, &request).await?;

        match extract_json(&reply) {
            Some(map) => Ok(hints_from_json(&map)),
            None => {
                warn!(reply_len = reply.len(), "Vision reply held no JSON object");
                Ok(ProductHints::default())
            }
        }
    }

    /// Free-text restock advice for the given snapshot.
    #[instrument(skip_all, fields(model = %self.inner.config.chat_model, products = snapshot.products.len()))]
    pub async fn restock_suggestions(&self, snapshot: &InventorySnapshot) -> AssistResult<String> {
        let key = self
            .inner
            .config
            .chat_api_key
            .as_deref()
            .ok_or(AssistError::Disabled("chat"))?;
        if snapshot.products.is_empty() {
            return Ok("There are no products in the inventory yet.".to_string());
        }

        let request = CompletionRequest {
            model: &self.inner.config.chat_model,
            messages: vec![
                ChatMessage::system(RESTOCK_SYSTEM_PROMPT).into(),
                ChatMessage::user(render_snapshot(snapshot)).into(),
            ],
            temperature: 0.6,
            max_tokens: 1024,
        };
        self.complete(key, &request).await
    }

    // =========================================================================
    // Transport
    // =========================================================================

    async fn complete(&self, key: &str, request: &CompletionRequest<'_>) -> AssistResult<String> {
        let mut backoff = create_backoff();
        let mut attempts = 0u32;

        loop {
            match self.send_once(key, request).await {
                Ok(reply) => return Ok(reply),
                Err(err) if err.is_transient() && attempts < self.inner.config.max_retries => {
                    attempts += 1;
                    let wait = backoff.next_backoff().unwrap_or(Duration::from_secs(2));
                    warn!(attempts, ?wait, error = %err, "LLM request failed, retrying");
                    tokio::time::sleep(wait).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send_once(&self, key: &str, request: &CompletionRequest<'_>) -> AssistResult<String> {
        let response = self
            .inner
            .http
            .post(&self.inner.config.api_url)
            .bearer_auth(key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(error_for_status(status, response).await);
        }

        let body = response.text().await?;
        let parsed: CompletionResponse = serde_json::from_str(&body)
            .map_err(|e| AssistError::Parse(format!("failed to parse response: {e}")))?;

        let reply = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or_else(|| AssistError::Parse("reply had no content".to_string()))?;

        debug!(reply_len = reply.len(), "LLM reply received");
        Ok(reply)
    }
}

async fn error_for_status(status: StatusCode, response: reqwest::Response) -> AssistError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return AssistError::RateLimited;
    }

    let message = match response.text().await {
        Ok(body) => serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|envelope| envelope.error.message)
            .unwrap_or_else(|_| body.chars().take(200).collect()),
        Err(err) => return AssistError::Http(err),
    };

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AssistError::Unauthorized(message),
        _ => AssistError::Api { status: status.as_u16(), message },
    }
}

fn create_backoff() -> ExponentialBackoff {
    ExponentialBackoff {
        initial_interval: Duration::from_millis(200),
        max_interval: Duration::from_secs(2),
        multiplier: 2.0,
        max_elapsed_time: None,
        ..Default::default()
    }
}

/// Renders the snapshot as one line per product.
fn render_snapshot(snapshot: &InventorySnapshot) -> String {
    let mut out = format!(
        "Inventory snapshot (sales over the last {} days):\n",
        snapshot.window_days
    );
    for line in &snapshot.products {
        let _ = writeln!(
            out,
            "- {} [{}]: {} in stock, price {}, {} sold",
            line.name,
            line.code,
            line.quantity,
            Money::from_cents(line.price_cents),
            line.units_sold,
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StockLine;
    use axum::extract::State;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Mock {
        hits: Arc<AtomicUsize>,
        fail_first: usize,
        reply: String,
        last_body: Arc<Mutex<Option<Value>>>,
    }

    async fn completions(
        State(mock): State<Mock>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        let hit = mock.hits.fetch_add(1, Ordering::SeqCst);
        *mock.last_body.lock().unwrap() = Some(body);

        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some("Bearer test-key");
        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": { "message": "Invalid API Key" } })),
            );
        }
        if hit < mock.fail_first {
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": { "message": "over capacity" } })),
            );
        }
        (
            StatusCode::OK,
            Json(json!({ "choices": [ { "message": { "role": "assistant", "content": mock.reply } } ] })),
        )
    }

    async fn spawn_mock(mock: Mock) -> String {
        let app = Router::new()
            .route("/v1/chat/completions", post(completions))
            .with_state(mock);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/v1/chat/completions")
    }

    fn client_for(url: String, key: &str) -> AssistClient {
        AssistClient::new(AssistConfig {
            api_url: url,
            chat_api_key: Some(key.to_string()),
            timeout: Duration::from_secs(5),
            ..AssistConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_chat_sends_context_and_history() {
        let mock = Mock { reply: "  You have 3 units.  ".to_string(), ..Mock::default() };
        let last_body = mock.last_body.clone();
        let client = client_for(spawn_mock(mock).await, "test-key");

        let history = vec![
            ChatMessage::system("ignored"),
            ChatMessage { role: ChatRole::Assistant, content: "Hello!".to_string() },
        ];
        let reply = client
            .chat("How much milk is left?", Some("Leche: 3"), history)
            .await
            .unwrap();
        assert_eq!(reply, "You have 3 units.");

        let body = last_body.lock().unwrap().clone().unwrap();
        let messages = body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert!(messages[0]["content"].as_str().unwrap().contains("Leche: 3"));
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[2]["content"], "How much milk is left?");
        assert_eq!(body["max_tokens"], 1024);
    }

    #[tokio::test]
    async fn test_retries_after_service_unavailable() {
        let mock = Mock { fail_first: 1, reply: "ok".to_string(), ..Mock::default() };
        let hits = mock.hits.clone();
        let client = client_for(spawn_mock(mock).await, "test-key");

        let reply = client.chat("hi", None, Vec::new()).await.unwrap();

        assert_eq!(reply, "ok");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let mock = Mock { reply: "ok".to_string(), ..Mock::default() };
        let hits = mock.hits.clone();
        let client = client_for(spawn_mock(mock).await, "wrong-key");

        let err = client.chat("hi", None, Vec::new()).await.unwrap_err();

        assert!(matches!(err, AssistError::Unauthorized(ref m) if m == "Invalid API Key"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recognize_product_parses_hints() {
        let mock = Mock {
            reply: "```json\n{\"name\": \"Pan amasado\", \"price\": \"2.50\", \"code\": null}\n```".to_string(),
            ..Mock::default()
        };
        let last_body = mock.last_body.clone();
        let client = client_for(spawn_mock(mock).await, "test-key");

        let hints = client.recognize_product(b"\x89PNG", "image/png").await.unwrap();

        assert_eq!(hints.name.as_deref(), Some("Pan amasado"));
        assert_eq!(hints.price_cents, Some(250));
        assert!(hints.code.is_none());

        let body = last_body.lock().unwrap().clone().unwrap();
        let url = body["messages"][0]["content"][1]["image_url"]["url"].as_str().unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn test_disabled_and_invalid_inputs_fail_fast() {
        let client = AssistClient::new(AssistConfig::default()).unwrap();
        assert!(matches!(
            client.chat("hi", None, Vec::new()).await,
            Err(AssistError::Disabled("chat"))
        ));

        let client = client_for("http://127.0.0.1:9/unused".to_string(), "test-key");
        assert!(matches!(
            client.recognize_product(b"%PDF", "application/pdf").await,
            Err(AssistError::InvalidInput(_))
        ));
        assert!(matches!(
            client.chat("   ", None, Vec::new()).await,
            Err(AssistError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_render_snapshot() {
        let snapshot = InventorySnapshot {
            window_days: 30,
            products: vec![StockLine {
                name: "Leche".to_string(),
                code: "LAC-001".to_string(),
                quantity: 4,
                price_cents: 1250,
                units_sold: 18,
            }],
        };
        let text = render_snapshot(&snapshot);
        assert!(text.contains("last 30 days"));
        assert!(text.contains("- Leche [LAC-001]: 4 in stock, price $12.50, 18 sold"));
    }
}
