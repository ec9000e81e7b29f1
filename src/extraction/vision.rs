//! Vision-model client: one text prompt plus 1..N page images in, raw text
//! out. Transport failures are retried with exponential backoff a bounded
//! number of times, then surfaced as `Unavailable` — a distinct outcome from
//! "the model answered but the reply was ungradeable", which is the parser's
//! call to make.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::VisionConfig;
use crate::extraction::image::PreparedImage;
use crate::extraction::prompts;

#[derive(Debug, thiserror::Error)]
pub enum VisionError {
    /// Endpoint unreachable or persistently failing; retries exhausted.
    #[error("vision endpoint unavailable: {0}")]
    Unavailable(String),
    /// The endpoint answered with something other than a completion.
    #[error("vision provider error: {0}")]
    Provider(String),
}

/// Black-box model endpoint. The trait carries both calls the pipeline needs:
/// the image-bearing extraction and the text-only classification batch.
#[async_trait]
pub trait VisionClient: Send + Sync + 'static {
    /// Extract one logical document from ordered page images. With more than
    /// one page the client frames the prompt so all pages merge into one
    /// result; callers never deal with per-page fragments.
    async fn extract_invoice(&self, pages: &[PreparedImage]) -> Result<String, VisionError>;

    /// Run a text-only completion (category classification batches).
    async fn classify(&self, prompt: &str) -> Result<String, VisionError>;
}

/// Client for any OpenAI-compatible chat-completions endpoint.
pub struct HttpVisionClient {
    http: reqwest::Client,
    cfg: VisionConfig,
}

impl HttpVisionClient {
    pub fn new(cfg: VisionConfig) -> Result<Self, VisionError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .map_err(|e| VisionError::Unavailable(format!("client build: {}", e)))?;
        Ok(Self { http, cfg })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.cfg.base_url.trim_end_matches('/'))
    }

    /// POST the request, retrying transport failures with exponential
    /// backoff: base * 2^(attempt-1), so 500ms -> 1s -> 2s by default.
    async fn chat(&self, body: Value) -> Result<String, VisionError> {
        let mut last_err = String::new();

        for attempt in 0..=self.cfg.max_retries {
            if attempt > 0 {
                let backoff = self.cfg.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(attempt, backoff_ms = backoff, "vision call retry");
                sleep(Duration::from_millis(backoff)).await;
            }

            let mut request = self.http.post(self.endpoint()).json(&body);
            if let Some(key) = &self.cfg.api_key {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let payload: Value = response.json().await.map_err(|e| {
                            VisionError::Provider(format!("malformed response body: {}", e))
                        })?;
                        return completion_text(&payload);
                    }
                    // 429/5xx are transient under load; anything else is final.
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    let detail = format!("HTTP {}", status);
                    if !retryable {
                        return Err(VisionError::Provider(detail));
                    }
                    last_err = detail;
                }
                Err(e) => {
                    last_err = e.to_string();
                }
            }
            debug!(attempt, error = %last_err, "vision call failed");
        }

        Err(VisionError::Unavailable(last_err))
    }
}

/// Pull the first choice's message content out of a chat-completions reply.
fn completion_text(payload: &Value) -> Result<String, VisionError> {
    payload["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| VisionError::Provider("response carried no completion text".into()))
}

#[async_trait]
impl VisionClient for HttpVisionClient {
    async fn extract_invoice(&self, pages: &[PreparedImage]) -> Result<String, VisionError> {
        if pages.is_empty() {
            return Err(VisionError::Provider("no pages supplied".into()));
        }

        let mut content = vec![json!({
            "type": "text",
            "text": prompts::extraction_prompt(pages.len()),
        })];
        for page in pages {
            content.push(json!({
                "type": "image_url",
                "image_url": {
                    "url": format!(
                        "data:{};base64,{}",
                        page.media_type,
                        STANDARD.encode(&page.bytes)
                    ),
                    "detail": "high",
                },
            }));
        }

        let body = json!({
            "model": self.cfg.model,
            "temperature": 0.0,
            "messages": [{ "role": "user", "content": content }],
        });

        self.chat(body).await
    }

    async fn classify(&self, prompt: &str) -> Result<String, VisionError> {
        let body = json!({
            "model": self.cfg.model,
            "temperature": 0.0,
            "messages": [{ "role": "user", "content": prompt }],
        });
        self.chat(body).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_text_reads_first_choice() {
        let payload = json!({
            "choices": [{ "message": { "content": "{\"items\": []}" } }]
        });
        assert_eq!(completion_text(&payload).unwrap(), "{\"items\": []}");
    }

    #[test]
    fn missing_content_is_a_provider_error() {
        let payload = json!({ "choices": [] });
        assert!(matches!(
            completion_text(&payload),
            Err(VisionError::Provider(_))
        ));
    }

    #[test]
    fn endpoint_handles_trailing_slash() {
        let client = HttpVisionClient::new(VisionConfig {
            base_url: "http://model.local/v1/".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.endpoint(), "http://model.local/v1/chat/completions");
    }
}
