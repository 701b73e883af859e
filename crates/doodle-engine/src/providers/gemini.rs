use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::{Client as HttpClient, StatusCode};
use serde_json::{json, Value};

use super::{ImageRequest, InferenceProvider, InlineImage, VisionRequest};
use crate::error::InferenceError;

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const PROVIDER: &str = "gemini";
const MAX_ERROR_BODY_CHARS: usize = 512;
const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiProvider {
    api_base: String,
    api_key: String,
    http: HttpClient,
    transport_retries: usize,
    retry_backoff: Duration,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, api_base: Option<String>) -> Self {
        Self {
            api_base: api_base
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            api_key: api_key.into(),
            http: HttpClient::new(),
            transport_retries: 1,
            retry_backoff: Duration::from_millis(1200),
        }
    }

    pub fn with_transport_retries(mut self, retries: usize, backoff: Duration) -> Self {
        self.transport_retries = retries;
        self.retry_backoff = backoff;
        self
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    fn safety_settings() -> Vec<Value> {
        [
            "HARM_CATEGORY_HARASSMENT",
            "HARM_CATEGORY_HATE_SPEECH",
            "HARM_CATEGORY_SEXUALLY_EXPLICIT",
            "HARM_CATEGORY_DANGEROUS_CONTENT",
        ]
        .into_iter()
        .map(|category| {
            json!({
                "category": category,
                "threshold": "BLOCK_MEDIUM_AND_ABOVE",
            })
        })
        .collect()
    }

    async fn post_with_transport_retries(
        &self,
        endpoint: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<Value, InferenceError> {
        let mut attempt = 0;
        loop {
            match self.post_once(endpoint, payload, timeout).await {
                Err(err) if err.is_retryable_transport() && attempt < self.transport_retries => {
                    attempt += 1;
                    tracing::warn!(
                        "Gemini transport retry {attempt}/{} after transient request failure: {err}",
                        self.transport_retries
                    );
                    tokio::time::sleep(self.retry_backoff * attempt as u32).await;
                }
                result => return result,
            }
        }
    }

    async fn post_once(
        &self,
        endpoint: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<Value, InferenceError> {
        let response = self
            .http
            .post(endpoint)
            .header(API_KEY_HEADER, self.api_key.as_str())
            .timeout(timeout)
            .json(payload)
            .send()
            .await
            .map_err(|err| transport_error(err, timeout))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| transport_error(err, timeout))?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        serde_json::from_str(&body).map_err(|err| InferenceError::MalformedResponse {
            provider: PROVIDER.to_string(),
            detail: format!("invalid JSON: {err}"),
        })
    }
}

#[async_trait]
impl InferenceProvider for GeminiProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn describe_image(&self, request: &VisionRequest) -> Result<String, InferenceError> {
        let endpoint = self.endpoint_for_model(&request.model);
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": request.instruction },
                    {
                        "inlineData": {
                            "mimeType": request.image.mime_type(),
                            "data": request.image.to_base64(),
                        }
                    },
                ],
            }],
            "safetySettings": Self::safety_settings(),
        });
        let response = self
            .post_with_transport_retries(&endpoint, &payload, request.timeout)
            .await?;
        Ok(extract_text(&response))
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<InlineImage, InferenceError> {
        let endpoint = self.endpoint_for_model(&request.model);
        let payload = json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.prompt }],
            }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
            },
            "safetySettings": Self::safety_settings(),
        });
        let response = self
            .post_with_transport_retries(&endpoint, &payload, request.timeout)
            .await?;
        extract_first_image(&response)?.ok_or_else(|| InferenceError::MissingImage {
            provider: PROVIDER.to_string(),
        })
    }
}

fn transport_error(err: reqwest::Error, timeout: Duration) -> InferenceError {
    if err.is_timeout() {
        return InferenceError::Timeout {
            provider: PROVIDER.to_string(),
            millis: timeout.as_millis(),
        };
    }
    InferenceError::Transport {
        provider: PROVIDER.to_string(),
        source: err.without_url(),
    }
}

fn status_error(status: StatusCode, body: &str) -> InferenceError {
    if status == StatusCode::TOO_MANY_REQUESTS || body.contains("RESOURCE_EXHAUSTED") {
        return InferenceError::Throttled {
            provider: PROVIDER.to_string(),
        };
    }
    InferenceError::Status {
        provider: PROVIDER.to_string(),
        code: status.as_u16(),
        body: truncate_text(body, MAX_ERROR_BODY_CHARS),
    }
}

fn candidate_parts(response: &Value) -> impl Iterator<Item = &Value> {
    response
        .get("candidates")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|candidate| {
            candidate
                .get("content")
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
        })
        .flatten()
}

fn extract_text(response: &Value) -> String {
    candidate_parts(response)
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<&str>>()
        .join(" ")
        .trim()
        .to_string()
}

fn extract_first_image(response: &Value) -> Result<Option<InlineImage>, InferenceError> {
    for part in candidate_parts(response) {
        let Some(inline) = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object)
        else {
            continue;
        };
        let data = inline
            .get("data")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        let bytes = BASE64
            .decode(data.as_bytes())
            .map_err(|err| InferenceError::MalformedResponse {
                provider: PROVIDER.to_string(),
                detail: format!("image base64 decode failed: {err}"),
            })?;
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .unwrap_or("image/png")
            .to_string();
        return Ok(Some(InlineImage { bytes, mime_type }));
    }
    Ok(None)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
