use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::dispatch::{DeliveryMode, DeliveryRequest, DeliveryResult, Transport};
use crate::error::ProofreadError;
use crate::progress::ProgressReporter;
use crate::stream::StreamAssembler;

pub const MAX_RESPONSE_BYTES: usize = 2 * 1024 * 1024; // 2MB

/// Characters of raw payload kept in `EmptyResponse` for diagnosis.
pub const PREVIEW_CHARS: usize = 200;

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Default longest silence tolerated between stream reads.
pub const DEFAULT_STALL_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    code: Option<String>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Deserialize)]
struct ModelList {
    data: Vec<ModelObject>,
}

#[derive(Deserialize)]
struct ModelObject {
    id: String,
}

/// Completion transport over the OpenAI HTTP API.
pub struct HttpTransport {
    client: Client,
    api_base: String,
    api_key: String,
    stall_timeout: Duration,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("api_base", &self.api_base)
            .field("api_key", &"[REDACTED]")
            .field("stall_timeout", &self.stall_timeout)
            .finish()
    }
}

impl HttpTransport {
    pub fn new(api_base: &str, api_key: &str) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(4)
            .build()
            .expect("failed to build HTTP client");

        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            stall_timeout: DEFAULT_STALL_TIMEOUT,
        }
    }

    pub fn with_stall_timeout(mut self, stall_timeout: Duration) -> Self {
        self.stall_timeout = stall_timeout;
        self
    }

    pub fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.api_base)
    }

    pub fn responses_url(&self) -> String {
        format!("{}/responses", self.api_base)
    }

    pub fn models_url(&self) -> String {
        format!("{}/models", self.api_base)
    }

    /// List model ids starting with `prefix`, newest-looking first
    /// (descending lexicographic order).
    pub async fn list_models(&self, prefix: &str) -> Result<Vec<String>, ProofreadError> {
        let response = self
            .client
            .get(self.models_url())
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let response = check_status(response, "").await?;
        let bytes = read_capped(response).await?;

        let list: ModelList = serde_json::from_slice(&bytes)
            .map_err(|e| ProofreadError::SchemaParse(format!("model list: {e}")))?;
        let mut models: Vec<String> = list
            .data
            .into_iter()
            .map(|m| m.id)
            .filter(|id| id.starts_with(prefix))
            .collect();
        models.sort_by(|a, b| b.cmp(a));

        if models.is_empty() {
            return Err(ProofreadError::Other(format!(
                "no models matching '{prefix}' are available to this API key"
            )));
        }
        Ok(models)
    }

    async fn post(&self, url: String, body: &Value) -> Result<Response, ProofreadError> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await?;
        Ok(response)
    }

    async fn deliver_chat(&self, req: &DeliveryRequest) -> Result<String, ProofreadError> {
        let body = chat_body(req, false);
        let response = self.post(self.chat_url(), &body).await?;
        let response = check_status(response, &req.model).await?;
        let bytes = read_capped(response).await?;
        let value = parse_json(&bytes)?;
        extract_chat_text(&value).ok_or_else(|| empty_response(&bytes))
    }

    async fn deliver_response_style(&self, req: &DeliveryRequest) -> Result<String, ProofreadError> {
        let body = response_style_body(req);
        let response = self.post(self.responses_url(), &body).await?;
        let response = check_status(response, &req.model).await?;
        let bytes = read_capped(response).await?;
        let value = parse_json(&bytes)?;
        extract_response_text(&value).ok_or_else(|| empty_response(&bytes))
    }

    async fn deliver_chat_stream(
        &self,
        req: &DeliveryRequest,
        progress: &dyn ProgressReporter,
    ) -> Result<String, ProofreadError> {
        let body = chat_body(req, true);
        let response = self.post(self.chat_url(), &body).await?;
        let response = check_status(response, &req.model).await?;

        let mut stream = response.bytes_stream();
        let mut assembler = StreamAssembler::new();

        loop {
            let next = tokio::time::timeout(self.stall_timeout, stream.next())
                .await
                .map_err(|_| {
                    tracing::warn!(
                        received = assembler.received_chars(),
                        "stream stalled for {}s",
                        self.stall_timeout.as_secs()
                    );
                    ProofreadError::Timeout(self.stall_timeout.as_millis() as u64)
                })?;
            match next {
                Some(Ok(bytes)) => {
                    assembler.feed(&bytes, progress);
                    // An unterminated line counts too.
                    if assembler.text().len() + assembler.buffered_len() > MAX_RESPONSE_BYTES {
                        return Err(ProofreadError::Other(format!(
                            "streamed response exceeded {MAX_RESPONSE_BYTES} bytes"
                        )));
                    }
                }
                Some(Err(e)) => {
                    // No resume: a dropped connection fails the run.
                    tracing::warn!(
                        received = assembler.received_chars(),
                        "stream interrupted: {e}"
                    );
                    return Err(ProofreadError::Network(format!("stream interrupted: {e}")));
                }
                None => break,
            }
        }

        if !assembler.is_done() {
            tracing::debug!("stream closed without [DONE] sentinel");
        }
        assembler.finish(progress)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn deliver(
        &self,
        req: &DeliveryRequest,
        mode: DeliveryMode,
        progress: &dyn ProgressReporter,
    ) -> Result<DeliveryResult, ProofreadError> {
        let start = Instant::now();
        tracing::debug!(
            model = %req.model,
            ?mode,
            chars = req.user_content.chars().count(),
            "sending completion request"
        );

        let text = match mode {
            DeliveryMode::Chat => self.deliver_chat(req).await?,
            DeliveryMode::ResponseStyle => self.deliver_response_style(req).await?,
            DeliveryMode::ChatStream => self.deliver_chat_stream(req, progress).await?,
        };

        Ok(DeliveryResult {
            text,
            model: req.model.clone(),
            latency: start.elapsed(),
        })
    }
}

/// Chat-style body: `messages` with system + user roles, the class-specific
/// token field, and a temperature only when the model accepts one.
pub fn chat_body(req: &DeliveryRequest, stream: bool) -> Value {
    let mut body = json!({
        "model": req.model,
        "messages": [
            {"role": "system", "content": req.system_instructions},
            {"role": "user", "content": req.user_content},
        ],
    });
    body[req.class().token_field()] = json!(req.token_budget);
    if let Some(t) = req.temperature {
        body["temperature"] = json!(t);
    }
    if stream {
        body["stream"] = json!(true);
    }
    body
}

/// Response-style body: single `instructions` + `input`.
pub fn response_style_body(req: &DeliveryRequest) -> Value {
    json!({
        "model": req.model,
        "instructions": req.system_instructions,
        "input": req.user_content,
        "max_output_tokens": req.token_budget,
    })
}

/// Text at `choices[0].message.content`, if non-blank.
pub fn extract_chat_text(value: &Value) -> Option<String> {
    value["choices"][0]["message"]["content"]
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

/// Concatenate every `output[].content[].text` fragment in order, falling
/// back to the flat `output_text` field.
pub fn extract_response_text(value: &Value) -> Option<String> {
    let structured: String = value["output"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|item| item["content"].as_array())
        .flatten()
        .filter_map(|c| c["text"].as_str())
        .collect();
    if !structured.trim().is_empty() {
        return Some(structured);
    }
    value["output_text"]
        .as_str()
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

/// Map a non-success status and its body onto the error taxonomy.
pub fn classify_error(status: StatusCode, body: &[u8], model: &str) -> ProofreadError {
    let parsed = serde_json::from_slice::<ErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error);
    let (message, code, kind) = match parsed {
        Some(e) => (e.message, e.code, e.kind),
        None => (None, None, None),
    };
    let message = message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    let markers = [code.as_deref(), kind.as_deref(), Some(message.as_str())];
    let mentions = |needle: &str| markers.iter().flatten().any(|m| m.contains(needle));

    if status == StatusCode::UNAUTHORIZED {
        ProofreadError::AuthFailed { message }
    } else if mentions("insufficient_quota") {
        ProofreadError::QuotaExceeded { message }
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        ProofreadError::RateLimited { message }
    } else if mentions("model_not_found") || mentions("does not have access to model") {
        ProofreadError::ModelAccess {
            model: model.to_string(),
            message,
        }
    } else {
        ProofreadError::Provider {
            status: status.as_u16(),
            message,
        }
    }
}

async fn check_status(response: Response, model: &str) -> Result<Response, ProofreadError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.bytes().await.unwrap_or_default();
    let body = &body[..body.len().min(MAX_RESPONSE_BYTES)];
    let err = classify_error(status, body, model);
    tracing::warn!(status = status.as_u16(), model, "provider rejected request: {err}");
    Err(err)
}

async fn read_capped(response: Response) -> Result<Vec<u8>, ProofreadError> {
    if let Some(len) = response.content_length()
        && len as usize > MAX_RESPONSE_BYTES
    {
        return Err(ProofreadError::Other(format!(
            "response too large: {len} bytes (max {MAX_RESPONSE_BYTES})"
        )));
    }
    let bytes = response
        .bytes()
        .await
        .map_err(|e| ProofreadError::Network(format!("failed to read response body: {e}")))?;
    if bytes.len() > MAX_RESPONSE_BYTES {
        return Err(ProofreadError::Other(format!(
            "response too large: {} bytes (max {MAX_RESPONSE_BYTES})",
            bytes.len()
        )));
    }
    Ok(bytes.to_vec())
}

fn parse_json(bytes: &[u8]) -> Result<Value, ProofreadError> {
    serde_json::from_slice(bytes)
        .map_err(|e| ProofreadError::SchemaParse(format!("failed to parse response: {e}")))
}

fn empty_response(bytes: &[u8]) -> ProofreadError {
    let preview: String = String::from_utf8_lossy(bytes)
        .chars()
        .take(PREVIEW_CHARS)
        .collect();
    ProofreadError::EmptyResponse { preview }
}
