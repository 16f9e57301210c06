pub mod http;

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ProofreadError;
use crate::progress::ProgressReporter;

/// Sampling temperature sent to models that accept one. Low to keep
/// corrections literal.
pub const DEFAULT_TEMPERATURE: f64 = 0.2;

/// Model name prefix routed to the response-style endpoint.
const RESPONSE_STYLE_PREFIXES: [&str; 1] = ["gpt-5"];

/// Reasoning-class prefixes: `max_completion_tokens`, no temperature.
const REASONING_PREFIXES: [&str; 3] = ["o1", "o3", "o4"];

/// Closed classification of a model identifier. Decides endpoint shape and
/// parameter set in one place instead of prefix checks at every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelClass {
    ChatStandard,
    ChatReasoning,
    ResponseStyle,
}

impl ModelClass {
    /// Token cap field name on the chat-style endpoint.
    pub fn token_field(self) -> &'static str {
        match self {
            Self::ChatStandard => "max_tokens",
            Self::ChatReasoning | Self::ResponseStyle => "max_completion_tokens",
        }
    }

    /// Temperature to send, if the model accepts one.
    pub fn temperature(self) -> Option<f64> {
        match self {
            Self::ChatStandard => Some(DEFAULT_TEMPERATURE),
            Self::ChatReasoning | Self::ResponseStyle => None,
        }
    }

    /// Endpoint shape for a non-streamed delivery.
    pub fn request_mode(self) -> DeliveryMode {
        match self {
            Self::ResponseStyle => DeliveryMode::ResponseStyle,
            Self::ChatStandard | Self::ChatReasoning => DeliveryMode::Chat,
        }
    }
}

pub fn classify_model(model: &str) -> ModelClass {
    if RESPONSE_STYLE_PREFIXES.iter().any(|p| model.starts_with(p)) {
        ModelClass::ResponseStyle
    } else if REASONING_PREFIXES.iter().any(|p| model.starts_with(p)) {
        ModelClass::ChatReasoning
    } else {
        ModelClass::ChatStandard
    }
}

/// Endpoint shape for one transport call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// `messages` array, one decoded reply.
    Chat,
    /// `instructions` + `input`, one decoded reply.
    ResponseStyle,
    /// Chat request with `stream: true`; reply is an event stream.
    ChatStream,
}

/// The unit handed to a transport.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    pub model: String,
    pub system_instructions: String,
    pub user_content: String,
    pub token_budget: u64,
    /// Present only for models that accept a temperature.
    pub temperature: Option<f64>,
}

impl DeliveryRequest {
    pub fn new(
        model: &str,
        system_instructions: &str,
        user_content: String,
        token_budget: u64,
    ) -> Self {
        Self {
            model: model.to_string(),
            system_instructions: system_instructions.to_string(),
            user_content,
            token_budget,
            temperature: classify_model(model).temperature(),
        }
    }

    pub fn class(&self) -> ModelClass {
        classify_model(&self.model)
    }
}

/// One non-empty text payload from the provider.
#[derive(Debug, Clone)]
pub struct DeliveryResult {
    pub text: String,
    pub model: String,
    pub latency: Duration,
}

/// One outbound call to a completion endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `req` using endpoint shape `mode`. Streaming transports report
    /// received-character progress through `progress`.
    async fn deliver(
        &self,
        req: &DeliveryRequest,
        mode: DeliveryMode,
        progress: &dyn ProgressReporter,
    ) -> Result<DeliveryResult, ProofreadError>;
}
