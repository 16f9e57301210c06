use thiserror::Error;

/// HTTP statuses treated as transient server-side failures.
pub const TRANSIENT_STATUSES: [u16; 3] = [500, 502, 503];

/// Substrings in an error message that mark a transient network failure.
const TRANSIENT_MARKERS: [&str; 5] = [
    "timeout",
    "timed out",
    "network",
    "failed to fetch",
    "connection",
];

#[derive(Debug, Error)]
pub enum ProofreadError {
    #[error("failed to read document: {0}")]
    Read(String),

    #[error("document contains no text")]
    EmptyDocument,

    #[error("no API key configured")]
    MissingApiKey,

    #[error("authentication failed: {message}")]
    AuthFailed { message: String },

    #[error("rate limited: {message}")]
    RateLimited { message: String },

    #[error("quota exceeded: {message}")]
    QuotaExceeded { message: String },

    #[error("model {model} is not available: {message}")]
    ModelAccess { model: String, message: String },

    #[error("provider error (HTTP {status}): {message}")]
    Provider { status: u16, message: String },

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("network error: {0}")]
    Network(String),

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned no text (payload: {preview})")]
    EmptyResponse { preview: String },

    #[error("stream ended without any text")]
    EmptyStream,

    #[error("schema parse error: {0}")]
    SchemaParse(String),

    #[error("block {index}/{total} failed: {source}")]
    ChunkFailed {
        index: usize,
        total: usize,
        #[source]
        source: Box<ProofreadError>,
    },

    #[error("settings error: {0}")]
    Settings(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl ProofreadError {
    /// Returns true for transient errors that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) => true,
            Self::Network(_) => true,
            Self::Request(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.is_body()
                    || has_transient_marker(&e.to_string())
            }
            // Markers only count on server-side failures; a 4xx is never transient.
            Self::Provider { status, message } => {
                TRANSIENT_STATUSES.contains(status)
                    || (*status >= 500 && has_transient_marker(message))
            }
            Self::Other(message) => has_transient_marker(message),
            _ => false,
        }
    }

    /// Strip the chunk position tag, if any.
    pub fn root(&self) -> &ProofreadError {
        match self {
            Self::ChunkFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Owned form of [`root`](Self::root): drop the chunk position tag.
    pub fn into_root(self) -> ProofreadError {
        match self {
            Self::ChunkFailed { source, .. } => source.into_root(),
            other => other,
        }
    }

    /// Short machine-readable class name, used in tool metadata and logs.
    pub fn reason(&self) -> &'static str {
        match self.root() {
            Self::Read(_) | Self::EmptyDocument => "read_error",
            Self::MissingApiKey | Self::AuthFailed { .. } => "auth_failed",
            Self::RateLimited { .. } => "rate_limited",
            Self::QuotaExceeded { .. } => "quota_exceeded",
            Self::ModelAccess { .. } => "model_access",
            Self::Provider { .. } => "provider_error",
            Self::Timeout(_) => "timeout",
            Self::Network(_) | Self::Request(_) => "network",
            Self::EmptyResponse { .. } => "empty_response",
            Self::EmptyStream => "empty_stream",
            Self::SchemaParse(_) => "parse_error",
            Self::Settings(_) | Self::Config(_) => "config",
            Self::ChunkFailed { .. } | Self::Other(_) => "error",
        }
    }

    /// Single human-readable message for the pane. Never includes the API key or
    /// raw upstream bodies beyond the provider's own error message.
    pub fn user_message(&self) -> String {
        match self {
            Self::Read(msg) => format!("Could not read the document: {msg}"),
            Self::EmptyDocument => {
                "The document contains no text. Add some text and try again.".to_string()
            }
            Self::MissingApiKey => {
                "No API key is configured. Save an OpenAI API key with the `settings` tool."
                    .to_string()
            }
            Self::AuthFailed { .. } => {
                "The API key is invalid. Enter a valid OpenAI API key and save it again."
                    .to_string()
            }
            Self::RateLimited { .. } => {
                "The API rate limit was reached. Wait a moment and try again.".to_string()
            }
            Self::QuotaExceeded { .. } => {
                "Your OpenAI quota is exhausted. Check the balance on the OpenAI billing page."
                    .to_string()
            }
            Self::ModelAccess { model, message } => format!(
                "Model {model} is not available to your project. Run `listmodels` to refresh \
                 the list and pick another model.\n\nDetails: {message}"
            ),
            Self::Provider { status, message } => {
                format!("OpenAI API error (HTTP {status}): {message}")
            }
            Self::Timeout(ms) => format!("The request timed out after {ms}ms."),
            Self::Network(msg) => format!("Network error: {msg}"),
            Self::Request(_) => "The request to the provider failed.".to_string(),
            Self::EmptyResponse { .. } | Self::EmptyStream => {
                "The API returned an empty response. Try another model or retry later."
                    .to_string()
            }
            Self::SchemaParse(_) => "Failed to parse the provider response.".to_string(),
            Self::ChunkFailed {
                index,
                total,
                source,
            } => format!("Block {index}/{total} failed: {}", source.user_message()),
            Self::Settings(msg) => format!("Settings error: {msg}"),
            Self::Config(msg) => format!("Configuration error: {msg}"),
            Self::Other(msg) if msg.is_empty() => "An unknown error occurred.".to_string(),
            Self::Other(msg) => msg.clone(),
        }
    }
}

fn has_transient_marker(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_MARKERS.iter().any(|m| lower.contains(m))
}
