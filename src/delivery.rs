//! Delivery orchestration: decides how a document gets through the
//! completion API and turns the per-call results into one result.
//!
//! - `Chunked`: whole document when short; otherwise paragraph blocks,
//!   delivered strictly one after another, each under the retry policy.
//!   Any block that ultimately fails fails the run; no partial aggregate.
//! - `Streamed`: whole document over one streamed chat request, no retry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::chunker::{self, Chunk};
use crate::config::{ChunkingConfig, Config, Strategy, TokenConfig};
use crate::dispatch::http::HttpTransport;
use crate::dispatch::{DeliveryMode, DeliveryRequest, DeliveryResult, Transport, classify_model};
use crate::document::{self, DocumentSource};
use crate::error::ProofreadError;
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::prompt;
use crate::retry::{ChunkPosition, RetryPolicy, with_retry};

/// Knobs the orchestrator needs, lifted out of [`Config`].
#[derive(Debug, Clone)]
pub struct DeliverySettings {
    pub strategy: Strategy,
    pub chunking: ChunkingConfig,
    pub retry: RetryPolicy,
    pub tokens: TokenConfig,
}

impl From<&Config> for DeliverySettings {
    fn from(config: &Config) -> Self {
        Self {
            strategy: config.strategy,
            chunking: config.chunking.clone(),
            retry: config.retry.clone(),
            tokens: config.tokens.clone(),
        }
    }
}

/// The text shown to the user, plus how it was obtained.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateResult {
    pub text: String,
    pub model: String,
    pub strategy: &'static str,
    /// Number of blocks delivered (1 for whole-document runs).
    pub blocks: usize,
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

pub struct Proofreader {
    transport: Arc<dyn Transport>,
    settings: DeliverySettings,
}

impl Proofreader {
    pub fn new(transport: Arc<dyn Transport>, settings: DeliverySettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    /// HTTP-backed proofreader for one run's credential.
    pub fn from_config(config: &Config, api_key: &str) -> Self {
        let transport = HttpTransport::new(&config.api_base, api_key)
            .with_stall_timeout(config.stream.stall_timeout());
        Self::new(Arc::new(transport), DeliverySettings::from(config))
    }

    /// Read the document once, then run. Read failures abort before any
    /// network activity.
    pub async fn run_document(
        &self,
        source: &dyn DocumentSource,
        model: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<(String, AggregateResult), ProofreadError> {
        progress.report(&ProgressEvent::ReadingDocument);
        let text = document::read_document(source).await?;
        let result = self.run(&text, model, progress).await?;
        Ok((text, result))
    }

    pub async fn run(
        &self,
        document_text: &str,
        model: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<AggregateResult, ProofreadError> {
        if document_text.trim().is_empty() {
            return Err(ProofreadError::EmptyDocument);
        }
        let start = Instant::now();
        let chars = document_text.chars().count();
        tracing::info!(
            model,
            chars,
            strategy = self.settings.strategy.as_str(),
            "starting proofreading run"
        );

        let (text, blocks) = match self.settings.strategy {
            Strategy::Streamed => (self.run_streamed(document_text, model, progress).await?, 1),
            Strategy::Chunked if chars <= self.settings.chunking.threshold_chars => {
                (self.run_single(document_text, model, progress).await?, 1)
            }
            Strategy::Chunked => self.run_chunked(document_text, model, progress).await?,
        };

        let elapsed = start.elapsed();
        tracing::info!(
            model,
            blocks,
            elapsed_ms = elapsed.as_millis() as u64,
            "proofreading run complete"
        );
        Ok(AggregateResult {
            text,
            model: model.to_string(),
            strategy: self.settings.strategy.as_str(),
            blocks,
            elapsed,
        })
    }

    async fn run_single(
        &self,
        document_text: &str,
        model: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<String, ProofreadError> {
        progress.report(&ProgressEvent::Sending {
            model: model.to_string(),
        });
        let req = DeliveryRequest::new(
            model,
            prompt::SYSTEM_PROMPT,
            prompt::document_message(document_text),
            self.settings.tokens.max_output_tokens,
        );
        let position = ChunkPosition { index: 1, total: 1 };
        // An unsplit document has no block to name in the error.
        let result = self
            .deliver_with_retry(&req, position, progress)
            .await
            .map_err(ProofreadError::into_root)?;
        Ok(result.text)
    }

    async fn run_chunked(
        &self,
        document_text: &str,
        model: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<(String, usize), ProofreadError> {
        let chunks = chunker::split(document_text, self.settings.chunking.max_chunk_chars);
        let total = chunks.len();
        if total <= 1 {
            // Over the threshold only by blank space: still one whole document.
            let text = self.run_single(document_text, model, progress).await?;
            return Ok((text, 1));
        }
        tracing::info!(total, "document split into blocks");
        progress.report(&ProgressEvent::Splitting { total });
        tokio::time::sleep(self.settings.chunking.start_delay()).await;

        let mut texts = Vec::with_capacity(total);
        for chunk in &chunks {
            progress.report(&ProgressEvent::Chunk {
                index: chunk.index,
                total,
            });
            let req = self.chunk_request(chunk, model);
            let position = ChunkPosition {
                index: chunk.index,
                total,
            };
            let result = self.deliver_with_retry(&req, position, progress).await?;
            tracing::debug!(
                chunk = chunk.index,
                latency_ms = result.latency.as_millis() as u64,
                "block delivered"
            );
            texts.push(result.text);
        }

        progress.report(&ProgressEvent::Aggregating { total });
        Ok((aggregate(&texts), total))
    }

    async fn run_streamed(
        &self,
        document_text: &str,
        model: &str,
        progress: &dyn ProgressReporter,
    ) -> Result<String, ProofreadError> {
        progress.report(&ProgressEvent::Sending {
            model: model.to_string(),
        });
        let req = DeliveryRequest::new(
            model,
            prompt::SYSTEM_PROMPT,
            prompt::document_message(document_text),
            self.settings.tokens.stream_max_tokens,
        );
        let result = self
            .transport
            .deliver(&req, DeliveryMode::ChatStream, progress)
            .await?;
        Ok(result.text)
    }

    fn chunk_request(&self, chunk: &Chunk, model: &str) -> DeliveryRequest {
        DeliveryRequest::new(
            model,
            prompt::SYSTEM_PROMPT,
            prompt::chunk_message(chunk),
            self.settings.tokens.max_output_tokens,
        )
    }

    async fn deliver_with_retry(
        &self,
        req: &DeliveryRequest,
        position: ChunkPosition,
        progress: &dyn ProgressReporter,
    ) -> Result<DeliveryResult, ProofreadError> {
        let mode = classify_model(&req.model).request_mode();
        let transport = &self.transport;
        with_retry(&self.settings.retry, position, progress, |_attempt| {
            transport.deliver(req, mode, progress)
        })
        .await
    }
}

/// One result is returned verbatim. Several are labeled with their block
/// position and joined by a visible divider, in block order.
pub fn aggregate(texts: &[String]) -> String {
    if let [only] = texts {
        return only.clone();
    }
    let total = texts.len();
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| format!("{}\n\n{}", prompt::block_heading(i + 1, total), text.trim_end()))
        .collect::<Vec<_>>()
        .join(prompt::BLOCK_DIVIDER)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_result_is_verbatim() {
        let texts = vec!["## 【校正結果】\n指摘なし\n".to_string()];
        assert_eq!(aggregate(&texts), texts[0]);
    }

    #[test]
    fn multiple_results_are_labeled_in_order() {
        let texts: Vec<String> = ["one", "two", "three"].iter().map(|s| s.to_string()).collect();
        let out = aggregate(&texts);
        let sections: Vec<&str> = out.split(prompt::BLOCK_DIVIDER).collect();
        assert_eq!(sections.len(), 3);
        for (i, section) in sections.iter().enumerate() {
            assert!(section.starts_with(&prompt::block_heading(i + 1, 3)));
        }
        assert!(sections[1].ends_with("two"));
    }
}
