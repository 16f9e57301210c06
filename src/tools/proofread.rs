use schemars::JsonSchema;
use serde::Deserialize;

use crate::document::{DocumentSource, FileDocument, InlineDocument};
use crate::tools::enums::StrategyArg;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ProofreadRequest {
    /// Document text to proofread. Provide either this or file_path.
    pub text: Option<String>,
    /// Path to a UTF-8 text file to proofread. Ignored when text is set.
    pub file_path: Option<String>,
    /// Model name from `listmodels` output. Defaults to the saved model setting.
    pub model: Option<String>,
    /// "chunked" (default) or "streamed". Overrides the configured strategy for this call.
    pub strategy: Option<StrategyArg>,
    /// Also return the result rendered as HTML.
    pub html: Option<bool>,
}

impl ProofreadRequest {
    /// Where the document comes from. Inline text wins over a path.
    pub fn source(&self) -> Result<Box<dyn DocumentSource>, String> {
        if let Some(text) = &self.text {
            return Ok(Box::new(InlineDocument(text.clone())));
        }
        match self.file_path.as_deref().map(str::trim) {
            Some(path) if !path.is_empty() => Ok(Box::new(FileDocument::new(path))),
            _ => Err("either text or file_path is required".to_string()),
        }
    }

    /// Explicit, non-blank model name, if one was given.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref().map(str::trim).filter(|m| !m.is_empty())
    }

    pub fn wants_html(&self) -> bool {
        self.html.unwrap_or(false)
    }
}
