//! Host document access. The core only needs "give me the whole text once".

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::ProofreadError;

/// Maximum document size accepted from disk.
pub const MAX_DOCUMENT_BYTES: u64 = 4 * 1024 * 1024;

#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Full text of the open document.
    async fn read_text(&self) -> Result<String, ProofreadError>;
}

/// Text handed over directly by the caller.
pub struct InlineDocument(pub String);

#[async_trait]
impl DocumentSource for InlineDocument {
    async fn read_text(&self) -> Result<String, ProofreadError> {
        Ok(normalize_newlines(&self.0))
    }
}

/// A UTF-8 text file on disk.
pub struct FileDocument {
    path: PathBuf,
}

impl FileDocument {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl DocumentSource for FileDocument {
    async fn read_text(&self) -> Result<String, ProofreadError> {
        let display = self.path.display();
        let meta = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| ProofreadError::Read(format!("{display}: {e}")))?;
        if !meta.is_file() {
            return Err(ProofreadError::Read(format!("{display}: not a regular file")));
        }
        if meta.len() > MAX_DOCUMENT_BYTES {
            return Err(ProofreadError::Read(format!(
                "{display}: {} bytes exceeds the {MAX_DOCUMENT_BYTES} byte limit",
                meta.len()
            )));
        }
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| ProofreadError::Read(format!("{display}: {e}")))?;
        let text = String::from_utf8(bytes)
            .map_err(|_| ProofreadError::Read(format!("{display}: not valid UTF-8")))?;
        Ok(normalize_newlines(&text))
    }
}

/// Word-style `\r` and `\r\n` paragraph marks become `\n`.
pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Read the document and reject empty or whitespace-only text.
pub async fn read_document(source: &dyn DocumentSource) -> Result<String, ProofreadError> {
    let text = source.read_text().await?;
    if text.trim().is_empty() {
        return Err(ProofreadError::EmptyDocument);
    }
    Ok(text)
}
