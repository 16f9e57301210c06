//! Paragraph-preferring text splitter.
//!
//! Sizes are measured in characters, not bytes: documents are mostly
//! Japanese and the provider limits scale with characters.

use serde::Serialize;

/// Default target chunk size in characters.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 1500;

/// Joins paragraphs inside one chunk.
const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// One ordered piece of a document. `index` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub index: usize,
    pub total: usize,
    pub text: String,
}

/// Split `text` into ordered chunks of at most `max_chars` characters,
/// preferring blank-line paragraph boundaries. A paragraph longer than
/// `max_chars` is force-split into fixed-size slices.
pub fn split(text: &str, max_chars: usize) -> Vec<Chunk> {
    let max_chars = max_chars.max(1);
    let mut pieces: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for paragraph in paragraphs(text) {
        let para_len = paragraph.chars().count();

        if para_len > max_chars {
            if current_len > 0 {
                pieces.push(std::mem::take(&mut current));
            }
            let mut slices = slice_chars(paragraph, max_chars);
            // Accumulation resumes from the final slice.
            let last = slices.pop().unwrap_or_default();
            pieces.extend(slices);
            current_len = last.chars().count();
            current = last;
            continue;
        }

        if current_len == 0 {
            current.push_str(paragraph);
            current_len = para_len;
        } else if current_len + PARAGRAPH_SEPARATOR.len() + para_len <= max_chars {
            current.push_str(PARAGRAPH_SEPARATOR);
            current.push_str(paragraph);
            current_len += PARAGRAPH_SEPARATOR.len() + para_len;
        } else {
            pieces.push(std::mem::replace(&mut current, paragraph.to_string()));
            current_len = para_len;
        }
    }
    if current_len > 0 {
        pieces.push(current);
    }

    pieces.retain(|p| !p.trim().is_empty());
    let total = pieces.len();
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, text)| Chunk {
            index: i + 1,
            total,
            text,
        })
        .collect()
}

/// Paragraphs are runs of non-blank lines. Each returned slice spans from the
/// start of its first line to the end of its last line, so interior single
/// newlines are preserved verbatim.
fn paragraphs(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    let mut end = 0usize;
    let mut offset = 0usize;

    for line in text.split_inclusive('\n') {
        let content = line.trim_end_matches(['\n', '\r']);
        if content.trim().is_empty() {
            if let Some(s) = start.take() {
                out.push(&text[s..end]);
            }
        } else {
            if start.is_none() {
                start = Some(offset);
            }
            end = offset + content.len();
        }
        offset += line.len();
    }
    if let Some(s) = start {
        out.push(&text[s..end]);
    }
    out
}

fn slice_chars(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(size).map(|c| c.iter().collect()).collect()
}
