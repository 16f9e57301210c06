//! Incremental reassembly of a chat-completion event stream.
//!
//! Network reads can end anywhere: inside a line, inside a JSON frame, or
//! inside a multi-byte UTF-8 sequence. The assembler carries both the
//! undecoded byte tail and the incomplete last line across reads.

use serde::Deserialize;

use crate::error::ProofreadError;
use crate::progress::{ProgressEvent, ProgressReporter};

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Deserialize)]
struct StreamFrame {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Option<Delta>,
}

#[derive(Deserialize)]
struct Delta {
    content: Option<String>,
}

/// Accumulates decoded text from event-stream bytes.
#[derive(Debug, Default)]
pub struct StreamAssembler {
    /// Bytes of an incomplete UTF-8 sequence from the previous read.
    pending: Vec<u8>,
    /// Decoded text after the last newline.
    carry: String,
    text: String,
    received_chars: usize,
    done: bool,
}

impl StreamAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network read. Returns the number of characters appended.
    pub fn feed(&mut self, bytes: &[u8], progress: &dyn ProgressReporter) -> usize {
        self.pending.extend_from_slice(bytes);
        let decoded = decode_prefix(&mut self.pending);
        self.carry.push_str(&decoded);

        let Some(last_newline) = self.carry.rfind('\n') else {
            return 0;
        };
        let tail = self.carry.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.carry, tail);

        complete
            .lines()
            .map(|line| self.process_line(line, progress))
            .sum()
    }

    /// Finish the stream: flush any trailing partial line and return the text.
    pub fn finish(mut self, progress: &dyn ProgressReporter) -> Result<String, ProofreadError> {
        if !self.pending.is_empty() {
            let rest = String::from_utf8_lossy(&self.pending).into_owned();
            self.pending.clear();
            self.carry.push_str(&rest);
        }
        let tail = std::mem::take(&mut self.carry);
        for line in tail.lines() {
            self.process_line(line, progress);
        }

        if self.text.trim().is_empty() {
            return Err(ProofreadError::EmptyStream);
        }
        Ok(self.text)
    }

    pub fn received_chars(&self) -> usize {
        self.received_chars
    }

    /// True once the `[DONE]` sentinel has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Bytes held back waiting for a newline or the rest of a UTF-8 sequence.
    pub fn buffered_len(&self) -> usize {
        self.pending.len() + self.carry.len()
    }

    fn process_line(&mut self, line: &str, progress: &dyn ProgressReporter) -> usize {
        let line = line.trim();
        if line.is_empty() {
            return 0;
        }
        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            return 0;
        };
        let payload = payload.trim_start();
        if payload == DONE_SENTINEL {
            self.done = true;
            return 0;
        }

        // Malformed frame; skip it.
        let Ok(frame) = serde_json::from_str::<StreamFrame>(payload) else {
            tracing::debug!(len = payload.len(), "skipping unparseable stream frame");
            return 0;
        };
        let Some(delta) = frame
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.delta)
            .and_then(|d| d.content)
            .filter(|s| !s.is_empty())
        else {
            return 0;
        };

        let added = delta.chars().count();
        self.text.push_str(&delta);
        self.received_chars += added;
        progress.report(&ProgressEvent::Received {
            chars: self.received_chars,
        });
        added
    }
}

/// Decode as much of `buf` as forms complete UTF-8, leaving an incomplete
/// trailing sequence in place. Invalid sequences become U+FFFD.
fn decode_prefix(buf: &mut Vec<u8>) -> String {
    let mut out = String::new();
    let mut start = 0;
    loop {
        match std::str::from_utf8(&buf[start..]) {
            Ok(s) => {
                out.push_str(s);
                start = buf.len();
                break;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&buf[start..start + valid]));
                match e.error_len() {
                    Some(bad) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        start += valid + bad;
                    }
                    None => {
                        start += valid;
                        break;
                    }
                }
            }
        }
    }
    buf.drain(..start);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::{NoProgress, RecordingProgress};

    fn frame(content: &str) -> String {
        format!(
            "data: {}\n\n",
            serde_json::json!({"choices": [{"delta": {"content": content}}]})
        )
    }

    #[test]
    fn assembles_frames_in_order() {
        let mut a = StreamAssembler::new();
        a.feed(frame("A").as_bytes(), &NoProgress);
        a.feed(frame("B").as_bytes(), &NoProgress);
        a.feed(b"data: [DONE]\n\n", &NoProgress);
        assert!(a.is_done());
        assert_eq!(a.finish(&NoProgress).unwrap(), "AB");
    }

    #[test]
    fn immediate_done_is_empty_stream() {
        let mut a = StreamAssembler::new();
        a.feed(b"data: [DONE]\n\n", &NoProgress);
        assert!(matches!(a.finish(&NoProgress), Err(ProofreadError::EmptyStream)));
    }

    #[test]
    fn whitespace_only_is_empty_stream() {
        let mut a = StreamAssembler::new();
        a.feed(frame("  \n ").as_bytes(), &NoProgress);
        assert!(matches!(a.finish(&NoProgress), Err(ProofreadError::EmptyStream)));
    }

    #[test]
    fn frame_split_across_reads() {
        let bytes = frame("校正結果");
        let (left, right) = bytes.as_bytes().split_at(17);
        let mut a = StreamAssembler::new();
        assert_eq!(a.feed(left, &NoProgress), 0);
        assert_eq!(a.feed(right, &NoProgress), 4);
        assert_eq!(a.text(), "校正結果");
    }

    #[test]
    fn unterminated_line_is_buffered() {
        let mut a = StreamAssembler::new();
        let partial = "data: {\"choices\":[{\"delta\":{\"content\":\"xxxx";
        assert_eq!(a.feed(partial.as_bytes(), &NoProgress), 0);
        assert_eq!(a.text(), "");
        assert_eq!(a.buffered_len(), partial.len());
        a.feed(b"\"}}]}\n", &NoProgress);
        assert_eq!(a.text(), "xxxx");
        assert_eq!(a.buffered_len(), 0);
    }

    #[test]
    fn multibyte_char_split_across_reads() {
        let bytes = frame("誤字");
        // Split in the middle of the first 3-byte character.
        let cut = bytes.find('誤').unwrap() + 1;
        let (left, right) = bytes.as_bytes().split_at(cut);
        let mut a = StreamAssembler::new();
        a.feed(left, &NoProgress);
        a.feed(right, &NoProgress);
        assert_eq!(a.finish(&NoProgress).unwrap(), "誤字");
    }

    #[test]
    fn byte_at_a_time() {
        let stream = frame("Hello ") + &frame("世界") + "data: [DONE]\n\n";
        let mut a = StreamAssembler::new();
        for b in stream.as_bytes() {
            a.feed(std::slice::from_ref(b), &NoProgress);
        }
        assert_eq!(a.finish(&NoProgress).unwrap(), "Hello 世界");
    }

    #[test]
    fn ignores_noise_lines() {
        let stream = format!(
            ": keepalive\nevent: ping\ndata: {{not json\n{}data: {{\"choices\":[]}}\n{}",
            frame("ok"),
            "data: [DONE]\n"
        );
        let mut a = StreamAssembler::new();
        a.feed(stream.as_bytes(), &NoProgress);
        assert_eq!(a.finish(&NoProgress).unwrap(), "ok");
    }

    #[test]
    fn reports_running_character_count() {
        let progress = RecordingProgress::new();
        let mut a = StreamAssembler::new();
        a.feed((frame("ab") + &frame("cde")).as_bytes(), &progress);
        assert_eq!(
            progress.events(),
            vec![
                ProgressEvent::Received { chars: 2 },
                ProgressEvent::Received { chars: 5 },
            ]
        );
        assert_eq!(a.received_chars(), 5);
    }

    #[test]
    fn trailing_frame_without_newline_is_kept() {
        let stream = frame("first");
        let last = r#"data: {"choices":[{"delta":{"content":" last"}}]}"#;
        let mut a = StreamAssembler::new();
        a.feed(stream.as_bytes(), &NoProgress);
        a.feed(last.as_bytes(), &NoProgress);
        assert_eq!(a.finish(&NoProgress).unwrap(), "first last");
    }

    #[test]
    fn invalid_utf8_is_replaced_not_fatal() {
        let mut buf = vec![b'a', 0xFF, b'b'];
        assert_eq!(decode_prefix(&mut buf), "a\u{FFFD}b");
        assert!(buf.is_empty());

        let mut partial = vec![b'x', 0xE8, 0xAA];
        assert_eq!(decode_prefix(&mut partial), "x");
        assert_eq!(partial, vec![0xE8, 0xAA]);
    }
}
