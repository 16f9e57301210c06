use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

/// Progress notifications emitted by a delivery run. The core never touches a
/// display; callers decide what to do with these (last write wins).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    ReadingDocument,
    /// Whole-document delivery started.
    Sending { model: String },
    /// The document was split and chunked delivery is about to begin.
    Splitting { total: usize },
    /// About to deliver chunk `index` of `total` (1-indexed).
    Chunk { index: usize, total: usize },
    /// A transient failure occurred; waiting `delay` before `attempt`.
    Retrying {
        index: usize,
        total: usize,
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
    },
    /// Streaming strategy: running count of received characters.
    Received { chars: usize },
    Aggregating { total: usize },
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadingDocument => write!(f, "reading document text..."),
            Self::Sending { model } => write!(f, "proofreading with {model}..."),
            Self::Splitting { total } => write!(f, "long document: splitting into {total} blocks"),
            Self::Chunk { index, total } => write!(f, "proofreading block {index} of {total}..."),
            Self::Retrying {
                index,
                total,
                attempt,
                max_attempts,
                delay,
            } => write!(
                f,
                "block {index}/{total}: retrying in {}ms (attempt {attempt}/{max_attempts})",
                delay.as_millis()
            ),
            Self::Received { chars } => write!(f, "proofreading... ({chars} characters received)"),
            Self::Aggregating { total } => write!(f, "combining {total} block results..."),
        }
    }
}

/// Callback contract for progress. Implemented for any `Fn(&ProgressEvent)`.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: &ProgressEvent);
}

impl<F> ProgressReporter for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn report(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Discards every event.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: &ProgressEvent) {}
}

/// Logs every event through `tracing` and remembers the most recent one.
#[derive(Default)]
pub struct TracingProgress {
    last: Mutex<Option<String>>,
}

impl TracingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<String> {
        self.last.lock().ok().and_then(|g| g.clone())
    }
}

impl ProgressReporter for TracingProgress {
    fn report(&self, event: &ProgressEvent) {
        match event {
            // Per-fragment events are too chatty for info.
            ProgressEvent::Received { chars } => tracing::debug!(chars, "{event}"),
            ProgressEvent::Retrying { .. } => tracing::warn!("{event}"),
            _ => tracing::info!("{event}"),
        }
        if let Ok(mut last) = self.last.lock() {
            *last = Some(event.to_string());
        }
    }
}

/// Records every event. Used by tests and by callers that want a full trace.
#[derive(Default)]
pub struct RecordingProgress {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

impl ProgressReporter for RecordingProgress {
    fn report(&self, event: &ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
