//! Display markup for a proofreading result. Pure text-to-text.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

struct Rule {
    pattern: Regex,
    replacement: &'static str,
}

fn rule(pattern: &str, replacement: &'static str) -> Rule {
    Rule {
        pattern: Regex::new(pattern).expect("render patterns are valid"),
        replacement,
    }
}

/// Applied in order; headings must run before bullets, newlines last.
static RULES: LazyLock<Vec<Rule>> = LazyLock::new(|| {
    vec![
        rule(
            r"【(.+?)→(.+?)】",
            r#"<span class="correction">【<del>$1</del> → $2】</span>"#,
        ),
        rule(r"(?m)^### (.+)$", r#"<div class="section-header">$1</div>"#),
        rule(
            r"(?m)^## (.+)$",
            r#"<div class="section-header" style="font-size:14px;margin-top:8px;">$1</div>"#,
        ),
        rule(
            r"(?m)^# (.+)$",
            r#"<div class="section-header" style="font-size:15px;margin-top:8px;">$1</div>"#,
        ),
        rule(r"\*\*(.+?)\*\*", "<strong>$1</strong>"),
        rule(r"__(.+?)__", "<strong>$1</strong>"),
        rule(r"(?m)^[-*] (.+)$", r#"<div class="issue-item">• $1</div>"#),
        rule(r"(?m)^\d+\. (.+)$", r#"<div class="issue-item info">$1</div>"#),
        rule(r"\n{2,}", "<br><br>"),
        rule(r"\n", "<br>"),
    ]
});

/// Convert the restricted markdown subset the model is asked to produce
/// into HTML for the pane.
pub fn to_html(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    RULES.iter().fold(text, |acc, r| {
        r.pattern.replace_all(&acc, r.replacement).into_owned()
    })
}

/// Metadata shown above a result.
#[derive(Debug, Clone, Serialize)]
pub struct ResultMeta {
    pub model: String,
    pub char_count: usize,
    pub line_count: usize,
    pub timestamp: String,
}

impl ResultMeta {
    pub fn for_document(model: &str, document: &str) -> Self {
        Self {
            model: model.to_string(),
            char_count: document.chars().count(),
            line_count: document.split('\n').count(),
            timestamp: chrono::Local::now().format("%Y/%m/%d %H:%M:%S").to_string(),
        }
    }
}
