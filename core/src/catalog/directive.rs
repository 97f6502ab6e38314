use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::Platform;

/// Instruction to show one image, carried through model output as
/// `[IMAGE: <url> | <label>]` on a single line.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DisplayDirective {
    pub url: String,
    pub label: String,
}

fn directive_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\[IMAGE:\s*(\S+?)\s*\|\s*([^\]\n]*?)\s*\]").expect("directive pattern is valid")
    })
}

impl DisplayDirective {
    pub fn new(url: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            url: url.into().trim().to_string(),
            label: sanitize_label(&label.into()),
        }
    }

    pub fn token(&self) -> String {
        format!("[IMAGE: {} | {}]", self.url, self.label)
    }

    /// Markdown for channels that render it, bare URL otherwise
    pub fn render(&self, platform: Platform) -> String {
        if platform.renders_markdown() {
            format!("![{}]({})", self.label, self.url)
        } else if self.label.is_empty() {
            self.url.clone()
        } else {
            format!("{}\n{}", self.label, self.url)
        }
    }
}

fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| match c {
            '|' | '[' | ']' | '\n' | '\r' => ' ',
            other => other,
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Every directive in `text`, in order of appearance
pub fn extract_directives(text: &str) -> Vec<DisplayDirective> {
    directive_re()
        .captures_iter(text)
        .map(|c| DisplayDirective {
            url: c[1].to_string(),
            label: c[2].trim().to_string(),
        })
        .collect()
}

/// Replace directive tokens with the channel's image representation
pub fn render_reply(text: &str, platform: Platform) -> String {
    directive_re()
        .replace_all(text, |c: &regex::Captures<'_>| {
            DisplayDirective {
                url: c[1].to_string(),
                label: c[2].trim().to_string(),
            }
            .render(platform)
        })
        .into_owned()
}
