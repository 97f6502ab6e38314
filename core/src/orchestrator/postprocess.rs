//! Response Post-Processor

use std::sync::OnceLock;

use regex::Regex;

use crate::catalog::{extract_directives, DisplayDirective};

fn markdown_image_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"!\[[^\]\n]*\]\([^)\n]*\)").expect("markdown image pattern is valid"))
}

fn attachment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"attachment://\S*").expect("attachment pattern is valid"))
}

/// Drop image markdown and `attachment://` tokens the model wrote despite
/// instructions, then tidy whitespace. Display directives are left in place.
pub fn clean_reply(text: &str) -> String {
    let text = markdown_image_re().replace_all(text, "");
    let text = attachment_re().replace_all(&text, "");

    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;
    for line in text.lines().map(str::trim_end) {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.trim().to_string()
}

/// Directives in the final text, first occurrence of each URL only
pub fn reply_images(text: &str) -> Vec<DisplayDirective> {
    let mut seen = std::collections::HashSet::new();
    extract_directives(text)
        .into_iter()
        .filter(|d| seen.insert(d.url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markdown_images_and_attachments() {
        let raw = "Here it is:\n![phone](https://cdn.example.com/p.png)\n\n\n\nattachment://img_1\nEnjoy!  ";
        assert_eq!(clean_reply(raw), "Here it is:\n\nEnjoy!");
    }

    #[test]
    fn keeps_directives_and_dedupes_images() {
        let raw = "[IMAGE: https://x.test/a.png | Case]\nand again [IMAGE: https://x.test/a.png | Case]";
        let text = clean_reply(raw);
        assert!(text.starts_with("[IMAGE: https://x.test/a.png | Case]"));
        assert_eq!(reply_images(&text).len(), 1);
    }
}
