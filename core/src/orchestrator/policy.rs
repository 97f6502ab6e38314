//! Price-visibility short circuit and the canned replies the engine can return.

use std::sync::OnceLock;

use regex::Regex;

/// Sent instead of a model answer when prices are hidden and the user asks about them
pub const ESCALATION_REPLY: &str = "Thanks for your interest! Pricing details are shared by our team directly. \
A team member will get back to you shortly, or you can reach us through our contact channel.";

pub const ROUND_CAP_FALLBACK: &str = "I'm sorry, I couldn't complete that request right now. \
Please try rephrasing your question or contact our team for help.";

pub const DEADLINE_FALLBACK: &str = "Sorry, this is taking longer than expected. Please try again in a moment.";

// Latin-script keywords match on word boundaries so "cosmetics" or "kosong" stay quiet
fn latin_keywords() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)\b(?:prices?|pricing|costs?|quotes?|rate\s+card|how\s+much|harga|berapa|kos|biaya|precios?|cu[aá]nto(?:\s+cuesta)?)\b",
        )
        .expect("price keyword pattern is valid")
    })
}

const CJK_KEYWORDS: [&str; 4] = ["价格", "价钱", "多少钱", "费用"];

/// Whether the message asks about price in any of the supported languages
pub fn has_price_intent(message: &str) -> bool {
    latin_keywords().is_match(message) || CJK_KEYWORDS.iter().any(|k| message.contains(k))
}

/// Escalate instead of calling the model
pub fn should_escalate(price_visible: bool, message: &str) -> bool {
    !price_visible && has_price_intent(message)
}
