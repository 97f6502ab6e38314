/// Output-token ceiling per model family.
///
/// Mini variants get the largest budget, legacy/turbo the smallest. Fine-tuned ids
/// (`ft:<base>:<org>::<id>`) resolve through their base model.
pub fn max_output_tokens_for(model: &str) -> u32 {
    let model = model.trim().to_ascii_lowercase();
    let base = match model.strip_prefix("ft:") {
        Some(rest) => rest.split(':').next().unwrap_or(rest).to_string(),
        None => model,
    };

    if base.contains("mini") {
        4096
    } else if base.contains("gpt-3.5") || base.contains("turbo") {
        1024
    } else if base.starts_with("gpt-4") || base.starts_with("o1") || base.starts_with("o3") {
        2048
    } else {
        1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budget_table() {
        assert_eq!(max_output_tokens_for("gpt-4o-mini"), 4096);
        assert_eq!(max_output_tokens_for("gpt-4o"), 2048);
        assert_eq!(max_output_tokens_for("gpt-4-turbo"), 1024);
        assert_eq!(max_output_tokens_for("gpt-3.5-turbo"), 1024);
        assert_eq!(max_output_tokens_for("some-local-model"), 1024);
    }

    #[test]
    fn fine_tuned_ids_use_their_base() {
        assert_eq!(
            max_output_tokens_for("ft:gpt-4o-mini-2024-07-18:acme::9abc"),
            4096
        );
        assert_eq!(max_output_tokens_for("ft:gpt-3.5-turbo-0125:acme::x"), 1024);
    }
}
