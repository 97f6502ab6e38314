//! Typed records for the rows the engine reads.
//!
//! Datastore rows arrive as loosely shaped JSON (text columns that sometimes hold
//! JSON arrays, nullable flags). Everything is decoded into these types once, at
//! the store boundary, and validated there.

mod avatar;
mod catalog;
mod knowledge;
mod memory;

pub use avatar::{Avatar, Platform, PlatformContext, PromptVersion};
pub use catalog::{DiscountType, Product, Promotion, PromotionScope, ValidationError};
pub use knowledge::KnowledgeChunk;
pub use memory::{Memory, MemoryImage};

pub(crate) mod de {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    /// Accepts a JSON array of strings, a single string (newline or comma separated,
    /// or itself a JSON-encoded array), or null.
    pub fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Some(Value::String(s)) => split_text_list(&s),
            Some(other) => vec![other.to_string()],
        })
    }

    pub(crate) fn split_text_list(s: &str) -> Vec<String> {
        let trimmed = s.trim();
        if trimmed.starts_with('[') {
            if let Ok(list) = serde_json::from_str::<Vec<String>>(trimmed) {
                return list
                    .into_iter()
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
        }
        let sep = if trimmed.contains('\n') { '\n' } else { ',' };
        trimmed
            .split(sep)
            .map(|s| s.trim().trim_start_matches(['-', '•', '*']).trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Nullable boolean columns; null falls back to `true`
    pub fn bool_default_true<'de, D>(deserializer: D) -> Result<bool, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(true))
    }

    pub fn default_true() -> bool {
        true
    }

    /// Numeric columns that PostgREST may serialize as strings (numeric type)
    pub fn number_or_string<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            Some(Value::Number(n)) => n
                .as_f64()
                .ok_or_else(|| serde::de::Error::custom("number out of range")),
            Some(Value::String(s)) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
            None | Some(Value::Null) => Ok(0.0),
            Some(other) => Err(serde::de::Error::custom(format!(
                "expected number, got {other}"
            ))),
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn text_lists_split_on_newlines_and_commas() {
            assert_eq!(
                split_text_list("- Be polite\n- Never guess"),
                vec!["Be polite", "Never guess"]
            );
            assert_eq!(split_text_list("warm, witty"), vec!["warm", "witty"]);
            assert_eq!(split_text_list(r#"["a","b"]"#), vec!["a", "b"]);
            assert!(split_text_list("   ").is_empty());
        }
    }
}
