//! System prompt assembly.

pub mod composer;
pub mod token_counter;

pub use composer::{ComposedPrompt, PromptComposer, PromptInputs};
pub use token_counter::{counter_for_model, CharEstimateCounter, TokenCounter};
