//! Conversation Orchestrator: the per-message state machine, the hidden-price
//! short circuit and reply post-processing.

mod engine;
pub mod policy;
pub mod postprocess;

pub use engine::{
    ChatEngine, ChatReply, EngineDeps, ReplyImage, ReplyMetadata, RespondContext, TurnOutcome,
};
