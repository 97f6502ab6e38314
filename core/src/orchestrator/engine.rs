use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
    KeyValue,
};
use serde::Serialize;
use tokio::time::{timeout_at, Instant as Deadline};
use tracing::{debug, error, info, warn};

use super::policy::{should_escalate, DEADLINE_FALLBACK, ESCALATION_REPLY, ROUND_CAP_FALLBACK};
use super::postprocess::{clean_reply, reply_images};
use crate::catalog::CatalogAccessor;
use crate::config::EngineConfig;
use crate::credentials::{resolve_model_credential, CredentialSource};
use crate::domain::{Avatar, Platform, PlatformContext};
use crate::knowledge::{KnowledgeRetriever, RetrievalLimits};
use crate::llm::{
    max_output_tokens_for, ChatMessage, CompletionRequest, LanguageModel, NormalizedToolCall,
    TokenUsage, ToolChoice,
};
use crate::prompt::{counter_for_model, PromptComposer, PromptInputs};
use crate::store::{AvatarStore, CatalogStore, KnowledgeSource, MemorySource};
use crate::tools::{ToolContext, ToolEnvelope, ToolRegistry};
use crate::usage::{
    is_fine_tuned, spawn_model_usage, spawn_prompt_version_usage, UsageRecord, UsageSink,
};
use crate::{preview, EngineError, Result};

/// One inbound message and everything needed to answer it
#[derive(Debug, Clone, Default)]
pub struct RespondContext {
    pub avatar_id: String,
    pub user_id: String,
    pub message: String,
    /// Earlier turns, oldest first
    pub history: Vec<ChatMessage>,
    /// Overrides the avatar's selected model
    pub model: Option<String>,
    pub platform: Platform,
    pub contact_handle: Option<String>,
    /// Defaults to now + `turn_timeout`
    pub deadline: Option<Deadline>,
}

impl RespondContext {
    pub fn new(
        avatar_id: impl Into<String>,
        user_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            avatar_id: avatar_id.into(),
            user_id: user_id.into(),
            message: message.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    Answered,
    /// Price question with prices hidden; no model call was made
    Escalated,
    RoundCapHit,
    TimedOut,
}

impl TurnOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnOutcome::Answered => "answered",
            TurnOutcome::Escalated => "escalated",
            TurnOutcome::RoundCapHit => "round_cap_hit",
            TurnOutcome::TimedOut => "timed_out",
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReplyImage {
    pub url: String,
    pub caption: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ReplyMetadata {
    /// `None` when the turn ended before any model call
    pub model_used: Option<String>,
    pub knowledge_chunks_used: usize,
    pub memories_accessed: usize,
    /// Tool names in execution order
    pub tool_calls_executed: Vec<String>,
    pub escalated_to_human: bool,
    pub outcome: TurnOutcome,
    pub model_calls: usize,
    pub round_cap_hit: bool,
    pub timed_out: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_version_id: Option<String>,
    pub usage: TokenUsage,
}

impl ReplyMetadata {
    fn empty(outcome: TurnOutcome) -> Self {
        Self {
            model_used: None,
            knowledge_chunks_used: 0,
            memories_accessed: 0,
            tool_calls_executed: Vec::new(),
            escalated_to_human: outcome == TurnOutcome::Escalated,
            outcome,
            model_calls: 0,
            round_cap_hit: false,
            timed_out: false,
            prompt_version_id: None,
            usage: TokenUsage::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatReply {
    /// Display directives stay in the text for the channel renderer
    pub text: String,
    pub images: Vec<ReplyImage>,
    pub metadata: ReplyMetadata,
}

/// Read capabilities the engine needs, one handle per concern
#[derive(Clone)]
pub struct EngineDeps {
    pub avatars: Arc<dyn AvatarStore>,
    pub knowledge: Arc<dyn KnowledgeSource>,
    pub memories: Arc<dyn MemorySource>,
    pub catalog: Arc<dyn CatalogStore>,
    pub credentials: Arc<dyn CredentialSource>,
    pub usage: Arc<dyn UsageSink>,
}

/// Conversation orchestrator: one `respond` call per inbound message.
///
/// States: policy check, retrieval fan-out, then model call and tool
/// execution alternating until the model answers in text, the round cap is
/// reached or the deadline passes.
pub struct ChatEngine {
    avatars: Arc<dyn AvatarStore>,
    credentials: Arc<dyn CredentialSource>,
    usage: Arc<dyn UsageSink>,
    retriever: KnowledgeRetriever,
    tools: ToolRegistry,
    model: Arc<dyn LanguageModel>,
    config: EngineConfig,

    // OpenTelemetry metrics
    turns_counter: Counter<u64>,
    model_calls_counter: Counter<u64>,
    tool_calls_counter: Counter<u64>,
    turn_latency: Histogram<f64>,
    model_latency: Histogram<f64>,
}

impl ChatEngine {
    pub fn new(deps: EngineDeps, model: Arc<dyn LanguageModel>, config: EngineConfig) -> Self {
        let tools = ToolRegistry::with_defaults(
            CatalogAccessor::new(deps.catalog.clone()),
            deps.memories.clone(),
            config.tool_timeout(),
        );
        Self::with_tools(deps, model, config, tools)
    }

    pub fn with_tools(
        deps: EngineDeps,
        model: Arc<dyn LanguageModel>,
        config: EngineConfig,
        tools: ToolRegistry,
    ) -> Self {
        let meter = global::meter("avatar.orchestrator");

        let turns_counter = meter
            .u64_counter("avatar.orchestrator.turns_total")
            .with_description("Total number of conversation turns by outcome")
            .init();

        let model_calls_counter = meter
            .u64_counter("avatar.orchestrator.model_calls_total")
            .with_description("Total number of model calls")
            .init();

        let tool_calls_counter = meter
            .u64_counter("avatar.orchestrator.tool_calls_total")
            .with_description("Total number of tool calls requested by the model")
            .init();

        let turn_latency = meter
            .f64_histogram("avatar.orchestrator.turn_latency_ms")
            .with_description("End-to-end turn latency in milliseconds")
            .init();

        let model_latency = meter
            .f64_histogram("avatar.orchestrator.model_latency_ms")
            .with_description("Model call latency in milliseconds")
            .init();

        Self {
            avatars: deps.avatars,
            credentials: deps.credentials,
            usage: deps.usage,
            retriever: KnowledgeRetriever::new(deps.knowledge, deps.memories),
            tools,
            model,
            config,
            turns_counter,
            model_calls_counter,
            tool_calls_counter,
            turn_latency,
            model_latency,
        }
    }

    /// Wire every capability to one store
    pub fn from_store<S>(store: Arc<S>, model: Arc<dyn LanguageModel>, config: EngineConfig) -> Self
    where
        S: AvatarStore
            + KnowledgeSource
            + MemorySource
            + CatalogStore
            + CredentialSource
            + UsageSink
            + 'static,
    {
        let deps = EngineDeps {
            avatars: store.clone(),
            knowledge: store.clone(),
            memories: store.clone(),
            catalog: store.clone(),
            credentials: store.clone(),
            usage: store,
        };
        Self::new(deps, model, config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Answer one message.
    /// Contract:
    /// - Input: avatar, user, message, history, optional model and deadline
    /// - Output: reply text with display directives, extracted images, metadata
    /// - Error: `Configuration` (missing avatar or credential), `UpstreamModel`,
    ///   `Store` (avatar / prompt version reads). Tool failures never surface here.
    #[tracing::instrument(name = "orchestrator.respond", skip(self, ctx), fields(avatar_id = %ctx.avatar_id, platform = ?ctx.platform))]
    pub async fn respond(&self, ctx: RespondContext) -> Result<ChatReply> {
        let started = Instant::now();
        let result = self.run_turn(&ctx).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.turn_latency.record(elapsed_ms, &[]);

        match &result {
            Ok(reply) => {
                let outcome = reply.metadata.outcome.as_str();
                self.turns_counter
                    .add(1, &[KeyValue::new("outcome", outcome)]);
                info!(
                    target: "orchestrator",
                    avatar_id = %ctx.avatar_id,
                    outcome = outcome,
                    model = ?reply.metadata.model_used,
                    model_calls = reply.metadata.model_calls,
                    tool_calls = reply.metadata.tool_calls_executed.len(),
                    latency_ms = elapsed_ms,
                    "Turn finished"
                );
            }
            Err(e) => {
                self.turns_counter
                    .add(1, &[KeyValue::new("outcome", "error"), KeyValue::new("kind", e.kind())]);
                error!(
                    target: "orchestrator",
                    avatar_id = %ctx.avatar_id,
                    message = %preview(&ctx.message, 80),
                    kind = e.kind(),
                    error = %e,
                    "Turn failed"
                );
            }
        }
        result
    }

    async fn run_turn(&self, ctx: &RespondContext) -> Result<ChatReply> {
        let deadline = ctx
            .deadline
            .unwrap_or_else(|| Deadline::now() + self.config.turn_timeout());

        let avatar = self
            .avatars
            .get_avatar(&ctx.avatar_id)
            .await?
            .ok_or_else(|| EngineError::Configuration(format!("avatar {} not found", ctx.avatar_id)))?;

        if should_escalate(avatar.price_visible, &ctx.message) {
            return Ok(ChatReply {
                text: ESCALATION_REPLY.to_string(),
                images: Vec::new(),
                metadata: ReplyMetadata::empty(TurnOutcome::Escalated),
            });
        }

        let model = self.select_model(ctx, &avatar);
        let limits = RetrievalLimits {
            top_k: self.config.knowledge_top_k,
            min_similarity: self.config.knowledge_min_similarity,
            memory_limit: self.config.memory_limit,
        };
        let (version, retrieved, api_key) = tokio::join!(
            self.avatars.get_active_prompt_version(&avatar.id),
            self.retriever.retrieve(&avatar.id, &ctx.message, limits),
            resolve_model_credential(self.credentials.as_ref(), &avatar.user_id),
        );
        let version = version?;
        let api_key = api_key?;

        let platform = PlatformContext {
            platform: ctx.platform,
            contact_handle: ctx.contact_handle.clone(),
        };
        let composer = PromptComposer::new(
            counter_for_model(&model),
            self.config.knowledge_token_budget,
        );
        let composed = composer.compose(&PromptInputs {
            avatar: &avatar,
            prompt_version: version.as_ref(),
            knowledge: &retrieved.chunks,
            memories: &retrieved.memories,
            platform: &platform,
            tools_available: !self.tools.is_empty(),
        });
        debug!(
            target: "orchestrator",
            avatar_id = %avatar.id,
            model = %model,
            prompt_version = ?composed.prompt_version_id,
            knowledge_used = composed.knowledge_chunks_used,
            knowledge_omitted = composed.knowledge_chunks_omitted,
            memories = composed.memories_included,
            "Composed system prompt"
        );

        let mut request = CompletionRequest {
            model: model.clone(),
            messages: self.initial_messages(&composed.text, ctx),
            tools: self.tools.declarations(),
            tool_choice: ToolChoice::Auto,
            max_tokens: max_output_tokens_for(&model),
            temperature: self.config.temperature,
            api_key,
        };
        let tool_ctx = ToolContext::for_avatar(&avatar, Utc::now());

        let mut metadata = ReplyMetadata::empty(TurnOutcome::Answered);
        metadata.model_used = Some(model.clone());
        metadata.knowledge_chunks_used = composed.knowledge_chunks_used;
        metadata.memories_accessed = composed.memories_included;
        metadata.prompt_version_id = composed.prompt_version_id.clone();

        let mut rounds = 0usize;
        let text = loop {
            let call_started = Instant::now();
            let turn = match timeout_at(deadline, self.model.complete(&request)).await {
                Ok(Ok(turn)) => turn,
                Ok(Err(e)) => {
                    // Tokens from completed rounds still count
                    self.report_model_usage(&avatar, &ctx.user_id, &model, &metadata);
                    return Err(e);
                }
                Err(_) => {
                    warn!(target: "orchestrator", avatar_id = %avatar.id, rounds, "Turn deadline passed during model call");
                    metadata.outcome = TurnOutcome::TimedOut;
                    metadata.timed_out = true;
                    break DEADLINE_FALLBACK.to_string();
                }
            };
            metadata.model_calls += 1;
            self.model_calls_counter
                .add(1, &[KeyValue::new("model", model.clone())]);
            self.model_latency
                .record(call_started.elapsed().as_secs_f64() * 1000.0, &[]);
            if let Some(usage) = turn.usage {
                metadata.usage.add(usage);
            }

            if !turn.wants_tools() {
                let cleaned = clean_reply(turn.content.as_deref().unwrap_or_default());
                if cleaned.is_empty() {
                    warn!(target: "orchestrator", avatar_id = %avatar.id, "Model returned an empty answer");
                    break ROUND_CAP_FALLBACK.to_string();
                }
                break cleaned;
            }

            if rounds >= self.config.max_tool_rounds {
                warn!(
                    target: "orchestrator",
                    avatar_id = %avatar.id,
                    max_tool_rounds = self.config.max_tool_rounds,
                    "Model kept requesting tools; ending turn"
                );
                metadata.outcome = TurnOutcome::RoundCapHit;
                metadata.round_cap_hit = true;
                break ROUND_CAP_FALLBACK.to_string();
            }

            let calls: Vec<NormalizedToolCall> =
                turn.tool_calls.iter().map(|c| c.normalized()).collect();
            request
                .messages
                .push(ChatMessage::assistant_tool_calls(turn.content.clone(), turn.tool_calls));

            let envelopes = match timeout_at(deadline, self.execute_calls(&calls, &tool_ctx)).await {
                Ok(envelopes) => envelopes,
                Err(_) => {
                    warn!(target: "orchestrator", avatar_id = %avatar.id, rounds, "Turn deadline passed during tool execution");
                    metadata.outcome = TurnOutcome::TimedOut;
                    metadata.timed_out = true;
                    break DEADLINE_FALLBACK.to_string();
                }
            };
            for (call, envelope) in calls.iter().zip(envelopes) {
                self.tool_calls_counter.add(
                    1,
                    &[
                        KeyValue::new("tool", call.name.clone()),
                        KeyValue::new("success", envelope.success),
                    ],
                );
                metadata.tool_calls_executed.push(call.name.clone());
                request
                    .messages
                    .push(ChatMessage::tool_result(call.id.clone(), envelope.to_json_string()));
            }
            rounds += 1;
        };

        self.report_usage(&avatar, &ctx.user_id, &model, &metadata);

        let images = reply_images(&text)
            .into_iter()
            .map(|d| ReplyImage {
                url: d.url,
                caption: d.label,
            })
            .collect();
        Ok(ChatReply {
            text,
            images,
            metadata,
        })
    }

    /// Request model, then the avatar's selection, then the configured default
    fn select_model(&self, ctx: &RespondContext, avatar: &Avatar) -> String {
        [ctx.model.as_deref(), avatar.model_id.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|m| !m.is_empty())
            .unwrap_or(self.config.default_model.as_str())
            .to_string()
    }

    /// System prompt, the most recent history turns, then the new message
    fn initial_messages(&self, system_prompt: &str, ctx: &RespondContext) -> Vec<ChatMessage> {
        let history: Vec<&ChatMessage> = ctx
            .history
            .iter()
            .filter(|m| m.is_conversational())
            .collect();
        let skip = history.len().saturating_sub(self.config.history_turns);

        let mut messages = Vec::with_capacity(history.len() - skip + 2);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend(history.into_iter().skip(skip).cloned());
        messages.push(ChatMessage::user(ctx.message.clone()));
        messages
    }

    /// Results come back in call order either way
    async fn execute_calls(
        &self,
        calls: &[NormalizedToolCall],
        tool_ctx: &ToolContext,
    ) -> Vec<ToolEnvelope> {
        if self.config.parallel_tools && calls.len() > 1 {
            join_all(calls.iter().map(|call| {
                self.tools
                    .execute(&call.name, call.arguments.clone(), tool_ctx)
            }))
            .await
        } else {
            let mut out = Vec::with_capacity(calls.len());
            for call in calls {
                out.push(
                    self.tools
                        .execute(&call.name, call.arguments.clone(), tool_ctx)
                        .await,
                );
            }
            out
        }
    }

    fn report_usage(&self, avatar: &Avatar, user_id: &str, model: &str, metadata: &ReplyMetadata) {
        self.report_model_usage(avatar, user_id, model, metadata);
        if let Some(version_id) = &metadata.prompt_version_id {
            spawn_prompt_version_usage(self.usage.clone(), version_id.clone());
        }
    }

    /// Fine-tuned models only, and only once a model call has completed
    fn report_model_usage(
        &self,
        avatar: &Avatar,
        user_id: &str,
        model: &str,
        metadata: &ReplyMetadata,
    ) {
        if metadata.model_calls > 0 && is_fine_tuned(model) {
            spawn_model_usage(
                self.usage.clone(),
                UsageRecord::new(&avatar.id, user_id, model, metadata.usage),
            );
        }
    }
}
