use std::sync::Arc;
use std::time::Duration;

use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
    KeyValue,
};
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::catalog::catalog_tools;
use super::error::ToolError;
use super::memory::GetMemoryImagesTool;
use super::traits::{Tool, ToolContext, ToolEnvelope};
use crate::catalog::CatalogAccessor;
use crate::llm::ToolSpec;
use crate::store::MemorySource;

/// Ordered set of tools the model may call.
///
/// Declaration order is registration order, so requests are reproducible.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    timeout: Duration,

    // OpenTelemetry metrics
    invocations_counter: Counter<u64>,
    errors_counter: Counter<u64>,
    timeouts_counter: Counter<u64>,
    invoke_latency: Histogram<f64>,
}

impl ToolRegistry {
    pub fn new(timeout: Duration) -> Self {
        let meter = global::meter("avatar.tool_registry");

        let invocations_counter = meter
            .u64_counter("avatar.tool_registry.invocations_total")
            .with_description("Total number of tool invocations")
            .init();

        let errors_counter = meter
            .u64_counter("avatar.tool_registry.errors_total")
            .with_description("Total number of tool errors")
            .init();

        let timeouts_counter = meter
            .u64_counter("avatar.tool_registry.timeouts_total")
            .with_description("Total number of tool timeouts")
            .init();

        let invoke_latency = meter
            .f64_histogram("avatar.tool_registry.invoke_latency_ms")
            .with_description("Tool invocation latency in milliseconds")
            .init();

        Self {
            tools: Vec::new(),
            timeout,
            invocations_counter,
            errors_counter,
            timeouts_counter,
            invoke_latency,
        }
    }

    /// The seven catalog tools followed by `get_memory_images`
    pub fn with_defaults(
        catalog: CatalogAccessor,
        memories: Arc<dyn MemorySource>,
        timeout: Duration,
    ) -> Self {
        let mut registry = Self::new(timeout);
        for tool in catalog_tools(catalog) {
            registry.register(tool);
        }
        registry.register(Arc::new(GetMemoryImagesTool::new(memories)));
        registry
    }

    /// Register a tool, replacing one with the same name in place
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name();
        info!(target: "tool_registry", tool = %name, "Registering tool");
        match self.tools.iter().position(|t| t.name() == name) {
            Some(i) => self.tools[i] = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Declarations sent with every model call
    pub fn declarations(&self) -> Vec<ToolSpec> {
        self.tools
            .iter()
            .map(|t| ToolSpec {
                name: t.name(),
                description: t.description(),
                parameters: t.parameters(),
            })
            .collect()
    }

    /// Run one tool call. Never fails: unknown tools, bad arguments, store
    /// errors and timeouts all come back as `success: false` envelopes.
    #[tracing::instrument(skip(self, arguments, ctx), fields(tool.name = %name, chatbot_id = %ctx.chatbot_id))]
    pub async fn execute(&self, name: &str, arguments: Value, ctx: &ToolContext) -> ToolEnvelope {
        let start_time = std::time::Instant::now();

        let result = match self.get(name) {
            None => Err(ToolError::NotFound(name.to_string())),
            Some(tool) => {
                debug!(target: "tool_registry", tool = %name, "Invoking tool");
                match timeout(self.timeout, tool.call(ctx, arguments)).await {
                    Ok(res) => res,
                    Err(_) => {
                        warn!(target: "tool_registry", tool = %name, timeout_ms = self.timeout.as_millis() as u64, "Tool execution timed out");
                        self.timeouts_counter
                            .add(1, &[KeyValue::new("tool", name.to_string())]);
                        Err(ToolError::Timeout)
                    }
                }
            }
        };

        let elapsed_ms = start_time.elapsed().as_secs_f64() * 1000.0;
        self.invoke_latency
            .record(elapsed_ms, &[KeyValue::new("tool", name.to_string())]);

        match result {
            Ok(output) => {
                self.invocations_counter.add(
                    1,
                    &[
                        KeyValue::new("tool", name.to_string()),
                        KeyValue::new("status", "success"),
                    ],
                );
                ToolEnvelope::ok(output)
            }
            Err(e) => {
                warn!(target: "tool_registry", tool = %name, error = %e, kind = e.kind(), "Tool execution failed");
                self.errors_counter.add(
                    1,
                    &[
                        KeyValue::new("tool", name.to_string()),
                        KeyValue::new("error", e.kind()),
                    ],
                );
                ToolEnvelope::failure(&e)
            }
        }
    }
}
