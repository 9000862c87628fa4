//! Model and tool telemetry as a plugin, forwarding spans to a pluggable
//! sink. Observation only: every hook passes through.

use arbor_contract::{CallbackContext, LlmRequest, LlmResponse, Plugin, Tool, ToolContext, ToolError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// One completed model call.
#[derive(Debug, Clone)]
pub struct ModelSpan {
    pub model: String,
    pub prompt_tokens: Option<i32>,
    pub completion_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
    pub duration_ms: u64,
}

/// One completed tool call.
#[derive(Debug, Clone)]
pub struct ToolSpan {
    pub name: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Consumer of telemetry spans; implementations forward to OTel
/// collectors, log files, or test buffers. Never on the critical path.
pub trait MetricsSink: Send + Sync {
    fn on_model(&self, span: &ModelSpan);
    fn on_tool(&self, span: &ToolSpan);
}

/// Collected spans, for inspection in tests.
#[derive(Debug, Clone, Default)]
pub struct Metrics {
    pub models: Vec<ModelSpan>,
    pub tools: Vec<ToolSpan>,
}

/// In-memory sink for testing and inspection.
#[derive(Clone, Default)]
pub struct InMemorySink {
    inner: Arc<Mutex<Metrics>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metrics(&self) -> Metrics {
        self.inner.lock().expect("metrics lock poisoned").clone()
    }
}

impl MetricsSink for InMemorySink {
    fn on_model(&self, span: &ModelSpan) {
        self.inner
            .lock()
            .expect("metrics lock poisoned")
            .models
            .push(span.clone());
    }

    fn on_tool(&self, span: &ToolSpan) {
        self.inner
            .lock()
            .expect("metrics lock poisoned")
            .tools
            .push(span.clone());
    }
}

/// Plugin capturing per-call model and tool spans. Tool timings are keyed
/// by function-call id, so parallel fan-out rounds stay accurate.
pub struct MetricsPlugin {
    sink: Arc<dyn MetricsSink>,
    model: String,
    model_start: Mutex<Option<Instant>>,
    tool_starts: Mutex<HashMap<String, Instant>>,
}

impl MetricsPlugin {
    pub fn new(sink: impl MetricsSink + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
            model: String::new(),
            model_start: Mutex::new(None),
            tool_starts: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn tool_elapsed_ms(&self, call_id: &str) -> u64 {
        self.tool_starts
            .lock()
            .expect("metrics lock poisoned")
            .remove(call_id)
            .map(|start| start.elapsed().as_millis() as u64)
            .unwrap_or(0)
    }
}

#[async_trait]
impl Plugin for MetricsPlugin {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn before_model(
        &self,
        _ctx: &mut CallbackContext,
        _request: &mut LlmRequest,
    ) -> Option<LlmResponse> {
        *self.model_start.lock().expect("metrics lock poisoned") = Some(Instant::now());
        None
    }

    async fn after_model(
        &self,
        _ctx: &mut CallbackContext,
        response: &LlmResponse,
    ) -> Option<LlmResponse> {
        let duration_ms = self
            .model_start
            .lock()
            .expect("metrics lock poisoned")
            .take()
            .map(|start| start.elapsed().as_millis() as u64)
            .unwrap_or(0);
        let usage = response.usage_metadata.as_ref();
        let span = ModelSpan {
            model: self.model.clone(),
            prompt_tokens: usage.and_then(|u| u.prompt_tokens),
            completion_tokens: usage.and_then(|u| u.completion_tokens),
            total_tokens: usage.and_then(|u| u.total_tokens),
            duration_ms,
        };
        tracing::debug!(
            model = %span.model,
            total_tokens = ?span.total_tokens,
            duration_ms = span.duration_ms,
            "model call complete"
        );
        self.sink.on_model(&span);
        None
    }

    async fn before_tool(
        &self,
        _tool: &dyn Tool,
        _args: &mut Map<String, Value>,
        ctx: &mut ToolContext,
    ) -> Option<Map<String, Value>> {
        self.tool_starts
            .lock()
            .expect("metrics lock poisoned")
            .insert(ctx.function_call_id.clone(), Instant::now());
        None
    }

    async fn after_tool(
        &self,
        tool: &dyn Tool,
        _args: &Map<String, Value>,
        ctx: &mut ToolContext,
        result: &Map<String, Value>,
    ) -> Option<Map<String, Value>> {
        let duration_ms = self.tool_elapsed_ms(&ctx.function_call_id);
        let error = result.get("error").and_then(|v| v.as_str());
        let span = ToolSpan {
            name: tool.declaration().name,
            success: error.is_none(),
            error: error.map(String::from),
            duration_ms,
        };
        tracing::debug!(
            tool = %span.name,
            success = span.success,
            duration_ms = span.duration_ms,
            "tool call complete"
        );
        self.sink.on_tool(&span);
        None
    }

    async fn on_tool_error(
        &self,
        tool: &dyn Tool,
        _args: &Map<String, Value>,
        ctx: &mut ToolContext,
        error: &ToolError,
    ) -> Option<Map<String, Value>> {
        let duration_ms = self.tool_elapsed_ms(&ctx.function_call_id);
        self.sink.on_tool(&ToolSpan {
            name: tool.declaration().name,
            success: false,
            error: Some(error.to_string()),
            duration_ms,
        });
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_contract::testing::test_invocation;
    use arbor_contract::{FunctionDeclaration, FunctionTool, UsageMetadata};
    use serde_json::json;

    fn probe_tool() -> FunctionTool {
        FunctionTool::new(FunctionDeclaration::new("probe", "test tool"), |_args| async {
            Ok(Map::new())
        })
    }

    #[tokio::test]
    async fn model_span_captures_usage() {
        let sink = InMemorySink::new();
        let plugin = MetricsPlugin::new(sink.clone()).with_model("mock-1");
        let mut ctx = CallbackContext::new(test_invocation());
        let mut request = LlmRequest::default();

        assert!(plugin.before_model(&mut ctx, &mut request).await.is_none());
        let response = LlmResponse::text("hi").with_usage(UsageMetadata {
            prompt_tokens: Some(10),
            completion_tokens: Some(5),
            total_tokens: Some(15),
        });
        assert!(plugin.after_model(&mut ctx, &response).await.is_none());

        let metrics = sink.metrics();
        assert_eq!(metrics.models.len(), 1);
        assert_eq!(metrics.models[0].model, "mock-1");
        assert_eq!(metrics.models[0].total_tokens, Some(15));
    }

    #[tokio::test]
    async fn tool_spans_keyed_by_call_id() {
        let sink = InMemorySink::new();
        let plugin = MetricsPlugin::new(sink.clone());
        let tool = probe_tool();

        let mut ctx_a = ToolContext::new(test_invocation(), "fc_a");
        let mut ctx_b = ToolContext::new(test_invocation(), "fc_b");
        let mut args = Map::new();

        plugin.before_tool(&tool, &mut args, &mut ctx_a).await;
        plugin.before_tool(&tool, &mut args, &mut ctx_b).await;
        plugin
            .after_tool(&tool, &args, &mut ctx_b, &Map::new())
            .await;
        let mut failed = Map::new();
        failed.insert("error".into(), json!("boom"));
        plugin.after_tool(&tool, &args, &mut ctx_a, &failed).await;

        let metrics = sink.metrics();
        assert_eq!(metrics.tools.len(), 2);
        assert!(metrics.tools[0].success);
        assert!(!metrics.tools[1].success);
        assert_eq!(metrics.tools[1].error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn tool_error_hook_records_failure() {
        let sink = InMemorySink::new();
        let plugin = MetricsPlugin::new(sink.clone());
        let tool = probe_tool();
        let mut ctx = ToolContext::new(test_invocation(), "fc_e");
        let args = Map::new();
        let recovered = plugin
            .on_tool_error(
                &tool,
                &args,
                &mut ctx,
                &ToolError::ExecutionFailed("io".into()),
            )
            .await;
        assert!(recovered.is_none());
        let metrics = sink.metrics();
        assert!(!metrics.tools[0].success);
    }
}
