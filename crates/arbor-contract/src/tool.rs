//! Tool and toolset contracts.
//!
//! Tools execute actions for the model and buffer state/artifact effects
//! through their [`ToolContext`]; the flow applies those effects centrally.

use crate::context::{InvocationContext, ToolContext};
use async_trait::async_trait;
use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use thiserror::Error;

/// JSON-Schema function-calling declaration advertised to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    /// Parameter schema: `{type: "object", properties, required}`.
    pub parameters: Value,
}

impl FunctionDeclaration {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    #[must_use]
    pub fn with_parameters(mut self, schema: Value) -> Self {
        self.parameters = schema;
        self
    }
}

/// Tool execution errors.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("tool call timed out after {0} ms")]
    Timeout(u64),

    #[error("tool call cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

/// An action the model may invoke.
///
/// Long-running tools return an immediate placeholder; their real result
/// arrives later as an external function-response message and the flow
/// records the call id on the yielded event.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Declaration shown to the model.
    fn declaration(&self) -> FunctionDeclaration;

    /// Whether this tool resolves out-of-band.
    fn is_long_running(&self) -> bool {
        false
    }

    /// Validate arguments against the declared parameter schema before
    /// execution. Override to customise or skip.
    fn validate_args(&self, args: &Value) -> Result<(), ToolError> {
        validate_against_schema(&self.declaration().parameters, args)
    }

    /// Execute the tool. State and artifact effects go through `ctx`; the
    /// returned map becomes the function-response payload.
    async fn run(
        &self,
        args: Map<String, Value>,
        ctx: &mut ToolContext,
    ) -> Result<Map<String, Value>, ToolError>;
}

/// A dynamic source of tools, resolved per invocation.
#[async_trait]
pub trait Toolset: Send + Sync {
    fn name(&self) -> &str;

    /// Tools contributed for this invocation. A failure here degrades to an
    /// empty contribution at the call site; it never aborts the turn.
    async fn tools(&self, ctx: &InvocationContext) -> Result<Vec<Arc<dyn Tool>>, ToolError>;
}

/// Validate a JSON value against a JSON Schema.
pub fn validate_against_schema(schema: &Value, args: &Value) -> Result<(), ToolError> {
    let validator = jsonschema::Validator::new(schema)
        .map_err(|e| ToolError::Internal(format!("invalid tool schema: {e}")))?;
    if validator.is_valid(args) {
        return Ok(());
    }
    let errors: Vec<String> = validator.iter_errors(args).map(|e| e.to_string()).collect();
    Err(ToolError::InvalidArguments(errors.join("; ")))
}

// ---------------------------------------------------------------------------
// TypedTool – strongly-typed tool with automatic schema generation
// ---------------------------------------------------------------------------

/// Strongly-typed variant of [`Tool`] with automatic JSON Schema generation.
///
/// Implement this instead of [`Tool`] when the parameter shape is fixed;
/// a blanket impl provides [`Tool`] automatically.
#[async_trait]
pub trait TypedTool: Send + Sync {
    /// Argument type — must derive `Deserialize` and `JsonSchema`.
    type Args: DeserializeOwned + JsonSchema + Send;

    /// Unique tool name (snake_case).
    fn tool_name(&self) -> &str;

    /// Description shown to the model.
    fn description(&self) -> &str;

    fn is_long_running(&self) -> bool {
        false
    }

    /// Optional business-logic validation after deserialization.
    fn validate(&self, _args: &Self::Args) -> Result<(), String> {
        Ok(())
    }

    /// Execute with typed arguments.
    async fn run(
        &self,
        args: Self::Args,
        ctx: &mut ToolContext,
    ) -> Result<Map<String, Value>, ToolError>;
}

#[async_trait]
impl<T: TypedTool> Tool for T {
    fn declaration(&self) -> FunctionDeclaration {
        FunctionDeclaration::new(self.tool_name(), self.description())
            .with_parameters(typed_tool_schema::<T::Args>())
    }

    fn is_long_running(&self) -> bool {
        TypedTool::is_long_running(self)
    }

    /// Skips JSON Schema validation — `from_value` deserialization covers it.
    fn validate_args(&self, _args: &Value) -> Result<(), ToolError> {
        Ok(())
    }

    async fn run(
        &self,
        args: Map<String, Value>,
        ctx: &mut ToolContext,
    ) -> Result<Map<String, Value>, ToolError> {
        let typed: T::Args = serde_json::from_value(Value::Object(args))
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        self.validate(&typed).map_err(ToolError::InvalidArguments)?;
        TypedTool::run(self, typed, ctx).await
    }
}

/// Generate a JSON Schema `Value` from a type implementing `JsonSchema`.
fn typed_tool_schema<T: JsonSchema>() -> Value {
    let mut v = serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}));
    // Strip the $schema key — providers don't need it.
    if let Some(obj) = v.as_object_mut() {
        obj.remove("$schema");
    }
    v
}

// ---------------------------------------------------------------------------
// FunctionTool – closure-backed tool for simple handlers
// ---------------------------------------------------------------------------

type FunctionHandler = Arc<
    dyn Fn(Map<String, Value>) -> BoxFuture<'static, Result<Map<String, Value>, ToolError>>
        + Send
        + Sync,
>;

/// A tool backed by an async closure over its arguments. Handlers needing
/// context access implement [`Tool`] directly.
#[derive(Clone)]
pub struct FunctionTool {
    declaration: FunctionDeclaration,
    long_running: bool,
    handler: FunctionHandler,
}

impl FunctionTool {
    pub fn new<F, Fut>(declaration: FunctionDeclaration, handler: F) -> Self
    where
        F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<Map<String, Value>, ToolError>> + Send + 'static,
    {
        Self {
            declaration,
            long_running: false,
            handler: Arc::new(move |args| Box::pin(handler(args))),
        }
    }

    #[must_use]
    pub fn long_running(mut self) -> Self {
        self.long_running = true;
        self
    }
}

#[async_trait]
impl Tool for FunctionTool {
    fn declaration(&self) -> FunctionDeclaration {
        self.declaration.clone()
    }

    fn is_long_running(&self) -> bool {
        self.long_running
    }

    async fn run(
        &self,
        args: Map<String, Value>,
        _ctx: &mut ToolContext,
    ) -> Result<Map<String, Value>, ToolError> {
        (self.handler)(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn declaration_defaults_to_empty_object_schema() {
        let decl = FunctionDeclaration::new("t", "a tool");
        assert_eq!(decl.parameters["type"], json!("object"));
    }

    #[test]
    fn schema_validation_accepts_conforming_args() {
        let schema = json!({
            "type": "object",
            "properties": {"q": {"type": "string"}},
            "required": ["q"],
        });
        assert!(validate_against_schema(&schema, &json!({"q": "rust"})).is_ok());
    }

    #[test]
    fn schema_validation_rejects_missing_required() {
        let schema = json!({
            "type": "object",
            "properties": {"q": {"type": "string"}},
            "required": ["q"],
        });
        let err = validate_against_schema(&schema, &json!({})).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[derive(Deserialize, JsonSchema)]
    struct GreetArgs {
        name: String,
    }

    struct GreetTool;

    #[async_trait]
    impl TypedTool for GreetTool {
        type Args = GreetArgs;

        fn tool_name(&self) -> &str {
            "greet"
        }

        fn description(&self) -> &str {
            "Greet a user"
        }

        async fn run(
            &self,
            args: GreetArgs,
            _ctx: &mut ToolContext,
        ) -> Result<Map<String, Value>, ToolError> {
            let mut out = Map::new();
            out.insert("greeting".into(), json!(format!("Hello, {}!", args.name)));
            Ok(out)
        }
    }

    #[test]
    fn typed_tool_declaration_carries_generated_schema() {
        let tool = GreetTool;
        let decl = Tool::declaration(&tool);
        assert_eq!(decl.name, "greet");
        assert!(decl.parameters.get("$schema").is_none());
        let props = &decl.parameters["properties"];
        assert!(props.get("name").is_some());
    }
}
