//! Plugin system: optional hooks at runner, agent, model, and tool layers.
//!
//! A chain folds its plugins in registration order; the first hook that
//! returns a value short-circuits the fold. Context mutations made by
//! earlier, pass-through plugins stay visible to later ones.

use crate::agent::Agent;
use crate::content::Content;
use crate::context::{CallbackContext, InvocationContext, ToolContext};
use crate::event::Event;
use crate::llm::{LlmRequest, LlmResponse, ModelError};
use crate::tool::{Tool, ToolError};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

/// Plugin construction failures.
#[derive(Debug, Clone, Error)]
pub enum PluginChainError {
    #[error("duplicate plugin names: {0:?}")]
    DuplicatePlugins(Vec<String>),
}

/// Extension hooks around a turn. Every hook is optional; defaults pass
/// through. Returning `Some` from a `before_*` hook bypasses the guarded
/// stage, from an `after_*` hook replaces the stage's value, and from an
/// `on_*_error` hook recovers the failure.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Unique name within a chain.
    fn name(&self) -> &str;

    // --- runner layer ---

    /// May rewrite the incoming user content before it is committed.
    async fn on_user_message(
        &self,
        _ctx: &InvocationContext,
        _content: &Content,
    ) -> Option<Content> {
        None
    }

    /// May short-circuit the whole turn after the user event commit.
    async fn before_run(&self, _ctx: &InvocationContext) -> Option<Content> {
        None
    }

    /// Notification only; return values are ignored.
    async fn after_run(&self, _ctx: &InvocationContext) {}

    /// May rewrite any event before it is committed and yielded.
    async fn on_event(&self, _ctx: &InvocationContext, _event: &Event) -> Option<Event> {
        None
    }

    // --- agent layer ---

    async fn before_agent(&self, _agent: &dyn Agent, _ctx: &mut CallbackContext) -> Option<Content> {
        None
    }

    async fn after_agent(&self, _agent: &dyn Agent, _ctx: &mut CallbackContext) -> Option<Content> {
        None
    }

    // --- model layer ---

    async fn before_model(
        &self,
        _ctx: &mut CallbackContext,
        _request: &mut LlmRequest,
    ) -> Option<LlmResponse> {
        None
    }

    async fn after_model(
        &self,
        _ctx: &mut CallbackContext,
        _response: &LlmResponse,
    ) -> Option<LlmResponse> {
        None
    }

    async fn on_model_error(
        &self,
        _ctx: &mut CallbackContext,
        _error: &ModelError,
    ) -> Option<LlmResponse> {
        None
    }

    // --- tool layer ---

    async fn before_tool(
        &self,
        _tool: &dyn Tool,
        _args: &mut Map<String, Value>,
        _ctx: &mut ToolContext,
    ) -> Option<Map<String, Value>> {
        None
    }

    async fn after_tool(
        &self,
        _tool: &dyn Tool,
        _args: &Map<String, Value>,
        _ctx: &mut ToolContext,
        _result: &Map<String, Value>,
    ) -> Option<Map<String, Value>> {
        None
    }

    async fn on_tool_error(
        &self,
        _tool: &dyn Tool,
        _args: &Map<String, Value>,
        _ctx: &mut ToolContext,
        _error: &ToolError,
    ) -> Option<Map<String, Value>> {
        None
    }
}

/// An ordered plugin list with first-non-`None`-wins fold semantics.
///
/// The empty chain is an explicit no-op value, so call sites never branch
/// on "is a chain configured".
#[derive(Default)]
pub struct PluginChain {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl std::fmt::Debug for PluginChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginChain")
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl PluginChain {
    /// Build a chain, rejecting duplicate plugin names.
    pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Result<Self, PluginChainError> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for plugin in &plugins {
            if !seen.insert(plugin.name().to_string()) {
                duplicates.push(plugin.name().to_string());
            }
        }
        if !duplicates.is_empty() {
            return Err(PluginChainError::DuplicatePlugins(duplicates));
        }
        Ok(Self { plugins })
    }

    /// The no-op chain.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub async fn on_user_message(
        &self,
        ctx: &InvocationContext,
        content: &Content,
    ) -> Option<Content> {
        for plugin in &self.plugins {
            if let Some(replaced) = plugin.on_user_message(ctx, content).await {
                return Some(replaced);
            }
        }
        None
    }

    pub async fn before_run(&self, ctx: &InvocationContext) -> Option<Content> {
        for plugin in &self.plugins {
            if let Some(content) = plugin.before_run(ctx).await {
                return Some(content);
            }
        }
        None
    }

    pub async fn after_run(&self, ctx: &InvocationContext) {
        for plugin in &self.plugins {
            plugin.after_run(ctx).await;
        }
    }

    pub async fn on_event(&self, ctx: &InvocationContext, event: &Event) -> Option<Event> {
        for plugin in &self.plugins {
            if let Some(rewritten) = plugin.on_event(ctx, event).await {
                return Some(rewritten);
            }
        }
        None
    }

    pub async fn before_agent(
        &self,
        agent: &dyn Agent,
        ctx: &mut CallbackContext,
    ) -> Option<Content> {
        for plugin in &self.plugins {
            if let Some(content) = plugin.before_agent(agent, ctx).await {
                return Some(content);
            }
        }
        None
    }

    pub async fn after_agent(
        &self,
        agent: &dyn Agent,
        ctx: &mut CallbackContext,
    ) -> Option<Content> {
        for plugin in &self.plugins {
            if let Some(content) = plugin.after_agent(agent, ctx).await {
                return Some(content);
            }
        }
        None
    }

    pub async fn before_model(
        &self,
        ctx: &mut CallbackContext,
        request: &mut LlmRequest,
    ) -> Option<LlmResponse> {
        for plugin in &self.plugins {
            if let Some(response) = plugin.before_model(ctx, request).await {
                return Some(response);
            }
        }
        None
    }

    pub async fn after_model(
        &self,
        ctx: &mut CallbackContext,
        response: &LlmResponse,
    ) -> Option<LlmResponse> {
        for plugin in &self.plugins {
            if let Some(replaced) = plugin.after_model(ctx, response).await {
                return Some(replaced);
            }
        }
        None
    }

    pub async fn on_model_error(
        &self,
        ctx: &mut CallbackContext,
        error: &ModelError,
    ) -> Option<LlmResponse> {
        for plugin in &self.plugins {
            if let Some(recovered) = plugin.on_model_error(ctx, error).await {
                return Some(recovered);
            }
        }
        None
    }

    pub async fn before_tool(
        &self,
        tool: &dyn Tool,
        args: &mut Map<String, Value>,
        ctx: &mut ToolContext,
    ) -> Option<Map<String, Value>> {
        for plugin in &self.plugins {
            if let Some(result) = plugin.before_tool(tool, args, ctx).await {
                return Some(result);
            }
        }
        None
    }

    pub async fn after_tool(
        &self,
        tool: &dyn Tool,
        args: &Map<String, Value>,
        ctx: &mut ToolContext,
        result: &Map<String, Value>,
    ) -> Option<Map<String, Value>> {
        for plugin in &self.plugins {
            if let Some(replaced) = plugin.after_tool(tool, args, ctx, result).await {
                return Some(replaced);
            }
        }
        None
    }

    pub async fn on_tool_error(
        &self,
        tool: &dyn Tool,
        args: &Map<String, Value>,
        ctx: &mut ToolContext,
        error: &ToolError,
    ) -> Option<Map<String, Value>> {
        for plugin in &self.plugins {
            if let Some(recovered) = plugin.on_tool_error(tool, args, ctx, error).await {
                return Some(recovered);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_invocation;
    use serde_json::json;

    struct Tagger {
        name: String,
        reply: Option<String>,
    }

    impl Tagger {
        fn passthrough(name: &str) -> Arc<dyn Plugin> {
            Arc::new(Self {
                name: name.to_string(),
                reply: None,
            })
        }

        fn replying(name: &str, reply: &str) -> Arc<dyn Plugin> {
            Arc::new(Self {
                name: name.to_string(),
                reply: Some(reply.to_string()),
            })
        }
    }

    #[async_trait]
    impl Plugin for Tagger {
        fn name(&self) -> &str {
            &self.name
        }

        async fn before_run(&self, _ctx: &InvocationContext) -> Option<Content> {
            self.reply.as_ref().map(Content::model)
        }

        async fn before_model(
            &self,
            ctx: &mut CallbackContext,
            _request: &mut LlmRequest,
        ) -> Option<LlmResponse> {
            // Every visited plugin leaves a mark so short-circuit order is
            // observable through the context.
            ctx.set_state(format!("visited:{}", self.name), json!(true));
            self.reply.as_ref().map(|r| LlmResponse::text(r.clone()))
        }
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = PluginChain::new(vec![
            Tagger::passthrough("p"),
            Tagger::passthrough("q"),
            Tagger::passthrough("p"),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            PluginChainError::DuplicatePlugins(names) if names == vec!["p".to_string()]
        ));
    }

    #[tokio::test]
    async fn empty_chain_is_noop() {
        let chain = PluginChain::empty();
        let ctx = test_invocation();
        assert!(chain.before_run(&ctx).await.is_none());
        assert!(chain
            .on_user_message(&ctx, &Content::user("hi"))
            .await
            .is_none());
        chain.after_run(&ctx).await;
    }

    #[tokio::test]
    async fn first_non_none_short_circuits() {
        let chain = PluginChain::new(vec![
            Tagger::passthrough("a"),
            Tagger::replying("b", "from b"),
            Tagger::replying("c", "from c"),
        ])
        .unwrap();

        let mut ctx = CallbackContext::new(test_invocation());
        let mut request = LlmRequest::default();
        let response = chain.before_model(&mut ctx, &mut request).await.unwrap();
        assert_eq!(response.content.unwrap().text(), "from b");

        // "a" ran and threaded its context update; "c" was never reached.
        assert_eq!(ctx.get_state("visited:a"), Some(&json!(true)));
        assert_eq!(ctx.get_state("visited:b"), Some(&json!(true)));
        assert_eq!(ctx.get_state("visited:c"), None);
    }

    #[tokio::test]
    async fn all_none_returns_none() {
        let chain =
            PluginChain::new(vec![Tagger::passthrough("a"), Tagger::passthrough("b")]).unwrap();
        let mut ctx = CallbackContext::new(test_invocation());
        let mut request = LlmRequest::default();
        assert!(chain.before_model(&mut ctx, &mut request).await.is_none());
        assert_eq!(ctx.get_state("visited:b"), Some(&json!(true)));
    }
}
