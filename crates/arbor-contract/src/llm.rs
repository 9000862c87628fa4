//! Provider-neutral LLM contract consumed by the flow.

use crate::content::Content;
use crate::tool::FunctionDeclaration;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One model invocation: system instruction, conversation so far, and the
/// declarations of every tool the model may call.
#[derive(Debug, Clone, Default)]
pub struct LlmRequest {
    pub system_instruction: Option<String>,
    pub contents: Vec<Content>,
    pub tools: Vec<FunctionDeclaration>,
}

impl LlmRequest {
    pub fn new(system_instruction: impl Into<String>) -> Self {
        Self {
            system_instruction: Some(system_instruction.into()),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_contents(mut self, contents: Vec<Content>) -> Self {
        self.contents = contents;
        self
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Vec<FunctionDeclaration>) -> Self {
        self.tools = tools;
        self
    }
}

/// Token accounting reported by a provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub prompt_tokens: Option<i32>,
    pub completion_tokens: Option<i32>,
    pub total_tokens: Option<i32>,
}

/// One model response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LlmResponse {
    pub content: Option<Content>,
    pub usage_metadata: Option<UsageMetadata>,
    pub finish_reason: Option<String>,
    /// Streaming fragment; never persisted, never a final response.
    pub partial: bool,
    pub turn_complete: bool,
    pub interrupted: bool,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl LlmResponse {
    /// A complete model-role text response.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Some(Content::model(text)),
            turn_complete: true,
            ..Default::default()
        }
    }

    pub fn from_content(content: Content) -> Self {
        Self {
            content: Some(content),
            turn_complete: true,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_usage(mut self, usage: UsageMetadata) -> Self {
        self.usage_metadata = Some(usage);
        self
    }
}

/// Model invocation failures.
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("provider error: {0}")]
    Provider(String),

    #[error("model call timed out after {0} ms")]
    Timeout(u64),

    #[error("model call cancelled")]
    Cancelled,
}

/// LLM provider contract. Concrete HTTP clients live outside the core;
/// the flow only ever sees this trait.
#[async_trait]
pub trait Model: Send + Sync {
    /// Model identifier for logging and telemetry.
    fn name(&self) -> &str;

    /// Execute one generation call.
    async fn generate_content(&self, request: LlmRequest) -> Result<LlmResponse, ModelError>;
}
