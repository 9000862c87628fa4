//! The immutable interaction record and its side-effect bundle.

use crate::content::{Content, FunctionCall, FunctionResponse};
use crate::llm::{LlmResponse, UsageMetadata};
use crate::session::state::StateMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A confirmation request raised by a tool through its context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolConfirmationRequest {
    pub function_call_id: String,
    pub tool_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// Side effects carried by an event. Applied centrally by the session
/// service at append time; an event is the only way effects reach storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventActions {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub state_delta: StateMap,
    /// `filename → version` for artifacts saved during the step.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub artifact_delta: HashMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_to_agent: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub escalate: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skip_summarization: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requested_tool_confirmations: Vec<ToolConfirmationRequest>,
}

impl EventActions {
    pub fn is_empty(&self) -> bool {
        self.state_delta.is_empty()
            && self.artifact_delta.is_empty()
            && self.transfer_to_agent.is_none()
            && !self.escalate
            && !self.skip_summarization
            && self.requested_tool_confirmations.is_empty()
    }
}

/// One record in the interaction stream.
///
/// Events become immutable once appended; only the session service stamps
/// `timestamp`, at append time, so per-session ordering never depends on a
/// caller's clock. `partial` events are transient: never persisted, never
/// carrying side effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// UUIDv4, unique within a session.
    pub id: String,
    /// Unix milliseconds, stamped by the session service at append.
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invocation_id: Option<String>,
    /// Distinguishes concurrent sub-agent traces.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub partial: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub turn_complete: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub interrupted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage_metadata: Option<UsageMetadata>,
    #[serde(default, skip_serializing_if = "EventActions::is_empty")]
    pub actions: EventActions,
    /// Ids of long-running tool calls whose real results arrive out-of-band.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub long_running_tool_ids: Vec<String>,
}

impl Event {
    /// Fresh event with a generated id and zero timestamp (stamped at append).
    pub fn new(author: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: 0,
            invocation_id: None,
            branch: None,
            author: Some(author.into()),
            content: None,
            partial: false,
            turn_complete: false,
            interrupted: false,
            error_code: None,
            error_message: None,
            finish_reason: None,
            usage_metadata: None,
            actions: EventActions::default(),
            long_running_tool_ids: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_content(mut self, content: Content) -> Self {
        self.content = Some(content);
        self
    }

    #[must_use]
    pub fn with_actions(mut self, actions: EventActions) -> Self {
        self.actions = actions;
        self
    }

    #[must_use]
    pub fn with_invocation(mut self, invocation_id: impl Into<String>) -> Self {
        self.invocation_id = Some(invocation_id.into());
        self
    }

    #[must_use]
    pub fn with_branch(mut self, branch: Option<String>) -> Self {
        self.branch = branch;
        self
    }

    /// An error event terminating an agent's contribution to the stream.
    pub fn error(
        author: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let mut event = Self::new(author);
        event.error_code = Some(code.into());
        event.error_message = Some(message.into());
        event
    }

    /// Build an event from a model response, authored by the agent.
    pub fn from_llm_response(author: impl Into<String>, response: LlmResponse) -> Self {
        let mut event = Self::new(author);
        event.content = response.content;
        event.partial = response.partial;
        event.turn_complete = response.turn_complete;
        event.interrupted = response.interrupted;
        event.error_code = response.error_code;
        event.error_message = response.error_message;
        event.finish_reason = response.finish_reason;
        event.usage_metadata = response.usage_metadata;
        event
    }

    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.content
            .as_ref()
            .map(|c| c.function_calls())
            .unwrap_or_default()
    }

    pub fn function_responses(&self) -> Vec<&FunctionResponse> {
        self.content
            .as_ref()
            .map(|c| c.function_responses())
            .unwrap_or_default()
    }

    /// Whether this event terminates its agent's loop.
    ///
    /// True iff `skip_summarization` is set, or a long-running tool id is
    /// recorded, or the event is not partial and its content carries neither
    /// function calls nor function responses.
    pub fn is_final_response(&self) -> bool {
        if self.actions.skip_summarization || !self.long_running_tool_ids.is_empty() {
            return true;
        }
        if self.partial {
            return false;
        }
        self.function_calls().is_empty() && self.function_responses().is_empty()
    }
}
