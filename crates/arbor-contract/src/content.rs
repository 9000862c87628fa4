//! Message content model: role-tagged sequences of typed parts.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Originator of a piece of content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Content supplied by the end user (including tool results echoed back).
    User,
    /// Content produced by the model.
    Model,
}

/// A multi-part message exchanged between user, model, and tools.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    /// User content with a single text part.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![Part::text(text)],
        }
    }

    /// Model content with a single text part.
    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            parts: vec![Part::text(text)],
        }
    }

    /// All function-call parts, in part order.
    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.parts
            .iter()
            .filter_map(|p| match &p.kind {
                PartKind::FunctionCall(fc) => Some(fc),
                _ => None,
            })
            .collect()
    }

    /// All function-response parts, in part order.
    pub fn function_responses(&self) -> Vec<&FunctionResponse> {
        self.parts
            .iter()
            .filter_map(|p| match &p.kind {
                PartKind::FunctionResponse(fr) => Some(fr),
                _ => None,
            })
            .collect()
    }

    /// Concatenated text of all non-thought text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter(|p| !p.thought)
            .filter_map(|p| p.as_text())
            .collect::<Vec<_>>()
            .join("")
    }
}

/// One element of a [`Content`]. Exactly one payload variant is set; empty
/// text parts are permitted only as streaming placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    #[serde(flatten)]
    pub kind: PartKind,
    /// Marks internal reasoning parts excluded from user-visible text.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub thought: bool,
}

/// Payload variants of a [`Part`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartKind {
    Text(String),
    FunctionCall(FunctionCall),
    FunctionResponse(FunctionResponse),
    InlineData(Blob),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: PartKind::Text(text.into()),
            thought: false,
        }
    }

    pub fn thought(text: impl Into<String>) -> Self {
        Self {
            kind: PartKind::Text(text.into()),
            thought: true,
        }
    }

    pub fn function_call(call: FunctionCall) -> Self {
        Self {
            kind: PartKind::FunctionCall(call),
            thought: false,
        }
    }

    pub fn function_response(response: FunctionResponse) -> Self {
        Self {
            kind: PartKind::FunctionResponse(response),
            thought: false,
        }
    }

    pub fn inline_data(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            kind: PartKind::InlineData(Blob {
                mime_type: mime_type.into(),
                data,
            }),
            thought: false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.kind {
            PartKind::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_function_call(&self) -> Option<&FunctionCall> {
        match &self.kind {
            PartKind::FunctionCall(fc) => Some(fc),
            _ => None,
        }
    }

    pub fn as_function_response(&self) -> Option<&FunctionResponse> {
        match &self.kind {
            PartKind::FunctionResponse(fr) => Some(fr),
            _ => None,
        }
    }
}

/// A model-issued request to invoke a named tool.
///
/// The `id` correlates the call with its eventual [`FunctionResponse`] and
/// must round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub args: Map<String, Value>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, id: impl Into<String>, args: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            id: Some(id.into()),
            args,
        }
    }
}

/// The result of a tool invocation, correlated by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub response: Map<String, Value>,
}

/// Raw bytes with a mime type, for inline media parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    pub mime_type: String,
    pub data: Vec<u8>,
}
