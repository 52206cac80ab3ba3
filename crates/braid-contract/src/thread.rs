//! Conversation model: messages made of ordered parts.

use crate::error::InvocationFailure;
use crate::status::InvocationStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Optional metadata associating a message with a run and step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// The run that produced this message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Step index within the run (0-based).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_index: Option<u32>,
}

/// Generate a time-ordered UUID v7 message identifier.
pub fn gen_message_id() -> String {
    uuid::Uuid::now_v7().to_string()
}

/// Generate an invocation identifier for engine-originated invocations.
pub fn gen_invocation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// A message in the conversation.
///
/// Immutable once appended, with two sanctioned exceptions exercised only by
/// the engine's state manager: appending parts to the last assistant message
/// of the current step, and updating a tool invocation part in place by its
/// `invocation_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Stable message identifier (UUID v7).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub role: Role,
    pub parts: Vec<Part>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl Message {
    /// Create a system message with a single text part.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            id: Some(gen_message_id()),
            role: Role::System,
            parts: vec![Part::text(content)],
            metadata: None,
        }
    }

    /// Create a user message with a single text part.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Some(gen_message_id()),
            role: Role::User,
            parts: vec![Part::text(content)],
            metadata: None,
        }
    }

    /// Create an assistant message with a single text part.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: Some(gen_message_id()),
            role: Role::Assistant,
            parts: vec![Part::text(content)],
            metadata: None,
        }
    }

    /// Create an empty assistant message with an explicit id; the engine
    /// opens one of these at each step boundary and streams parts into it.
    pub fn assistant_empty(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            role: Role::Assistant,
            parts: Vec::new(),
            metadata: None,
        }
    }

    /// Create a user message carrying caller-supplied tool results.
    pub fn tool_results(parts: Vec<Part>) -> Self {
        Self {
            id: Some(gen_message_id()),
            role: Role::User,
            parts,
            metadata: None,
        }
    }

    /// Attach run/step metadata to this message.
    #[must_use]
    pub fn with_metadata(mut self, metadata: MessageMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Concatenated text content of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text { content } => Some(content.as_str()),
                Part::ToolInvocation(_) => None,
            })
            .collect()
    }

    /// Iterate this message's tool invocation parts.
    pub fn invocations(&self) -> impl Iterator<Item = &ToolInvocationPart> {
        self.parts.iter().filter_map(|p| match p {
            Part::ToolInvocation(inv) => Some(inv),
            Part::Text { .. } => None,
        })
    }
}

/// An ordered piece of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Part {
    Text {
        content: String,
    },
    ToolInvocation(ToolInvocationPart),
}

impl Part {
    /// Create a text part.
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
        }
    }

    /// Create a tool invocation part.
    pub fn invocation(part: ToolInvocationPart) -> Self {
        Self::ToolInvocation(part)
    }
}

/// One tool invocation tracked through its status lifecycle.
///
/// `invocation_id` is unique across the conversation and is the join key
/// between the model's request and its eventual result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationPart {
    #[serde(rename = "toolName")]
    pub tool_name: String,
    #[serde(rename = "invocationId")]
    pub invocation_id: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub input: Value,
    pub status: InvocationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<InvocationFailure>,
}

impl ToolInvocationPart {
    /// Create a part for an invocation whose input is still streaming.
    pub fn streaming(invocation_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            invocation_id: invocation_id.into(),
            input: Value::Null,
            status: InvocationStatus::InputStreaming,
            output: None,
            error: None,
        }
    }

    /// Create a part with complete input.
    pub fn with_input(
        invocation_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: Value,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            invocation_id: invocation_id.into(),
            input,
            status: InvocationStatus::InputAvailable,
            output: None,
            error: None,
        }
    }

    /// Create a caller-supplied result part referencing a pending invocation.
    pub fn resolved(
        invocation_id: impl Into<String>,
        tool_name: impl Into<String>,
        output: Value,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            invocation_id: invocation_id.into(),
            input: Value::Null,
            status: InvocationStatus::OutputAvailable,
            output: Some(output),
            error: None,
        }
    }

    /// Create a caller-supplied rejection part referencing a pending invocation.
    pub fn rejected(
        invocation_id: impl Into<String>,
        tool_name: impl Into<String>,
        failure: InvocationFailure,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            invocation_id: invocation_id.into(),
            input: Value::Null,
            status: InvocationStatus::OutputError,
            output: None,
            error: Some(failure),
        }
    }

    /// Whether this invocation has reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether this invocation is parked waiting on the caller.
    pub fn is_awaiting_confirmation(&self) -> bool {
        self.status == InvocationStatus::AwaitingConfirmation
    }
}

/// A complete tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(rename = "invocationId")]
    pub invocation_id: String,
    #[serde(rename = "toolName")]
    pub tool_name: String,
    pub input: Value,
}

impl ToolCall {
    pub fn new(
        invocation_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: Value,
    ) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            tool_name: tool_name.into(),
            input,
        }
    }
}
