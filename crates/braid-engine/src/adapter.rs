//! The model adapter seam.
//!
//! The engine treats the generative model as an opaque capability: given a
//! conversation snapshot and a tool catalog, it produces a lazy sequence of
//! generation events. Providers plug in behind [`ModelAdapter`]; the engine
//! never reads ambient provider configuration.

use async_trait::async_trait;
use braid_contract::{Message, ToolDescriptor, Usage};
use futures::stream::BoxStream;
use serde_json::Value;
use thiserror::Error;

/// Transport-level adapter failure. Fatal to the current run.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

/// What the engine asks the model for: the running conversation snapshot
/// plus the model-facing tool catalog (names and input schemas only).
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDescriptor>,
}

/// One event of a model generation.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationEvent {
    /// Incremental assistant text.
    TextDelta { delta: String },

    /// The model started emitting a tool call; its input follows as deltas.
    ToolCallStart {
        invocation_id: String,
        tool_name: String,
    },

    /// Incremental chunk of a tool call's input text.
    ToolCallDelta {
        invocation_id: String,
        input_text_delta: String,
    },

    /// A complete tool call. Adapters that do not stream inputs may emit
    /// this without a preceding `ToolCallStart`.
    ToolCall {
        invocation_id: String,
        tool_name: String,
        input: Value,
    },

    /// Terminal event of the generation.
    Finish {
        reason: Option<String>,
        usage: Option<Usage>,
    },
}

/// Lazy sequence of generation events; an `Err` item aborts the run.
pub type GenerationStream = BoxStream<'static, Result<GenerationEvent, AdapterError>>;

/// Opaque generative-model capability.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    /// Start one generation over the given snapshot and tool catalog.
    async fn stream_generation(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationStream, AdapterError>;
}
