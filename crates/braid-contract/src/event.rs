//! Run events: the single ordered output stream of a run.
//!
//! Every event carries enough information to reconstruct a part update on
//! the caller's copy of the conversation; tool parts are addressed by
//! `invocationId`, text by a running append to the step's assistant message.

use crate::error::InvocationFailure;
use crate::usage::Usage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Why a run stopped cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Termination {
    /// The model produced a final answer (pure text or a final-answer tool).
    Completed,
    /// The caller cancelled the run mid-stream.
    Cancelled,
}

/// Run-fatal failure classification carried on the terminal error event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunFailureKind {
    /// The model adapter was unreachable or produced a malformed stream.
    AdapterTransport,
    /// The step budget was exhausted before the run reached `Completed`.
    StepBudgetExceeded,
}

/// One unit of the run's merged output stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RunEvent {
    /// A run started.
    RunStart {
        #[serde(rename = "runId")]
        run_id: String,
    },

    /// A step's generation began; subsequent text streams into `messageId`.
    StepStart {
        #[serde(rename = "stepIndex")]
        step_index: u32,
        #[serde(rename = "messageId")]
        message_id: String,
    },

    /// Incremental assistant text.
    TextDelta {
        #[serde(rename = "messageId")]
        message_id: String,
        delta: String,
    },

    /// The model began streaming a tool invocation's input.
    ToolInputStart {
        #[serde(rename = "invocationId")]
        invocation_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
    },

    /// Incremental chunk of a tool invocation's input.
    ToolInputDelta {
        #[serde(rename = "invocationId")]
        invocation_id: String,
        #[serde(rename = "inputTextDelta")]
        input_text_delta: String,
    },

    /// A tool invocation's input is complete.
    ToolInputAvailable {
        #[serde(rename = "invocationId")]
        invocation_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        input: Value,
    },

    /// A server-side executor started running.
    ToolExecuting {
        #[serde(rename = "invocationId")]
        invocation_id: String,
    },

    /// A progressively refined partial output from a running executor.
    ToolPartial {
        #[serde(rename = "invocationId")]
        invocation_id: String,
        partial: Value,
    },

    /// A caller-executed invocation is parked until the caller resolves it.
    ToolAwaitingConfirmation {
        #[serde(rename = "invocationId")]
        invocation_id: String,
        #[serde(rename = "toolName")]
        tool_name: String,
        input: Value,
    },

    /// A tool invocation's final output.
    ToolOutputAvailable {
        #[serde(rename = "invocationId")]
        invocation_id: String,
        output: Value,
    },

    /// A tool invocation failed; the run continues.
    ToolOutputError {
        #[serde(rename = "invocationId")]
        invocation_id: String,
        failure: InvocationFailure,
    },

    /// A step completed (its generation and all dispatched tools settled).
    StepFinish {
        #[serde(rename = "stepIndex")]
        step_index: u32,
    },

    /// The run paused on unresolved caller-executed invocations; the stream
    /// ends here and the caller must resubmit with results.
    RunBlocked {
        /// Invocation ids awaiting caller-supplied results.
        pending: Vec<String>,
    },

    /// The run finished cleanly.
    RunFinish {
        termination: Termination,
        usage: Usage,
    },

    /// The run failed; everything streamed before this event stands.
    RunError {
        kind: RunFailureKind,
        message: String,
    },
}

impl RunEvent {
    pub fn run_start(run_id: impl Into<String>) -> Self {
        Self::RunStart {
            run_id: run_id.into(),
        }
    }

    pub fn step_start(step_index: u32, message_id: impl Into<String>) -> Self {
        Self::StepStart {
            step_index,
            message_id: message_id.into(),
        }
    }

    pub fn text_delta(message_id: impl Into<String>, delta: impl Into<String>) -> Self {
        Self::TextDelta {
            message_id: message_id.into(),
            delta: delta.into(),
        }
    }

    pub fn tool_input_start(
        invocation_id: impl Into<String>,
        tool_name: impl Into<String>,
    ) -> Self {
        Self::ToolInputStart {
            invocation_id: invocation_id.into(),
            tool_name: tool_name.into(),
        }
    }

    pub fn tool_input_delta(
        invocation_id: impl Into<String>,
        input_text_delta: impl Into<String>,
    ) -> Self {
        Self::ToolInputDelta {
            invocation_id: invocation_id.into(),
            input_text_delta: input_text_delta.into(),
        }
    }

    pub fn tool_input_available(
        invocation_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: Value,
    ) -> Self {
        Self::ToolInputAvailable {
            invocation_id: invocation_id.into(),
            tool_name: tool_name.into(),
            input,
        }
    }

    pub fn tool_executing(invocation_id: impl Into<String>) -> Self {
        Self::ToolExecuting {
            invocation_id: invocation_id.into(),
        }
    }

    pub fn tool_partial(invocation_id: impl Into<String>, partial: Value) -> Self {
        Self::ToolPartial {
            invocation_id: invocation_id.into(),
            partial,
        }
    }

    pub fn tool_awaiting_confirmation(
        invocation_id: impl Into<String>,
        tool_name: impl Into<String>,
        input: Value,
    ) -> Self {
        Self::ToolAwaitingConfirmation {
            invocation_id: invocation_id.into(),
            tool_name: tool_name.into(),
            input,
        }
    }

    pub fn tool_output_available(invocation_id: impl Into<String>, output: Value) -> Self {
        Self::ToolOutputAvailable {
            invocation_id: invocation_id.into(),
            output,
        }
    }

    pub fn tool_output_error(
        invocation_id: impl Into<String>,
        failure: InvocationFailure,
    ) -> Self {
        Self::ToolOutputError {
            invocation_id: invocation_id.into(),
            failure,
        }
    }

    pub fn step_finish(step_index: u32) -> Self {
        Self::StepFinish { step_index }
    }

    pub fn run_blocked(pending: Vec<String>) -> Self {
        Self::RunBlocked { pending }
    }

    pub fn run_finish(termination: Termination, usage: Usage) -> Self {
        Self::RunFinish { termination, usage }
    }

    pub fn run_error(kind: RunFailureKind, message: impl Into<String>) -> Self {
        Self::RunError {
            kind,
            message: message.into(),
        }
    }

    /// Whether this event terminates the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::RunBlocked { .. } | Self::RunFinish { .. } | Self::RunError { .. }
        )
    }

    /// Short name for logging.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::RunStart { .. } => "run-start",
            Self::StepStart { .. } => "step-start",
            Self::TextDelta { .. } => "text-delta",
            Self::ToolInputStart { .. } => "tool-input-start",
            Self::ToolInputDelta { .. } => "tool-input-delta",
            Self::ToolInputAvailable { .. } => "tool-input-available",
            Self::ToolExecuting { .. } => "tool-executing",
            Self::ToolPartial { .. } => "tool-partial",
            Self::ToolAwaitingConfirmation { .. } => "tool-awaiting-confirmation",
            Self::ToolOutputAvailable { .. } => "tool-output-available",
            Self::ToolOutputError { .. } => "tool-output-error",
            Self::StepFinish { .. } => "step-finish",
            Self::RunBlocked { .. } => "run-blocked",
            Self::RunFinish { .. } => "run-finish",
            Self::RunError { .. } => "run-error",
        }
    }
}
