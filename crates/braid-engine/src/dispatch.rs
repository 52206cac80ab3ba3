//! Tool dispatcher: turns one tool call into a lazy stream of status updates.
//!
//! Dispatch order per invocation: validate the input, then either park the
//! invocation for the caller (no executor) or drive the executor, surfacing
//! each yielded value as a partial. Executor faults are contained to the
//! invocation; they never unwind the step loop.

use braid_contract::{
    validate_against_schema, FailureKind, InvocationContext, InvocationFailure, InvocationStatus,
    ToolCall, ToolDefinition,
};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;

/// One dispatcher-emitted update for an invocation. Applied to the
/// conversation state and forwarded to the merged output stream, in that
/// order, never reordered within an invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationUpdate {
    pub invocation_id: String,
    pub status: InvocationStatus,
    /// Partial or final output payload.
    pub payload: Option<Value>,
    /// Structured failure for `output-error` updates.
    pub failure: Option<InvocationFailure>,
}

impl InvocationUpdate {
    fn status_only(invocation_id: &str, status: InvocationStatus) -> Self {
        Self {
            invocation_id: invocation_id.to_string(),
            status,
            payload: None,
            failure: None,
        }
    }

    fn partial(invocation_id: &str, payload: Value) -> Self {
        Self {
            invocation_id: invocation_id.to_string(),
            status: InvocationStatus::Executing,
            payload: Some(payload),
            failure: None,
        }
    }

    fn output(invocation_id: &str, payload: Value) -> Self {
        Self {
            invocation_id: invocation_id.to_string(),
            status: InvocationStatus::OutputAvailable,
            payload: Some(payload),
            failure: None,
        }
    }

    fn error(invocation_id: &str, failure: InvocationFailure) -> Self {
        Self {
            invocation_id: invocation_id.to_string(),
            status: InvocationStatus::OutputError,
            payload: None,
            failure: Some(failure),
        }
    }
}

/// Lazy sequence of updates for one invocation.
pub type UpdateStream = BoxStream<'static, InvocationUpdate>;

/// Dispatch a tool call against its resolved definition.
///
/// `definition` is `None` when the registry lookup missed; the stream then
/// carries a single `unknown-tool` error so the run can continue.
pub fn dispatch(definition: Option<Arc<ToolDefinition>>, call: ToolCall) -> UpdateStream {
    let stream = async_stream::stream! {
        let id = call.invocation_id.clone();

        let Some(definition) = definition else {
            tracing::debug!(invocation_id = %id, tool = %call.tool_name, "unknown tool");
            yield InvocationUpdate::error(&id, InvocationFailure::unknown_tool(&call.tool_name));
            return;
        };

        if let Err(violation) = validate_against_schema(&definition.input_schema, &call.input) {
            yield InvocationUpdate::error(
                &id,
                InvocationFailure::new(FailureKind::InvalidInput, violation.reason)
                    .with_path(violation.path),
            );
            return;
        }

        let Some(executor) = definition.executor.clone() else {
            // Caller-executed: completion is deferred to a later submission.
            yield InvocationUpdate::status_only(&id, InvocationStatus::AwaitingConfirmation);
            return;
        };

        yield InvocationUpdate::status_only(&id, InvocationStatus::Executing);

        let ctx = InvocationContext::new(&id, &definition.name);
        let mut outputs = executor.run(call.input.clone(), ctx);
        let mut last: Option<Value> = None;
        while let Some(item) = outputs.next().await {
            match item {
                Ok(value) => {
                    yield InvocationUpdate::partial(&id, value.clone());
                    last = Some(value);
                }
                Err(err) => {
                    tracing::debug!(invocation_id = %id, error = %err, "executor failed");
                    yield InvocationUpdate::error(&id, err.into());
                    return;
                }
            }
        }

        let Some(output) = last else {
            yield InvocationUpdate::error(
                &id,
                InvocationFailure::new(
                    FailureKind::ExecutionFailed,
                    "executor produced no output",
                ),
            );
            return;
        };

        if let Some(schema) = &definition.output_schema {
            if let Err(violation) = validate_against_schema(schema, &output) {
                yield InvocationUpdate::error(
                    &id,
                    InvocationFailure::new(FailureKind::InvalidOutput, violation.reason)
                        .with_path(violation.path),
                );
                return;
            }
        }

        yield InvocationUpdate::output(&id, output);
    };
    stream.boxed()
}
