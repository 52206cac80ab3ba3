//! The step scheduler: drives the run loop.
//!
//! One run is a single sequential loop of `Generating -> Dispatching` steps
//! that ends in one of three terminal events: `run-finish` (completed or
//! cancelled), `run-blocked` (unresolved caller-executed invocations), or
//! `run-error` (adapter transport failure or step-budget exhaustion). A
//! single step may fan out to several concurrently executing tool
//! invocations; the loop itself is never internally parallel.

use crate::adapter::{GenerationEvent, GenerationRequest, ModelAdapter};
use crate::config::EngineConfig;
use crate::conversation::ConversationState;
use crate::dispatch::{dispatch, InvocationUpdate, UpdateStream};
use crate::merger::merge_updates;
use braid_contract::{
    gen_message_id, InvocationStatus, Message, RunEvent, RunFailureKind, Termination, ToolCall,
    ToolRegistry, Usage,
};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The run's merged, ordered output stream.
pub type RunStream = Pin<Box<dyn Stream<Item = RunEvent> + Send>>;

/// Sequence-stamps and traces every emitted event.
struct Emitter {
    run_id: String,
    seq: u64,
}

impl Emitter {
    fn new(run_id: String) -> Self {
        Self { run_id, seq: 0 }
    }

    fn emit(&mut self, event: RunEvent) -> RunEvent {
        tracing::trace!(
            run_id = %self.run_id,
            seq = self.seq,
            event_type = %event.kind_name(),
            "emit run event"
        );
        self.seq = self.seq.saturating_add(1);
        event
    }
}

/// Build the generation request: config system prompt, then the snapshot.
fn build_request(
    config: &EngineConfig,
    conversation: &ConversationState,
    registry: &ToolRegistry,
) -> GenerationRequest {
    let mut messages = Vec::with_capacity(conversation.messages().len() + 1);
    if !config.system_prompt.is_empty() {
        messages.push(Message::system(config.system_prompt.clone()));
    }
    messages.extend(conversation.snapshot());
    GenerationRequest {
        messages,
        tools: registry.descriptors(),
    }
}

/// Project a dispatcher update onto the outbound event vocabulary.
///
/// Returns `None` for statuses the dispatcher never emits.
fn update_event(update: &InvocationUpdate, calls: &[ToolCall]) -> Option<RunEvent> {
    let id = update.invocation_id.clone();
    match update.status {
        InvocationStatus::Executing => match &update.payload {
            Some(partial) => Some(RunEvent::tool_partial(id, partial.clone())),
            None => Some(RunEvent::tool_executing(id)),
        },
        InvocationStatus::AwaitingConfirmation => {
            let call = calls.iter().find(|c| c.invocation_id == id)?;
            Some(RunEvent::tool_awaiting_confirmation(
                id,
                call.tool_name.clone(),
                call.input.clone(),
            ))
        }
        InvocationStatus::OutputAvailable => Some(RunEvent::tool_output_available(
            id,
            update.payload.clone().unwrap_or(serde_json::Value::Null),
        )),
        InvocationStatus::OutputError => update
            .failure
            .clone()
            .map(|failure| RunEvent::tool_output_error(id, failure)),
        InvocationStatus::InputStreaming | InvocationStatus::InputAvailable => None,
    }
}

/// Whether the latest step resolved a final-answer tool.
fn resolved_ends_run(conversation: &ConversationState, registry: &ToolRegistry) -> bool {
    conversation
        .resolved_tool_names()
        .iter()
        .any(|name| registry.lookup(name).map(|d| d.ends_run).unwrap_or(false))
}

pub(crate) fn run_stream(
    adapter: Arc<dyn ModelAdapter>,
    registry: Arc<ToolRegistry>,
    config: EngineConfig,
    messages: Vec<Message>,
    cancellation: CancellationToken,
) -> RunStream {
    Box::pin(async_stream::stream! {
        let run_id = uuid::Uuid::new_v4().to_string();
        let mut emitter = Emitter::new(run_id.clone());
        let mut conversation = ConversationState::from_submission(messages);
        let mut usage_total = Usage::default();

        yield emitter.emit(RunEvent::run_start(&run_id));

        // Confirmation gate: a submission that leaves any caller-executed
        // invocation unresolved keeps the run blocked. No generation runs.
        let pending = conversation.pending_confirmations();
        if !pending.is_empty() {
            tracing::debug!(run_id = %run_id, pending = pending.len(), "run still blocked");
            yield emitter.emit(RunEvent::run_blocked(pending));
            return;
        }

        // A caller-resolved final-answer tool completes the run outright -
        // but only when nothing (e.g. a fresh user message) follows it.
        let ends_at_assistant = conversation
            .messages()
            .last()
            .map(|m| m.role == braid_contract::Role::Assistant)
            .unwrap_or(false);
        if ends_at_assistant && resolved_ends_run(&conversation, &registry) {
            yield emitter.emit(RunEvent::run_finish(Termination::Completed, usage_total));
            return;
        }

        let mut step_index: u32 = 0;
        loop {
            if step_index >= config.max_steps {
                yield emitter.emit(RunEvent::run_error(
                    RunFailureKind::StepBudgetExceeded,
                    format!(
                        "step budget of {} exhausted before the run completed",
                        config.max_steps
                    ),
                ));
                return;
            }
            if cancellation.is_cancelled() {
                yield emitter.emit(RunEvent::run_finish(Termination::Cancelled, usage_total));
                return;
            }

            let request = build_request(&config, &conversation, &registry);
            let message_id = gen_message_id();
            conversation.begin_assistant(&message_id);
            yield emitter.emit(RunEvent::step_start(step_index, &message_id));
            tracing::debug!(run_id = %run_id, step_index, "generating");

            let mut generation = match adapter.stream_generation(request).await {
                Ok(stream) => stream,
                Err(e) => {
                    yield emitter.emit(RunEvent::run_error(
                        RunFailureKind::AdapterTransport,
                        e.to_string(),
                    ));
                    return;
                }
            };

            // Generating: forward deltas, collect completed tool calls.
            let mut calls: Vec<ToolCall> = Vec::new();
            loop {
                let next = tokio::select! {
                    _ = cancellation.cancelled() => {
                        yield emitter.emit(RunEvent::run_finish(
                            Termination::Cancelled,
                            usage_total,
                        ));
                        return;
                    }
                    event = generation.next() => event,
                };
                let Some(event) = next else { break };

                match event {
                    Ok(GenerationEvent::TextDelta { delta }) => {
                        conversation.append_text(&delta);
                        yield emitter.emit(RunEvent::text_delta(&message_id, delta));
                    }
                    Ok(GenerationEvent::ToolCallStart { invocation_id, tool_name }) => {
                        if conversation.open_invocation(&invocation_id, &tool_name) {
                            yield emitter.emit(RunEvent::tool_input_start(
                                invocation_id,
                                tool_name,
                            ));
                        } else {
                            tracing::warn!(
                                invocation_id = %invocation_id,
                                "duplicate tool call id from model; ignoring"
                            );
                        }
                    }
                    Ok(GenerationEvent::ToolCallDelta { invocation_id, input_text_delta }) => {
                        yield emitter.emit(RunEvent::tool_input_delta(
                            invocation_id,
                            input_text_delta,
                        ));
                    }
                    Ok(GenerationEvent::ToolCall { invocation_id, tool_name, input }) => {
                        if conversation.set_invocation_input(
                            &invocation_id,
                            &tool_name,
                            input.clone(),
                        ) {
                            yield emitter.emit(RunEvent::tool_input_available(
                                &invocation_id,
                                &tool_name,
                                input.clone(),
                            ));
                            calls.push(ToolCall::new(invocation_id, tool_name, input));
                        } else {
                            tracing::warn!(
                                invocation_id = %invocation_id,
                                "duplicate tool call id from model; ignoring"
                            );
                        }
                    }
                    Ok(GenerationEvent::Finish { usage, .. }) => {
                        if let Some(usage) = usage {
                            usage_total.add(&usage);
                        }
                    }
                    Err(e) => {
                        // Already-streamed output stands; the stream is not
                        // retracted.
                        yield emitter.emit(RunEvent::run_error(
                            RunFailureKind::AdapterTransport,
                            e.to_string(),
                        ));
                        return;
                    }
                }
            }

            if calls.is_empty() {
                // Pure-text step: the run is done.
                yield emitter.emit(RunEvent::step_finish(step_index));
                yield emitter.emit(RunEvent::run_finish(Termination::Completed, usage_total));
                return;
            }

            // Dispatching: fan out, merge the update streams, apply each
            // update to the conversation before forwarding it.
            let sources: Vec<UpdateStream> = calls
                .iter()
                .map(|call| dispatch(registry.lookup(&call.tool_name).ok(), call.clone()))
                .collect();
            let mut merged = merge_updates(sources);

            loop {
                let next = tokio::select! {
                    _ = cancellation.cancelled() => {
                        yield emitter.emit(RunEvent::run_finish(
                            Termination::Cancelled,
                            usage_total,
                        ));
                        return;
                    }
                    update = merged.next() => update,
                };
                let Some(update) = next else { break };

                match conversation.apply_update(&update) {
                    Ok(()) => {
                        if let Some(event) = update_event(&update, &calls) {
                            yield emitter.emit(event);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "discarding invocation update");
                    }
                }
            }

            yield emitter.emit(RunEvent::step_finish(step_index));

            let pending = conversation.pending_confirmations();
            if !pending.is_empty() {
                tracing::debug!(run_id = %run_id, pending = pending.len(), "run blocked");
                yield emitter.emit(RunEvent::run_blocked(pending));
                return;
            }

            if resolved_ends_run(&conversation, &registry) {
                yield emitter.emit(RunEvent::run_finish(Termination::Completed, usage_total));
                return;
            }

            // Every invocation settled server-side: the model sees the
            // populated outputs as new context in the next step.
            step_index += 1;
        }
    })
}
