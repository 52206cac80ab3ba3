//! Article-writer workflow: outline -> confirm -> draft -> confirm -> final.
//!
//! Server tools stream partial results while caller-executed confirmation
//! tools pause the run at a `run-blocked` boundary; this driver plays the
//! remote caller, echoing the history back with results to resume. The
//! scripted adapter stands in for a real model provider.
//!
//! Run with: cargo run -p braid-engine --example writer

use async_trait::async_trait;
use braid_engine::contract::{
    Message, Part, RunEvent, ToolDefinition, ToolInvocationPart, ToolRegistry,
};
use braid_engine::{
    AdapterError, Engine, EngineConfig, GenerationEvent, GenerationRequest, GenerationStream,
    ModelAdapter,
};
use futures::StreamExt;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replays a scripted conversation plan, one turn per generation.
struct ScriptedModel {
    turns: Mutex<VecDeque<Vec<GenerationEvent>>>,
}

#[async_trait]
impl ModelAdapter for ScriptedModel {
    async fn stream_generation(
        &self,
        _request: GenerationRequest,
    ) -> Result<GenerationStream, AdapterError> {
        let turn = self
            .turns
            .lock()
            .map_err(|e| AdapterError::Transport(e.to_string()))?
            .pop_front()
            .unwrap_or_else(|| {
                vec![
                    GenerationEvent::TextDelta {
                        delta: "All steps are done.".into(),
                    },
                    finish(),
                ]
            });
        Ok(Box::pin(futures::stream::iter(turn.into_iter().map(Ok))))
    }
}

fn finish() -> GenerationEvent {
    GenerationEvent::Finish {
        reason: Some("stop".into()),
        usage: None,
    }
}

fn call(id: &str, name: &str, input: Value) -> GenerationEvent {
    GenerationEvent::ToolCall {
        invocation_id: id.into(),
        tool_name: name.into(),
        input,
    }
}

/// Streaming executor that reveals `lines` one at a time under `key`.
fn reveal_lines(key: &'static str, lines: Vec<&'static str>) -> ToolDefinition {
    ToolDefinition::new(key, "placeholder").streaming_executor(move |_input, _ctx| {
        let lines = lines.clone();
        Box::pin(async_stream::stream! {
            let mut acc = String::new();
            for line in lines {
                tokio::time::sleep(Duration::from_millis(20)).await;
                if !acc.is_empty() {
                    acc.push('\n');
                }
                acc.push_str(line);
                yield Ok(json!({ key: acc }));
            }
        })
    })
}

fn build_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    let outline = {
        let mut def = reveal_lines(
            "outline",
            vec![
                "- Why streaming engines are hard",
                "- Merging concurrent tool output",
                "- Pausing on user confirmation",
            ],
        );
        def.name = "generate_outline".into();
        def.description = "Generate an outline for the blog.".into();
        def.with_input_schema(json!({
            "type": "object",
            "properties": {
                "title": {"type": "string", "description": "The title of the blog."},
                "tone": {"type": "string", "description": "The tone of the blog."}
            },
            "required": ["title"]
        }))
        .with_output_schema(json!({
            "type": "object",
            "properties": {"outline": {"type": "string"}},
            "required": ["outline"]
        }))
    };
    registry.register(outline).expect("register generate_outline");

    let draft = {
        let mut def = reveal_lines(
            "draft",
            vec![
                "Streaming engines are hard because output arrives from many",
                "places at once. This draft grew line by line, merged into one",
                "ordered stream while the confirmation gate held further steps.",
            ],
        );
        def.name = "generate_draft".into();
        def.description = "Generate a draft for the blog.".into();
        def.with_input_schema(json!({
            "type": "object",
            "properties": {
                "outline": {"type": "string"},
                "title": {"type": "string"},
                "tone": {"type": "string"}
            },
            "required": ["outline", "title"]
        }))
        .with_output_schema(json!({
            "type": "object",
            "properties": {"draft": {"type": "string", "maxLength": 400}},
            "required": ["draft"]
        }))
    };
    registry.register(draft).expect("register generate_draft");

    registry
        .register(ToolDefinition::new(
            "ask_for_confirmation",
            "Ask the user for confirmation after calling a tool.",
        ))
        .expect("register ask_for_confirmation");

    registry
        .register(
            ToolDefinition::new("show_final_answer", "Show the final answer to the user.")
                .with_input_schema(json!({
                    "type": "object",
                    "properties": {"message": {"type": "string"}},
                    "required": ["message"]
                }))
                .with_ends_run(true)
                .executor_fn(|input, _ctx| async move { Ok(input) }),
        )
        .expect("register show_final_answer");

    registry
}

fn scripted_turns() -> Vec<Vec<GenerationEvent>> {
    vec![
        vec![
            GenerationEvent::TextDelta {
                delta: "Starting with an outline. ".into(),
            },
            call(
                "call_outline",
                "generate_outline",
                json!({"title": "Streaming engines", "tone": "casual"}),
            ),
            finish(),
        ],
        vec![
            call("call_confirm_outline", "ask_for_confirmation", json!({})),
            finish(),
        ],
        vec![
            GenerationEvent::TextDelta {
                delta: "Outline approved, drafting. ".into(),
            },
            call(
                "call_draft",
                "generate_draft",
                json!({
                    "title": "Streaming engines",
                    "tone": "casual",
                    "outline": "- Why streaming engines are hard"
                }),
            ),
            finish(),
        ],
        vec![
            call("call_confirm_draft", "ask_for_confirmation", json!({})),
            finish(),
        ],
        vec![
            call(
                "call_final",
                "show_final_answer",
                json!({"message": "Here is your finished article."}),
            ),
            finish(),
        ],
    ]
}

/// Rebuild the caller-side history from the streamed events, the way a UI
/// client applies part updates.
fn apply_events(history: &mut Vec<Message>, events: &[RunEvent]) {
    for event in events {
        match event {
            RunEvent::StepStart { message_id, .. } => {
                history.push(Message::assistant_empty(message_id.clone()));
            }
            RunEvent::TextDelta { delta, .. } => {
                if let Some(last) = history.last_mut() {
                    if let Some(Part::Text { content }) = last.parts.last_mut() {
                        content.push_str(delta);
                    } else {
                        last.parts.push(Part::text(delta.clone()));
                    }
                }
            }
            RunEvent::ToolInputAvailable {
                invocation_id,
                tool_name,
                input,
            } => {
                if let Some(last) = history.last_mut() {
                    last.parts.push(Part::invocation(ToolInvocationPart::with_input(
                        invocation_id.clone(),
                        tool_name.clone(),
                        input.clone(),
                    )));
                }
            }
            RunEvent::ToolAwaitingConfirmation { invocation_id, .. }
            | RunEvent::ToolExecuting { invocation_id }
            | RunEvent::ToolPartial { invocation_id, .. } => {
                update_part(history, invocation_id, event);
            }
            RunEvent::ToolOutputAvailable { invocation_id, .. }
            | RunEvent::ToolOutputError { invocation_id, .. } => {
                update_part(history, invocation_id, event);
            }
            _ => {}
        }
    }
}

fn update_part(history: &mut [Message], invocation_id: &str, event: &RunEvent) {
    use braid_engine::contract::InvocationStatus;
    for message in history.iter_mut().rev() {
        for part in message.parts.iter_mut() {
            let Part::ToolInvocation(inv) = part else {
                continue;
            };
            if inv.invocation_id != invocation_id {
                continue;
            }
            match event {
                RunEvent::ToolAwaitingConfirmation { .. } => {
                    inv.status = InvocationStatus::AwaitingConfirmation;
                }
                RunEvent::ToolExecuting { .. } => inv.status = InvocationStatus::Executing,
                RunEvent::ToolPartial { partial, .. } => {
                    inv.output = Some(partial.clone());
                }
                RunEvent::ToolOutputAvailable { output, .. } => {
                    inv.status = InvocationStatus::OutputAvailable;
                    inv.output = Some(output.clone());
                }
                RunEvent::ToolOutputError { failure, .. } => {
                    inv.status = InvocationStatus::OutputError;
                    inv.error = Some(failure.clone());
                }
                _ => {}
            }
            return;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let adapter = Arc::new(ScriptedModel {
        turns: Mutex::new(scripted_turns().into()),
    });
    let engine = Engine::new(
        adapter,
        build_registry(),
        EngineConfig::new()
            .with_max_steps(10)
            .with_system_prompt("You are a helpful writer.")
            .with_smooth_deltas(true),
    );

    let mut history = vec![Message::user("Write a blog post about streaming engines.")];

    // Keep resubmitting until the run no longer blocks, approving every
    // confirmation request like a patient user would.
    loop {
        let events: Vec<RunEvent> = engine.run(history.clone()).collect().await;
        for event in &events {
            println!("{}", serde_json::to_string(event).expect("serializable event"));
        }

        apply_events(&mut history, &events);

        match events.last() {
            Some(RunEvent::RunBlocked { pending }) => {
                let results = pending
                    .iter()
                    .map(|id| {
                        Part::invocation(ToolInvocationPart::resolved(
                            id.clone(),
                            "ask_for_confirmation",
                            json!({"approved": true}),
                        ))
                    })
                    .collect();
                history.push(Message::tool_results(results));
                println!("--- caller approved {} pending invocation(s), resubmitting ---", pending.len());
            }
            _ => break,
        }
    }
}
