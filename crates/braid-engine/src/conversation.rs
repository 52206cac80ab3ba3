//! Conversation state: the ordered message history and in-flight invocations.
//!
//! Owned exclusively by the run loop (single-writer discipline); readers get
//! consistent snapshots via [`ConversationState::snapshot`]. All mutation is
//! append-only at the part level except [`ConversationState::apply_update`],
//! which updates a tool invocation part in place by its `invocation_id` and
//! rejects any non-monotonic status transition.

use crate::dispatch::InvocationUpdate;
use braid_contract::{InvocationStatus, Message, Part, Role, ToolInvocationPart};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("unknown invocation: {0}")]
    UnknownInvocation(String),

    #[error("invalid status transition for {invocation_id}: {from:?} -> {to:?}")]
    InvalidTransition {
        invocation_id: String,
        from: InvocationStatus,
        to: InvocationStatus,
    },
}

#[derive(Debug, Default, Clone)]
pub struct ConversationState {
    messages: Vec<Message>,
}

impl ConversationState {
    /// Build the authoritative starting state from a caller submission.
    ///
    /// The caller echoes the full history; caller-supplied results arrive
    /// either as already-updated assistant invocation parts, or as
    /// tool-invocation parts on a trailing user message referencing pending
    /// `invocation_id`s. The latter are folded into the pending parts here,
    /// so resumption is a pure function of (snapshot, submission).
    pub fn from_submission(messages: Vec<Message>) -> Self {
        let mut state = Self {
            messages: Vec::with_capacity(messages.len()),
        };

        for mut message in messages {
            if message.role == Role::User {
                let mut kept = Vec::with_capacity(message.parts.len());
                for part in message.parts {
                    match part {
                        Part::ToolInvocation(result) if result.is_terminal() => {
                            if !state.fold_caller_result(result) {
                                tracing::warn!(
                                    "discarding caller result for unknown or settled invocation"
                                );
                            }
                        }
                        other => kept.push(other),
                    }
                }
                if kept.is_empty() {
                    continue;
                }
                message.parts = kept;
            }
            state.messages.push(message);
        }

        state
    }

    /// Fold one caller-supplied result into the matching pending invocation.
    fn fold_caller_result(&mut self, result: ToolInvocationPart) -> bool {
        for message in self.messages.iter_mut().rev() {
            if message.role != Role::Assistant {
                continue;
            }
            for part in message.parts.iter_mut() {
                let Part::ToolInvocation(inv) = part else {
                    continue;
                };
                if inv.invocation_id != result.invocation_id || inv.is_terminal() {
                    continue;
                }
                if !inv.status.can_transition_to(result.status) {
                    return false;
                }
                inv.status = result.status;
                inv.output = result.output;
                inv.error = result.error;
                return true;
            }
        }
        false
    }

    /// Append a user message.
    pub fn push_user(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Open the assistant message the current step streams into.
    pub fn begin_assistant(&mut self, message_id: impl Into<String>) {
        self.messages.push(Message::assistant_empty(message_id));
    }

    fn last_assistant_mut(&mut self) -> Option<&mut Message> {
        self.messages
            .iter_mut()
            .rev()
            .find(|m| m.role == Role::Assistant)
    }

    /// The latest assistant message, if any.
    pub fn last_assistant(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|m| m.role == Role::Assistant)
    }

    /// Append streamed text to the last assistant message, extending its
    /// trailing text part when there is one.
    pub fn append_text(&mut self, delta: &str) {
        let Some(message) = self.last_assistant_mut() else {
            return;
        };
        if let Some(Part::Text { content }) = message.parts.last_mut() {
            content.push_str(delta);
        } else {
            message.parts.push(Part::text(delta));
        }
    }

    /// Whether any message already carries this invocation id.
    pub fn contains_invocation(&self, invocation_id: &str) -> bool {
        self.messages
            .iter()
            .flat_map(|m| m.invocations())
            .any(|inv| inv.invocation_id == invocation_id)
    }

    /// Open an invocation part in `input-streaming` state on the last
    /// assistant message. Returns false (and does nothing) for a duplicate
    /// invocation id; first occurrence wins.
    pub fn open_invocation(&mut self, invocation_id: &str, tool_name: &str) -> bool {
        if self.contains_invocation(invocation_id) {
            return false;
        }
        if let Some(message) = self.last_assistant_mut() {
            message.parts.push(Part::invocation(
                ToolInvocationPart::streaming(invocation_id, tool_name),
            ));
            true
        } else {
            false
        }
    }

    /// Record a complete tool-call input, upserting the invocation part.
    /// Returns false for a duplicate completed invocation id.
    pub fn set_invocation_input(
        &mut self,
        invocation_id: &str,
        tool_name: &str,
        input: serde_json::Value,
    ) -> bool {
        // Already streaming in this step: complete it in place.
        if let Some(message) = self.last_assistant_mut() {
            for part in message.parts.iter_mut() {
                if let Part::ToolInvocation(inv) = part {
                    if inv.invocation_id == invocation_id {
                        if inv.status != InvocationStatus::InputStreaming {
                            return false;
                        }
                        inv.input = input;
                        inv.status = InvocationStatus::InputAvailable;
                        return true;
                    }
                }
            }
        }
        if self.contains_invocation(invocation_id) {
            return false;
        }
        if let Some(message) = self.last_assistant_mut() {
            message.parts.push(Part::invocation(
                ToolInvocationPart::with_input(invocation_id, tool_name, input),
            ));
            true
        } else {
            false
        }
    }

    /// Apply a dispatcher update to the invocation it addresses.
    ///
    /// The one in-place mutation of the model: status, output, and error of
    /// the part move together, so a snapshot taken before or after this call
    /// never observes a half-updated invocation.
    pub fn apply_update(&mut self, update: &InvocationUpdate) -> Result<(), ConversationError> {
        let invocation_id = update.invocation_id.clone();
        for message in self.messages.iter_mut().rev() {
            for part in message.parts.iter_mut() {
                let Part::ToolInvocation(inv) = part else {
                    continue;
                };
                if inv.invocation_id != invocation_id {
                    continue;
                }
                if !inv.status.can_transition_to(update.status) {
                    return Err(ConversationError::InvalidTransition {
                        invocation_id,
                        from: inv.status,
                        to: update.status,
                    });
                }
                inv.status = update.status;
                if let Some(payload) = &update.payload {
                    inv.output = Some(payload.clone());
                }
                if let Some(failure) = &update.failure {
                    inv.error = Some(failure.clone());
                }
                return Ok(());
            }
        }
        Err(ConversationError::UnknownInvocation(invocation_id))
    }

    /// Consistent snapshot of the history.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Invocation ids in the latest assistant message still awaiting a
    /// caller-supplied result; the confirmation gate's query.
    pub fn pending_confirmations(&self) -> Vec<String> {
        self.last_assistant()
            .map(|message| {
                message
                    .invocations()
                    .filter(|inv| inv.is_awaiting_confirmation())
                    .map(|inv| inv.invocation_id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Tool names of invocations in the latest assistant message that
    /// reached `output-available`.
    pub fn resolved_tool_names(&self) -> Vec<String> {
        self.last_assistant()
            .map(|message| {
                message
                    .invocations()
                    .filter(|inv| inv.status == InvocationStatus::OutputAvailable)
                    .map(|inv| inv.tool_name.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_contract::{FailureKind, InvocationFailure};
    use serde_json::json;

    fn update(
        invocation_id: &str,
        status: InvocationStatus,
        payload: Option<serde_json::Value>,
    ) -> InvocationUpdate {
        InvocationUpdate {
            invocation_id: invocation_id.to_string(),
            status,
            payload,
            failure: None,
        }
    }

    #[test]
    fn append_text_extends_trailing_text_part() {
        let mut state = ConversationState::default();
        state.push_user(Message::user("hi"));
        state.begin_assistant("m1");
        state.append_text("Hel");
        state.append_text("lo");
        let assistant = state.last_assistant().unwrap();
        assert_eq!(assistant.parts.len(), 1);
        assert_eq!(assistant.text(), "Hello");
    }

    #[test]
    fn text_after_invocation_opens_new_part() {
        let mut state = ConversationState::default();
        state.begin_assistant("m1");
        state.append_text("before ");
        assert!(state.open_invocation("inv_1", "sum"));
        state.append_text("after");
        let assistant = state.last_assistant().unwrap();
        assert_eq!(assistant.parts.len(), 3);
        assert_eq!(assistant.text(), "before after");
    }

    #[test]
    fn duplicate_invocation_ids_are_ignored() {
        let mut state = ConversationState::default();
        state.begin_assistant("m1");
        assert!(state.open_invocation("inv_1", "sum"));
        assert!(!state.open_invocation("inv_1", "sum"));
        assert!(state.set_invocation_input("inv_1", "sum", json!({"a": 1})));
        // A second step must not resurrect the same id.
        state.begin_assistant("m2");
        assert!(!state.open_invocation("inv_1", "sum"));
        assert!(!state.set_invocation_input("inv_1", "sum", json!({})));
    }

    #[test]
    fn set_input_without_start_upserts_part() {
        let mut state = ConversationState::default();
        state.begin_assistant("m1");
        assert!(state.set_invocation_input("inv_1", "sum", json!({"a": 1, "b": 2})));
        let inv = state
            .last_assistant()
            .unwrap()
            .invocations()
            .next()
            .unwrap();
        assert_eq!(inv.status, InvocationStatus::InputAvailable);
        assert_eq!(inv.input, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn apply_update_moves_status_and_payload_together() {
        let mut state = ConversationState::default();
        state.begin_assistant("m1");
        state.set_invocation_input("inv_1", "outline", json!({"title": "t"}));

        state
            .apply_update(&update("inv_1", InvocationStatus::Executing, None))
            .unwrap();
        state
            .apply_update(&update(
                "inv_1",
                InvocationStatus::Executing,
                Some(json!({"outline": "- a"})),
            ))
            .unwrap();
        state
            .apply_update(&update(
                "inv_1",
                InvocationStatus::OutputAvailable,
                Some(json!({"outline": "- a\n- b"})),
            ))
            .unwrap();

        let inv = state
            .last_assistant()
            .unwrap()
            .invocations()
            .next()
            .unwrap();
        assert_eq!(inv.status, InvocationStatus::OutputAvailable);
        assert_eq!(inv.output, Some(json!({"outline": "- a\n- b"})));
    }

    #[test]
    fn apply_update_rejects_regression() {
        let mut state = ConversationState::default();
        state.begin_assistant("m1");
        state.set_invocation_input("inv_1", "sum", json!({}));
        state
            .apply_update(&update(
                "inv_1",
                InvocationStatus::OutputError,
                None,
            ))
            .unwrap();

        let err = state
            .apply_update(&update("inv_1", InvocationStatus::Executing, None))
            .unwrap_err();
        assert!(matches!(err, ConversationError::InvalidTransition { .. }));
    }

    #[test]
    fn apply_update_unknown_invocation() {
        let mut state = ConversationState::default();
        state.begin_assistant("m1");
        let err = state
            .apply_update(&update("ghost", InvocationStatus::Executing, None))
            .unwrap_err();
        assert!(matches!(err, ConversationError::UnknownInvocation(id) if id == "ghost"));
    }

    #[test]
    fn pending_confirmations_lists_awaiting_parts() {
        let mut state = ConversationState::default();
        state.begin_assistant("m1");
        state.set_invocation_input("inv_1", "confirm", json!({}));
        state.set_invocation_input("inv_2", "sum", json!({}));
        state
            .apply_update(&update(
                "inv_1",
                InvocationStatus::AwaitingConfirmation,
                None,
            ))
            .unwrap();
        state
            .apply_update(&update("inv_2", InvocationStatus::Executing, None))
            .unwrap();
        state
            .apply_update(&update(
                "inv_2",
                InvocationStatus::OutputAvailable,
                Some(json!({})),
            ))
            .unwrap();

        assert_eq!(state.pending_confirmations(), vec!["inv_1".to_string()]);
        assert_eq!(state.resolved_tool_names(), vec!["sum".to_string()]);
    }

    #[test]
    fn submission_folds_caller_results_into_pending_parts() {
        // A blocked conversation: assistant awaiting confirmation on inv_1.
        let mut blocked = ConversationState::default();
        blocked.push_user(Message::user("write"));
        blocked.begin_assistant("m1");
        blocked.set_invocation_input("inv_1", "confirm", json!({}));
        blocked
            .apply_update(&update(
                "inv_1",
                InvocationStatus::AwaitingConfirmation,
                None,
            ))
            .unwrap();

        // Caller echoes the history plus a result-bearing user message.
        let mut submission = blocked.snapshot();
        submission.push(Message::tool_results(vec![Part::invocation(
            ToolInvocationPart::resolved("inv_1", "confirm", json!({"approved": true})),
        )]));

        let resumed = ConversationState::from_submission(submission);
        assert!(resumed.pending_confirmations().is_empty());
        let inv = resumed
            .last_assistant()
            .unwrap()
            .invocations()
            .next()
            .unwrap();
        assert_eq!(inv.status, InvocationStatus::OutputAvailable);
        assert_eq!(inv.output, Some(json!({"approved": true})));
        // The result-only user message is not kept as a separate message.
        assert_eq!(resumed.messages().len(), 2);
    }

    #[test]
    fn submission_with_partial_results_stays_pending() {
        let mut blocked = ConversationState::default();
        blocked.begin_assistant("m1");
        blocked.set_invocation_input("inv_1", "confirm", json!({}));
        blocked.set_invocation_input("inv_2", "confirm", json!({}));
        for id in ["inv_1", "inv_2"] {
            blocked
                .apply_update(&update(id, InvocationStatus::AwaitingConfirmation, None))
                .unwrap();
        }

        let mut submission = blocked.snapshot();
        submission.push(Message::tool_results(vec![Part::invocation(
            ToolInvocationPart::resolved("inv_1", "confirm", json!(true)),
        )]));

        let resumed = ConversationState::from_submission(submission);
        assert_eq!(resumed.pending_confirmations(), vec!["inv_2".to_string()]);
    }

    #[test]
    fn submission_folds_rejections_as_errors() {
        let mut blocked = ConversationState::default();
        blocked.begin_assistant("m1");
        blocked.set_invocation_input("inv_1", "confirm", json!({}));
        blocked
            .apply_update(&update(
                "inv_1",
                InvocationStatus::AwaitingConfirmation,
                None,
            ))
            .unwrap();

        let mut submission = blocked.snapshot();
        submission.push(Message::tool_results(vec![Part::invocation(
            ToolInvocationPart::rejected(
                "inv_1",
                "confirm",
                InvocationFailure::new(FailureKind::ExecutionFailed, "user declined"),
            ),
        )]));

        let resumed = ConversationState::from_submission(submission);
        assert!(resumed.pending_confirmations().is_empty());
        let inv = resumed
            .last_assistant()
            .unwrap()
            .invocations()
            .next()
            .unwrap();
        assert_eq!(inv.status, InvocationStatus::OutputError);
        assert_eq!(inv.error.as_ref().unwrap().reason, "user declined");
    }

    #[test]
    fn submission_keeps_mixed_user_message_text() {
        let mut blocked = ConversationState::default();
        blocked.begin_assistant("m1");
        blocked.set_invocation_input("inv_1", "confirm", json!({}));
        blocked
            .apply_update(&update(
                "inv_1",
                InvocationStatus::AwaitingConfirmation,
                None,
            ))
            .unwrap();

        let mut submission = blocked.snapshot();
        let mut message = Message::user("looks good, continue");
        message.parts.push(Part::invocation(ToolInvocationPart::resolved(
            "inv_1",
            "confirm",
            json!(true),
        )));
        submission.push(message);

        let resumed = ConversationState::from_submission(submission);
        assert!(resumed.pending_confirmations().is_empty());
        let last = resumed.messages().last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.text(), "looks good, continue");
    }
}
