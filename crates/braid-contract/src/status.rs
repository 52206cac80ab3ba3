use serde::{Deserialize, Serialize};

/// Lifecycle status of a tool invocation.
///
/// Transitions are monotonic and forward-only; a terminal status is never
/// left. Server-executed tools reach their output states through
/// `Executing`; caller-executed tools park at `AwaitingConfirmation` until
/// an external submission resolves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvocationStatus {
    /// The model is still streaming the invocation's input.
    InputStreaming,
    /// The input is complete but execution has not started.
    InputAvailable,
    /// A server-side executor is running (possibly yielding partials).
    Executing,
    /// Waiting for the caller to supply the result in a later submission.
    AwaitingConfirmation,
    /// The final output is available.
    OutputAvailable,
    /// The invocation failed; the part carries a structured failure.
    OutputError,
}

impl InvocationStatus {
    /// Canonical invocation lifecycle, used by the engine's transition tests.
    pub const ASCII_STATE_MACHINE: &str = r#"input-streaming ---> input-available ---> executing ----------+
                         |                   |              |
                         |                   v              v
                         |              (partials)   output-available
                         |
                         +---> awaiting-confirmation ---> output-available
                         |                   |
                         v                   v
                    output-error        output-error"#;

    /// Whether this status is terminal (no further transition is expected).
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InvocationStatus::OutputAvailable | InvocationStatus::OutputError
        )
    }

    /// Validate a lifecycle transition from `self` to `next`.
    ///
    /// Self-transitions are allowed for non-terminal states so that repeated
    /// `Executing` updates (one per partial output) pass through.
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return !self.is_terminal();
        }

        match self {
            InvocationStatus::InputStreaming => {
                matches!(next, InvocationStatus::InputAvailable)
            }
            InvocationStatus::InputAvailable => matches!(
                next,
                InvocationStatus::Executing
                    | InvocationStatus::AwaitingConfirmation
                    | InvocationStatus::OutputError
            ),
            InvocationStatus::Executing => matches!(
                next,
                InvocationStatus::OutputAvailable | InvocationStatus::OutputError
            ),
            InvocationStatus::AwaitingConfirmation => matches!(
                next,
                InvocationStatus::OutputAvailable | InvocationStatus::OutputError
            ),
            InvocationStatus::OutputAvailable | InvocationStatus::OutputError => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_follow_lifecycle() {
        use InvocationStatus::*;
        assert!(InputStreaming.can_transition_to(InputAvailable));
        assert!(InputAvailable.can_transition_to(Executing));
        assert!(InputAvailable.can_transition_to(AwaitingConfirmation));
        assert!(InputAvailable.can_transition_to(OutputError));
        assert!(Executing.can_transition_to(Executing));
        assert!(Executing.can_transition_to(OutputAvailable));
        assert!(Executing.can_transition_to(OutputError));
        assert!(AwaitingConfirmation.can_transition_to(OutputAvailable));
        assert!(AwaitingConfirmation.can_transition_to(OutputError));
    }

    #[test]
    fn statuses_never_regress() {
        use InvocationStatus::*;
        assert!(!InputAvailable.can_transition_to(InputStreaming));
        assert!(!Executing.can_transition_to(InputAvailable));
        assert!(!AwaitingConfirmation.can_transition_to(Executing));
        assert!(!OutputAvailable.can_transition_to(Executing));
        assert!(!OutputError.can_transition_to(OutputAvailable));
        assert!(!OutputAvailable.can_transition_to(OutputAvailable));
    }

    #[test]
    fn caller_executed_path_skips_executing() {
        use InvocationStatus::*;
        // A caller-executed tool never passes through Executing.
        assert!(!AwaitingConfirmation.can_transition_to(Executing));
        assert!(AwaitingConfirmation.can_transition_to(OutputAvailable));
    }

    #[test]
    fn serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&InvocationStatus::InputStreaming).unwrap(),
            "\"input-streaming\""
        );
        assert_eq!(
            serde_json::to_string(&InvocationStatus::AwaitingConfirmation).unwrap(),
            "\"awaiting-confirmation\""
        );
        assert_eq!(
            serde_json::from_str::<InvocationStatus>("\"output-error\"").unwrap(),
            InvocationStatus::OutputError
        );
    }

    #[test]
    fn ascii_state_machine_mentions_every_state() {
        let diagram = InvocationStatus::ASCII_STATE_MACHINE;
        for state in [
            "input-streaming",
            "input-available",
            "executing",
            "awaiting-confirmation",
            "output-available",
            "output-error",
        ] {
            assert!(diagram.contains(state), "missing {state}");
        }
    }
}
