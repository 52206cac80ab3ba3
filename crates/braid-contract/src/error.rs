use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Per-invocation tool errors.
///
/// These never terminate a run; the dispatcher maps them onto the failing
/// invocation's part as an `output-error` update.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("invalid input at {path}: {reason}")]
    InvalidInput { path: String, reason: String },

    #[error("invalid output at {path}: {reason}")]
    InvalidOutput { path: String, reason: String },

    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

/// Classification of an invocation failure, carried on `output-error` parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// Input rejected by the tool's input schema.
    InvalidInput,
    /// Executor's final output rejected by the tool's output schema.
    InvalidOutput,
    /// The model named a tool that is not in the registry.
    UnknownTool,
    /// The executor itself failed (or the caller rejected the invocation).
    ExecutionFailed,
}

/// Structured failure payload attached to an `output-error` invocation part.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationFailure {
    pub kind: FailureKind,
    /// JSON pointer to the offending field, for schema violations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub reason: String,
}

impl InvocationFailure {
    pub fn new(kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            path: None,
            reason: reason.into(),
        }
    }

    /// Attach the JSON pointer of the violating field.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(FailureKind::UnknownTool, format!("unknown tool: {name}"))
    }
}

impl From<ToolError> for InvocationFailure {
    fn from(err: ToolError) -> Self {
        match err {
            ToolError::InvalidInput { path, reason } => Self {
                kind: FailureKind::InvalidInput,
                path: Some(path),
                reason,
            },
            ToolError::InvalidOutput { path, reason } => Self {
                kind: FailureKind::InvalidOutput,
                path: Some(path),
                reason,
            },
            ToolError::ExecutionFailed(reason) => Self {
                kind: FailureKind::ExecutionFailed,
                path: None,
                reason,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_error_display() {
        let err = ToolError::InvalidInput {
            path: "/b".into(),
            reason: "expected integer".into(),
        };
        assert_eq!(err.to_string(), "invalid input at /b: expected integer");

        let err = ToolError::ExecutionFailed("timeout".into());
        assert_eq!(err.to_string(), "execution failed: timeout");
    }

    #[test]
    fn failure_from_tool_error_keeps_path() {
        let failure: InvocationFailure = ToolError::InvalidOutput {
            path: "/draft".into(),
            reason: "too long".into(),
        }
        .into();
        assert_eq!(failure.kind, FailureKind::InvalidOutput);
        assert_eq!(failure.path.as_deref(), Some("/draft"));
    }

    #[test]
    fn failure_kind_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&FailureKind::UnknownTool).unwrap(),
            "\"unknown-tool\""
        );
        assert_eq!(
            serde_json::to_string(&FailureKind::ExecutionFailed).unwrap(),
            "\"execution-failed\""
        );
    }

    #[test]
    fn failure_serde_roundtrip() {
        let failure = InvocationFailure::new(FailureKind::InvalidInput, "bad").with_path("/a");
        let json = serde_json::to_value(&failure).unwrap();
        assert_eq!(json["kind"], "invalid-input");
        assert_eq!(json["path"], "/a");
        let back: InvocationFailure = serde_json::from_value(json).unwrap();
        assert_eq!(back, failure);
    }

    #[test]
    fn failure_omits_absent_path() {
        let failure = InvocationFailure::unknown_tool("sum");
        let json = serde_json::to_value(&failure).unwrap();
        assert!(json.get("path").is_none());
        assert!(failure.reason.contains("sum"));
    }
}
