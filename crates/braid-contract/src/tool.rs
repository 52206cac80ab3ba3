//! Tool contract: definitions, executors, and schema validation.

use crate::error::ToolError;
use futures::stream::BoxStream;
use futures::StreamExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Stream of progressively refined executor outputs.
///
/// Every yielded value supersedes the previous one; the final yielded value
/// is the tool's output. An `Err` item terminates the invocation with an
/// execution failure.
pub type OutputStream = BoxStream<'static, Result<Value, ToolError>>;

/// Execution context handed to a tool executor.
///
/// `invocation_id` doubles as the idempotency key for side effects.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    pub invocation_id: String,
    pub tool_name: String,
}

impl InvocationContext {
    pub fn new(invocation_id: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            invocation_id: invocation_id.into(),
            tool_name: tool_name.into(),
        }
    }
}

/// Server-side tool executor.
///
/// Implementations return a stream so that long-running tools can surface
/// intermediate results; one-shot tools yield a single value. Use
/// [`ToolDefinition::executor_fn`] or [`ToolDefinition::streaming_executor`]
/// instead of implementing this by hand.
pub trait ToolExecutor: Send + Sync {
    fn run(&self, input: Value, ctx: InvocationContext) -> OutputStream;
}

struct FnExecutor<F>(F);

impl<F, Fut> ToolExecutor for FnExecutor<F>
where
    F: Fn(Value, InvocationContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    fn run(&self, input: Value, ctx: InvocationContext) -> OutputStream {
        futures::stream::once((self.0)(input, ctx)).boxed()
    }
}

struct StreamExecutor<F>(F);

impl<F> ToolExecutor for StreamExecutor<F>
where
    F: Fn(Value, InvocationContext) -> OutputStream + Send + Sync,
{
    fn run(&self, input: Value, ctx: InvocationContext) -> OutputStream {
        (self.0)(input, ctx)
    }
}

/// Model-facing projection of a tool: name, description, and input schema.
///
/// The output schema and executor identity are never exposed to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// A registered tool: schemas plus an optional server-side executor.
///
/// No executor means the tool is caller-executed; its output can only
/// arrive from a later caller-supplied submission.
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub output_schema: Option<Value>,
    pub executor: Option<Arc<dyn ToolExecutor>>,
    /// Resolving an invocation of this tool ends the run.
    pub ends_run: bool,
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("input_schema", &self.input_schema)
            .field("output_schema", &self.output_schema)
            .field("executor", &self.executor.as_ref().map(|_| "<executor>"))
            .field("ends_run", &self.ends_run)
            .finish()
    }
}

impl ToolDefinition {
    /// Create a caller-executed tool accepting an empty object input.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
            output_schema: None,
            executor: None,
            ends_run: false,
        }
    }

    /// Set the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }

    /// Derive the input schema from a typed argument struct.
    #[must_use]
    pub fn with_typed_input<T: JsonSchema>(mut self) -> Self {
        self.input_schema = schema_of::<T>();
        self
    }

    /// Set the output schema the executor's final value must satisfy.
    #[must_use]
    pub fn with_output_schema(mut self, schema: Value) -> Self {
        self.output_schema = Some(schema);
        self
    }

    /// Derive the output schema from a typed result struct.
    #[must_use]
    pub fn with_typed_output<T: JsonSchema>(mut self) -> Self {
        self.output_schema = Some(schema_of::<T>());
        self
    }

    /// Mark this tool as a final-answer tool: once an invocation of it
    /// resolves, the run is done.
    #[must_use]
    pub fn with_ends_run(mut self, ends_run: bool) -> Self {
        self.ends_run = ends_run;
        self
    }

    /// Attach a server-side executor.
    #[must_use]
    pub fn with_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Attach a one-shot async closure as the executor.
    #[must_use]
    pub fn executor_fn<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Value, InvocationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        self.with_executor(Arc::new(FnExecutor(f)))
    }

    /// Attach a streaming executor built from a closure returning an
    /// [`OutputStream`] (e.g. an `async_stream` generator).
    #[must_use]
    pub fn streaming_executor<F>(self, f: F) -> Self
    where
        F: Fn(Value, InvocationContext) -> OutputStream + Send + Sync + 'static,
    {
        self.with_executor(Arc::new(StreamExecutor(f)))
    }

    /// Whether this tool's output can only be supplied by the caller.
    pub fn is_caller_executed(&self) -> bool {
        self.executor.is_none()
    }

    /// The model-facing projection of this tool.
    pub fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name.clone(),
            description: self.description.clone(),
            input_schema: self.input_schema.clone(),
        }
    }
}

/// Generate a JSON Schema `Value` from a type implementing `JsonSchema`.
///
/// Strips the `$schema` key; model providers don't need it.
pub fn schema_of<T: JsonSchema>() -> Value {
    let mut v = serde_json::to_value(schemars::schema_for!(T))
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}));
    if let Some(obj) = v.as_object_mut() {
        obj.remove("$schema");
    }
    v
}

/// A single schema violation: where, and why.
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaViolation {
    /// JSON pointer to the violating field ("" for the instance root).
    pub path: String,
    pub reason: String,
}

/// Validate a JSON value against a JSON Schema.
///
/// Returns the first violation with its field path; remaining violations
/// (up to two more) are appended to the reason.
pub fn validate_against_schema(schema: &Value, instance: &Value) -> Result<(), SchemaViolation> {
    let validator = jsonschema::Validator::new(schema).map_err(|e| SchemaViolation {
        path: String::new(),
        reason: format!("invalid tool schema: {e}"),
    })?;

    let mut errors = validator.iter_errors(instance);
    let Some(first) = errors.next() else {
        return Ok(());
    };

    let path = first.instance_path.to_string();
    let mut reason = first.to_string();
    for extra in errors.take(2) {
        reason.push_str("; ");
        reason.push_str(&extra.to_string());
    }
    Err(SchemaViolation { path, reason })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validate_accepts_conforming_value() {
        let schema = json!({
            "type": "object",
            "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
            "required": ["a", "b"]
        });
        assert!(validate_against_schema(&schema, &json!({"a": 2, "b": 3})).is_ok());
    }

    #[test]
    fn validate_points_at_offending_field() {
        let schema = json!({
            "type": "object",
            "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
            "required": ["a", "b"]
        });
        let violation = validate_against_schema(&schema, &json!({"a": 2, "b": "x"})).unwrap_err();
        assert_eq!(violation.path, "/b");
        assert!(violation.reason.contains("integer"), "{}", violation.reason);
    }

    #[test]
    fn validate_reports_missing_required_fields() {
        let schema = json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"]
        });
        let violation = validate_against_schema(&schema, &json!({})).unwrap_err();
        assert!(violation.reason.contains("name"), "{}", violation.reason);
    }

    #[test]
    fn validate_rejects_broken_schema() {
        let violation = validate_against_schema(&json!({"type": 123}), &json!({})).unwrap_err();
        assert!(violation.reason.contains("invalid tool schema"));
    }

    #[test]
    fn definition_defaults_to_caller_executed() {
        let def = ToolDefinition::new("confirm", "Ask the user to confirm");
        assert!(def.is_caller_executed());
        assert!(def.output_schema.is_none());
        assert!(!def.ends_run);
        assert_eq!(
            def.input_schema,
            json!({"type": "object", "properties": {}})
        );
    }

    #[test]
    fn descriptor_hides_output_schema_and_executor() {
        let def = ToolDefinition::new("sum", "Add two integers")
            .with_input_schema(json!({"type": "object"}))
            .with_output_schema(json!({"type": "object"}))
            .executor_fn(|input, _ctx| async move { Ok(input) });
        let descriptor = def.descriptor();
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(json["name"], "sum");
        assert_eq!(json["inputSchema"], json!({"type": "object"}));
        assert!(json.get("outputSchema").is_none());
        assert!(json.get("executor").is_none());
    }

    #[tokio::test]
    async fn executor_fn_yields_single_value() {
        let def = ToolDefinition::new("echo", "Echo the input")
            .executor_fn(|input, _ctx| async move { Ok(input) });
        let executor = def.executor.as_ref().unwrap();
        let ctx = InvocationContext::new("inv_1", "echo");
        let out: Vec<_> = executor.run(json!({"x": 1}), ctx).collect().await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap(), &json!({"x": 1}));
    }

    #[tokio::test]
    async fn streaming_executor_preserves_yield_order() {
        let def = ToolDefinition::new("count", "Count up").streaming_executor(|_input, _ctx| {
            futures::stream::iter(vec![Ok(json!(1)), Ok(json!(2)), Ok(json!(3))]).boxed()
        });
        let executor = def.executor.as_ref().unwrap();
        let ctx = InvocationContext::new("inv_1", "count");
        let out: Vec<_> = executor
            .run(json!({}), ctx)
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(out, vec![json!(1), json!(2), json!(3)]);
    }

    #[derive(Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct SumArgs {
        a: i64,
        b: i64,
    }

    #[test]
    fn typed_input_derives_schema() {
        let def = ToolDefinition::new("sum", "Add two integers").with_typed_input::<SumArgs>();
        let props = def.input_schema.get("properties").unwrap();
        assert!(props.get("a").is_some());
        assert!(props.get("b").is_some());
        assert!(def.input_schema.get("$schema").is_none());

        // The derived schema actually validates.
        assert!(validate_against_schema(&def.input_schema, &json!({"a": 1, "b": 2})).is_ok());
        assert!(validate_against_schema(&def.input_schema, &json!({"a": 1, "b": "x"})).is_err());
    }
}
