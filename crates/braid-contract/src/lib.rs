//! Shared contracts for the braid engine: conversation model, tool contract,
//! registry, run events, and the error taxonomy.
//!
//! This crate is the leaf of the workspace; types and traits only, no
//! runtime. The engine crate builds the step loop on top of these contracts.

pub mod error;
pub mod event;
pub mod registry;
pub mod status;
pub mod thread;
pub mod tool;
pub mod usage;

// thread
pub use thread::{
    gen_invocation_id, gen_message_id, Message, MessageMetadata, Part, Role, ToolCall,
    ToolInvocationPart,
};

// status
pub use status::InvocationStatus;

// tool
pub use tool::{
    validate_against_schema, InvocationContext, OutputStream, SchemaViolation, ToolDefinition,
    ToolDescriptor, ToolExecutor,
};

// registry
pub use registry::{RegistryError, ToolRegistry};

// event
pub use event::{RunEvent, RunFailureKind, Termination};

// error
pub use error::{FailureKind, InvocationFailure, ToolError};

// usage
pub use usage::Usage;
