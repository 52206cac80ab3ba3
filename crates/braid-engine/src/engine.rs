//! Engine façade: adapter + registry + config, one `run` per submission.

use crate::adapter::ModelAdapter;
use crate::config::EngineConfig;
use crate::scheduler::{run_stream, RunStream};
use crate::smooth::smooth_text_deltas;
use braid_contract::{Message, ToolRegistry};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// The step-orchestration engine.
///
/// Stateless across runs: every [`Engine::run`] treats the submitted message
/// history as the authoritative snapshot, so a blocked conversation can be
/// resumed by any process holding the same snapshot.
pub struct Engine {
    adapter: Arc<dyn ModelAdapter>,
    registry: Arc<ToolRegistry>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        adapter: Arc<dyn ModelAdapter>,
        registry: ToolRegistry,
        config: EngineConfig,
    ) -> Self {
        Self {
            adapter,
            registry: Arc::new(registry),
            config,
        }
    }

    /// Run one conversation submission to its terminal event.
    pub fn run(&self, messages: Vec<Message>) -> RunStream {
        self.run_with_cancellation(messages, CancellationToken::new())
    }

    /// Run with an external cancellation token. Cancelling stops every
    /// in-flight source (model stream, tool executors); conversation state
    /// already streamed is not retracted.
    pub fn run_with_cancellation(
        &self,
        messages: Vec<Message>,
        cancellation: CancellationToken,
    ) -> RunStream {
        let stream = run_stream(
            self.adapter.clone(),
            self.registry.clone(),
            self.config.clone(),
            messages,
            cancellation,
        );
        if self.config.smooth_deltas {
            smooth_text_deltas(stream)
        } else {
            stream
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }
}
