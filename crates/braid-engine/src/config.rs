/// Engine configuration. Plain data; the embedding layer decides where the
/// values come from (env, file, request).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of generation steps before the run fails with
    /// `step-budget-exceeded`.
    pub max_steps: u32,
    /// System prompt prepended to every generation request.
    pub system_prompt: String,
    /// Re-chunk streamed text deltas on word boundaries before emission.
    pub smooth_deltas: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: 8,
            system_prompt: String::new(),
            smooth_deltas: false,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the step budget.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Set the system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Enable word-boundary smoothing of text deltas.
    #[must_use]
    pub fn with_smooth_deltas(mut self, smooth: bool) -> Self {
        self.smooth_deltas = smooth;
        self
    }
}
