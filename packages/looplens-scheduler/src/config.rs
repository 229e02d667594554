use looplens_script::{Limits, MAX_NESTING};
use serde::{Deserialize, Serialize};

/// How snapshots pick the source line to highlight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LineMode {
    /// Text search for the call's signature, see [`LineLocator`](crate::LineLocator).
    #[default]
    Heuristic,
    /// The line the parser recorded for the call expression.
    CallSite,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Outer event-loop passes before the simulation stops.
    pub max_iterations: usize,
    /// Deferred callbacks run in a single drain step before the simulation stops.
    pub max_deferred_per_checkpoint: usize,
    /// Record an explicit snapshot when a limit cuts the timeline short.
    pub announce_iteration_limit: bool,
    pub line_mode: LineMode,
    pub max_steps: usize,
    pub max_call_depth: usize,
    /// Deepest syntactic nesting accepted; deeper scripts fail to parse.
    pub max_nesting: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            max_iterations: 50,
            max_deferred_per_checkpoint: 1_000,
            announce_iteration_limit: true,
            line_mode: LineMode::Heuristic,
            max_steps: limits.max_steps,
            max_call_depth: limits.max_call_depth,
            max_nesting: MAX_NESTING,
        }
    }
}

impl GeneratorConfig {
    pub fn limits(&self) -> Limits {
        Limits {
            max_steps: self.max_steps,
            max_call_depth: self.max_call_depth,
        }
    }
}
