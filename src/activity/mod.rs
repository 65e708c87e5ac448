//! Activity classification for agent panes.
//!
//! Raw pane text flows through three layers: the [`PatternLibrary`] finds
//! prompt, error and progress markers, the [`VelocityTracker`] measures how
//! fast output is growing, and the [`StateClassifier`] fuses both into a
//! debounced [`AgentState`]. The [`VelocityManager`] and [`ActivityMonitor`]
//! registries hold one of each per pane.

mod classifier;
mod monitor;
mod patterns;
mod velocity;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use classifier::{
    AgentActivity, ClassifierConfig, StateClassifier, StateTransition, VelocityThresholds,
    DEFAULT_HYSTERESIS_DURATION, DEFAULT_STALL_THRESHOLD, MAX_STATE_HISTORY,
};
pub use monitor::{ActivityMonitor, ActivitySummary};
pub use patterns::{
    default_library, has_error_pattern, has_idle_pattern, has_thinking_pattern,
    match_first_pattern, match_patterns, AgentScope, PatternLibrary, PatternMatch, PatternRule,
    DEFAULT_PATTERN_VERSION,
};
pub use velocity::{VelocityManager, VelocitySample, VelocityTracker, DEFAULT_MAX_SAMPLES};

/// What an agent pane is doing right now
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentState {
    /// Actively producing output
    Generating,
    /// Idle at a prompt, ready for input
    Waiting,
    /// Working without much output (spinner, "Thinking...")
    Thinking,
    /// An error was detected in the output
    Error,
    /// Was generating, then went silent for too long
    Stalled,
    /// Not enough signal to decide
    #[default]
    Unknown,
}

impl AgentState {
    pub const ALL: [AgentState; 6] = [
        AgentState::Generating,
        AgentState::Waiting,
        AgentState::Thinking,
        AgentState::Error,
        AgentState::Stalled,
        AgentState::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentState::Generating => "GENERATING",
            AgentState::Waiting => "WAITING",
            AgentState::Thinking => "THINKING",
            AgentState::Error => "ERROR",
            AgentState::Stalled => "STALLED",
            AgentState::Unknown => "UNKNOWN",
        }
    }

    /// Ready to take new work
    pub fn is_available(&self) -> bool {
        matches!(self, AgentState::Waiting)
    }

    pub fn is_busy(&self) -> bool {
        matches!(self, AgentState::Generating | AgentState::Thinking)
    }

    /// Needs a human to look at it
    pub fn is_problem(&self) -> bool {
        matches!(self, AgentState::Error | AgentState::Stalled)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behavioral category of a pattern rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternCategory {
    /// Prompt shown while the agent waits for input
    Idle,
    Error,
    /// Spinners and progress phrases
    Thinking,
    /// Task finished markers
    Completion,
}

impl PatternCategory {
    /// The state a match of this category points at
    pub fn suggested_state(&self) -> AgentState {
        match self {
            PatternCategory::Idle | PatternCategory::Completion => AgentState::Waiting,
            PatternCategory::Error => AgentState::Error,
            PatternCategory::Thinking => AgentState::Thinking,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PatternCategory::Idle => "idle",
            PatternCategory::Error => "error",
            PatternCategory::Thinking => "thinking",
            PatternCategory::Completion => "completion",
        }
    }
}

impl fmt::Display for PatternCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
