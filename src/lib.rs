//! Activity classification engine for AI coding agents running in terminal
//! panes.
//!
//! Callers capture pane text themselves, strip escape sequences, and hand
//! the result to an [`ActivityMonitor`]; the monitor answers what each agent
//! is doing right now.

pub mod activity;
pub mod agent;
pub mod error;
mod sync;

pub use activity::{
    ActivityMonitor, ActivitySummary, AgentActivity, AgentState, ClassifierConfig,
    PatternCategory, PatternLibrary, PatternMatch, PatternRule, StateClassifier,
    VelocityManager, VelocityTracker,
};
pub use agent::{detect_agent_type, normalize_agent_type};
pub use error::{Error, Result};
