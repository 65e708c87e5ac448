use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use super::patterns::{default_library, PatternLibrary, PatternMatch};
use super::velocity::{VelocityTracker, DEFAULT_MAX_SAMPLES};
use super::{AgentState, PatternCategory};
use crate::error::{Error, Result};
use crate::sync::lock;

/// Silence after generating that counts as a stall
pub const DEFAULT_STALL_THRESHOLD: Duration = Duration::from_secs(30);

/// How long a new state must persist before it is committed
pub const DEFAULT_HYSTERESIS_DURATION: Duration = Duration::from_secs(2);

/// Transitions kept per classifier
pub const MAX_STATE_HISTORY: usize = 20;

// Samples averaged for `AgentActivity::recent_velocity`
const RECENT_WINDOW: usize = 3;

/// Output-rate cut-offs in characters per second
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VelocityThresholds {
    /// Above this the agent is generating with high confidence
    pub high: f64,
    /// Above this the agent is generating
    pub medium: f64,
    /// Below this an idle prompt is trusted
    pub idle: f64,
}

impl Default for VelocityThresholds {
    fn default() -> Self {
        Self {
            high: 10.0,
            medium: 2.0,
            idle: 1.0,
        }
    }
}

impl VelocityThresholds {
    pub fn validate(&self) -> Result<()> {
        if self.high > self.medium && self.medium > self.idle {
            Ok(())
        } else {
            Err(Error::InvalidThresholds {
                high: self.high,
                medium: self.medium,
                idle: self.idle,
            })
        }
    }
}

/// Settings shared by every classifier an [`ActivityMonitor`](super::ActivityMonitor) creates
#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    /// Agent kind used for pattern scoping
    pub agent_type: String,
    pub stall_threshold: Duration,
    pub hysteresis_duration: Duration,
    pub thresholds: VelocityThresholds,
    pub max_history: usize,
    pub max_samples: usize,
    /// Rules to match against; `None` uses the shared default library
    pub pattern_library: Option<Arc<PatternLibrary>>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            agent_type: String::new(),
            stall_threshold: DEFAULT_STALL_THRESHOLD,
            hysteresis_duration: DEFAULT_HYSTERESIS_DURATION,
            thresholds: VelocityThresholds::default(),
            max_history: MAX_STATE_HISTORY,
            max_samples: DEFAULT_MAX_SAMPLES,
            pattern_library: None,
        }
    }
}

impl ClassifierConfig {
    pub fn validate(&self) -> Result<()> {
        self.thresholds.validate()
    }
}

/// A committed state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: AgentState,
    pub to: AgentState,
    pub at: DateTime<Utc>,
    pub confidence: f64,
    /// Signal that caused the change
    pub trigger: String,
}

/// Everything known about one pane after a classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentActivity {
    pub pane_id: String,
    pub agent_type: String,
    /// Committed (debounced) state
    pub state: AgentState,
    /// Confidence of the latest candidate. While a change is held back by
    /// hysteresis this belongs to `pending_state`, not to `state`.
    pub confidence: f64,
    /// Signal behind the latest candidate, paired with `confidence`
    pub trigger: String,
    /// Candidate waiting out the hysteresis window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_state: Option<AgentState>,
    pub velocity: f64,
    pub average_velocity: f64,
    pub recent_velocity: f64,
    pub state_since: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detected_patterns: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_output: Option<DateTime<Utc>>,
    pub last_output_age: Duration,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub state_history: Vec<StateTransition>,
}

#[derive(Debug)]
struct ClassifierState {
    agent_type: String,
    current: AgentState,
    since: DateTime<Utc>,
    pending: Option<(AgentState, DateTime<Utc>)>,
    history: VecDeque<StateTransition>,
    last_patterns: Vec<String>,
    last_confidence: f64,
    last_trigger: String,
    last_velocity: f64,
}

impl ClassifierState {
    fn new(agent_type: String, now: DateTime<Utc>, max_history: usize) -> Self {
        Self {
            agent_type,
            current: AgentState::Unknown,
            since: now,
            pending: None,
            history: VecDeque::with_capacity(max_history),
            last_patterns: Vec::new(),
            last_confidence: 0.0,
            last_trigger: String::new(),
            last_velocity: 0.0,
        }
    }
}

/// Debounced activity state for one pane.
///
/// Each classification turns a velocity and a set of pattern matches into a
/// candidate state, then runs the candidate through a hysteresis window so
/// short-lived flickers never reach the committed state. Errors skip the
/// window.
#[derive(Debug)]
pub struct StateClassifier {
    pane_id: String,
    tracker: VelocityTracker,
    library: Arc<PatternLibrary>,
    stall_threshold: Duration,
    hysteresis: Duration,
    thresholds: VelocityThresholds,
    max_history: usize,
    state: Mutex<ClassifierState>,
}

impl StateClassifier {
    pub fn new(pane_id: impl Into<String>, config: &ClassifierConfig) -> Self {
        let pane_id = pane_id.into();

        let thresholds = match config.thresholds.validate() {
            Ok(()) => config.thresholds,
            Err(e) => {
                warn!(pane = %pane_id, "{}; using defaults", e);
                VelocityThresholds::default()
            }
        };
        let stall_threshold = non_zero_or(config.stall_threshold, DEFAULT_STALL_THRESHOLD);
        let hysteresis = non_zero_or(config.hysteresis_duration, DEFAULT_HYSTERESIS_DURATION);
        let max_history = if config.max_history == 0 {
            MAX_STATE_HISTORY
        } else {
            config.max_history
        };

        Self {
            tracker: VelocityTracker::with_capacity(pane_id.clone(), config.max_samples),
            library: config
                .pattern_library
                .clone()
                .unwrap_or_else(default_library),
            stall_threshold,
            hysteresis,
            thresholds,
            max_history,
            state: Mutex::new(ClassifierState::new(
                config.agent_type.clone(),
                Utc::now(),
                max_history,
            )),
            pane_id,
        }
    }

    pub fn pane_id(&self) -> &str {
        &self.pane_id
    }

    pub fn velocity_tracker(&self) -> &VelocityTracker {
        &self.tracker
    }

    pub fn pattern_library(&self) -> &Arc<PatternLibrary> {
        &self.library
    }

    /// Run a full cycle on freshly captured, escape-stripped pane text
    pub fn observe(&self, text: &str) -> AgentActivity {
        self.observe_at(text, Utc::now())
    }

    pub fn observe_at(&self, text: &str, now: DateTime<Utc>) -> AgentActivity {
        let mut state = lock(&self.state);
        let sample = self.tracker.record_capture(text, now);
        let matches = self.library.match_content(text, &state.agent_type);
        self.step(&mut state, sample.velocity, &matches, now)
    }

    /// A cycle where the pane could not be captured: no output, no matches
    pub fn observe_capture_failure(&self, now: DateTime<Utc>) -> AgentActivity {
        let mut state = lock(&self.state);
        self.step(&mut state, 0.0, &[], now)
    }

    /// Classify an already-measured velocity and match set
    pub fn classify(&self, velocity: f64, matches: &[PatternMatch]) -> AgentActivity {
        self.classify_at(velocity, matches, Utc::now())
    }

    pub fn classify_at(
        &self,
        velocity: f64,
        matches: &[PatternMatch],
        now: DateTime<Utc>,
    ) -> AgentActivity {
        let mut state = lock(&self.state);
        self.step(&mut state, velocity, matches, now)
    }

    /// Latest report without classifying again
    pub fn activity(&self) -> AgentActivity {
        let state = lock(&self.state);
        self.report(&state)
    }

    pub fn current_state(&self) -> AgentState {
        lock(&self.state).current
    }

    pub fn pending_state(&self) -> Option<AgentState> {
        lock(&self.state).pending.map(|(state, _)| state)
    }

    pub fn state_since(&self) -> DateTime<Utc> {
        lock(&self.state).since
    }

    /// How long the committed state has held
    pub fn state_duration(&self) -> Duration {
        self.state_duration_at(Utc::now())
    }

    pub fn state_duration_at(&self, now: DateTime<Utc>) -> Duration {
        let since = lock(&self.state).since;
        (now - since).to_std().unwrap_or(Duration::ZERO)
    }

    /// Copy of the transition log, oldest first
    pub fn state_history(&self) -> Vec<StateTransition> {
        lock(&self.state).history.iter().cloned().collect()
    }

    /// Names of the patterns seen by the latest classification
    pub fn detected_patterns(&self) -> Vec<String> {
        lock(&self.state).last_patterns.clone()
    }

    pub fn agent_type(&self) -> String {
        lock(&self.state).agent_type.clone()
    }

    pub fn set_agent_type(&self, agent_type: impl Into<String>) {
        lock(&self.state).agent_type = agent_type.into();
    }

    /// Back to `UNKNOWN` with empty history and velocity window
    pub fn reset(&self) {
        let mut state = lock(&self.state);
        self.tracker.reset();

        let agent_type = std::mem::take(&mut state.agent_type);
        *state = ClassifierState::new(agent_type, Utc::now(), self.max_history);
        debug!(pane = %self.pane_id, "classifier reset");
    }

    fn step(
        &self,
        state: &mut ClassifierState,
        velocity: f64,
        matches: &[PatternMatch],
        now: DateTime<Utc>,
    ) -> AgentActivity {
        let (candidate, confidence, trigger) = self.propose(state, velocity, matches);
        trace!(
            pane = %self.pane_id,
            velocity,
            matches = matches.len(),
            candidate = %candidate,
            "classified"
        );

        self.apply_hysteresis(state, candidate, confidence, &trigger, now);

        state.last_patterns = matches.iter().map(|m| m.pattern.clone()).collect();
        state.last_confidence = confidence;
        state.last_trigger = trigger;
        state.last_velocity = velocity;

        self.report(state)
    }

    /// Candidate state for one observation; the first rule that applies wins
    fn propose(
        &self,
        state: &ClassifierState,
        velocity: f64,
        matches: &[PatternMatch],
    ) -> (AgentState, f64, String) {
        let first_of = |category: PatternCategory| matches.iter().find(|m| m.category == category);

        if let Some(m) = first_of(PatternCategory::Error) {
            return (AgentState::Error, 0.95, m.pattern.clone());
        }

        if velocity > self.thresholds.high {
            return (AgentState::Generating, 0.85, "high_velocity".to_string());
        }
        if velocity > self.thresholds.medium {
            return (AgentState::Generating, 0.70, "medium_velocity".to_string());
        }

        if let Some(m) = first_of(PatternCategory::Idle) {
            if velocity < self.thresholds.idle {
                return (AgentState::Waiting, 0.90, m.pattern.clone());
            }
        }

        if let Some(m) = first_of(PatternCategory::Thinking) {
            return (AgentState::Thinking, 0.80, m.pattern.clone());
        }

        if velocity == 0.0 && matches.is_empty() {
            if state.current == AgentState::Generating
                && self.tracker.last_output_age() > self.stall_threshold
            {
                return (
                    AgentState::Stalled,
                    0.75,
                    "stalled_after_generating".to_string(),
                );
            }
            return (AgentState::Waiting, 0.60, "idle_no_output".to_string());
        }

        (AgentState::Unknown, 0.50, "insufficient_signals".to_string())
    }

    fn apply_hysteresis(
        &self,
        state: &mut ClassifierState,
        candidate: AgentState,
        confidence: f64,
        trigger: &str,
        now: DateTime<Utc>,
    ) -> AgentState {
        if candidate == AgentState::Error {
            if state.current != AgentState::Error {
                self.commit(state, candidate, confidence, trigger, now);
            }
            state.pending = None;
            return state.current;
        }

        // First real signal commits immediately
        if state.history.is_empty() && candidate != AgentState::Unknown {
            self.commit(state, candidate, confidence, trigger, now);
            return state.current;
        }

        if candidate == state.current {
            state.pending = None;
            return state.current;
        }

        match state.pending {
            Some((pending, pending_since)) if pending == candidate => {
                let held = (now - pending_since).to_std().unwrap_or(Duration::ZERO);
                if held >= self.hysteresis {
                    self.commit(state, candidate, confidence, trigger, now);
                }
            }
            _ => state.pending = Some((candidate, now)),
        }

        state.current
    }

    fn commit(
        &self,
        state: &mut ClassifierState,
        to: AgentState,
        confidence: f64,
        trigger: &str,
        now: DateTime<Utc>,
    ) {
        debug!(
            pane = %self.pane_id,
            from = %state.current,
            to = %to,
            trigger,
            "state transition"
        );

        while state.history.len() >= self.max_history {
            state.history.pop_front();
        }
        state.history.push_back(StateTransition {
            from: state.current,
            to,
            at: now,
            confidence,
            trigger: trigger.to_string(),
        });

        state.current = to;
        state.since = now;
        state.pending = None;
    }

    fn report(&self, state: &ClassifierState) -> AgentActivity {
        AgentActivity {
            pane_id: self.pane_id.clone(),
            agent_type: state.agent_type.clone(),
            state: state.current,
            confidence: state.last_confidence,
            trigger: state.last_trigger.clone(),
            pending_state: state.pending.map(|(s, _)| s),
            velocity: state.last_velocity,
            average_velocity: self.tracker.average_velocity(),
            recent_velocity: self.tracker.recent_velocity(RECENT_WINDOW),
            state_since: state.since,
            detected_patterns: state.last_patterns.clone(),
            last_output: self.tracker.last_output_time(),
            last_output_age: self.tracker.last_output_age(),
            state_history: state.history.iter().cloned().collect(),
        }
    }
}

fn non_zero_or(value: Duration, default: Duration) -> Duration {
    if value.is_zero() {
        default
    } else {
        value
    }
}
