use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::classifier::{AgentActivity, ClassifierConfig, StateClassifier};
use super::AgentState;
use crate::sync::{read, write};

/// Fleet-level view over every monitored pane
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivitySummary {
    pub total_agents: usize,
    pub by_state: BTreeMap<AgentState, usize>,
    /// Panes ready for work
    pub available: Vec<String>,
    pub busy: Vec<String>,
    /// Panes in error or stalled
    pub problems: Vec<String>,
    pub summary: String,
    pub suggested_actions: Vec<String>,
}

impl ActivitySummary {
    fn from_states(states: &BTreeMap<String, AgentState>) -> Self {
        let mut summary = ActivitySummary {
            total_agents: states.len(),
            ..Default::default()
        };

        for (pane_id, state) in states {
            *summary.by_state.entry(*state).or_default() += 1;
            if state.is_available() {
                summary.available.push(pane_id.clone());
            } else if state.is_busy() {
                summary.busy.push(pane_id.clone());
            } else if state.is_problem() {
                summary.problems.push(pane_id.clone());
            }
        }

        if summary.total_agents == 0 {
            summary.summary = "No agents monitored".to_string();
            return summary;
        }

        summary.summary = format!(
            "{} agents: {} available, {} busy, {} problems",
            summary.total_agents,
            summary.available.len(),
            summary.busy.len(),
            summary.problems.len()
        );

        if !summary.problems.is_empty() {
            summary.suggested_actions.push(format!(
                "Check error/stalled agents in panes: {}",
                summary.problems.join(", ")
            ));
        }
        if !summary.available.is_empty() && summary.busy.is_empty() {
            summary
                .suggested_actions
                .push("All agents idle - ready for new prompts".to_string());
        }
        if summary.available.is_empty() && !summary.busy.is_empty() {
            summary
                .suggested_actions
                .push("All agents busy - wait for one to finish".to_string());
        }
        if !summary.available.is_empty() {
            summary.suggested_actions.push(format!(
                "Send work to available panes: {}",
                summary.available.join(", ")
            ));
        }

        summary
    }
}

/// State classifiers keyed by pane id.
///
/// Every classifier is built from the same [`ClassifierConfig`].
#[derive(Debug, Default)]
pub struct ActivityMonitor {
    classifiers: RwLock<HashMap<String, Arc<StateClassifier>>>,
    config: ClassifierConfig,
}

impl ActivityMonitor {
    pub fn new(config: Option<ClassifierConfig>) -> Self {
        Self {
            classifiers: RwLock::new(HashMap::new()),
            config: config.unwrap_or_default(),
        }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// The classifier for `pane_id`, created on first use
    pub fn get_or_create(&self, pane_id: &str) -> Arc<StateClassifier> {
        if let Some(classifier) = read(&self.classifiers).get(pane_id) {
            return Arc::clone(classifier);
        }

        let mut classifiers = write(&self.classifiers);
        let classifier = classifiers.entry(pane_id.to_string()).or_insert_with(|| {
            debug!(pane = %pane_id, "creating state classifier");
            Arc::new(StateClassifier::new(pane_id, &self.config))
        });
        Arc::clone(classifier)
    }

    pub fn get(&self, pane_id: &str) -> Option<Arc<StateClassifier>> {
        read(&self.classifiers).get(pane_id).cloned()
    }

    pub fn remove(&self, pane_id: &str) -> Option<Arc<StateClassifier>> {
        let removed = write(&self.classifiers).remove(pane_id);
        if removed.is_some() {
            debug!(pane = %pane_id, "removed state classifier");
        }
        removed
    }

    pub fn clear(&self) {
        write(&self.classifiers).clear();
    }

    pub fn count(&self) -> usize {
        read(&self.classifiers).len()
    }

    /// Drop classifiers for panes that are no longer present
    pub fn retain<'a>(&self, live: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let live: HashSet<&str> = live.into_iter().collect();
        let mut classifiers = write(&self.classifiers);

        let gone: Vec<String> = classifiers
            .keys()
            .filter(|id| !live.contains(id.as_str()))
            .cloned()
            .collect();
        for id in &gone {
            classifiers.remove(id);
            debug!(pane = %id, "pane vanished; dropped classifier");
        }
        gone
    }

    /// Feed one capture for `pane_id`, creating its classifier if needed
    pub fn observe(&self, pane_id: &str, text: &str, now: DateTime<Utc>) -> AgentActivity {
        self.get_or_create(pane_id).observe_at(text, now)
    }

    /// Committed state of every monitored pane
    pub fn all_states(&self) -> HashMap<String, AgentState> {
        self.classifiers_snapshot()
            .into_iter()
            .map(|(id, classifier)| (id, classifier.current_state()))
            .collect()
    }

    /// Latest report for every monitored pane, ordered by pane id
    pub fn snapshot(&self) -> BTreeMap<String, AgentActivity> {
        self.classifiers_snapshot()
            .into_iter()
            .map(|(id, classifier)| (id, classifier.activity()))
            .collect()
    }

    pub fn summary(&self) -> ActivitySummary {
        let states: BTreeMap<String, AgentState> = self
            .classifiers_snapshot()
            .into_iter()
            .map(|(id, classifier)| (id, classifier.current_state()))
            .collect();
        ActivitySummary::from_states(&states)
    }

    // Registry lock is released before any classifier lock is taken.
    fn classifiers_snapshot(&self) -> Vec<(String, Arc<StateClassifier>)> {
        read(&self.classifiers)
            .iter()
            .map(|(id, classifier)| (id.clone(), Arc::clone(classifier)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::PatternLibrary;
    use chrono::TimeDelta;
    use std::time::Duration;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn monitor() -> ActivityMonitor {
        ActivityMonitor::new(Some(ClassifierConfig {
            agent_type: "claude".to_string(),
            hysteresis_duration: Duration::from_secs(3),
            pattern_library: Some(Arc::new(PatternLibrary::with_defaults())),
            ..ClassifierConfig::default()
        }))
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let monitor = ActivityMonitor::new(None);
        assert!(monitor.get("%1").is_none());

        let a = monitor.get_or_create("%1");
        let b = monitor.get_or_create("%1");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(monitor.count(), 1);

        assert!(monitor.remove("%1").is_some());
        assert!(monitor.get("%1").is_none());
        assert_eq!(monitor.count(), 0);
    }

    #[test]
    fn test_config_reaches_every_classifier() {
        let monitor = monitor();
        let classifier = monitor.get_or_create("%3");

        assert_eq!(classifier.agent_type(), "claude");
        assert!(Arc::ptr_eq(
            classifier.pattern_library(),
            monitor.config().pattern_library.as_ref().unwrap()
        ));
    }

    #[test]
    fn test_states_and_clear() {
        let monitor = monitor();
        monitor.observe("%1", "claude>", t0());
        monitor.observe("%2", "panic: out of memory", t0());
        monitor.get_or_create("%3");

        let states = monitor.all_states();
        assert_eq!(states.len(), 3);
        assert_eq!(states["%1"], AgentState::Waiting);
        assert_eq!(states["%2"], AgentState::Error);
        assert_eq!(states["%3"], AgentState::Unknown);

        monitor.clear();
        assert_eq!(monitor.count(), 0);
        assert!(monitor.all_states().is_empty());
    }

    #[test]
    fn test_summary_groups_panes() {
        let monitor = monitor();
        monitor.observe("%1", "claude>", t0());
        monitor.observe("%2", "⠋ Thinking...", t0());
        monitor.observe("%3", "Error: unauthorized", t0());
        monitor.observe("%4", "claude>", t0());

        let summary = monitor.summary();
        assert_eq!(summary.total_agents, 4);
        assert_eq!(summary.available, vec!["%1", "%4"]);
        assert_eq!(summary.busy, vec!["%2"]);
        assert_eq!(summary.problems, vec!["%3"]);
        assert_eq!(summary.by_state[&AgentState::Waiting], 2);
        assert_eq!(summary.summary, "4 agents: 2 available, 1 busy, 1 problems");
        assert!(summary.suggested_actions[0].contains("%3"));
    }

    #[test]
    fn test_empty_summary() {
        let summary = ActivityMonitor::new(None).summary();
        assert_eq!(summary.total_agents, 0);
        assert_eq!(summary.summary, "No agents monitored");
        assert!(summary.suggested_actions.is_empty());
    }

    #[test]
    fn test_retain_drops_vanished_panes() {
        let monitor = monitor();
        for id in ["%1", "%2", "%3"] {
            monitor.get_or_create(id);
        }

        let mut gone = monitor.retain(["%2"]);
        gone.sort();

        assert_eq!(gone, vec!["%1", "%3"]);
        assert_eq!(monitor.count(), 1);
        assert!(monitor.get("%2").is_some());
    }

    #[test]
    fn test_snapshot_reports_latest_activity() {
        let monitor = monitor();
        monitor.observe("%1", "", t0());
        monitor.observe("%1", &"z".repeat(60), t0() + TimeDelta::seconds(2));

        let snapshot = monitor.snapshot();
        let activity = &snapshot["%1"];
        assert_eq!(activity.velocity, 30.0);
        assert_eq!(activity.trigger, "high_velocity");
        // Committed state still debounced
        assert_eq!(activity.state, AgentState::Waiting);
        assert_eq!(activity.pending_state, Some(AgentState::Generating));
    }

    #[test]
    fn test_concurrent_get_or_create_and_remove() {
        let monitor = monitor();

        std::thread::scope(|s| {
            for t in 0..8 {
                let monitor = &monitor;
                s.spawn(move || {
                    for i in 0..40 {
                        let id = format!("%{}", i % 10);
                        let classifier = monitor.get_or_create(&id);
                        classifier.observe_at("claude>", t0() + TimeDelta::seconds(i));
                        if (t + i) % 7 == 0 {
                            monitor.remove(&id);
                        }
                        let _ = monitor.summary();
                    }
                });
            }
        });

        assert!(monitor.count() <= 10);

        let shared: Vec<Arc<StateClassifier>> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| s.spawn(|| monitor.get_or_create("%new")))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert!(shared.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }
}
