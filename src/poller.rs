use agent_activity::{detect_agent_type, ActivityMonitor, AgentActivity};
use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tracing::warn;

use crate::tmux::{clean_capture, TmuxClient, TmuxPane};

/// A pane together with its latest activity report
#[derive(Debug, Clone, Serialize)]
pub struct PaneView {
    pub pane: TmuxPane,
    pub activity: AgentActivity,
}

/// Captures every pane once per cycle and feeds the monitor
pub struct Poller {
    client: TmuxClient,
    session: Option<String>,
    agent_override: Option<String>,
}

impl Poller {
    pub fn new(
        client: TmuxClient,
        session: Option<String>,
        agent_override: Option<String>,
    ) -> Self {
        Self {
            client,
            session,
            agent_override,
        }
    }

    /// One capture-and-classify pass over all panes
    pub async fn poll(&self, monitor: &ActivityMonitor) -> Result<Vec<PaneView>> {
        let panes = self.client.list_panes(self.session.as_deref()).await?;
        monitor.retain(panes.iter().map(|p| p.id.as_str()));

        let mut views = Vec::with_capacity(panes.len());
        for pane in panes {
            let classifier = monitor.get_or_create(&pane.id);

            let agent_type = self.agent_type_for(&pane);
            if classifier.agent_type() != agent_type {
                classifier.set_agent_type(agent_type);
            }

            let activity = match self.client.capture_pane(&pane.id).await {
                Ok(raw) => classifier.observe_at(&clean_capture(&raw), Utc::now()),
                Err(e) => {
                    warn!(pane = %pane.id, "capture failed: {:#}", e);
                    classifier.observe_capture_failure(Utc::now())
                }
            };
            views.push(PaneView { pane, activity });
        }

        Ok(views)
    }

    fn agent_type_for(&self, pane: &TmuxPane) -> String {
        if let Some(agent) = &self.agent_override {
            return agent.clone();
        }

        detect_agent_type(&pane.title)
            .or_else(|| detect_agent_type(&pane.current_command))
            .unwrap_or_default()
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agent_activity::AgentState;

    fn pane(title: &str, command: &str) -> TmuxPane {
        TmuxPane {
            id: "%1".to_string(),
            session: "work".to_string(),
            window_index: 0,
            pane_index: 0,
            title: title.to_string(),
            current_command: command.to_string(),
        }
    }

    #[test]
    fn test_agent_type_detection_order() {
        let poller = Poller::new(TmuxClient::default(), None, None);
        assert_eq!(poller.agent_type_for(&pane("proj__cod_1", "node")), "codex");
        assert_eq!(poller.agent_type_for(&pane("host", "claude")), "claude");
        assert_eq!(poller.agent_type_for(&pane("host", "zsh")), "");
    }

    #[test]
    fn test_newline_terminated_capture_is_classified() {
        let monitor = ActivityMonitor::default();
        let now = Utc::now();

        let activity = monitor.observe("%1", &clean_capture("\x1b[2m⏺ Thinking...\x1b[0m\n"), now);
        assert_eq!(activity.state, AgentState::Thinking);
        assert_eq!(activity.trigger, "thinking_text");

        let activity = monitor.observe("%2", &clean_capture("Build finished ✓\n\n"), now);
        assert!(activity.detected_patterns.contains(&"checkmark".to_string()));
    }

    #[test]
    fn test_agent_override_wins() {
        let poller = Poller::new(TmuxClient::default(), None, Some("gemini".to_string()));
        assert_eq!(poller.agent_type_for(&pane("proj__cc_1", "claude")), "gemini");
    }
}
