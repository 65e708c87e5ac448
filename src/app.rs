use std::time::Duration;

use agent_activity::{ActivitySummary, AgentState};
use anyhow::Result;
use chrono::Utc;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};

use crate::actions::Action;
use crate::poller::PaneView;

// Transitions shown in the detail pane
const HISTORY_LINES: usize = 5;

/// Theme colors inspired by Claude Code
pub struct Theme {
    pub fg: Color,
    pub accent: Color,
    pub dim: Color,
    pub success: Color,
    pub warning: Color,
    pub error: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            fg: Color::Rgb(220, 220, 220),
            accent: Color::Rgb(217, 119, 87), // Claude orange
            dim: Color::Rgb(100, 100, 100),
            success: Color::Rgb(80, 200, 120),
            warning: Color::Rgb(255, 193, 7),
            error: Color::Rgb(220, 53, 69),
        }
    }
}

impl Theme {
    fn state_color(&self, state: AgentState) -> Color {
        match state {
            AgentState::Generating => self.warning,
            AgentState::Thinking => self.accent,
            AgentState::Waiting => self.success,
            AgentState::Error | AgentState::Stalled => self.error,
            AgentState::Unknown => self.dim,
        }
    }
}

fn state_glyph(state: AgentState) -> &'static str {
    match state {
        AgentState::Generating => "● ",
        AgentState::Thinking => "◐ ",
        AgentState::Waiting => "? ",
        AgentState::Error => "✗ ",
        AgentState::Stalled => "‼ ",
        AgentState::Unknown => "○ ",
    }
}

/// Main application state
pub struct App {
    /// Panes from the latest poll
    pub panes: Vec<PaneView>,
    pub summary: ActivitySummary,
    /// Currently selected pane index
    pub list_state: ListState,
    /// Current message to display (info or error)
    pub message: Option<String>,
    pub theme: Theme,
    /// Pending action queue
    pub pending_actions: Vec<Action>,
}

impl App {
    pub fn new() -> Self {
        let mut list_state = ListState::default();
        list_state.select(Some(0));

        Self {
            panes: Vec::new(),
            summary: ActivitySummary::default(),
            list_state,
            message: None,
            theme: Theme::default(),
            pending_actions: Vec::new(),
        }
    }

    /// Get the currently selected pane
    pub fn selected_pane(&self) -> Option<&PaneView> {
        self.list_state.selected().and_then(|i| self.panes.get(i))
    }

    /// Take pending actions (drains the queue)
    pub fn take_pending_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.pending_actions)
    }

    /// Handle an action and return whether to quit
    pub fn handle_action(&mut self, action: Action) -> Result<bool> {
        match action {
            Action::KeyPress(key) => self.handle_key(key),
            Action::ActivityUpdated { panes, summary } => {
                self.panes = panes;
                self.summary = summary;
                // Ensure selection is valid
                if let Some(selected) = self.list_state.selected() {
                    if selected >= self.panes.len() && !self.panes.is_empty() {
                        self.list_state.select(Some(self.panes.len() - 1));
                    }
                }
                Ok(false)
            }
            Action::Error(msg) => {
                self.message = Some(msg);
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> Result<bool> {
        // Clear message on any key press
        self.message = None;

        match key.code {
            KeyCode::Char('q') => return Ok(true),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Ok(true);
            }
            KeyCode::Char('j') | KeyCode::Down => self.next_pane(),
            KeyCode::Char('k') | KeyCode::Up => self.previous_pane(),
            KeyCode::Enter => {
                if let Some(view) = self.selected_pane() {
                    let target = view.pane.target();
                    self.pending_actions.push(Action::AttachPane(target));
                }
            }
            KeyCode::Char('r') => {
                if let Some(view) = self.selected_pane() {
                    let id = view.pane.id.clone();
                    self.pending_actions.push(Action::ResetPane(id));
                }
            }
            _ => {}
        }
        Ok(false)
    }

    fn next_pane(&mut self) {
        if self.panes.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(i) if i + 1 < self.panes.len() => i + 1,
            _ => 0,
        };
        self.list_state.select(Some(i));
    }

    fn previous_pane(&mut self) {
        if self.panes.is_empty() {
            return;
        }
        let i = match self.list_state.selected() {
            Some(0) | None => self.panes.len() - 1,
            Some(i) => i - 1,
        };
        self.list_state.select(Some(i));
    }

    pub fn render(&mut self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Min(0),    // Main content
                Constraint::Length(3), // Footer/status
            ])
            .split(frame.area());

        self.render_header(frame, chunks[0]);
        self.render_main(frame, chunks[1]);
        self.render_footer(frame, chunks[2]);
    }

    fn render_header(&self, frame: &mut Frame, area: Rect) {
        let title = Paragraph::new(Line::from(vec![
            Span::styled(
                " AgentActivity ",
                Style::default()
                    .fg(self.theme.accent)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("│ {}", self.summary.summary),
                Style::default().fg(self.theme.dim),
            ),
        ]))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(title, area);
    }

    fn render_main(&mut self, frame: &mut Frame, area: Rect) {
        let chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([
                Constraint::Percentage(40), // Pane list
                Constraint::Percentage(60), // Detail pane
            ])
            .split(area);

        self.render_pane_list(frame, chunks[0]);
        self.render_detail_pane(frame, chunks[1]);
    }

    fn render_pane_list(&mut self, frame: &mut Frame, area: Rect) {
        let items: Vec<ListItem> = if self.panes.is_empty() {
            vec![ListItem::new(Line::from(Span::styled(
                "  No tmux panes found.",
                Style::default().fg(self.theme.dim),
            )))]
        } else {
            self.panes
                .iter()
                .map(|view| {
                    let state = view.activity.state;
                    let agent = if view.activity.agent_type.is_empty() {
                        "-"
                    } else {
                        view.activity.agent_type.as_str()
                    };

                    ListItem::new(Line::from(vec![
                        Span::styled(
                            state_glyph(state),
                            Style::default().fg(self.theme.state_color(state)),
                        ),
                        Span::styled(
                            format!("{} ", view.pane.target()),
                            Style::default().fg(self.theme.fg),
                        ),
                        Span::styled(
                            format!("{} ", agent),
                            Style::default().fg(self.theme.dim),
                        ),
                        Span::styled(
                            state.as_str(),
                            Style::default().fg(self.theme.state_color(state)),
                        ),
                    ]))
                })
                .collect()
        };

        let list = List::new(items)
            .block(
                Block::default()
                    .title(" Panes ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(self.theme.dim)),
            )
            .highlight_style(
                Style::default()
                    .bg(Color::Rgb(50, 50, 50))
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("▶ ");

        frame.render_stateful_widget(list, area, &mut self.list_state);
    }

    fn field<'a>(&self, label: &'a str, value: String) -> Line<'a> {
        Line::from(vec![
            Span::styled(label, Style::default().fg(self.theme.dim)),
            Span::styled(value, Style::default().fg(self.theme.fg)),
        ])
    }

    fn render_detail_pane(&self, frame: &mut Frame, area: Rect) {
        let content = if let Some(view) = self.selected_pane() {
            let activity = &view.activity;
            let state_age = (Utc::now() - activity.state_since)
                .to_std()
                .unwrap_or(Duration::ZERO);

            let mut lines = vec![
                self.field("Pane: ", format!("{} ({})", view.pane.id, view.pane.target())),
                self.field("Title: ", view.pane.title.clone()),
                self.field("Command: ", view.pane.current_command.clone()),
                self.field("Agent: ", activity.agent_type.clone()),
                Line::from(vec![
                    Span::styled("State: ", Style::default().fg(self.theme.dim)),
                    Span::styled(
                        format!("{} for {}", activity.state, format_duration(state_age)),
                        Style::default()
                            .fg(self.theme.state_color(activity.state))
                            .add_modifier(Modifier::BOLD),
                    ),
                ]),
                self.field(
                    "Signal: ",
                    format!(
                        "{} ({:.0}% confidence)",
                        activity.trigger,
                        activity.confidence * 100.0
                    ),
                ),
                self.field(
                    "Velocity: ",
                    format!(
                        "{:.1} now, {:.1} recent, {:.1} avg chars/s",
                        activity.velocity, activity.recent_velocity, activity.average_velocity
                    ),
                ),
                self.field(
                    "Last output: ",
                    format!("{} ago", format_duration(activity.last_output_age)),
                ),
            ];

            if let Some(pending) = activity.pending_state {
                lines.push(self.field("Pending: ", pending.to_string()));
            }
            if !activity.detected_patterns.is_empty() {
                lines.push(self.field("Patterns: ", activity.detected_patterns.join(", ")));
            }

            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                "Recent transitions",
                Style::default().fg(self.theme.dim),
            )));
            for transition in activity.state_history.iter().rev().take(HISTORY_LINES) {
                lines.push(Line::from(vec![
                    Span::styled(
                        format!("  {} ", transition.at.format("%H:%M:%S")),
                        Style::default().fg(self.theme.dim),
                    ),
                    Span::styled(
                        format!("{} → {}", transition.from, transition.to),
                        Style::default().fg(self.theme.state_color(transition.to)),
                    ),
                    Span::styled(
                        format!("  {}", transition.trigger),
                        Style::default().fg(self.theme.dim),
                    ),
                ]));
            }

            lines.push(Line::from(""));
            lines.push(Line::from(Span::styled(
                "Press Enter to attach, 'r' to reset",
                Style::default().fg(self.theme.dim),
            )));
            lines
        } else {
            vec![Line::from(Span::styled(
                "No pane selected",
                Style::default().fg(self.theme.dim),
            ))]
        };

        let detail = Paragraph::new(content).block(
            Block::default()
                .title(" Details ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(detail, area);
    }

    fn render_footer(&self, frame: &mut Frame, area: Rect) {
        let help_text = " q: Quit │ j/k: Navigate │ Enter: Attach │ r: Reset classifier ";

        let content = if let Some(ref msg) = self.message {
            Line::from(Span::styled(
                format!(" {} ", msg),
                Style::default().fg(self.theme.error),
            ))
        } else if !self.summary.problems.is_empty() {
            Line::from(vec![
                Span::styled(
                    format!(" Needs attention: {} ", self.summary.problems.join(", ")),
                    Style::default().fg(self.theme.error),
                ),
                Span::styled(help_text, Style::default().fg(self.theme.dim)),
            ])
        } else {
            Line::from(Span::styled(help_text, Style::default().fg(self.theme.dim)))
        };

        let footer = Paragraph::new(content).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(self.theme.dim)),
        );
        frame.render_widget(footer, area);
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

/// Compact duration like "4s", "2m05s", "1h03m"
fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h{:02}m", secs / 3600, (secs % 3600) / 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tmux::TmuxPane;
    use agent_activity::{ActivityMonitor, ClassifierConfig};
    use crossterm::event::KeyEventState;
    use crossterm::event::KeyEventKind;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    fn views(n: usize) -> Vec<PaneView> {
        let monitor = ActivityMonitor::new(Some(ClassifierConfig::default()));
        (0..n)
            .map(|i| {
                let id = format!("%{}", i);
                PaneView {
                    pane: TmuxPane {
                        id: id.clone(),
                        session: "work".to_string(),
                        window_index: 0,
                        pane_index: i as u32,
                        title: "claude".to_string(),
                        current_command: "node".to_string(),
                    },
                    activity: monitor.observe(&id, "claude>", Utc::now()),
                }
            })
            .collect()
    }

    #[test]
    fn test_navigation_wraps() {
        let mut app = App::new();
        app.handle_action(Action::ActivityUpdated {
            panes: views(3),
            summary: ActivitySummary::default(),
        })
        .unwrap();

        app.handle_action(Action::KeyPress(key(KeyCode::Char('k')))).unwrap();
        assert_eq!(app.list_state.selected(), Some(2));
        app.handle_action(Action::KeyPress(key(KeyCode::Char('j')))).unwrap();
        assert_eq!(app.list_state.selected(), Some(0));
    }

    #[test]
    fn test_selection_clamped_when_panes_shrink() {
        let mut app = App::new();
        app.handle_action(Action::ActivityUpdated {
            panes: views(4),
            summary: ActivitySummary::default(),
        })
        .unwrap();
        app.list_state.select(Some(3));

        app.handle_action(Action::ActivityUpdated {
            panes: views(2),
            summary: ActivitySummary::default(),
        })
        .unwrap();
        assert_eq!(app.list_state.selected(), Some(1));
    }

    #[test]
    fn test_keys_queue_actions() {
        let mut app = App::new();
        app.handle_action(Action::ActivityUpdated {
            panes: views(2),
            summary: ActivitySummary::default(),
        })
        .unwrap();

        app.handle_action(Action::KeyPress(key(KeyCode::Char('r')))).unwrap();
        app.handle_action(Action::KeyPress(key(KeyCode::Enter))).unwrap();

        let actions = app.take_pending_actions();
        assert!(matches!(&actions[0], Action::ResetPane(id) if id == "%0"));
        assert!(matches!(&actions[1], Action::AttachPane(t) if t == "work:0.0"));
        assert!(app.take_pending_actions().is_empty());

        assert!(app.handle_action(Action::KeyPress(key(KeyCode::Char('q')))).unwrap());
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(4)), "4s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m05s");
        assert_eq!(format_duration(Duration::from_secs(3780)), "1h03m");
    }
}
