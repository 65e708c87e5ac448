use agent_activity::ActivitySummary;
use crossterm::event::KeyEvent;

use crate::poller::PaneView;

/// Actions that can be dispatched through the application
#[derive(Debug, Clone)]
pub enum Action {
    /// A key was pressed
    KeyPress(KeyEvent),
    /// A poll cycle finished
    ActivityUpdated {
        panes: Vec<PaneView>,
        summary: ActivitySummary,
    },
    /// An error occurred
    Error(String),
    /// Attach to a tmux target (session:window.pane)
    AttachPane(String),
    /// Forget the classification history of a pane
    ResetPane(String),
}
