mod client;

pub use client::TmuxClient;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// CSI, OSC and two-byte escape sequences
static RE_ANSI: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[()][A-Za-z0-9]|\x1b[=>78]")
        .unwrap()
});

/// Remove terminal escape sequences from captured text
pub fn strip_ansi(text: &str) -> String {
    RE_ANSI.replace_all(text, "").into_owned()
}

/// Pane text as the classifier expects it: escapes removed and the
/// surrounding blank lines tmux pads captures with trimmed away
pub fn clean_capture(raw: &str) -> String {
    strip_ansi(raw).trim().to_string()
}

/// Represents a tmux pane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TmuxPane {
    /// Pane ID (e.g., "%3")
    pub id: String,
    /// Owning session name
    pub session: String,
    pub window_index: u32,
    pub pane_index: u32,
    pub title: String,
    /// Foreground command (e.g., "claude", "zsh")
    pub current_command: String,
}

impl TmuxPane {
    /// `session:window.pane`, the form tmux accepts as a target
    pub fn target(&self) -> String {
        format!("{}:{}.{}", self.session, self.window_index, self.pane_index)
    }
}
