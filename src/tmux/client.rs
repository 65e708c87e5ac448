use anyhow::{Context, Result};
use tokio::process::Command;

use super::TmuxPane;

// session|window|pane|command|id|title ; title last since it may contain '|'
const PANE_FORMAT: &str = "#{session_name}|#{window_index}|#{pane_index}|#{pane_current_command}|#{pane_id}|#{pane_title}";

/// Client for interacting with tmux via CLI
pub struct TmuxClient {
    /// Path to tmux binary
    tmux_path: String,
    /// Scrollback lines included in each capture
    capture_lines: u32,
}

impl TmuxClient {
    pub fn new(capture_lines: u32) -> Self {
        Self {
            tmux_path: "tmux".to_string(),
            capture_lines,
        }
    }

    /// List panes across all sessions, or only those of `session`
    pub async fn list_panes(&self, session: Option<&str>) -> Result<Vec<TmuxPane>> {
        let mut cmd = Command::new(&self.tmux_path);
        match session {
            Some(name) => cmd.args(["list-panes", "-s", "-t", name, "-F", PANE_FORMAT]),
            None => cmd.args(["list-panes", "-a", "-F", PANE_FORMAT]),
        };

        let output = cmd
            .output()
            .await
            .context("Failed to execute tmux list-panes")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("no server running") || stderr.contains("no sessions") {
                return Ok(Vec::new());
            }
            anyhow::bail!("tmux list-panes failed: {}", stderr);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().filter_map(parse_pane_line).collect())
    }

    /// Capture the visible text of a pane plus recent scrollback
    pub async fn capture_pane(&self, pane_id: &str) -> Result<String> {
        let start = format!("-{}", self.capture_lines);
        let output = Command::new(&self.tmux_path)
            .args(["capture-pane", "-p", "-J", "-t", pane_id, "-S", &start])
            .output()
            .await
            .context("Failed to capture pane")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("capture-pane {} failed: {}", pane_id, stderr.trim());
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Get the command to attach to a session (for external execution)
    pub fn attach_command(&self, target: &str) -> Vec<String> {
        vec![
            self.tmux_path.clone(),
            "attach-session".to_string(),
            "-t".to_string(),
            target.to_string(),
        ]
    }
}

impl Default for TmuxClient {
    fn default() -> Self {
        Self::new(200)
    }
}

fn parse_pane_line(line: &str) -> Option<TmuxPane> {
    let parts: Vec<&str> = line.splitn(6, '|').collect();
    if parts.len() < 6 {
        return None;
    }

    Some(TmuxPane {
        session: parts[0].to_string(),
        window_index: parts[1].parse().unwrap_or(0),
        pane_index: parts[2].parse().unwrap_or(0),
        current_command: parts[3].to_string(),
        id: parts[4].to_string(),
        title: parts[5].to_string(),
    })
}
