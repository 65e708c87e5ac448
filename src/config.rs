use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use agent_activity::activity::{default_library, VelocityThresholds};
use agent_activity::{normalize_agent_type, ClassifierConfig, PatternLibrary};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

/// Watch AI coding agents in tmux and classify what each one is doing
#[derive(Debug, Parser)]
#[command(name = "agent-activity", version, about)]
pub struct Cli {
    /// Only watch panes of this tmux session
    #[arg(long, short, env = "AGENT_ACTIVITY_SESSION")]
    pub session: Option<String>,

    /// Milliseconds between pane captures
    #[arg(long, env = "AGENT_ACTIVITY_POLL_MS", default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// Scrollback lines included in each capture
    #[arg(long, env = "AGENT_ACTIVITY_CAPTURE_LINES", default_value_t = 200)]
    pub capture_lines: u32,

    /// Seconds of silence after generating before a pane counts as stalled
    #[arg(long, env = "AGENT_ACTIVITY_STALL_SECS", default_value_t = 30)]
    pub stall_threshold_secs: u64,

    /// Milliseconds a new state must persist before it is shown
    #[arg(long, env = "AGENT_ACTIVITY_HYSTERESIS_MS", default_value_t = 2000)]
    pub hysteresis_ms: u64,

    /// Chars/sec above which output counts as fast generation
    #[arg(long, env = "AGENT_ACTIVITY_HIGH_VELOCITY", default_value_t = 10.0)]
    pub high_velocity: f64,

    /// Chars/sec above which output counts as generation
    #[arg(long, env = "AGENT_ACTIVITY_MEDIUM_VELOCITY", default_value_t = 2.0)]
    pub medium_velocity: f64,

    /// Chars/sec below which an idle prompt is trusted
    #[arg(long, env = "AGENT_ACTIVITY_IDLE_VELOCITY", default_value_t = 1.0)]
    pub idle_velocity: f64,

    /// Agent kind for every pane instead of detecting it from pane titles
    #[arg(long, env = "AGENT_ACTIVITY_AGENT")]
    pub agent_type: Option<String>,

    /// JSON file of extra pattern rules
    /// [default: <config dir>/agent-activity/patterns.json, if present]
    #[arg(long, env = "AGENT_ACTIVITY_PATTERNS")]
    pub patterns: Option<PathBuf>,

    /// Print one JSON snapshot and exit
    #[arg(long)]
    pub once: bool,
}

impl Cli {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(100))
    }

    /// Forced agent kind, normalized
    pub fn agent_override(&self) -> Option<String> {
        self.agent_type.as_deref().map(normalize_agent_type)
    }

    fn patterns_path(&self) -> Option<PathBuf> {
        self.patterns.clone().or_else(|| {
            let path = dirs::config_dir()?
                .join("agent-activity")
                .join("patterns.json");
            path.exists().then_some(path)
        })
    }

    /// The default rules, extended with the user's rule file if there is one
    pub fn pattern_library(&self) -> Result<Arc<PatternLibrary>> {
        let Some(path) = self.patterns_path() else {
            return Ok(default_library());
        };

        let rules = PatternLibrary::load_rules(&path)
            .with_context(|| format!("Failed to load patterns from {}", path.display()))?;

        let library = PatternLibrary::with_defaults();
        match library.add_patterns(rules) {
            Ok(added) => info!("loaded {} pattern(s) from {}", added, path.display()),
            Err(e) => warn!("some patterns in {} were skipped: {}", path.display(), e),
        }
        Ok(Arc::new(library))
    }

    pub fn classifier_config(&self, library: Arc<PatternLibrary>) -> Result<ClassifierConfig> {
        let config = ClassifierConfig {
            agent_type: self.agent_override().unwrap_or_default(),
            stall_threshold: Duration::from_secs(self.stall_threshold_secs),
            hysteresis_duration: Duration::from_millis(self.hysteresis_ms),
            thresholds: VelocityThresholds {
                high: self.high_velocity,
                medium: self.medium_velocity,
                idle: self.idle_velocity,
            },
            pattern_library: Some(library),
            ..ClassifierConfig::default()
        };
        config.validate().context("Invalid velocity thresholds")?;
        Ok(config)
    }
}
