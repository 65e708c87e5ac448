use std::io::{self, Write};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use agent_activity::ActivityMonitor;
use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event, KeyEventKind};
use tokio::sync::mpsc;
use tracing::{debug, info};

mod actions;
mod app;
mod config;
mod poller;
mod tmux;

use actions::Action;
use app::App;
use config::Cli;
use poller::{PaneView, Poller};
use tmux::TmuxClient;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so they never mix with the TUI or JSON output
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let library = cli.pattern_library()?;
    info!(
        "pattern library {} with {} rules",
        library.version(),
        library.pattern_count()
    );
    let monitor = Arc::new(ActivityMonitor::new(Some(cli.classifier_config(library)?)));
    let poller = Poller::new(
        TmuxClient::new(cli.capture_lines),
        cli.session.clone(),
        cli.agent_override(),
    );

    if cli.once {
        return print_snapshot(&poller, &monitor, cli.poll_interval()).await;
    }

    run_tui(poller, monitor, cli.poll_interval()).await
}

/// Two polls one interval apart so velocities are measured, then JSON to stdout
async fn print_snapshot(
    poller: &Poller,
    monitor: &ActivityMonitor,
    interval: Duration,
) -> Result<()> {
    poller.poll(monitor).await?;
    tokio::time::sleep(interval).await;
    let panes: Vec<PaneView> = poller.poll(monitor).await?;

    let report = serde_json::json!({
        "panes": panes,
        "summary": monitor.summary(),
    });

    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, &report)?;
    writeln!(stdout)?;
    Ok(())
}

async fn run_tui(poller: Poller, monitor: Arc<ActivityMonitor>, interval: Duration) -> Result<()> {
    // Create event channel
    let (tx, mut rx) = mpsc::unbounded_channel::<Action>();

    // Initialize terminal
    let mut terminal = ratatui::init();

    // Spawn input handler
    let input_tx = tx.clone();
    tokio::spawn(async move {
        loop {
            if event::poll(Duration::from_millis(100)).unwrap_or(false) {
                if let Ok(Event::Key(key)) = event::read() {
                    if key.kind == KeyEventKind::Press {
                        let _ = input_tx.send(Action::KeyPress(key));
                    }
                }
            }
        }
    });

    // Spawn pane poller
    let poll_tx = tx.clone();
    let poll_monitor = Arc::clone(&monitor);
    tokio::spawn(async move {
        loop {
            match poller.poll(&poll_monitor).await {
                Ok(panes) => {
                    let summary = poll_monitor.summary();
                    let _ = poll_tx.send(Action::ActivityUpdated { panes, summary });
                }
                Err(e) => {
                    let _ = poll_tx.send(Action::Error(format!("Tmux: {}", e)));
                }
            }
            tokio::time::sleep(interval).await;
        }
    });

    // Only used to build attach commands
    let tmux_client = TmuxClient::default();

    // Create app state
    let mut app = App::new();

    // Main event loop
    let result = loop {
        // Render
        terminal.draw(|f| app.render(f))?;

        // Process any pending actions from the app
        for pending_action in app.take_pending_actions() {
            match pending_action {
                Action::AttachPane(ref target) => {
                    // Suspend TUI and attach to the pane
                    ratatui::restore();

                    let cmd = tmux_client.attach_command(target);
                    let status = std::process::Command::new(&cmd[0])
                        .args(&cmd[1..])
                        .stdin(Stdio::inherit())
                        .stdout(Stdio::inherit())
                        .stderr(Stdio::inherit())
                        .status();

                    // Resume TUI
                    terminal = ratatui::init();

                    if let Err(e) = status {
                        app.message = Some(format!("Failed to attach: {}", e));
                    }
                }
                Action::ResetPane(ref pane_id) => match monitor.get(pane_id) {
                    Some(classifier) => {
                        classifier.reset();
                        debug!(pane = %pane_id, "classifier reset");
                        app.message = Some(format!("Reset {}", pane_id));
                    }
                    None => {
                        app.message = Some(format!("Pane {} is no longer monitored", pane_id));
                    }
                },
                _ => {}
            }
        }

        // Handle events from channel
        tokio::select! {
            Some(action) = rx.recv() => {
                match app.handle_action(action) {
                    Ok(should_quit) => {
                        if should_quit {
                            break Ok(());
                        }
                    }
                    Err(e) => {
                        break Err(e);
                    }
                }
            }
        }
    };

    // Restore terminal
    ratatui::restore();
    result
}
