//! vimevents replay
//!
//! Replays a recorded session script through the event monitor and prints
//! every enriched event, either in full or as messages only.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vimevents::{Event, EventMonitor, Inventory, MonitorConfig, MonitorError, Script, ScriptedSession};

#[derive(Debug, Parser)]
#[command(name = "vimevents-replay")]
#[command(author, version, about, long_about = None)]
struct ReplayArgs {
    /// JSON script: initial inventory plus recorded wait outcomes.
    script: PathBuf,

    /// TOML monitor configuration.
    #[arg(long, env = "VIMEVENTS_CONFIG")]
    config: Option<PathBuf>,

    /// Collector page size (overrides the config file).
    #[arg(long)]
    page_size: Option<u32>,

    /// Maximum seconds per wait (overrides the config file).
    #[arg(long)]
    max_wait: Option<u64>,

    /// Print only event messages.
    #[arg(long)]
    messages_only: bool,

    /// Stop after this many batches.
    #[arg(long)]
    max_batches: Option<usize>,
}

fn load_config(args: &ReplayArgs) -> Result<MonitorConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::from_toml_file(path)?,
        None => MonitorConfig::default(),
    };
    if let Some(page_size) = args.page_size {
        config = config.with_page_size(page_size);
    }
    if let Some(secs) = args.max_wait {
        config = config.with_max_wait(Duration::from_secs(secs));
    }
    Ok(config)
}

fn print_event(out: &mut impl Write, event: &Event, messages_only: bool) -> std::io::Result<()> {
    if messages_only {
        if let Some(message) = event.message() {
            writeln!(out, "{message}")?;
        }
        return Ok(());
    }

    writeln!(out)?;
    writeln!(out, "*** New Event: {}", event.event_type().unwrap_or("<unknown>"))?;
    serde_json::to_writer_pretty(&mut *out, event)?;
    writeln!(out)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "vimevents=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_target(false))
        .init();

    let args = ReplayArgs::parse();
    let config = load_config(&args)?;

    let script: Script = serde_json::from_str(&std::fs::read_to_string(&args.script)?)?;
    let session = Arc::new(ScriptedSession::new(script));
    let inventory = Arc::new(Inventory::load(session.clone())?);
    info!(
        hosts = inventory.host_count()?,
        vms = inventory.vm_count()?,
        "inventory loaded"
    );

    let monitor = Arc::new(EventMonitor::new(config, session.clone(), inventory)?);
    let handle = Arc::clone(&monitor);
    let mut batches = 0usize;
    let stdout = std::io::stdout();

    let result = monitor.monitor_events(|batch| {
        let mut out = stdout.lock();
        for event in &batch {
            print_event(&mut out, event, args.messages_only)?;
        }
        out.flush()?;

        batches += 1;
        if args.max_batches.is_some_and(|max| batches >= max) {
            handle.stop();
        }
        Ok::<_, std::io::Error>(())
    });

    match result {
        Err(MonitorError::ConnectionLost(_)) if session.is_exhausted() => {
            info!(batches, "replay finished");
            Ok(())
        }
        other => other.map_err(Into::into),
    }
}
