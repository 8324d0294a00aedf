// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, info};
use std::path::PathBuf;
use std::sync::Arc;
use taskmaster::control::{self, Console};
use taskmaster::supervisor::Supervisor;
use taskmaster_log::EventLog;

/// Process supervisor
#[derive(Parser, Debug)]
#[command(name = "taskmaster", version)]
#[command(about = "Launch, watch and restart the programs listed in a YAML file")]
struct Args {
    /// Configuration file
    #[arg(short, long, env = "TASKMASTER_CONFIG", default_value = "./taskmaster.yaml")]
    config: PathBuf,

    /// Lifecycle event log, appended to
    #[arg(short, long, env = "TASKMASTER_LOG_FILE", default_value = "./taskmaster.log")]
    log_file: PathBuf,

    /// Diagnostic verbosity on stderr (off, error, warn, info, debug, trace)
    #[arg(long, env = "TASKMASTER_LOG_LEVEL", default_value = "warn")]
    log_level: LevelFilter,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    taskmaster_log::init(args.log_level)?;
    info!(
        "taskmaster starting (version {})",
        env!("CARGO_PKG_VERSION")
    );

    let events = Arc::new(
        EventLog::open(&args.log_file)
            .with_context(|| format!("opening event log {}", args.log_file.display()))?,
    );
    events.status("Starting taskmaster...");

    let supervisor = Supervisor::new(Arc::clone(&events));
    let report = supervisor
        .load_config(&args.config, false)
        .await
        .with_context(|| format!("loading {}", args.config.display()))?;
    if !report.is_valid() {
        events.status("Configuration is not valid, exiting.");
        bail!(
            "no valid process entry in {} ({} skipped)",
            args.config.display(),
            report.skipped
        );
    }

    let started = supervisor.start_auto_start();
    info!("started {started} process(es) at startup");

    let mut console = Console::new(supervisor.clone());
    let mut stdout = tokio::io::stdout();
    console.run(control::spawn_stdin_reader(), &mut stdout).await?;

    info!("taskmaster shutting down");
    supervisor.shutdown().await;
    events.status("Exiting taskmaster...");
    Ok(())
}
