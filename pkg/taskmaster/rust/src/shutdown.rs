// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::supervisor::Supervisor;
use log::{info, warn};
use tokio::task::JoinHandle;
use tokio::time::{Duration, timeout};

const SIGKILL_TIMEOUT: Duration = Duration::from_secs(10);

/// Send every running process its kill signal, then wait for each cycle to
/// end. Stragglers get SIGKILL once their `force_quit_wait_time` elapses.
pub async fn shutdown_all(supervisor: &Supervisor) -> usize {
    let names = supervisor.active_names();
    for name in &names {
        info!("[{name}] stopping for shutdown");
        if let Err(e) = supervisor.stop(name) {
            warn!("[{name}] {e}");
        }
    }

    for name in &names {
        if let Some((handle, grace)) = supervisor.take_cycle(name) {
            wait_for_cycle(name, handle, grace).await;
        }
    }

    supervisor
        .events()
        .status(&format!("Killed: {} process(es)", names.len()));
    names.len()
}

/// Wait for a cycle task to observe its process exit. The stop request has
/// already scheduled SIGKILL at `grace`; give that time to land.
pub(crate) async fn wait_for_cycle(name: &str, handle: JoinHandle<()>, grace: Duration) {
    match timeout(grace + SIGKILL_TIMEOUT, handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("[{name}] supervision task failed: {e}"),
        Err(_) => warn!("[{name}] still running after SIGKILL, giving up"),
    }
}
