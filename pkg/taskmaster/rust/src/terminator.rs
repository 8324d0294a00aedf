// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use log::{debug, warn};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// No live process; nothing was sent.
    NotRunning,
    /// `kill` returned an error.
    SignalFailed,
    /// The signal was accepted. The process may still be running.
    SignalDelivered,
}

/// Ask `pid` to terminate with `signal`. Does not wait for the exit; the
/// monitor reaps it.
pub fn stop(pid: Option<u32>, signal: Signal) -> StopOutcome {
    let Some(pid) = pid else {
        return StopOutcome::NotRunning;
    };
    send(pid, signal)
}

pub fn force_kill(pid: u32) -> StopOutcome {
    send(pid, Signal::SIGKILL)
}

fn send(pid: u32, sig: Signal) -> StopOutcome {
    // 0 and negative values address process groups; never send those.
    let Some(raw) = i32::try_from(pid).ok().filter(|p| *p > 0) else {
        warn!("refusing to signal invalid pid {pid}");
        return StopOutcome::SignalFailed;
    };
    match signal::kill(Pid::from_raw(raw), sig) {
        Ok(()) => {
            debug!("sent {sig} to pid {pid}");
            StopOutcome::SignalDelivered
        }
        Err(e) => {
            warn!("failed to send {sig} to pid {pid}: {e}");
            StopOutcome::SignalFailed
        }
    }
}
