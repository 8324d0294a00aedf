// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Reaping a launched child and classifying how it ended.

use crate::process_spec::ProcessSpec;
use nix::sys::signal::Signal;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::time::SystemTime;
use taskmaster_log::EventLog;
use tokio::process::Child;

/// Outcome of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Verdict {
    /// Absent when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    /// Exited before `min_run_duration` elapsed.
    pub too_early: bool,
    /// Exit code outside `expected_exit_codes`.
    pub unexpected_exit: bool,
    /// The program never ran.
    pub launch_failed: bool,
}

impl Verdict {
    pub fn launch_failure() -> Self {
        Self {
            launch_failed: true,
            ..Self::default()
        }
    }

    /// Status could not be collected; counted as a failure.
    pub fn lost() -> Self {
        Self {
            unexpected_exit: true,
            ..Self::default()
        }
    }

    pub fn is_success(&self) -> bool {
        !self.too_early && !self.unexpected_exit && !self.launch_failed
    }
}

pub fn classify(
    status: ExitStatus,
    exec_confirmed_at: SystemTime,
    reaped_at: SystemTime,
    spec: &ProcessSpec,
) -> Verdict {
    let exit_code = status.code();
    let too_early = !spec.min_run_duration.is_zero()
        && reaped_at < exec_confirmed_at + spec.min_run_duration;
    let unexpected_exit = exit_code.is_some_and(|code| !spec.expected_exit_codes.contains(&code));

    Verdict {
        exit_code,
        signal: status.signal(),
        too_early,
        unexpected_exit,
        launch_failed: false,
    }
}

/// Wait for this specific child to exit and classify it. Cancel-safe.
pub async fn await_exit(
    child: &mut Child,
    exec_confirmed_at: SystemTime,
    spec: &ProcessSpec,
) -> io::Result<Verdict> {
    let status = child.wait().await?;
    Ok(classify(status, exec_confirmed_at, SystemTime::now(), spec))
}

/// Write the event-log lines describing a verdict.
pub fn report(events: &EventLog, spec: &ProcessSpec, verdict: &Verdict) {
    let name = spec.name.as_str();
    if let Some(sig) = verdict.signal {
        let label = Signal::try_from(sig).map(Signal::as_str).unwrap_or("unknown");
        events.success(name, &format!("Killed by signal {sig} ({label})."));
    }
    if verdict.too_early {
        events.error(name, "Returned too early.");
    }
    if verdict.unexpected_exit {
        match verdict.exit_code {
            Some(code) => events.error(
                name,
                &format!(
                    "Unexpected return value: {code} expected: {}",
                    expected_list(spec)
                ),
            ),
            None => events.error(name, "Exit status could not be collected."),
        }
    }
    if verdict.is_success() {
        events.success(name, "Terminated without errors.");
    } else {
        events.error(name, "Encountered problems.");
    }
}

fn expected_list(spec: &ProcessSpec) -> String {
    spec.expected_exit_codes
        .iter()
        .map(i32::to_string)
        .collect::<Vec<_>>()
        .join(" ")
}
