// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::error::StateError;
use crate::monitor::Verdict;
use crate::policy::RestartPolicy;
use std::fmt;
use std::time::SystemTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Configured, never started.
    Idle,
    /// A launch is in progress or a relaunch is pending.
    Launching,
    /// Child process is alive.
    Running,
    /// Last run ended with a successful verdict.
    Exited,
    /// Last run failed, or the program could not be launched.
    Failed,
    /// Stopped on operator request.
    Stopped,
}

impl RunState {
    pub fn is_alive(self) -> bool {
        self == RunState::Running
    }

    /// Running, or about to be.
    pub fn is_active(self) -> bool {
        matches!(self, RunState::Launching | RunState::Running)
    }

    pub(crate) fn can_transition_to(self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (self, next),
            (Idle, Launching)
                | (Launching, Running)
                | (Launching, Failed)
                | (Launching, Stopped)
                | (Running, Exited)
                | (Running, Failed)
                | (Running, Stopped)
                | (Exited, Launching)
                | (Failed, Launching)
                | (Stopped, Launching)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "idle"),
            RunState::Launching => write!(f, "launching"),
            RunState::Running => write!(f, "running"),
            RunState::Exited => write!(f, "exited"),
            RunState::Failed => write!(f, "failed"),
            RunState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Runtime state of one registry entry, reused across restarts of the same
/// spec generation.
#[derive(Debug, Clone)]
pub struct ProcessState {
    run_state: RunState,
    pid: Option<u32>,
    last_exit_code: Option<i32>,
    last_signal: Option<i32>,
    last_error: Option<String>,
    launched_at: Option<SystemTime>,
    exec_confirmed_at: Option<SystemTime>,
    restarts_so_far: u32,
    run_count: u64,
}

impl Default for ProcessState {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessState {
    pub fn new() -> Self {
        Self {
            run_state: RunState::Idle,
            pid: None,
            last_exit_code: None,
            last_signal: None,
            last_error: None,
            launched_at: None,
            exec_confirmed_at: None,
            restarts_so_far: 0,
            run_count: 0,
        }
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn is_alive(&self) -> bool {
        self.run_state.is_alive()
    }

    /// Only meaningful while alive.
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn last_exit_code(&self) -> Option<i32> {
        self.last_exit_code
    }

    pub fn last_signal(&self) -> Option<i32> {
        self.last_signal
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn launched_at(&self) -> Option<SystemTime> {
        self.launched_at
    }

    pub fn exec_confirmed_at(&self) -> Option<SystemTime> {
        self.exec_confirmed_at
    }

    pub fn restarts_so_far(&self) -> u32 {
        self.restarts_so_far
    }

    /// Number of successful launches; identifies a run for stop escalation.
    pub fn run_count(&self) -> u64 {
        self.run_count
    }

    fn transition(&mut self, next: RunState) -> Result<(), StateError> {
        if !self.run_state.can_transition_to(next) {
            return Err(StateError {
                from: self.run_state.to_string(),
                to: next.to_string(),
            });
        }
        self.run_state = next;
        Ok(())
    }

    pub fn mark_launching(&mut self) -> Result<(), StateError> {
        self.transition(RunState::Launching)?;
        self.pid = None;
        Ok(())
    }

    pub fn mark_running(
        &mut self,
        pid: u32,
        launched_at: SystemTime,
        exec_confirmed_at: SystemTime,
    ) -> Result<(), StateError> {
        self.transition(RunState::Running)?;
        self.pid = Some(pid);
        self.launched_at = Some(launched_at);
        self.exec_confirmed_at = Some(exec_confirmed_at);
        self.last_error = None;
        self.run_count += 1;
        Ok(())
    }

    pub fn mark_launch_failed(&mut self, error: impl Into<String>) -> Result<(), StateError> {
        self.transition(RunState::Failed)?;
        self.pid = None;
        self.last_error = Some(error.into());
        Ok(())
    }

    /// Record a reaped run. Only the monitor path calls this, so it is the
    /// single place `alive` turns false.
    pub fn mark_exited(
        &mut self,
        verdict: &Verdict,
        stopped_by_operator: bool,
    ) -> Result<(), StateError> {
        let next = if stopped_by_operator {
            RunState::Stopped
        } else if verdict.is_success() {
            RunState::Exited
        } else {
            RunState::Failed
        };
        self.transition(next)?;
        self.pid = None;
        self.last_exit_code = verdict.exit_code;
        self.last_signal = verdict.signal;
        Ok(())
    }

    /// A pending relaunch was cancelled before it started.
    pub fn mark_cancelled(&mut self) -> Result<(), StateError> {
        self.transition(RunState::Stopped)?;
        self.pid = None;
        Ok(())
    }

    pub fn record_restart(&mut self) {
        self.restarts_so_far = self.restarts_so_far.saturating_add(1);
    }

    pub fn reset_restarts(&mut self) {
        self.restarts_so_far = 0;
    }
}

/// Point-in-time view of one entry, for the control surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessStatus {
    pub name: String,
    pub state: RunState,
    pub pid: Option<u32>,
    pub runs: u64,
    pub restarts: u32,
    pub max_restarts: u32,
    pub policy: RestartPolicy,
    pub last_exit_code: Option<i32>,
    pub last_signal: Option<i32>,
    pub last_error: Option<String>,
    pub uptime_secs: Option<u64>,
}
