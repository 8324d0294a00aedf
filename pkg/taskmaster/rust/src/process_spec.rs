// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::policy::RestartPolicy;
use nix::sys::signal::Signal;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_KILL_SIGNAL: Signal = Signal::SIGTERM;
pub const DEFAULT_FORCE_KILL_GRACE: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_RESTARTS: u32 = 1;

/// Launch configuration of one supervised program. Immutable once built;
/// a reload replaces it wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSpec {
    pub name: String,
    pub executable: PathBuf,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    /// Applied in order over the inherited environment.
    pub env: Vec<(String, String)>,
    pub umask: Option<u32>,
    /// Receives both stdout and stderr, truncated on every launch.
    pub output_redirect: Option<PathBuf>,
    pub expected_exit_codes: BTreeSet<i32>,
    pub kill_signal: Signal,
    pub force_kill_grace: Duration,
    pub min_run_duration: Duration,
    pub restart_policy: RestartPolicy,
    pub max_restarts: u32,
    pub restart_delay: Duration,
    pub replica_count: u32,
    pub auto_start: bool,
}

impl ProcessSpec {
    pub fn new(name: impl Into<String>, executable: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            executable: executable.into(),
            args: Vec::new(),
            working_dir: None,
            env: Vec::new(),
            umask: None,
            output_redirect: None,
            expected_exit_codes: BTreeSet::from([0]),
            kill_signal: DEFAULT_KILL_SIGNAL,
            force_kill_grace: DEFAULT_FORCE_KILL_GRACE,
            min_run_duration: Duration::ZERO,
            restart_policy: RestartPolicy::Never,
            max_restarts: DEFAULT_MAX_RESTARTS,
            restart_delay: Duration::ZERO,
            replica_count: 1,
            auto_start: false,
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn expected_exit_codes(mut self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.expected_exit_codes = codes.into_iter().collect();
        self
    }

    pub fn restart_policy(mut self, policy: RestartPolicy, max_restarts: u32) -> Self {
        self.restart_policy = policy;
        self.max_restarts = max_restarts;
        self
    }

    /// Names this spec registers under: `name`, then `name_1..name_N` when
    /// more than one replica is configured.
    pub fn replica_names(&self) -> Vec<String> {
        let mut names = vec![self.name.clone()];
        if self.replica_count > 1 {
            names.extend((1..=self.replica_count).map(|i| format!("{}_{i}", self.name)));
        }
        names
    }

    pub fn with_name(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..self.clone()
        }
    }

    /// True when a running process launched from `self` cannot pick up
    /// `other` without being re-executed.
    pub fn requires_relaunch(&self, other: &ProcessSpec) -> bool {
        self.executable != other.executable
            || self.working_dir != other.working_dir
            || self.args != other.args
            || self.env != other.env
            || self.umask != other.umask
            || self.output_redirect != other.output_redirect
    }
}
