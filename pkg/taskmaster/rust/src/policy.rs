// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! When a process is relaunched after it exits.

use crate::error::ConfigError;
use crate::monitor::Verdict;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RestartPolicy {
    /// Never relaunch.
    #[default]
    Never,

    /// Relaunch after a failed verdict while restarts remain.
    OnUnexpectedExit,

    /// Relaunch after every exit, without limit.
    Always,
}

impl TryFrom<i64> for RestartPolicy {
    type Error = ConfigError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(RestartPolicy::Never),
            1 => Ok(RestartPolicy::OnUnexpectedExit),
            2 => Ok(RestartPolicy::Always),
            other => Err(ConfigError::InvalidField {
                field: "should_restart",
                reason: format!("{other} is not one of 0 (never), 1 (on unexpected exit), 2 (always)"),
            }),
        }
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartPolicy::Never => write!(f, "never"),
            RestartPolicy::OnUnexpectedExit => write!(f, "on-unexpected-exit"),
            RestartPolicy::Always => write!(f, "always"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Stop,
    Relaunch,
}

/// Decide what follows an exit (or a failed launch).
///
/// `restarts_so_far` is only consulted under
/// [`RestartPolicy::OnUnexpectedExit`]; `Always` loops without bound.
pub fn next_action(
    policy: RestartPolicy,
    verdict: &Verdict,
    restarts_so_far: u32,
    max_restarts: u32,
) -> Action {
    match policy {
        RestartPolicy::Never => Action::Stop,
        RestartPolicy::Always => Action::Relaunch,
        RestartPolicy::OnUnexpectedExit => {
            if !verdict.is_success() && restarts_so_far < max_restarts {
                Action::Relaunch
            } else {
                Action::Stop
            }
        }
    }
}
