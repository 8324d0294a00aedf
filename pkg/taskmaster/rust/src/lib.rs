// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! taskmaster: a small process supervisor.
//!
//! A [`Supervisor`] owns the registry of configured programs. Starting one
//! spawns a detached cycle task that launches it ([`launcher`]), waits for
//! it to exit ([`monitor`]) and consults its [`RestartPolicy`] to decide
//! whether to go again. Operators drive it through [`control::Console`].

pub mod config;
pub mod control;
pub mod env;
pub mod error;
pub mod launcher;
pub mod monitor;
pub mod policy;
pub mod process_spec;
pub mod shutdown;
pub mod state;
pub mod supervisor;
pub mod terminator;

pub use error::{ConfigError, EntryError, LaunchError, StateError, SupervisorError};
pub use monitor::Verdict;
pub use policy::{Action, RestartPolicy, next_action};
pub use process_spec::ProcessSpec;
pub use state::{ProcessState, ProcessStatus, RunState};
pub use supervisor::{LoadReport, StartOutcome, Supervisor};
pub use terminator::StopOutcome;
