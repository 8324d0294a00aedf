// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn a [`crate::ProcessSpec`] into a running OS process.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("cannot open output redirect {}: {source}", path.display())]
    Redirect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The child was forked but a pre-exec step or exec itself failed.
    #[error("{source}")]
    Exec {
        errno: i32,
        #[source]
        source: io::Error,
    },

    #[error("spawn failed: {0}")]
    Spawn(#[source] io::Error),
}

impl LaunchError {
    pub fn errno(&self) -> Option<i32> {
        match self {
            LaunchError::Redirect { source, .. } | LaunchError::Spawn(source) => {
                source.raw_os_error()
            }
            LaunchError::Exec { errno, .. } => Some(*errno),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("YAML::BadFile: {0}")]
    Parse(#[source] serde_yaml::Error),

    #[error("supervisor-processes node not found.")]
    MissingRoot,

    #[error("malformed entry: {0}")]
    Malformed(#[source] serde_yaml::Error),

    #[error("{0} does not exist or is invalid")]
    MissingField(&'static str),

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("already exists in process list.")]
    Duplicate,
}

/// A configuration entry that was skipped, with the name (or position) it
/// was reported under.
#[derive(Debug, Error)]
#[error("{source_name}: {error}")]
pub struct EntryError {
    pub source_name: String,
    #[source]
    pub error: ConfigError,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid state transition from {from} to {to}")]
pub struct StateError {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("{0}: no such process")]
    UnknownProcess(String),

    #[error("no configuration file has been loaded")]
    NoConfig,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    State(#[from] StateError),
}
