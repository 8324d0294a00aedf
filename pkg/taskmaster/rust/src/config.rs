// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::env;
use crate::error::{ConfigError, EntryError};
use crate::policy::RestartPolicy;
use crate::process_spec::{DEFAULT_FORCE_KILL_GRACE, DEFAULT_KILL_SIGNAL, DEFAULT_MAX_RESTARTS, ProcessSpec};
use log::debug;
use nix::sys::signal::Signal;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

pub const ROOT_KEY: &str = "supervisor-processes";

/// One entry under `supervisor-processes`, as written in the file.
#[derive(Debug, Default, Deserialize)]
pub struct ProcessEntry {
    pub name: Option<String>,
    pub full_path: Option<String>,
    pub start_command: Option<Vec<String>>,
    pub working_directory: Option<String>,
    pub environment_file: Option<String>,
    #[serde(default)]
    pub additional_env: Vec<EnvEntry>,
    pub umask: Option<Umask>,
    pub output_redirect_path: Option<String>,
    pub redirect_streams: Option<bool>,
    pub expected_return: Option<ExpectedReturn>,
    pub kill_signal: Option<KillSignal>,
    pub force_quit_wait_time: Option<f64>,
    pub start_time: Option<f64>,
    pub number_of_restarts: Option<u32>,
    pub number_of_processes: Option<u32>,
    pub should_restart: Option<i64>,
    pub exec_on_startup: Option<bool>,
    pub restart_sec: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EnvEntry {
    Pair(String),
    Map(Mapping),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Umask {
    Bits(i64),
    Octal(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ExpectedReturn {
    One(i32),
    Many(Vec<i32>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum KillSignal {
    Number(i32),
    Name(String),
}

/// Read `path` and parse every entry. The outer error means the file as a
/// whole is unusable; inner errors are per-entry and only skip that entry.
pub fn load_file(path: &Path) -> Result<Vec<Result<ProcessSpec, EntryError>>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_str(&contents)
}

pub fn parse_str(contents: &str) -> Result<Vec<Result<ProcessSpec, EntryError>>, ConfigError> {
    let doc: Value = serde_yaml::from_str(contents).map_err(ConfigError::Parse)?;
    let nodes = entry_nodes(doc)?;
    debug!("found {} process entries", nodes.len());

    Ok(nodes
        .into_iter()
        .map(|(label, node)| {
            let source_name = node
                .get("name")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or(label);
            serde_yaml::from_value::<ProcessEntry>(node)
                .map_err(ConfigError::Malformed)
                .and_then(ProcessEntry::into_spec)
                .map_err(|error| EntryError { source_name, error })
        })
        .collect())
}

fn entry_nodes(doc: Value) -> Result<Vec<(String, Value)>, ConfigError> {
    let root = match doc {
        Value::Mapping(mut map) => map.remove(ROOT_KEY).ok_or(ConfigError::MissingRoot)?,
        list @ Value::Sequence(_) => list,
        _ => return Err(ConfigError::MissingRoot),
    };
    match root {
        Value::Sequence(items) => Ok(items
            .into_iter()
            .enumerate()
            .map(|(i, node)| (format!("{ROOT_KEY}[{i}]"), node))
            .collect()),
        Value::Mapping(map) => Ok(map
            .into_iter()
            .map(|(key, node)| {
                let label = match key {
                    Value::String(s) => s,
                    other => format!("{ROOT_KEY}.{}", scalar_to_string(&other).unwrap_or_default()),
                };
                (label, node)
            })
            .collect()),
        _ => Err(ConfigError::MissingRoot),
    }
}

impl ProcessEntry {
    pub fn into_spec(self) -> Result<ProcessSpec, ConfigError> {
        let name = self
            .name
            .filter(|n| !n.trim().is_empty() && !n.contains(char::is_whitespace))
            .ok_or(ConfigError::MissingField("name"))?;
        let executable = self
            .full_path
            .filter(|p| !p.is_empty())
            .ok_or(ConfigError::MissingField("full_path"))?;
        let args = self
            .start_command
            .ok_or(ConfigError::MissingField("start_command"))?;
        let expected_exit_codes: BTreeSet<i32> = match self.expected_return {
            Some(ExpectedReturn::One(code)) => BTreeSet::from([code]),
            Some(ExpectedReturn::Many(codes)) => codes.into_iter().collect(),
            None => BTreeSet::new(),
        };
        if expected_exit_codes.is_empty() {
            return Err(ConfigError::MissingField("expected_return"));
        }

        let mut env_pairs = Vec::new();
        if let Some(file) = self.environment_file.as_deref() {
            env_pairs.extend(env::parse_environment_file(Path::new(file))?);
        }
        for entry in self.additional_env {
            env_pairs.extend(entry.into_pairs()?);
        }

        let output_redirect = match self.redirect_streams {
            Some(false) => None,
            _ => self
                .output_redirect_path
                .filter(|p| !p.is_empty())
                .map(PathBuf::from),
        };

        let restart_policy = match self.should_restart {
            Some(value) => RestartPolicy::try_from(value)?,
            None => RestartPolicy::Never,
        };

        let replica_count = self.number_of_processes.unwrap_or(1);
        if replica_count == 0 {
            return Err(ConfigError::InvalidField {
                field: "number_of_processes",
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(ProcessSpec {
            name,
            executable: PathBuf::from(executable),
            args,
            working_dir: self
                .working_directory
                .filter(|d| !d.is_empty())
                .map(PathBuf::from),
            env: env::merge_overrides(env_pairs),
            umask: self.umask.map(Umask::into_mask).transpose()?.flatten(),
            output_redirect,
            expected_exit_codes,
            kill_signal: self
                .kill_signal
                .map(KillSignal::into_signal)
                .transpose()?
                .unwrap_or(DEFAULT_KILL_SIGNAL),
            force_kill_grace: seconds("force_quit_wait_time", self.force_quit_wait_time)?
                .unwrap_or(DEFAULT_FORCE_KILL_GRACE),
            min_run_duration: seconds("start_time", self.start_time)?.unwrap_or_default(),
            restart_policy,
            max_restarts: self.number_of_restarts.unwrap_or(DEFAULT_MAX_RESTARTS),
            restart_delay: seconds("restart_sec", self.restart_sec)?.unwrap_or_default(),
            replica_count,
            auto_start: self.exec_on_startup.unwrap_or(false),
        })
    }
}

impl EnvEntry {
    fn into_pairs(self) -> Result<Vec<(String, String)>, ConfigError> {
        match self {
            EnvEntry::Pair(entry) => env::parse_pair(&entry)
                .map(|pair| vec![pair])
                .ok_or_else(|| ConfigError::InvalidField {
                    field: "additional_env",
                    reason: format!("{entry:?} is not KEY=VALUE"),
                }),
            EnvEntry::Map(map) => map
                .into_iter()
                .map(|(key, value)| {
                    match (scalar_to_string(&key), scalar_to_string(&value)) {
                        (Some(k), Some(v)) if !k.is_empty() => Ok((k, v)),
                        _ => Err(ConfigError::InvalidField {
                            field: "additional_env",
                            reason: "map entries must be scalar KEY: VALUE pairs".to_string(),
                        }),
                    }
                })
                .collect(),
        }
    }
}

impl Umask {
    /// `None` means leave the inherited mask alone.
    fn into_mask(self) -> Result<Option<u32>, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidField {
            field: "umask",
            reason,
        };
        let bits = match self {
            Umask::Bits(n) if n < 0 => return Ok(None),
            // YAML reads `022` as decimal 22; its digits are the octal mask.
            Umask::Bits(n) => u32::from_str_radix(&n.to_string(), 8)
                .map_err(|e| invalid(format!("{n}: {e}")))?,
            Umask::Octal(s) => {
                let digits = s.trim().trim_start_matches("0o");
                u32::from_str_radix(digits, 8).map_err(|e| invalid(format!("{s:?}: {e}")))?
            }
        };
        if bits > 0o777 {
            return Err(invalid(format!("{bits:o} is larger than 777")));
        }
        Ok(Some(bits))
    }
}

impl KillSignal {
    fn into_signal(self) -> Result<Signal, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidField {
            field: "kill_signal",
            reason,
        };
        match self {
            KillSignal::Number(n) => Signal::try_from(n).map_err(|e| invalid(format!("{n}: {e}"))),
            KillSignal::Name(name) => {
                let upper = name.trim().to_ascii_uppercase();
                let full = if upper.starts_with("SIG") {
                    upper
                } else {
                    format!("SIG{upper}")
                };
                Signal::from_str(&full).map_err(|e| invalid(format!("{name}: {e}")))
            }
        }
    }
}

fn seconds(field: &'static str, value: Option<f64>) -> Result<Option<Duration>, ConfigError> {
    value
        .map(|secs| {
            Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::InvalidField {
                field,
                reason: format!("{secs}: {e}"),
            })
        })
        .transpose()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
