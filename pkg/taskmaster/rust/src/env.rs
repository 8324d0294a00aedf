// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use crate::error::ConfigError;
use std::ffi::OsString;
use std::path::Path;

/// Split a `KEY=VALUE` entry. The key must be non-empty; the value may be.
pub fn parse_pair(entry: &str) -> Option<(String, String)> {
    let (key, value) = entry.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}

/// Parse a systemd-style environment file into key-value pairs.
/// Supports `KEY=VALUE`, `KEY="VALUE"`, `KEY='VALUE'`, comments (#), and blank lines.
pub fn parse_environment_file(path: &Path) -> Result<Vec<(String, String)>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let vars = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_pair)
        .map(|(key, raw)| {
            let value = raw.trim().trim_matches('"').trim_matches('\'').to_string();
            (key, value)
        })
        .collect();
    Ok(vars)
}

/// Collapse repeated keys: first appearance keeps its position, last write
/// keeps its value.
pub fn merge_overrides(
    pairs: impl IntoIterator<Item = (String, String)>,
) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = Vec::new();
    for (key, value) in pairs {
        match merged.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => merged.push((key, value)),
        }
    }
    merged
}

/// The environment a child starts with: `inherited` first, then
/// `overrides` replacing same-key entries.
pub fn effective_environment(
    inherited: impl IntoIterator<Item = (OsString, OsString)>,
    overrides: &[(String, String)],
) -> Vec<(OsString, OsString)> {
    let mut env: Vec<(OsString, OsString)> = inherited.into_iter().collect();
    for (key, value) in overrides {
        let key = OsString::from(key);
        let value = OsString::from(value);
        match env.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => env.push((key, value)),
        }
    }
    env
}
