// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use log::{error, info};
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;
use time::OffsetDateTime;

const PROGRAM: &str = "taskmaster";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Success,
    Error,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Success => write!(f, "SUCCESS"),
            EventKind::Error => write!(f, "ERROR"),
        }
    }
}

/// Append-only lifecycle event stream. Every call writes exactly one line and
/// flushes it; concurrent writers are serialized by the inner mutex.
pub struct EventLog {
    sink: Mutex<Box<dyn Write + Send>>,
}

impl EventLog {
    /// Open (or create) `path` for appending.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let file: File = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self::from_writer(file))
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Mutex::new(Box::new(writer)),
        }
    }

    /// An event log that discards everything.
    pub fn sink() -> Self {
        Self::from_writer(io::sink())
    }

    pub fn success(&self, source: &str, message: &str) {
        info!("[{source}] {message}");
        self.write_line(format_event(now(), EventKind::Success, source, message));
    }

    pub fn error(&self, source: &str, message: &str) {
        error!("[{source}] {message}");
        self.write_line(format_event(now(), EventKind::Error, source, message));
    }

    /// Free-form banner or summary line, without the SUCCESS/ERROR wrapper.
    pub fn status(&self, message: &str) {
        info!("{message}");
        self.write_line(format_status(now(), message));
    }

    fn write_line(&self, line: String) {
        let mut sink = self
            .sink
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Err(e) = writeln!(sink, "{line}").and_then(|_| sink.flush()) {
            error!("failed to write event log line: {e}");
        }
    }
}

fn now() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// `[<epoch>] taskmaster: <KIND>: <source>: <message>`
pub fn format_event(epoch: i64, kind: EventKind, source: &str, message: &str) -> String {
    format!(
        "[{epoch}] {PROGRAM}: {kind}: {source}: {}",
        single_line(message)
    )
}

/// `[<epoch>] taskmaster: <message>`
pub fn format_status(epoch: i64, message: &str) -> String {
    format!("[{epoch}] {PROGRAM}: {}", single_line(message))
}

fn single_line(message: &str) -> String {
    message.trim_end().replace('\n', " ")
}
