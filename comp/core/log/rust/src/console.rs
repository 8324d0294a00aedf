// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use std::io::Write;
use time::OffsetDateTime;
use time::macros::format_description;

const LOGGER_NAME: &str = "TASKMASTER";

/// Stderr backend for the `log` facade.
pub struct ConsoleLogger {
    level: LevelFilter,
}

impl ConsoleLogger {
    pub fn new(level: LevelFilter) -> Self {
        Self { level }
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format_record(
            OffsetDateTime::now_utc(),
            record.level(),
            record.target(),
            &record.args().to_string(),
        );
        let mut stderr = std::io::stderr().lock();
        // Nowhere left to report a failed stderr write.
        let _ = writeln!(stderr, "{line}");
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Install [`ConsoleLogger`] as the global logger.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    log::set_boxed_logger(Box::new(ConsoleLogger::new(level)))?;
    log::set_max_level(level);
    Ok(())
}

/// Render one diagnostic line in the agent layout:
/// `2026-01-02 03:04:05 UTC | TASKMASTER | INFO | (target) | message`.
pub fn format_record(now: OffsetDateTime, level: Level, target: &str, message: &str) -> String {
    let stamp = now
        .format(format_description!(
            "[year]-[month]-[day] [hour]:[minute]:[second]"
        ))
        .unwrap_or_else(|_| now.unix_timestamp().to_string());
    format!("{stamp} UTC | {LOGGER_NAME} | {level} | ({target}) | {message}")
}
