// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Logging for taskmaster.
//!
//! Two sinks live here:
//! - [`ConsoleLogger`], the `log` facade backend used for diagnostics. It
//!   writes to stderr so it never interleaves with the control prompt.
//! - [`EventLog`], the append-only lifecycle stream operators read
//!   (`[<epoch>] taskmaster: SUCCESS: <name>: <message>`).

mod console;
mod events;

pub use console::{ConsoleLogger, format_record, init};
pub use events::{EventKind, EventLog, format_event, format_status};
