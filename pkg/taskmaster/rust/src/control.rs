// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Operator command surface: the `taskmasterctl` prompt plus SIGHUP reload.

use crate::policy::RestartPolicy;
use crate::state::ProcessStatus;
use crate::supervisor::{StartOutcome, Supervisor};
use crate::terminator::StopOutcome;
use anyhow::Result;
use log::info;
use std::io::{BufRead, Write};
use tabwriter::TabWriter;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;

pub const PROMPT: &str = "taskmasterctl>$ ";

const HELP: &str = "\
Available commands:
  start <name>     start a process
  stop <name>      stop a process
  restart <name>   stop, then start a process
  status [name]    show the state of one or every process
  reload           re-read the configuration file
  list             list configured processes
  history          show the commands entered so far
  help             show this message
  exit             stop every process and quit
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Start(String),
    Restart(String),
    Stop(String),
    Status(Option<String>),
    Reload,
    History,
    List,
    Exit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Command not found: {0}")]
    NotFound(String),

    #[error("usage: {0} <name>")]
    MissingName(&'static str),
}

impl Command {
    /// `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
        let not_found = || CommandError::NotFound(line.trim().to_string());
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let arg = words.next().map(String::from);
        if words.next().is_some() {
            return Err(not_found());
        }

        let cmd = match (verb, arg) {
            ("help", None) => Command::Help,
            ("start", Some(name)) => Command::Start(name),
            ("restart", Some(name)) => Command::Restart(name),
            ("stop", Some(name)) => Command::Stop(name),
            ("start", None) => return Err(CommandError::MissingName("start")),
            ("restart", None) => return Err(CommandError::MissingName("restart")),
            ("stop", None) => return Err(CommandError::MissingName("stop")),
            ("status", name) => Command::Status(name),
            ("reload", None) => Command::Reload,
            ("history", None) => Command::History,
            ("list", None) => Command::List,
            ("exit", None) => Command::Exit,
            _ => return Err(not_found()),
        };
        Ok(Some(cmd))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct Console {
    supervisor: Supervisor,
    history: Vec<String>,
}

impl Console {
    pub fn new(supervisor: Supervisor) -> Self {
        Self {
            supervisor,
            history: Vec::new(),
        }
    }

    /// Prompt, read and execute until `exit`, end of input, SIGINT or
    /// SIGTERM. SIGHUP only queues a notification here; the reload itself
    /// runs on this task.
    pub async fn run<W>(&mut self, mut lines: mpsc::Receiver<String>, out: &mut W) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let mut hangup = signal(SignalKind::hangup())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let mut interrupt = signal(SignalKind::interrupt())?;

        loop {
            out.write_all(PROMPT.as_bytes()).await?;
            out.flush().await?;

            tokio::select! {
                _ = hangup.recv() => {
                    info!("received SIGHUP, reloading");
                    out.write_all(b"\n").await?;
                    self.execute_command(Command::Reload, out).await?;
                }
                _ = terminate.recv() => {
                    info!("received SIGTERM");
                    break;
                }
                _ = interrupt.recv() => {
                    info!("received SIGINT");
                    break;
                }
                line = lines.recv() => match line {
                    Some(line) => {
                        if self.execute(&line, out).await? == Flow::Exit {
                            break;
                        }
                    }
                    None => {
                        out.write_all(b"\n").await?;
                        break;
                    }
                },
            }
        }
        out.flush().await?;
        Ok(())
    }

    /// Handle one input line, recording it in the history.
    pub async fn execute<W>(&mut self, line: &str, out: &mut W) -> Result<Flow>
    where
        W: AsyncWrite + Unpin,
    {
        let trimmed = line.trim();
        if !trimmed.is_empty() {
            self.history.push(trimmed.to_string());
        }
        match Command::parse(trimmed) {
            Ok(Some(cmd)) => self.execute_command(cmd, out).await,
            Ok(None) => Ok(Flow::Continue),
            Err(e) => {
                out.write_all(format!("{e}\n").as_bytes()).await?;
                Ok(Flow::Continue)
            }
        }
    }

    async fn execute_command<W>(&mut self, cmd: Command, out: &mut W) -> Result<Flow>
    where
        W: AsyncWrite + Unpin,
    {
        let sup = &self.supervisor;
        let text = match cmd {
            Command::Help => HELP.to_string(),
            Command::Start(name) => match sup.start(&name) {
                Ok(StartOutcome::Started) => success(&name, "starting"),
                Ok(StartOutcome::AlreadyRunning) => failure(&name, "already running"),
                Err(e) => failure("start", &e.to_string()),
            },
            Command::Stop(name) => match sup.stop(&name) {
                Ok(StopOutcome::SignalDelivered) => success(&name, "stopping"),
                Ok(StopOutcome::SignalFailed) => {
                    failure(&name, "signal failed, forcing SIGKILL after the grace period")
                }
                Ok(StopOutcome::NotRunning) => failure(&name, "is not running"),
                Err(e) => failure("stop", &e.to_string()),
            },
            Command::Restart(name) => match sup.restart(&name).await {
                Ok(_) => success(&name, "restarted"),
                Err(e) => failure("restart", &e.to_string()),
            },
            Command::Status(name) => match sup.status(name.as_deref()) {
                Ok(statuses) => render_status(&statuses)?,
                Err(e) => failure("status", &e.to_string()),
            },
            Command::Reload => match sup.reload().await {
                Ok(report) => {
                    let source = sup
                        .config_path()
                        .map(|p| p.display().to_string())
                        .unwrap_or_default();
                    success(
                        &source,
                        &format!(
                            "reloaded ({} registered, {} skipped, {} restarted)",
                            report.registered,
                            report.skipped,
                            report.relaunched.len()
                        ),
                    )
                }
                Err(e) => failure("reload", &e.to_string()),
            },
            Command::History => render_history(&self.history),
            Command::List => render_list(&sup.list()),
            Command::Exit => return Ok(Flow::Exit),
        };
        out.write_all(text.as_bytes()).await?;
        Ok(Flow::Continue)
    }
}

/// Forward stdin lines to the control task from a plain thread. A blocking
/// read cannot be cancelled, so it must not live on the runtime; the thread
/// simply dies with the process.
pub fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn success(source: &str, message: &str) -> String {
    format!("taskmaster: success: {source}: {message}\n")
}

fn failure(source: &str, message: &str) -> String {
    format!("taskmaster: error: {source}: {message}\n")
}

pub fn render_status(statuses: &[ProcessStatus]) -> Result<String> {
    let mut buf = Vec::new();
    {
        let mut tw = TabWriter::new(&mut buf).padding(2);
        writeln!(tw, "NAME\tSTATE\tPID\tUPTIME\tRUNS\tRESTARTS\tLAST EXIT\tLAST ERROR")?;
        for s in statuses {
            let pid = s.pid.map_or_else(|| "-".to_string(), |p| p.to_string());
            let uptime = s.uptime_secs.map_or_else(|| "-".to_string(), |u| format!("{u}s"));
            let restarts = match s.policy {
                RestartPolicy::Never => "-".to_string(),
                RestartPolicy::OnUnexpectedExit => format!("{}/{}", s.restarts, s.max_restarts),
                RestartPolicy::Always => s.restarts.to_string(),
            };
            let last_exit = match (s.last_exit_code, s.last_signal) {
                (Some(code), _) => format!("code {code}"),
                (None, Some(sig)) => format!("signal {sig}"),
                (None, None) => "-".to_string(),
            };
            writeln!(
                tw,
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                s.name,
                s.state,
                pid,
                uptime,
                s.runs,
                restarts,
                last_exit,
                s.last_error.as_deref().unwrap_or("-")
            )?;
        }
        tw.flush()?;
    }
    Ok(String::from_utf8(buf)?)
}

fn render_history(history: &[String]) -> String {
    let mut text = String::from("==== taskmaster command history ====\n");
    for (i, line) in history.iter().enumerate() {
        text.push_str(&format!("{:>4}  {line}\n", i + 1));
    }
    text
}

fn render_list(names: &[String]) -> String {
    let mut text = String::from("==== taskmaster configured programs list ====\n");
    for name in names {
        text.push_str(name);
        text.push('\n');
    }
    text
}
