// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! The registry of supervised processes and the per-process
//! launch, monitor and decide cycle.
//!
//! Every entry is keyed by name and guarded by one registry mutex. The
//! mutex is never held across an `.await`: a cycle task locks only to read
//! its spec or to record a transition. Each entry carries a generation
//! number; a cycle task whose generation no longer matches (the entry was
//! replaced by a reload) stops touching it.

use crate::config;
use crate::error::{ConfigError, EntryError, SupervisorError};
use crate::launcher::{self, Launched};
use crate::monitor::{self, Verdict};
use crate::policy::{Action, RestartPolicy, next_action};
use crate::process_spec::ProcessSpec;
use crate::shutdown;
use crate::state::{ProcessState, ProcessStatus, RunState};
use crate::terminator::{self, StopOutcome};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};
use taskmaster_log::EventLog;
use tokio::task::JoinHandle;

/// Minimum pause between relaunches of a program that cannot be executed
/// at all under [`RestartPolicy::Always`].
const LAUNCH_FAILURE_BACKOFF: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyRunning,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Configuration entries accepted (replicas count once).
    pub registered: usize,
    pub skipped: usize,
    /// Names stopped and relaunched because a launch-time field changed.
    pub relaunched: Vec<String>,
}

impl LoadReport {
    pub fn is_valid(&self) -> bool {
        self.registered > 0
    }
}

struct Entry {
    spec: Arc<ProcessSpec>,
    state: ProcessState,
    generation: u64,
    /// Set by an operator stop; the cycle ends instead of consulting the
    /// restart policy.
    stop_requested: bool,
    cycle: Option<JoinHandle<()>>,
}

impl Entry {
    fn new(spec: Arc<ProcessSpec>, generation: u64) -> Self {
        Self {
            spec,
            state: ProcessState::new(),
            generation,
            stop_requested: false,
            cycle: None,
        }
    }

    fn status(&self, name: &str, now: SystemTime) -> ProcessStatus {
        let uptime_secs = self
            .state
            .exec_confirmed_at()
            .filter(|_| self.state.is_alive())
            .and_then(|t| now.duration_since(t).ok())
            .map(|d| d.as_secs());
        ProcessStatus {
            name: name.to_string(),
            state: self.state.run_state(),
            pid: self.state.pid(),
            runs: self.state.run_count(),
            restarts: self.state.restarts_so_far(),
            max_restarts: self.spec.max_restarts,
            policy: self.spec.restart_policy,
            last_exit_code: self.state.last_exit_code(),
            last_signal: self.state.last_signal(),
            last_error: self.state.last_error().map(String::from),
            uptime_secs,
        }
    }
}

/// Identifies the run a delayed SIGKILL is aimed at.
struct Escalation {
    pid: u32,
    run: u64,
    generation: u64,
    grace: Duration,
}

struct Inner {
    registry: Mutex<HashMap<String, Entry>>,
    events: Arc<EventLog>,
    config_path: Mutex<Option<PathBuf>>,
    config_valid: AtomicBool,
    generations: AtomicU64,
}

impl Inner {
    fn registry(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::Relaxed)
    }

    /// Run `f` on the entry if it still belongs to `generation`.
    fn with_entry<R>(&self, name: &str, generation: u64, f: impl FnOnce(&mut Entry) -> R) -> Option<R> {
        let mut registry = self.registry();
        registry
            .get_mut(name)
            .filter(|entry| entry.generation == generation)
            .map(f)
    }
}

/// Cheap-to-clone handle on the process registry.
#[derive(Clone)]
pub struct Supervisor {
    inner: Arc<Inner>,
}

impl Supervisor {
    pub fn new(events: Arc<EventLog>) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(HashMap::new()),
                events,
                config_path: Mutex::new(None),
                config_valid: AtomicBool::new(false),
                generations: AtomicU64::new(0),
            }),
        }
    }

    pub fn events(&self) -> &EventLog {
        &self.inner.events
    }

    /// True when the last configuration load registered at least one entry.
    pub fn is_config_valid(&self) -> bool {
        self.inner.config_valid.load(Ordering::Relaxed)
    }

    pub fn config_path(&self) -> Option<PathBuf> {
        self.inner
            .config_path
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Load `path` and reconcile it against the registry. Entry-level
    /// problems are logged and skipped; only an unreadable or unparsable
    /// file is an error.
    pub async fn load_config(
        &self,
        path: &Path,
        override_existing: bool,
    ) -> Result<LoadReport, SupervisorError> {
        *self
            .inner
            .config_path
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(path.to_path_buf());

        let entries = match config::load_file(path) {
            Ok(entries) => entries,
            Err(e) => {
                self.events().error(&path.display().to_string(), &e.to_string());
                return Err(e.into());
            }
        };
        let report = self.apply(entries, override_existing).await;
        self.inner
            .config_valid
            .store(report.is_valid(), Ordering::Relaxed);
        info!(
            "loaded {}: {} registered, {} skipped, {} relaunched",
            path.display(),
            report.registered,
            report.skipped,
            report.relaunched.len()
        );
        Ok(report)
    }

    /// Re-read the last loaded file, overriding existing entries.
    pub async fn reload(&self) -> Result<LoadReport, SupervisorError> {
        let path = self.config_path().ok_or(SupervisorError::NoConfig)?;
        self.events()
            .status(&format!("Reloading configuration from {}", path.display()));
        self.load_config(&path, true).await
    }

    /// Reconcile parsed entries against the registry.
    ///
    /// New names are registered. For existing names, launch-time changes
    /// stop the live process and relaunch it under the new spec once every
    /// entry has been processed; other changes apply silently and are picked
    /// up at the next restart decision. Names absent from `entries` are left
    /// alone.
    pub async fn apply(
        &self,
        entries: Vec<Result<ProcessSpec, EntryError>>,
        override_existing: bool,
    ) -> LoadReport {
        let mut report = LoadReport::default();
        let mut seen: HashSet<String> = HashSet::new();
        let mut replacements: Vec<(String, Arc<ProcessSpec>)> = Vec::new();

        for entry in entries {
            let spec = match entry {
                Ok(spec) => spec,
                Err(EntryError { source_name, error }) => {
                    self.events().error(&source_name, &error.to_string());
                    report.skipped += 1;
                    continue;
                }
            };

            let names = spec.replica_names();
            if names.iter().any(|n| seen.contains(n)) {
                self.events()
                    .error(&spec.name, &ConfigError::Duplicate.to_string());
                report.skipped += 1;
                continue;
            }

            {
                let mut registry = self.inner.registry();
                if !override_existing && names.iter().any(|n| registry.contains_key(n)) {
                    drop(registry);
                    self.events()
                        .error(&spec.name, &ConfigError::Duplicate.to_string());
                    report.skipped += 1;
                    continue;
                }
                for name in &names {
                    let replica = Arc::new(spec.with_name(name.clone()));
                    match registry.get_mut(name) {
                        Some(existing) if existing.spec.requires_relaunch(&replica) => {
                            replacements.push((name.clone(), replica));
                        }
                        Some(existing) => existing.spec = replica,
                        None => {
                            let generation = self.inner.next_generation();
                            registry.insert(name.clone(), Entry::new(replica, generation));
                        }
                    }
                }
            }

            debug!("[{}] registered ({} instance(s))", spec.name, names.len());
            seen.extend(names);
            report.registered += 1;
        }

        for (name, spec) in replacements {
            if self.replace(&name, spec).await {
                report.relaunched.push(name);
            }
        }
        report
    }

    /// Swap in a new spec generation for `name`, stopping the old OS process
    /// first. Returns whether a relaunch happened.
    async fn replace(&self, name: &str, spec: Arc<ProcessSpec>) -> bool {
        let was_active = self
            .inner
            .registry()
            .get(name)
            .is_some_and(|e| e.state.run_state().is_active());

        if was_active {
            self.events()
                .success(name, "Configuration changed, restarting process.");
            if let Err(e) = self.stop_and_wait(name).await {
                warn!("[{name}] {e}");
            }
        }

        {
            let mut registry = self.inner.registry();
            let generation = self.inner.next_generation();
            registry.insert(name.to_string(), Entry::new(spec, generation));
        }

        if was_active && let Err(e) = self.start(name) {
            warn!("[{name}] relaunch after reload failed: {e}");
        }
        was_active
    }

    /// Start the launch cycle for `name`. A no-op if it is already running
    /// or about to be.
    pub fn start(&self, name: &str) -> Result<StartOutcome, SupervisorError> {
        let mut registry = self.inner.registry();
        let entry = registry
            .get_mut(name)
            .ok_or_else(|| SupervisorError::UnknownProcess(name.to_string()))?;

        if entry.state.run_state().is_active() {
            debug!("[{name}] start requested but already {}", entry.state.run_state());
            return Ok(StartOutcome::AlreadyRunning);
        }

        entry.state.mark_launching()?;
        entry.state.reset_restarts();
        entry.stop_requested = false;
        let handle = tokio::spawn(run_cycle(
            Arc::clone(&self.inner),
            name.to_string(),
            entry.generation,
        ));
        entry.cycle = Some(handle);
        Ok(StartOutcome::Started)
    }

    /// Start every entry configured with `exec_on_startup`.
    pub fn start_auto_start(&self) -> usize {
        let names: Vec<String> = {
            let registry = self.inner.registry();
            let mut names: Vec<String> = registry
                .iter()
                .filter(|(_, e)| e.spec.auto_start)
                .map(|(n, _)| n.clone())
                .collect();
            names.sort();
            names
        };
        names
            .iter()
            .filter(|name| matches!(self.start(name), Ok(StartOutcome::Started)))
            .count()
    }

    /// Ask `name` to stop with its configured signal. Returns once the
    /// signal is sent; a SIGKILL follows after the grace period if the same
    /// run is still alive.
    pub fn stop(&self, name: &str) -> Result<StopOutcome, SupervisorError> {
        enum Requested {
            Signalled(StopOutcome, i32, Option<Escalation>),
            PendingCancelled,
            Idle,
        }

        let requested = {
            let mut registry = self.inner.registry();
            let entry = registry
                .get_mut(name)
                .ok_or_else(|| SupervisorError::UnknownProcess(name.to_string()))?;
            match entry.state.run_state() {
                RunState::Running => {
                    entry.stop_requested = true;
                    let pid = entry.state.pid();
                    let outcome = terminator::stop(pid, entry.spec.kill_signal);
                    let escalation = pid
                        .filter(|_| outcome != StopOutcome::NotRunning)
                        .map(|pid| Escalation {
                            pid,
                            run: entry.state.run_count(),
                            generation: entry.generation,
                            grace: entry.spec.force_kill_grace,
                        });
                    Requested::Signalled(outcome, entry.spec.kill_signal as i32, escalation)
                }
                RunState::Launching => {
                    entry.stop_requested = true;
                    Requested::PendingCancelled
                }
                _ => Requested::Idle,
            }
        };

        match requested {
            Requested::Signalled(outcome, sig, escalation) => {
                match outcome {
                    StopOutcome::SignalDelivered => {
                        self.events().success(name, &format!("Sent signal {sig}."));
                    }
                    _ => self.events().error(
                        name,
                        &format!(
                            "kill({sig}) did not return as expected. Force quitting (using SIGKILL)."
                        ),
                    ),
                }
                if let Some(escalation) = escalation {
                    tokio::spawn(escalate(
                        Arc::clone(&self.inner),
                        name.to_string(),
                        escalation,
                        outcome,
                    ));
                }
                Ok(outcome)
            }
            Requested::PendingCancelled => {
                self.events().success(name, "Pending launch cancelled.");
                Ok(StopOutcome::NotRunning)
            }
            Requested::Idle => {
                self.events().error(name, "is not running.");
                Ok(StopOutcome::NotRunning)
            }
        }
    }

    /// Stop `name` if needed and wait for its cycle task to finish.
    pub(crate) async fn stop_and_wait(&self, name: &str) -> Result<(), SupervisorError> {
        let active = self
            .inner
            .registry()
            .get(name)
            .map(|e| e.state.run_state().is_active())
            .ok_or_else(|| SupervisorError::UnknownProcess(name.to_string()))?;
        if active {
            self.stop(name)?;
        }
        if let Some((handle, grace)) = self.take_cycle(name) {
            shutdown::wait_for_cycle(name, handle, grace).await;
        }
        Ok(())
    }

    /// Stop, wait for the run to end, then start again.
    pub async fn restart(&self, name: &str) -> Result<StartOutcome, SupervisorError> {
        self.stop_and_wait(name).await?;
        self.start(name)
    }

    /// Snapshot of one entry, or of all of them sorted by name.
    pub fn status(&self, name: Option<&str>) -> Result<Vec<ProcessStatus>, SupervisorError> {
        let registry = self.inner.registry();
        let now = SystemTime::now();
        match name {
            Some(name) => registry
                .get(name)
                .map(|e| vec![e.status(name, now)])
                .ok_or_else(|| SupervisorError::UnknownProcess(name.to_string())),
            None => {
                let mut all: Vec<ProcessStatus> =
                    registry.iter().map(|(n, e)| e.status(n, now)).collect();
                all.sort_by(|a, b| a.name.cmp(&b.name));
                Ok(all)
            }
        }
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.registry().keys().cloned().collect();
        names.sort();
        names
    }

    /// Stop everything, escalating to SIGKILL after each grace period.
    /// Returns how many processes were stopped.
    pub async fn shutdown(&self) -> usize {
        shutdown::shutdown_all(self).await
    }

    pub(crate) fn active_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .registry()
            .iter()
            .filter(|(_, e)| e.state.run_state().is_active())
            .map(|(n, _)| n.clone())
            .collect();
        names.sort();
        names
    }

    pub(crate) fn take_cycle(&self, name: &str) -> Option<(JoinHandle<()>, Duration)> {
        let mut registry = self.inner.registry();
        let entry = registry.get_mut(name)?;
        let grace = entry.spec.force_kill_grace;
        entry.cycle.take().map(|handle| (handle, grace))
    }
}

async fn escalate(inner: Arc<Inner>, name: String, esc: Escalation, first: StopOutcome) {
    tokio::time::sleep(esc.grace).await;
    // Kill under the lock so the run cannot be recorded as exited in between.
    let killed = inner.with_entry(&name, esc.generation, |entry| {
        if entry.state.is_alive() && entry.state.run_count() == esc.run {
            Some(terminator::force_kill(esc.pid))
        } else {
            None
        }
    });
    if let Some(Some(outcome)) = killed {
        warn!(
            "[{name}] stop timeout ({}s) reached, sent SIGKILL: {outcome:?}",
            esc.grace.as_secs_f64()
        );
        if first == StopOutcome::SignalDelivered {
            inner.events.error(
                &name,
                "Did not stop in time. Force quitting (using SIGKILL).",
            );
        }
    }
}

/// Launch, wait, decide; repeat while the restart policy says so.
async fn run_cycle(inner: Arc<Inner>, name: String, generation: u64) {
    loop {
        let spec = inner.with_entry(&name, generation, |entry| {
            if entry.stop_requested {
                if let Err(e) = entry.state.mark_cancelled() {
                    warn!("[{}] {e}", entry.spec.name);
                }
                None
            } else {
                Some(Arc::clone(&entry.spec))
            }
        });
        let Some(Some(spec)) = spec else {
            return;
        };

        let verdict = match launcher::launch(&spec) {
            Ok(launched) => supervise_run(&inner, &name, generation, &spec, launched).await,
            Err(e) => {
                inner
                    .events
                    .error(&name, &format!("Did not start. strerror: {e}"));
                inner.with_entry(&name, generation, |entry| {
                    if let Err(err) = entry.state.mark_launch_failed(e.to_string()) {
                        warn!("[{name}] {err}");
                    }
                });
                Verdict::launch_failure()
            }
        };

        let decision = inner.with_entry(&name, generation, |entry| {
            let stopped = entry.stop_requested;
            if !verdict.launch_failed
                && let Err(e) = entry.state.mark_exited(&verdict, stopped)
            {
                warn!("[{name}] {e}");
            }
            let action = if stopped {
                Action::Stop
            } else {
                next_action(
                    entry.spec.restart_policy,
                    &verdict,
                    entry.state.restarts_so_far(),
                    entry.spec.max_restarts,
                )
            };
            if action == Action::Relaunch {
                entry.state.record_restart();
                if let Err(e) = entry.state.mark_launching() {
                    warn!("[{name}] {e}");
                }
            }
            (action, stopped, Arc::clone(&entry.spec), entry.state.restarts_so_far())
        });
        let Some((action, stopped, spec, restarts)) = decision else {
            debug!("[{name}] entry replaced, ending superseded cycle");
            return;
        };

        if !verdict.launch_failed {
            if stopped {
                let how = match (verdict.signal, verdict.exit_code) {
                    (Some(sig), _) => format!("signal {sig}"),
                    (None, Some(code)) => format!("exit code {code}"),
                    (None, None) => "unknown status".to_string(),
                };
                inner
                    .events
                    .success(&name, &format!("Stopped by operator ({how})."));
            } else {
                monitor::report(&inner.events, &spec, &verdict);
            }
        }

        match action {
            Action::Stop => {
                if !stopped
                    && !verdict.is_success()
                    && spec.restart_policy == RestartPolicy::OnUnexpectedExit
                    && spec.max_restarts > 0
                {
                    inner
                        .events
                        .error(&name, &format!("Gave up after {restarts} restart(s)."));
                }
                return;
            }
            Action::Relaunch => {
                let mut delay = spec.restart_delay;
                if verdict.launch_failed && spec.restart_policy == RestartPolicy::Always {
                    delay = delay.max(LAUNCH_FAILURE_BACKOFF);
                }
                let attempt = match spec.restart_policy {
                    RestartPolicy::Always => format!("attempt {restarts}"),
                    _ => format!("attempt {restarts}/{}", spec.max_restarts),
                };
                info!("[{name}] relaunching ({attempt}) in {}ms", delay.as_millis());
                inner
                    .events
                    .success(&name, &format!("Restarting ({attempt})."));
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Record the run as started, then wait for it to end.
async fn supervise_run(
    inner: &Arc<Inner>,
    name: &str,
    generation: u64,
    spec: &ProcessSpec,
    mut launched: Launched,
) -> Verdict {
    let pid = launched.pid;
    let recorded = inner.with_entry(name, generation, |entry| {
        if let Err(e) =
            entry
                .state
                .mark_running(pid, launched.launched_at, launched.exec_confirmed_at)
        {
            warn!("[{name}] {e}");
        }
        (entry.stop_requested, entry.state.run_count())
    });
    inner.events.success(name, &format!("Started (pid {pid})."));

    match recorded {
        Some((false, _)) => {}
        // A stop arrived while spawning. It gets the same SIGKILL fallback
        // as a stop of a running process.
        Some((true, run)) => {
            debug!("[{name}] stop requested during launch, signalling pid {pid}");
            let outcome = terminator::stop(Some(pid), spec.kill_signal);
            tokio::spawn(escalate(
                Arc::clone(inner),
                name.to_string(),
                Escalation {
                    pid,
                    run,
                    generation,
                    grace: spec.force_kill_grace,
                },
                outcome,
            ));
        }
        // The entry was replaced under us and no longer tracks this run.
        None => {
            terminator::stop(Some(pid), spec.kill_signal);
            if tokio::time::timeout(spec.force_kill_grace, launched.child.wait())
                .await
                .is_err()
            {
                warn!("[{name}] superseded run did not stop in time, sending SIGKILL");
                terminator::force_kill(pid);
            }
        }
    }

    match monitor::await_exit(&mut launched.child, launched.exec_confirmed_at, spec).await {
        Ok(verdict) => verdict,
        Err(e) => {
            warn!("[{name}] error waiting for process exit, treating as failure: {e}");
            Verdict::lost()
        }
    }
}
