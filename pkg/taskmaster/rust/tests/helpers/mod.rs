// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Handle to a running taskmaster daemon driven over stdin.
pub struct DaemonHandle {
    child: Child,
    stdin: Option<ChildStdin>,
    config_path: PathBuf,
    event_log: PathBuf,
    output: Arc<Mutex<String>>,
    _stdout_thread: std::thread::JoinHandle<()>,
    _stderr_thread: std::thread::JoinHandle<()>,
}

impl DaemonHandle {
    /// Write `yaml` as the configuration in `dir` and start the daemon on it.
    pub fn start(dir: &Path, yaml: &str) -> Self {
        let config_path = dir.join("taskmaster.yaml");
        write_config(&config_path, yaml);
        Self::start_with(&config_path, &dir.join("taskmaster.log"))
    }

    pub fn start_with(config_path: &Path, event_log: &Path) -> Self {
        let bin = env!("CARGO_BIN_EXE_taskmaster");
        let mut child = Command::new(bin)
            .arg("--config")
            .arg(config_path)
            .arg("--log-file")
            .arg(event_log)
            .arg("--log-level")
            .arg("info")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("failed to start taskmaster");

        let stdin = child.stdin.take();
        let stdout = child.stdout.take().expect("failed to capture stdout");
        let stderr = child.stderr.take().expect("failed to capture stderr");
        let output = Arc::new(Mutex::new(String::new()));
        let out_clone = Arc::clone(&output);

        // The prompt is not newline-terminated, so read raw chunks.
        let stdout_thread = std::thread::spawn(move || {
            let mut reader = BufReader::new(stdout);
            loop {
                let (chunk, n) = match reader.fill_buf() {
                    Ok([]) | Err(_) => break,
                    Ok(buf) => (String::from_utf8_lossy(buf).into_owned(), buf.len()),
                };
                reader.consume(n);
                out_clone.lock().unwrap().push_str(&chunk);
            }
        });

        let stderr_thread = std::thread::spawn(move || {
            for line in BufReader::new(stderr).lines() {
                match line {
                    Ok(l) => eprintln!("[daemon:err] {l}"),
                    Err(_) => break,
                }
            }
        });

        Self {
            child,
            stdin,
            config_path: config_path.to_path_buf(),
            event_log: event_log.to_path_buf(),
            output,
            _stdout_thread: stdout_thread,
            _stderr_thread: stderr_thread,
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Type one line at the prompt.
    pub fn send_command(&mut self, line: &str) {
        let stdin = self.stdin.as_mut().expect("stdin already closed");
        writeln!(stdin, "{line}").expect("failed to write command");
        stdin.flush().expect("failed to flush command");
    }

    /// Close stdin, which the daemon treats as `exit`.
    pub fn close_stdin(&mut self) {
        self.stdin.take();
    }

    pub fn output(&self) -> String {
        self.output.lock().unwrap().clone()
    }

    pub fn wait_for_output(&self, pattern: &str, timeout: Duration) -> bool {
        wait_until(timeout, || self.output().contains(pattern))
    }

    pub fn events(&self) -> Vec<String> {
        std::fs::read_to_string(&self.event_log)
            .unwrap_or_default()
            .lines()
            .map(String::from)
            .collect()
    }

    pub fn count_events(&self, pattern: &str) -> usize {
        self.events().iter().filter(|l| l.contains(pattern)).count()
    }

    /// Wait until an event log line containing `pattern` appears.
    pub fn wait_for_event(&self, pattern: &str) -> bool {
        self.wait_for_event_count(pattern, 1, DEFAULT_TIMEOUT)
    }

    pub fn wait_for_event_count(&self, pattern: &str, n: usize, timeout: Duration) -> bool {
        wait_until(timeout, || self.count_events(pattern) >= n)
    }

    /// PIDs from "Started (pid N)." events, in order.
    pub fn started_pids(&self) -> Vec<u32> {
        self.events()
            .iter()
            .filter_map(|l| {
                let marker = "Started (pid ";
                let start = l.find(marker)? + marker.len();
                let end = l[start..].find(|c: char| !c.is_ascii_digit())? + start;
                l[start..end].parse().ok()
            })
            .collect()
    }

    pub fn send_signal(&self, sig: Signal) {
        let pid = self.child.id() as i32;
        signal::kill(Pid::from_raw(pid), sig).expect("failed to send signal to daemon");
    }

    /// Type `exit` and wait for the daemon to finish.
    pub fn exit(&mut self) -> ExitStatus {
        self.send_command("exit");
        self.wait_with_timeout(Duration::from_secs(30))
    }

    pub fn wait_with_timeout(&mut self, timeout: Duration) -> ExitStatus {
        let deadline = Instant::now() + timeout;
        loop {
            match self
                .child
                .try_wait()
                .expect("failed to check daemon status")
            {
                Some(status) => return status,
                None => {
                    if Instant::now() >= deadline {
                        self.child.kill().ok();
                        return self.child.wait().expect("failed to wait on killed daemon");
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
            }
        }
    }
}

impl Drop for DaemonHandle {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

pub fn write_config(path: &Path, yaml: &str) {
    std::fs::write(path, yaml)
        .unwrap_or_else(|e| panic!("failed to write {}: {e}", path.display()));
}

pub fn pid_is_alive(pid: u32) -> bool {
    signal::kill(Pid::from_raw(pid as i32), None).is_ok()
}

pub fn wait_for_pid_gone(pid: u32, timeout: Duration) -> bool {
    wait_until(timeout, || !pid_is_alive(pid))
}

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if done() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}
