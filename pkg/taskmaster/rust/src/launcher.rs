// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

//! Turning a [`ProcessSpec`] into a running child.
//!
//! The exec outcome is reported synchronously. std's spawn forks with a
//! close-on-exec pipe shared between parent and child: a successful exec
//! closes it and the parent reads EOF, while a failure in a pre-exec step or
//! in exec itself writes the child's errno into it before `_exit`. So
//! `spawn()` returning `Ok` means the target program is running, and an
//! `Err` carrying an OS error is the child's errno. The failed child has
//! already been reaped by then, so a failed launch leaves no process behind.

use crate::env::effective_environment;
use crate::error::LaunchError;
use crate::process_spec::ProcessSpec;
use log::info;
use nix::sys::stat::{Mode, umask};
use nix::unistd::setsid;
use std::fs::File;
use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::SystemTime;
use tokio::process::{Child, Command};

pub struct Launched {
    pub child: Child,
    pub pid: u32,
    pub launched_at: SystemTime,
    pub exec_confirmed_at: SystemTime,
}

pub fn launch(spec: &ProcessSpec) -> Result<Launched, LaunchError> {
    let mut cmd = Command::new(&spec.executable);
    cmd.arg0(&spec.name)
        .args(&spec.args)
        .env_clear()
        .envs(effective_environment(std::env::vars_os(), &spec.env))
        .stdin(Stdio::null())
        .kill_on_drop(false);

    if let Some(dir) = &spec.working_dir {
        cmd.current_dir(dir);
    }

    match &spec.output_redirect {
        Some(path) => {
            let (stdout, stderr) = open_redirect(path)?;
            cmd.stdout(stdout).stderr(stderr);
        }
        None => {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }
    }

    let mask = spec
        .umask
        .map(|bits| Mode::from_bits_truncate(bits as nix::libc::mode_t));

    // SAFETY: the hook runs in the forked child before exec and only makes
    // async-signal-safe syscalls (setsid, umask). No allocation, no locks.
    unsafe {
        cmd.pre_exec(move || {
            // Own session: terminal signals aimed at the supervisor do not
            // reach the child.
            setsid().map_err(io::Error::from)?;
            if let Some(mask) = mask {
                umask(mask);
            }
            Ok(())
        });
    }

    let launched_at = SystemTime::now();
    let child = cmd.spawn().map_err(spawn_error)?;
    let exec_confirmed_at = SystemTime::now();

    // `id()` is only `None` once the child has been polled to completion.
    let pid = child
        .id()
        .ok_or_else(|| LaunchError::Spawn(io::Error::other("child exited before its pid was read")))?;

    info!(
        "[{}] spawned (pid={}, cmd={})",
        spec.name,
        pid,
        spec.executable.display()
    );

    Ok(Launched {
        child,
        pid,
        launched_at,
        exec_confirmed_at,
    })
}

/// Stdout and stderr handles sharing one truncated file description, so
/// interleaved writes never overwrite each other.
fn open_redirect(path: &Path) -> Result<(File, File), LaunchError> {
    let redirect_error = |source| LaunchError::Redirect {
        path: path.to_path_buf(),
        source,
    };
    let stdout = File::create(path).map_err(redirect_error)?;
    let stderr = stdout.try_clone().map_err(redirect_error)?;
    Ok((stdout, stderr))
}

fn spawn_error(err: io::Error) -> LaunchError {
    match err.raw_os_error() {
        Some(errno) => LaunchError::Exec { errno, source: err },
        None => LaunchError::Spawn(err),
    }
}
