//! Launching detached service processes and finding them again by command line.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use sysinfo::{Pid, ProcessStatus, System};
#[cfg(not(unix))]
use sysinfo::Signal;
use tokio::process::{Child, Command};
use tracing::debug;

#[cfg(windows)]
const CREATE_NEW_CONSOLE: u32 = 0x0000_0010;

/// How to launch a service process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Program to execute, resolved through `PATH` when not absolute.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Working directory of the process.
    pub working_dir: Option<PathBuf>,
    /// Run in its own process group (Unix) or console (Windows).
    pub detached: bool,
}

impl LaunchSpec {
    /// Create a launch spec for `program` with no arguments.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            detached: true,
        }
    }

    /// Parse a whitespace separated command line such as `ollama serve`.
    ///
    /// Returns `None` for an empty command.
    pub fn from_command_line(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
            working_dir: None,
            detached: true,
        })
    }

    /// Append an argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Set the working directory.
    pub fn in_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Keep the process attached to our process group.
    pub fn attached(mut self) -> Self {
        self.detached = false;
        self
    }

    /// The command line as a single string, for logs.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Spawn the process with stdio discarded.
    pub fn spawn(&self) -> std::io::Result<Child> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(false);

        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }

        if self.detached {
            #[cfg(unix)]
            command.process_group(0);
            #[cfg(windows)]
            command.creation_flags(CREATE_NEW_CONSOLE);
        }

        command.spawn()
    }

    /// Whether a running process with the given command line and working
    /// directory was started from this spec.
    pub fn matches(&self, cmd: &[String], cwd: Option<&Path>) -> bool {
        let Some((program, args)) = cmd.split_first() else {
            return false;
        };

        if program_stem(program) != program_stem(&self.program) || args != self.args.as_slice() {
            return false;
        }

        match (&self.working_dir, cwd) {
            (None, _) => true,
            (Some(expected), Some(actual)) => {
                let expected = std::fs::canonicalize(expected).unwrap_or_else(|_| expected.clone());
                expected == actual
            }
            (Some(_), None) => false,
        }
    }
}

fn program_stem(program: &str) -> &str {
    Path::new(program)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(program)
}

/// Scan the process table for processes launched from `spec`.
///
/// The current process is never included.
pub fn find_matching(spec: &LaunchSpec) -> Vec<u32> {
    let sys = System::new_all();
    let own_pid = std::process::id();

    sys.processes()
        .iter()
        .filter(|(_, process)| process.status() != ProcessStatus::Zombie)
        .filter(|(_, process)| spec.matches(process.cmd(), process.cwd()))
        .map(|(pid, _)| pid.as_u32())
        .filter(|pid| *pid != own_pid)
        .collect()
}

/// Ask a process to terminate.
///
/// Sends SIGTERM on Unix, to the whole process group when `pid` leads one;
/// elsewhere this is a hard kill. Returns `false` when the signal could not be
/// delivered.
pub fn request_terminate(pid: u32) -> bool {
    #[cfg(unix)]
    {
        signal_tree(pid, libc::SIGTERM)
    }
    #[cfg(not(unix))]
    {
        with_process(pid, |process| {
            process.kill_with(Signal::Term).unwrap_or_else(|| process.kill())
        })
        .unwrap_or(false)
    }
}

/// Kill a process outright, together with its process group when it leads one.
pub fn force_kill(pid: u32) -> bool {
    #[cfg(unix)]
    {
        signal_tree(pid, libc::SIGKILL)
    }
    #[cfg(not(unix))]
    {
        with_process(pid, |process| {
            process.kill_with(Signal::Kill).unwrap_or_else(|| process.kill())
        })
        .unwrap_or(false)
    }
}

/// Signal `pid`, or its whole group if it is a group leader other than ours.
///
/// Detached services are spawned as group leaders, so this also reaches the
/// workers they fork.
#[cfg(unix)]
fn signal_tree(pid: u32, signal: libc::c_int) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // pid 0 and negative values address groups implicitly.
    if pid <= 0 {
        return false;
    }

    // SAFETY: getpgid, getpgrp, killpg and kill take plain integers and touch no memory.
    unsafe {
        let group = libc::getpgid(pid);
        if group == pid && group != libc::getpgrp() {
            debug!("Signalling process group {}", group);
            libc::killpg(group, signal) == 0
        } else {
            libc::kill(pid, signal) == 0
        }
    }
}

/// Whether a process with this PID exists and is not a zombie.
pub fn is_alive(pid: u32) -> bool {
    with_process(pid, |process| process.status() != ProcessStatus::Zombie).unwrap_or(false)
}

fn with_process<T>(pid: u32, f: impl FnOnce(&sysinfo::Process) -> T) -> Option<T> {
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    if !sys.refresh_process(pid) {
        debug!("Process {} not found", pid);
        return None;
    }
    sys.process(pid).map(f)
}
