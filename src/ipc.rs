//! Running external programs.
//!
//! Every child spawned here is owned by a [`Subprocess`] guard, which waits
//! for it on drop. Callers that care about the exit status call
//! [`Subprocess::wait`] explicitly; everyone else still gets the child reaped
//! on early return or unwinding.

use std::ffi::OsStr;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::{Child, ChildStdout, Command, ExitStatus, Output, Stdio};

use thiserror::Error;
use tracing::debug;

/// Errors from external program invocations.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("External tool not found: {0}")]
    NotFound(String),

    #[error("{program} failed ({status}){}", format_stderr(.stderr))]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

fn format_stderr(stderr: &str) -> String {
    let stderr = stderr.trim();
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr)
    }
}

impl ProcessError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ProcessError::NotFound(_))
    }
}

/// Locate a program in PATH (or validate an explicit path) and build a command for it.
pub fn command(program: impl AsRef<OsStr>) -> Result<Command, ProcessError> {
    let program = program.as_ref();
    let resolved: PathBuf = which::which(program)
        .map_err(|_| ProcessError::NotFound(program.to_string_lossy().into_owned()))?;
    Ok(Command::new(resolved))
}

fn describe(cmd: &Command) -> String {
    std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|s| s.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

fn program_name(cmd: &Command) -> String {
    let program = PathBuf::from(cmd.get_program());
    program
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.to_string_lossy().into_owned())
}

fn spawn_error(cmd: &Command, e: io::Error) -> ProcessError {
    if e.kind() == io::ErrorKind::NotFound {
        ProcessError::NotFound(program_name(cmd))
    } else {
        ProcessError::Io(e)
    }
}

/// Run a command to completion, capturing stdout and stderr without checking the status.
pub fn run_captured(mut cmd: Command) -> Result<Output, ProcessError> {
    debug!("Running {}", describe(&cmd));
    cmd.stdin(Stdio::null())
        .output()
        .map_err(|e| spawn_error(&cmd, e))
}

/// Run a command to completion and fail unless it exits successfully.
pub fn run_checked(cmd: Command) -> Result<Output, ProcessError> {
    let program = program_name(&cmd);
    let output = run_captured(cmd)?;
    if output.status.success() {
        Ok(output)
    } else {
        Err(ProcessError::Failed {
            program,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// A running child process with its stdout piped back to us.
pub struct Subprocess {
    program: String,
    child: Child,
    stdout: Option<ChildStdout>,
    reaped: bool,
}

impl Subprocess {
    /// Spawn `cmd` with stdin closed and stdout piped. Stderr is left as configured.
    pub fn spawn(mut cmd: Command) -> Result<Self, ProcessError> {
        debug!("Spawning {}", describe(&cmd));
        cmd.stdin(Stdio::null()).stdout(Stdio::piped());
        let mut child = cmd.spawn().map_err(|e| spawn_error(&cmd, e))?;
        let stdout = child.stdout.take();
        Ok(Self {
            program: program_name(&cmd),
            child,
            stdout,
            reaped: false,
        })
    }

    /// Take ownership of the stdout pipe. Subsequent reads through `Read` return EOF.
    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.stdout.take()
    }

    /// Close our end of the pipe and wait for the child, returning its exit status.
    pub fn wait_status(mut self) -> Result<ExitStatus, ProcessError> {
        self.stdout = None;
        let status = self.child.wait()?;
        self.reaped = true;
        Ok(status)
    }

    /// Close our end of the pipe and wait for the child, failing on a non-zero exit.
    pub fn wait(self) -> Result<(), ProcessError> {
        let program = self.program.clone();
        let status = self.wait_status()?;
        if status.success() {
            Ok(())
        } else {
            Err(ProcessError::Failed {
                program,
                status,
                stderr: String::new(),
            })
        }
    }
}

impl Read for Subprocess {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stdout.as_mut() {
            Some(stdout) => stdout.read(buf),
            None => Ok(0),
        }
    }
}

impl Drop for Subprocess {
    fn drop(&mut self) {
        if !self.reaped {
            // Closing the pipe first keeps a child blocked on a full pipe from hanging us.
            self.stdout = None;
            if let Err(e) = self.child.wait() {
                debug!("Failed to reap {}: {}", self.program, e);
            }
        }
    }
}
