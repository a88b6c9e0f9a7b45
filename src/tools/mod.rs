// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Running external radio-astronomy packages.
//!
//! Pipeline stages never assemble shell strings themselves. A typed task
//! (see [`miriad`] and [`casa`]) is validated and turned into a
//! [`ToolCommand`], which a [`ToolRunner`] executes. [`SystemRunner`] runs
//! real processes; tests substitute their own runners.

pub mod casa;
mod error;
pub mod miriad;

pub use error::ToolError;

use std::{
    fmt,
    io::Read,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};

use log::{debug, trace, warn};

/// How often a running process is polled for completion.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A fully-specified invocation of an external program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,

    /// The directory to run in. If not set, the current directory is used.
    pub workdir: Option<PathBuf>,

    /// Kill the process if it runs longer than this.
    pub timeout: Option<Duration>,
}

impl ToolCommand {
    pub fn new<S: Into<String>>(program: S) -> ToolCommand {
        ToolCommand {
            program: program.into(),
            args: vec![],
            workdir: None,
            timeout: None,
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> ToolCommand {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> ToolCommand
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|a| a.into()));
        self
    }

    pub fn workdir<P: Into<PathBuf>>(mut self, dir: P) -> ToolCommand {
        self.workdir = Some(dir.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> ToolCommand {
        self.timeout = Some(timeout);
        self
    }

    /// Get the value of a `key=value` argument, if present.
    pub fn get_param(&self, key: &str) -> Option<&str> {
        self.args.iter().find_map(|a| {
            a.split_once('=')
                .and_then(|(k, v)| if k == key { Some(v) } else { None })
        })
    }
}

impl fmt::Display for ToolCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            if arg.contains(char::is_whitespace) {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// What came back from running a [`ToolCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ToolOutput {
    /// The exit code. `None` if the process was killed by a signal.
    pub code: Option<i32>,
    pub duration: Duration,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Something that can run external programs.
pub trait ToolRunner: Sync {
    /// Run the command to completion (or until it times out). A non-zero exit
    /// code is not an error at this level; see [`run_checked`].
    fn run(&self, cmd: &ToolCommand) -> Result<ToolOutput, ToolError>;
}

/// Run a command and turn a non-zero exit code into an error.
pub fn run_checked(runner: &dyn ToolRunner, cmd: &ToolCommand) -> Result<ToolOutput, ToolError> {
    debug!("Running: {cmd}");
    let output = runner.run(cmd)?;
    trace!(
        "{} finished in {:.1}s with code {:?}",
        cmd.program,
        output.duration.as_secs_f64(),
        output.code
    );
    if !output.success() {
        return Err(ToolError::Failed {
            program: cmd.program.clone(),
            code: output.code,
            stderr: output.stderr,
        });
    }
    Ok(output)
}

/// Check that a tool produced what it was meant to.
pub fn expect_output(program: &str, path: &Path) -> Result<(), ToolError> {
    if path.exists() {
        Ok(())
    } else {
        Err(ToolError::MissingOutput {
            program: program.to_string(),
            path: path.to_path_buf(),
        })
    }
}

/// Runs commands as child processes of this one.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl ToolRunner for SystemRunner {
    fn run(&self, cmd: &ToolCommand) -> Result<ToolOutput, ToolError> {
        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &cmd.workdir {
            command.current_dir(dir);
        }

        let start = Instant::now();
        let mut child = command.spawn().map_err(|e| ToolError::Spawn {
            program: cmd.program.clone(),
            err: e,
        })?;
        let mut child_stdout = child.stdout.take();
        let mut child_stderr = child.stderr.take();

        // Drain both pipes while waiting, so a chatty process can't block on a
        // full pipe.
        thread::scope(|scope| {
            let stdout_handle = thread::Builder::new()
                .name("stdout".to_string())
                .spawn_scoped(scope, move || drain(child_stdout.as_mut()))
                .map_err(|e| ToolError::Io {
                    program: cmd.program.clone(),
                    err: e,
                })?;
            let stderr_handle = thread::Builder::new()
                .name("stderr".to_string())
                .spawn_scoped(scope, move || drain(child_stderr.as_mut()))
                .map_err(|e| ToolError::Io {
                    program: cmd.program.clone(),
                    err: e,
                })?;

            let io_err = |e| ToolError::Io {
                program: cmd.program.clone(),
                err: e,
            };
            let status = loop {
                if let Some(status) = child.try_wait().map_err(io_err)? {
                    break status;
                }
                if let Some(timeout) = cmd.timeout {
                    if start.elapsed() > timeout {
                        warn!(
                            "{} exceeded its timeout of {}s; killing it",
                            cmd.program,
                            timeout.as_secs()
                        );
                        child.kill().map_err(io_err)?;
                        child.wait().map_err(io_err)?;
                        return Err(ToolError::Timeout {
                            program: cmd.program.clone(),
                            timeout,
                        });
                    }
                }
                thread::sleep(POLL_INTERVAL);
            };

            let stdout = stdout_handle.join().unwrap_or_default();
            let stderr = stderr_handle.join().unwrap_or_default();
            Ok(ToolOutput {
                code: status.code(),
                duration: start.elapsed(),
                stdout,
                stderr,
            })
        })
    }
}

fn drain<R: Read>(pipe: Option<&mut R>) -> String {
    let mut buf = vec![];
    if let Some(pipe) = pipe {
        // A broken pipe just means we keep what we have.
        let _ = pipe.read_to_end(&mut buf);
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// A task for an external package, with named parameters.
pub trait Task {
    /// The name of the task, e.g. "invert" or "gaincal".
    fn name(&self) -> &'static str;

    /// Check that the parameters make sense before anything is run.
    fn validate(&self) -> Result<(), ToolError> {
        Ok(())
    }
}

/// Complain about a parameter.
pub(crate) fn invalid<S: Into<String>>(task: &'static str, reason: S) -> ToolError {
    ToolError::Validation {
        task,
        reason: reason.into(),
    }
}
