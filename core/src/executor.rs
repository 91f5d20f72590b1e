use std::fmt;
use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Serialize;

use crate::error::BenchError;

const INPUT_PLACEHOLDER: &str = "{input}";
const OUTPUT_PLACEHOLDER: &str = "{output}";
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// External build command template.
///
/// `{input}` and `{output}` inside arguments are replaced per invocation. When
/// no argument mentions `{input}`, the input path is appended as the last one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl BuildCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Build from an argv-style list (`["c++", "-c", "{input}"]`).
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.to_vec()))
    }

    pub fn expand_args(&self, input: &Path, output: &Path) -> Vec<String> {
        let input = input.to_string_lossy();
        let output = output.to_string_lossy();
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| arg.replace(INPUT_PLACEHOLDER, &input).replace(OUTPUT_PLACEHOLDER, &output))
            .collect();
        if !self.args.iter().any(|arg| arg.contains(INPUT_PLACEHOLDER)) {
            args.push(input.into_owned());
        }
        args
    }

    /// Shell-like rendering for diagnostics.
    pub fn display_with(&self, input: &Path, output: &Path) -> String {
        let mut line = self.program.clone();
        for arg in self.expand_args(input, output) {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }
}

impl fmt::Display for BuildCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationStatus {
    Succeeded,
    Failed { code: Option<i32> },
    TimedOut { after: Duration },
}

impl InvocationStatus {
    pub fn success(self) -> bool {
        matches!(self, InvocationStatus::Succeeded)
    }

    fn from_exit(status: ExitStatus) -> Self {
        if status.success() {
            InvocationStatus::Succeeded
        } else {
            InvocationStatus::Failed { code: status.code() }
        }
    }
}

impl fmt::Display for InvocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationStatus::Succeeded => write!(f, "succeeded"),
            InvocationStatus::Failed { code: Some(code) } => write!(f, "exited with code {}", code),
            InvocationStatus::Failed { code: None } => write!(f, "terminated by signal"),
            InvocationStatus::TimedOut { after } => write!(f, "timed out after {:?}", after),
        }
    }
}

/// Outcome of one external build.
#[derive(Debug, Clone)]
pub struct Invocation {
    /// Wall-clock time from spawn to exit; `None` when the process was killed.
    pub elapsed: Option<Duration>,
    pub status: InvocationStatus,
    pub stdout: String,
    pub stderr: String,
}

impl Invocation {
    /// The timing sample this invocation contributes, if it succeeded.
    pub fn sample(&self) -> Option<Duration> {
        if self.status.success() { self.elapsed } else { None }
    }
}

/// Runs one build at a time and times it.
#[derive(Debug, Clone, Copy, Default)]
pub struct Executor {
    timeout: Option<Duration>,
}

impl Executor {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// Spawn the build synchronously. The clock covers spawn to exit only.
    ///
    /// Failing builds are reported through `Invocation::status`; the error
    /// path is reserved for processes that could not be started at all.
    pub fn run(&self, command: &BuildCommand, input: &Path, output: &Path) -> Result<Invocation> {
        let mut cmd = Command::new(&command.program);
        cmd.args(command.expand_args(input, output))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let start = Instant::now();
        let mut child = cmd.spawn().map_err(|source| BenchError::Spawn {
            program: command.program.clone(),
            source,
        })?;
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let waited = self.wait(&mut child, start);
        let elapsed = start.elapsed();

        let status = match waited {
            Ok(Some(status)) => InvocationStatus::from_exit(status),
            Ok(None) => InvocationStatus::TimedOut { after: elapsed },
            Err(source) => {
                return Err(BenchError::Spawn {
                    program: command.program.clone(),
                    source,
                }
                .into());
            }
        };
        // A killed driver may leave grandchildren holding the pipes open, so
        // output of a timed-out build is not waited for.
        let invocation = match status {
            InvocationStatus::TimedOut { .. } => Invocation {
                elapsed: None,
                status,
                stdout: String::new(),
                stderr: String::new(),
            },
            _ => Invocation {
                elapsed: Some(elapsed),
                status,
                stdout: collect(stdout),
                stderr: collect(stderr),
            },
        };
        tracing::debug!(
            program = %command.program,
            input = %input.display(),
            status = %invocation.status,
            elapsed = ?invocation.elapsed,
            "build invocation finished"
        );
        Ok(invocation)
    }

    /// `Ok(None)` means the timeout fired and the child was killed.
    fn wait(&self, child: &mut Child, start: Instant) -> std::io::Result<Option<ExitStatus>> {
        let Some(timeout) = self.timeout else {
            return child.wait().map(Some);
        };
        loop {
            if let Some(status) = child.try_wait()? {
                return Ok(Some(status));
            }
            if start.elapsed() >= timeout {
                let _ = child.kill();
                let _ = child.wait();
                return Ok(None);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Read a pipe on its own thread so a chatty compiler cannot fill the buffer
/// and stall.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut bytes = Vec::new();
            let _ = pipe.read_to_end(&mut bytes);
            String::from_utf8_lossy(&bytes).into_owned()
        })
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}
