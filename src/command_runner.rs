//! External command execution
//!
//! All tool invocations go through a `CommandRunner`. The pipeline only ever
//! sees the trait, so the same stage code drives real block devices through
//! `SystemRunner` and a scripted fake through `RecordingRunner`.
//!
//! # Rules
//!
//! - A non-zero exit is reported, logged with the captured stderr, and never
//!   retried. The caller decides whether it is fatal (`run_tool` makes it so).
//! - Children are spawned in their own process group and registered with
//!   `ChildRegistry::global()` while they run.
//! - Secrets travel on stdin only. `Invocation::command_line()` is safe to log.

use crate::error::{InstallError, Result};
use crate::process_guard::{ChildRegistry, CommandProcessGroup};
use crate::secret::Secret;
use crate::tool_traits::ToolArgs;
use std::io::Write;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// One fully-described external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub stdin: Option<Secret>,
    /// Inherit stdout/stderr instead of capturing them
    pub stream_output: bool,
    pub destructive: bool,
}

impl Invocation {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            stdin: None,
            stream_output: false,
            destructive: false,
        }
    }

    pub fn from_tool<T: ToolArgs + ?Sized>(tool: &T) -> Self {
        Self {
            program: tool.program().to_string(),
            args: tool.to_cli_args(),
            stdin: tool.stdin(),
            stream_output: tool.streams_output(),
            destructive: tool.is_destructive(),
        }
    }

    /// Program and argv joined by spaces, for logs and test assertions.
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Output from a command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code (None if terminated by signal)
    pub exit_code: Option<i32>,
    pub success: bool,
}

impl CommandOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
            success: true,
        }
    }

    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: Some(code),
            success: false,
        }
    }

    /// Turn a failed run into `InstallError::Command`.
    pub fn ensure_success(&self, program: &str) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            Err(InstallError::command(
                program,
                self.exit_code.unwrap_or(-1),
                self.stderr.trim(),
            ))
        }
    }
}

/// Executes external commands.
pub trait CommandRunner {
    /// Run one command to completion.
    ///
    /// Returns `Ok` with `success == false` for a non-zero exit; `Err` only
    /// when the command could not be executed at all.
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput>;
}

/// Run a typed tool and treat a non-zero exit as an error.
pub fn run_tool<T: ToolArgs + ?Sized>(runner: &dyn CommandRunner, tool: &T) -> Result<CommandOutput> {
    let invocation = Invocation::from_tool(tool);
    let output = runner.run(&invocation)?;
    output.ensure_success(&invocation.program)?;
    Ok(output)
}

/// Runs commands on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        let command_line = invocation.command_line();
        if invocation.destructive {
            info!("Running (destructive): {}", command_line);
        } else {
            info!("Running: {}", command_line);
        }

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args).in_new_process_group();

        cmd.stdin(if invocation.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        if invocation.stream_output {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        } else {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        let mut child = cmd.spawn().map_err(|source| InstallError::Spawn {
            program: invocation.program.clone(),
            source,
        })?;
        let pid = child.id();

        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.register(pid);
        }

        if let Some(secret) = &invocation.stdin {
            if let Some(mut stdin) = child.stdin.take() {
                // The tool may exit before reading everything; its exit code tells the story
                if let Err(e) = stdin.write_all(secret.expose().as_bytes()) {
                    warn!("Failed to write stdin of {}: {}", invocation.program, e);
                }
            }
        }

        let waited = child.wait_with_output();

        if let Ok(mut registry) = ChildRegistry::global().lock() {
            registry.unregister(pid);
        }

        let output = waited?;
        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
            success: output.status.success(),
        };

        if result.success {
            debug!("{} exited successfully", invocation.program);
        } else {
            warn!(
                "Command failed (exit code {}): {}\n{}",
                result.exit_code.unwrap_or(-1),
                command_line,
                result.stderr.trim()
            );
        }

        Ok(result)
    }
}

#[derive(Debug, Clone)]
struct Rule {
    program: String,
    arg_contains: Option<String>,
    output: CommandOutput,
}

impl Rule {
    fn matches(&self, invocation: &Invocation) -> bool {
        self.program == invocation.program
            && self
                .arg_contains
                .as_deref()
                .is_none_or(|needle| invocation.args.iter().any(|a| a.contains(needle)))
    }
}

/// Records every invocation and answers from canned rules.
///
/// Unmatched commands succeed with empty output. Later rules win over
/// earlier ones, so a test can override a broad default with a narrow case.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<Invocation>>,
    rules: Mutex<Vec<Rule>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `program` (optionally only when some argument contains
    /// `arg_contains`) with the given output.
    pub fn respond(&self, program: &str, arg_contains: Option<&str>, output: CommandOutput) {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                program: program.to_string(),
                arg_contains: arg_contains.map(str::to_string),
                output,
            });
        }
    }

    /// Shorthand for a successful answer with `stdout`.
    pub fn stdout(&self, program: &str, arg_contains: Option<&str>, stdout: &str) {
        self.respond(program, arg_contains, CommandOutput::ok(stdout));
    }

    /// Shorthand for a non-zero exit.
    pub fn fail(&self, program: &str, arg_contains: Option<&str>, code: i32, stderr: &str) {
        self.respond(program, arg_contains, CommandOutput::failed(code, stderr));
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn command_lines(&self) -> Vec<String> {
        self.calls().iter().map(Invocation::command_line).collect()
    }

    /// Number of recorded calls to `program`.
    pub fn count(&self, program: &str) -> usize {
        self.calls().iter().filter(|c| c.program == program).count()
    }
}

impl CommandRunner for RecordingRunner {
    fn run(&self, invocation: &Invocation) -> Result<CommandOutput> {
        debug!("Recording: {}", invocation.command_line());
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(invocation.clone());
        }

        let output = self
            .rules
            .lock()
            .ok()
            .and_then(|rules| {
                rules
                    .iter()
                    .rev()
                    .find(|rule| rule.matches(invocation))
                    .map(|rule| rule.output.clone())
            })
            .unwrap_or_else(|| CommandOutput::ok(""));

        Ok(output)
    }
}
