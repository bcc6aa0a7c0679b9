//! External command execution.
//!
//! Every collaborator tool (fetch, packaging, container engine) is described
//! as a [`Cmd`] and run through a [`CommandRunner`], so builds can be planned,
//! printed, and tested without spawning anything.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::BuildError;

/// What to do when an external command exits unsuccessfully.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Abort the run on the first non-zero exit.
    #[default]
    FailFast,
    /// Log the failure and keep going, like the legacy build scripts.
    Permissive,
}

/// A command line with its working directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cmd {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    /// Capture stdout instead of inheriting it.
    pub capture_stdout: bool,
}

impl Cmd {
    pub fn new(program: impl Into<String>, cwd: &Path) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.to_path_buf(),
            capture_stdout: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn capture(mut self) -> Self {
        self.capture_stdout = true;
        self
    }

    /// Program followed by its arguments.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }
}

impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .argv()
            .iter()
            .map(|part| shell_quote(part))
            .collect::<Vec<_>>()
            .join(" ");
        f.write_str(&rendered)
    }
}

fn shell_quote(part: &str) -> String {
    let plain = !part.is_empty()
        && part
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,+@%".contains(c));
    if plain {
        part.to_string()
    } else {
        format!("'{}'", part.replace('\'', r"'\''"))
    }
}

/// Exit state of a finished command.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutcome {
    /// `None` when the process was terminated by a signal.
    pub code: Option<i32>,
    /// Captured stdout; empty unless the command asked for capture.
    pub stdout: String,
}

impl CommandOutcome {
    pub fn exited(code: i32) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    fn describe(&self) -> String {
        match self.code {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs commands to completion.
pub trait CommandRunner {
    /// Runs `cmd`, blocking until it exits. Errors only when the process could
    /// not be spawned or waited on.
    fn run(&self, cmd: &Cmd) -> std::io::Result<CommandOutcome>;
}

/// Spawns real processes, inheriting stderr (and stdout unless captured).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &Cmd) -> std::io::Result<CommandOutcome> {
        debug!(command = %cmd, cwd = %cmd.cwd.display(), "spawning");
        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .current_dir(&cmd.cwd)
            .stdin(Stdio::null())
            .stderr(Stdio::inherit());

        if cmd.capture_stdout {
            let output = command.stdout(Stdio::piped()).output()?;
            return Ok(CommandOutcome {
                code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            });
        }

        let status = command.stdout(Stdio::inherit()).status()?;
        Ok(CommandOutcome {
            code: status.code(),
            stdout: String::new(),
        })
    }
}

/// A command that could not be run or exited unsuccessfully under
/// [`FailurePolicy::FailFast`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    pub command: String,
    pub cwd: PathBuf,
    pub reason: String,
    /// `None` when the process never ran or was killed by a signal.
    pub exit_code: Option<i32>,
}

impl From<CommandFailure> for BuildError {
    fn from(failure: CommandFailure) -> Self {
        BuildError::BuildCommand {
            command: failure.command,
            cwd: failure.cwd,
            reason: failure.reason,
        }
    }
}

/// A finished command and whether its failure was let through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub outcome: CommandOutcome,
    pub tolerated: bool,
}

/// Runs `cmd` and applies `policy` to its exit status. Spawn errors are
/// always fatal.
pub fn execute(
    runner: &dyn CommandRunner,
    cmd: &Cmd,
    policy: FailurePolicy,
) -> Result<Execution, CommandFailure> {
    let outcome = runner.run(cmd).map_err(|err| CommandFailure {
        command: cmd.to_string(),
        cwd: cmd.cwd.clone(),
        reason: format!("could not run '{}': {err}", cmd.program),
        exit_code: None,
    })?;

    if outcome.success() {
        return Ok(Execution {
            outcome,
            tolerated: false,
        });
    }

    match policy {
        FailurePolicy::FailFast => Err(CommandFailure {
            command: cmd.to_string(),
            cwd: cmd.cwd.clone(),
            reason: outcome.describe(),
            exit_code: outcome.code,
        }),
        FailurePolicy::Permissive => {
            warn!(
                command = %cmd,
                cwd = %cmd.cwd.display(),
                status = %outcome.describe(),
                "command failed; continuing"
            );
            Ok(Execution {
                outcome,
                tolerated: true,
            })
        }
    }
}

/// Commands run by one build step, in order, plus the one that stopped it.
#[derive(Debug, Clone, Default)]
pub struct RunLog {
    pub executions: Vec<(Cmd, Execution)>,
    pub failed: Option<(Cmd, CommandFailure)>,
}

impl RunLog {
    /// [`execute`], keeping the result whether or not it failed.
    pub fn run(
        &mut self,
        runner: &dyn CommandRunner,
        cmd: &Cmd,
        policy: FailurePolicy,
    ) -> Result<Execution, CommandFailure> {
        match execute(runner, cmd, policy) {
            Ok(execution) => {
                self.executions.push((cmd.clone(), execution.clone()));
                Ok(execution)
            }
            Err(failure) => {
                self.failed = Some((cmd.clone(), failure.clone()));
                Err(failure)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct Fixed(io::Result<CommandOutcome>);

    impl CommandRunner for Fixed {
        fn run(&self, _cmd: &Cmd) -> io::Result<CommandOutcome> {
            match &self.0 {
                Ok(outcome) => Ok(outcome.clone()),
                Err(err) => Err(io::Error::new(err.kind(), err.to_string())),
            }
        }
    }

    fn docker() -> Cmd {
        Cmd::new("docker", Path::new("/work")).args(["build", "-t", "repo:tag", "."])
    }

    #[test]
    fn display_quotes_only_when_needed() {
        let cmd = Cmd::new("docker", Path::new("/")).args(["build", "a b", "it's"]);
        assert_eq!(cmd.to_string(), r"docker build 'a b' 'it'\''s'");
    }

    #[test]
    fn fail_fast_rejects_nonzero_exit() {
        let failure = execute(&Fixed(Ok(CommandOutcome::exited(1))), &docker(), FailurePolicy::FailFast)
            .unwrap_err();
        assert_eq!(failure.command, "docker build -t repo:tag .");
        assert_eq!(failure.reason, "exit status 1");
        assert_eq!(failure.exit_code, Some(1));
    }

    #[test]
    fn permissive_tolerates_nonzero_exit() {
        let execution = execute(
            &Fixed(Ok(CommandOutcome::exited(2))),
            &docker(),
            FailurePolicy::Permissive,
        )
        .unwrap();
        assert!(execution.tolerated);
        assert_eq!(execution.outcome.code, Some(2));
    }

    #[test]
    fn signal_termination_is_a_failure() {
        let killed = CommandOutcome {
            code: None,
            stdout: String::new(),
        };
        let failure = execute(&Fixed(Ok(killed)), &docker(), FailurePolicy::FailFast).unwrap_err();
        assert_eq!(failure.reason, "terminated by signal");
    }

    #[test]
    fn spawn_error_is_fatal_even_when_permissive() {
        let runner = Fixed(Err(io::Error::new(io::ErrorKind::NotFound, "no such file")));
        let failure = execute(&runner, &docker(), FailurePolicy::Permissive).unwrap_err();
        assert!(failure.reason.contains("could not run 'docker'"));
    }

    #[test]
    fn run_log_keeps_the_failed_command() {
        let mut log = RunLog::default();
        log.run(&Fixed(Ok(CommandOutcome::exited(0))), &docker(), FailurePolicy::FailFast)
            .unwrap();
        log.run(&Fixed(Ok(CommandOutcome::exited(3))), &docker(), FailurePolicy::FailFast)
            .unwrap_err();

        assert_eq!(log.executions.len(), 1);
        let (cmd, failure) = log.failed.unwrap();
        assert_eq!(cmd, docker());
        assert_eq!(failure.exit_code, Some(3));
    }

    #[test]
    fn system_runner_captures_stdout() {
        let cmd = Cmd::new("echo", Path::new("/")).arg("hello").capture();
        let outcome = SystemRunner.run(&cmd).unwrap();
        assert!(outcome.success());
        assert_eq!(outcome.stdout.trim(), "hello");
    }
}
