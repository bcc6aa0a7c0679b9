//! Binary acquisition: place the framework binary in the final image directory.
//!
//! Local files are copied byte for byte. Anything else is handed to the fetch
//! tool as a link. The binary's integrity is not verified.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::BuilderConfig;
use crate::error::{BuildError, Result};
use crate::process::{Cmd, CommandRunner, FailurePolicy, RunLog};
use crate::request::{BinarySource, BuildRequest};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquisition {
    Copy { from: PathBuf, to: PathBuf },
    Fetch { url: String, to: PathBuf, cmd: Cmd },
}

impl Acquisition {
    pub fn plan(
        request: &BuildRequest,
        final_dir: &Path,
        config: &BuilderConfig,
    ) -> Result<Self> {
        let to = final_dir.join(request.binary_filename()?);
        Ok(match &request.binary {
            BinarySource::Local(from) => Acquisition::Copy {
                from: from.clone(),
                to,
            },
            BinarySource::Remote(url) => Acquisition::Fetch {
                url: url.clone(),
                cmd: fetch_command(&config.fetch_tool, url, &to, final_dir, config.failure_policy),
                to,
            },
        })
    }

    pub fn destination(&self) -> &Path {
        match self {
            Acquisition::Copy { to, .. } | Acquisition::Fetch { to, .. } => to,
        }
    }

    pub fn command(&self) -> Option<&Cmd> {
        match self {
            Acquisition::Copy { .. } => None,
            Acquisition::Fetch { cmd, .. } => Some(cmd),
        }
    }

    /// Performs the copy or fetch. The fetch command, if any, lands in `log`.
    pub fn execute(
        &self,
        runner: &dyn CommandRunner,
        policy: FailurePolicy,
        log: &mut RunLog,
    ) -> Result<()> {
        match self {
            Acquisition::Copy { from, to } => {
                if same_file(from, to) {
                    info!(path = %to.display(), "binary already in final image directory");
                    return Ok(());
                }
                info!(from = %from.display(), to = %to.display(), "copying local binary");
                fs::copy(from, to).map_err(|err| BuildError::ArtifactAcquisition {
                    source_ref: from.display().to_string(),
                    reason: format!("copying to '{}': {err}", to.display()),
                })?;
                Ok(())
            }
            Acquisition::Fetch { url, to, cmd } => {
                info!(url = %url, to = %to.display(), "fetching remote binary");
                log.run(runner, cmd, policy).map_err(|failure| {
                    BuildError::ArtifactAcquisition {
                        source_ref: url.clone(),
                        reason: format!("`{}` {}", failure.command, failure.reason),
                    }
                })?;
                if policy == FailurePolicy::FailFast && !to.is_file() {
                    return Err(BuildError::ArtifactAcquisition {
                        source_ref: url.clone(),
                        reason: format!("fetch finished but '{}' was not written", to.display()),
                    });
                }
                Ok(())
            }
        }
    }
}

/// Copying a file onto itself truncates it.
fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Fail-fast fetches treat HTTP errors as failures; permissive fetches save
/// whatever body comes back.
fn fetch_command(tool: &str, url: &str, to: &Path, cwd: &Path, policy: FailurePolicy) -> Cmd {
    let cmd = Cmd::new(tool, cwd);
    let cmd = match policy {
        FailurePolicy::FailFast => cmd.args(["--fail", "--location", "--silent", "--show-error"]),
        FailurePolicy::Permissive => cmd.arg("--location"),
    };
    cmd.arg("--output")
        .arg(to.display().to_string())
        .arg(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::CommandOutcome;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use tempfile::TempDir;

    #[derive(Default)]
    struct WritingRunner {
        calls: RefCell<Vec<Cmd>>,
        body: Option<&'static [u8]>,
        code: i32,
    }

    impl CommandRunner for WritingRunner {
        fn run(&self, cmd: &Cmd) -> std::io::Result<CommandOutcome> {
            self.calls.borrow_mut().push(cmd.clone());
            if let Some(body) = self.body {
                let out = cmd
                    .args
                    .iter()
                    .position(|a| a == "--output")
                    .map(|i| PathBuf::from(&cmd.args[i + 1]))
                    .expect("fetch command names an output file");
                fs::write(out, body)?;
            }
            Ok(CommandOutcome::exited(self.code))
        }
    }

    fn request_for(source: &str) -> BuildRequest {
        BuildRequest::new(source, "cpu", "1.6.0", "3.6.5").unwrap()
    }

    #[test]
    fn local_file_is_copied_byte_identical() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("mxnet-1.6.0.whl");
        let final_dir = dir.path().join("final");
        fs::create_dir_all(&final_dir).unwrap();
        fs::write(&src, [0u8, 159, 146, 150, 255]).unwrap();

        let request = request_for(src.to_str().unwrap());
        let plan = Acquisition::plan(&request, &final_dir, &BuilderConfig::default()).unwrap();
        assert!(plan.command().is_none());

        let runner = WritingRunner::default();
        let mut log = RunLog::default();
        plan.execute(&runner, FailurePolicy::FailFast, &mut log).unwrap();
        assert!(log.executions.is_empty());
        assert!(runner.calls.borrow().is_empty());
        assert_eq!(
            fs::read(final_dir.join("mxnet-1.6.0.whl")).unwrap(),
            fs::read(&src).unwrap()
        );
    }

    #[test]
    fn non_local_source_is_fetched() {
        let dir = TempDir::new().unwrap();
        let request = request_for("https://example.com/dl/mxnet-1.6.0.whl");
        let plan =
            Acquisition::plan(&request, dir.path(), &BuilderConfig::default()).unwrap();

        let runner = WritingRunner {
            body: Some(b"remote wheel"),
            ..Default::default()
        };
        let mut log = RunLog::default();
        plan.execute(&runner, FailurePolicy::FailFast, &mut log).unwrap();
        assert_eq!(log.executions.len(), 1);

        let calls = runner.calls.borrow();
        assert_eq!(calls.len(), 1);
        let dest = dir.path().join("mxnet-1.6.0.whl");
        assert_eq!(
            calls[0].argv(),
            vec![
                "curl",
                "--fail",
                "--location",
                "--silent",
                "--show-error",
                "--output",
                dest.to_str().unwrap(),
                "https://example.com/dl/mxnet-1.6.0.whl",
            ]
        );
        assert_eq!(fs::read(dest).unwrap(), b"remote wheel");
    }

    #[test]
    fn failed_fetch_is_an_acquisition_error() {
        let dir = TempDir::new().unwrap();
        let request = request_for("https://example.com/dl/missing.whl");
        let plan =
            Acquisition::plan(&request, dir.path(), &BuilderConfig::default()).unwrap();

        let runner = WritingRunner {
            code: 22,
            ..Default::default()
        };
        let mut log = RunLog::default();
        let err = plan
            .execute(&runner, FailurePolicy::FailFast, &mut log)
            .unwrap_err();
        assert!(matches!(err, BuildError::ArtifactAcquisition { .. }));
        assert!(err.to_string().contains("exit status 22"));
        let (cmd, failure) = log.failed.unwrap();
        assert_eq!(cmd.program, "curl");
        assert_eq!(failure.exit_code, Some(22));
    }

    #[test]
    fn permissive_fetch_continues_past_failure() {
        let dir = TempDir::new().unwrap();
        let config = BuilderConfig {
            failure_policy: FailurePolicy::Permissive,
            ..Default::default()
        };
        let request = request_for("https://example.com/dl/missing.whl");
        let plan = Acquisition::plan(&request, dir.path(), &config).unwrap();
        assert_eq!(plan.command().unwrap().args[0], "--location");

        let runner = WritingRunner {
            code: 6,
            ..Default::default()
        };
        let mut log = RunLog::default();
        plan.execute(&runner, FailurePolicy::Permissive, &mut log)
            .unwrap();
        assert!(log.executions[0].1.tolerated);
        assert!(log.failed.is_none());
    }

    #[test]
    fn missing_local_destination_dir_fails_copy() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("mxnet.whl");
        fs::write(&src, b"x").unwrap();
        let request = request_for(src.to_str().unwrap());
        let plan = Acquisition::plan(&request, &dir.path().join("absent"), &BuilderConfig::default())
            .unwrap();

        let err = plan
            .execute(
                &WritingRunner::default(),
                FailurePolicy::Permissive,
                &mut RunLog::default(),
            )
            .unwrap_err();
        assert!(matches!(err, BuildError::ArtifactAcquisition { .. }));
    }

    #[test]
    fn binary_already_in_place_is_left_untouched() {
        let dir = TempDir::new().unwrap();
        let wheel = dir.path().join("mxnet.whl");
        fs::write(&wheel, [9u8; 512]).unwrap();

        let request = request_for(wheel.to_str().unwrap());
        let plan = Acquisition::plan(&request, dir.path(), &BuilderConfig::default()).unwrap();
        assert_eq!(plan.destination(), wheel.as_path());

        plan.execute(
            &WritingRunner::default(),
            FailurePolicy::FailFast,
            &mut RunLog::default(),
        )
        .unwrap();
        assert_eq!(fs::read(&wheel).unwrap(), vec![9u8; 512]);
    }
}
