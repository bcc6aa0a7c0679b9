//! Image build orchestration.
//!
//! A build is one forward pass:
//!
//! 1. resolve the docker directory layout for the framework version
//! 2. place the framework binary in the final image directory
//! 3. build the base image (legacy layouts only)
//! 4. package the source distribution and copy it next to the binary
//! 5. build and tag the final image
//!
//! There is no rollback: files written by earlier steps stay in place when a
//! later step fails.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::acquire::Acquisition;
use crate::config::BuilderConfig;
use crate::engine::{
    base_build_command, base_image, final_build_command, final_images, ImageReference,
};
use crate::error::{BuildError, Result};
use crate::layout::{dockerfile_name, PathLayout};
use crate::packaging::Packaging;
use crate::process::{
    Cmd, CommandFailure, CommandRunner, Execution, FailurePolicy, RunLog, SystemRunner,
};
use crate::report::{ArtifactRecord, StepRecord};
use crate::request::BuildRequest;

/// Every command and path a build will use, computed without side effects.
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub layout: PathLayout,
    pub binary_filename: String,
    pub acquisition: Acquisition,
    pub base: Option<BaseBuild>,
    pub packaging: Packaging,
    pub images: Vec<ImageReference>,
    pub final_build: Cmd,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseBuild {
    pub image: ImageReference,
    pub cmd: Cmd,
}

impl BuildPlan {
    /// Human-readable listing of the steps, one line each.
    pub fn describe(&self) -> Vec<String> {
        let mut lines = Vec::new();
        match &self.acquisition {
            Acquisition::Copy { from, to } => lines.push(format!(
                "copy {} -> {}",
                from.display(),
                to.display()
            )),
            Acquisition::Fetch { cmd, .. } => lines.push(format!("(cd {}) {cmd}", cmd.cwd.display())),
        }
        if let Some(base) = &self.base {
            lines.push(format!("(cd {}) {}", base.cmd.cwd.display(), base.cmd));
        }
        lines.push(format!(
            "(cd {}) {}",
            self.packaging.sdist.cwd.display(),
            self.packaging.sdist
        ));
        if let Some(metadata) = &self.packaging.metadata {
            lines.push(format!("(cd {}) {metadata}", metadata.cwd.display()));
        }
        lines.push(format!(
            "copy {}/<package>-<version>.tar.gz -> {}",
            self.packaging.dist_dir.display(),
            self.packaging.final_dir.display()
        ));
        lines.push(format!(
            "(cd {}) {}",
            self.final_build.cwd.display(),
            self.final_build
        ));
        lines
    }
}

/// What a successful build produced.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub images: Vec<ImageReference>,
    pub base_image: Option<ImageReference>,
    pub binary: ArtifactRecord,
    pub archive: ArtifactRecord,
    pub steps: Vec<StepRecord>,
}

/// Builds images rooted at one main project directory.
pub struct ImageBuilder<R: CommandRunner = SystemRunner> {
    main_dir: PathBuf,
    config: BuilderConfig,
    runner: R,
}

impl ImageBuilder<SystemRunner> {
    pub fn with_system_runner(main_dir: impl Into<PathBuf>, config: BuilderConfig) -> Self {
        Self::new(main_dir, config, SystemRunner)
    }
}

impl<R: CommandRunner> ImageBuilder<R> {
    pub fn new(main_dir: impl Into<PathBuf>, config: BuilderConfig, runner: R) -> Self {
        Self {
            main_dir: main_dir.into(),
            config,
            runner,
        }
    }

    pub fn main_dir(&self) -> &Path {
        &self.main_dir
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn plan(&self, request: &BuildRequest) -> Result<BuildPlan> {
        let layout =
            PathLayout::resolve(&self.main_dir, &request.framework_version, &request.python);
        let program = self.config.engine_program(request.engine);
        let binary_filename = request.binary_filename()?;
        let acquisition = Acquisition::plan(request, &layout.final_dir, &self.config)?;

        let base = layout.base_dir.as_ref().map(|base_dir| {
            let image = base_image(request, &self.config.base_image_repository);
            let cmd = base_build_command(program, base_dir, &image, request.processor);
            BaseBuild { image, cmd }
        });

        let packaging = Packaging::plan(&self.main_dir, &layout.final_dir, &self.config);
        let images = final_images(request);
        let final_build =
            final_build_command(program, &layout.final_dir, request, &images, &binary_filename);

        Ok(BuildPlan {
            layout,
            binary_filename,
            acquisition,
            base,
            packaging,
            images,
            final_build,
        })
    }

    pub fn build(&self, request: &BuildRequest) -> Result<BuildOutcome> {
        let mut steps = Vec::new();
        self.build_recorded(request, &mut steps)
    }

    /// Like [`build`](Self::build), but leaves the step log in `steps` even
    /// when the build fails.
    pub fn build_recorded(
        &self,
        request: &BuildRequest,
        steps: &mut Vec<StepRecord>,
    ) -> Result<BuildOutcome> {
        let plan = self.plan(request)?;
        let policy = self.config.failure_policy;
        info!(
            version = %request.framework_version,
            processor = %request.processor,
            final_dir = %plan.layout.final_dir.display(),
            ?policy,
            "starting image build"
        );

        println!("Getting binary...");
        let mut log = RunLog::default();
        let acquired = plan.acquisition.execute(&self.runner, policy, &mut log);
        if plan.acquisition.command().is_some() {
            record_log(steps, &log, |_| "fetch_binary");
        } else {
            steps.push(StepRecord {
                name: "copy_binary",
                command: None,
                cwd: None,
                exit_code: None,
                tolerated: false,
            });
        }
        acquired?;
        let binary = ArtifactRecord::inspect(plan.acquisition.destination())?;

        if let Some(base) = &plan.base {
            println!("Building base image...");
            let execution = self.run_engine("base_image", &base.cmd, request, policy, steps)?;
            info!(image = %base.image, tolerated = execution.tolerated, "base image build finished");
        }

        println!("Building final image...");
        let mut log = RunLog::default();
        let packaged = plan.packaging.execute(&self.runner, policy, &mut log);
        record_log(steps, &log, |cmd| {
            if cmd.capture_stdout {
                "package_metadata"
            } else {
                "package_sdist"
            }
        });
        let packaged = packaged?;
        let archive = ArtifactRecord::inspect(&packaged.destination)?;

        let execution = self.run_engine("final_image", &plan.final_build, request, policy, steps)?;
        let tagged = plan
            .images
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        info!(images = %tagged, tolerated = execution.tolerated, "final image build finished");

        Ok(BuildOutcome {
            images: plan.images,
            base_image: plan.base.map(|base| base.image),
            binary,
            archive,
            steps: steps.clone(),
        })
    }

    fn run_engine(
        &self,
        name: &'static str,
        cmd: &Cmd,
        request: &BuildRequest,
        policy: FailurePolicy,
        steps: &mut Vec<StepRecord>,
    ) -> Result<Execution> {
        let build_file = cmd.cwd.join(dockerfile_name(request.processor));
        if policy == FailurePolicy::FailFast && !build_file.is_file() {
            let failure = CommandFailure {
                command: cmd.to_string(),
                cwd: cmd.cwd.clone(),
                reason: format!("build file '{}' does not exist", build_file.display()),
                exit_code: None,
            };
            steps.push(record_failure(name, &failure));
            return Err(failure.into());
        }
        let mut log = RunLog::default();
        let result = log.run(&self.runner, cmd, policy);
        record_log(steps, &log, |_| name);
        result.map_err(BuildError::from)
    }
}

/// Appends one step per command in `log`, the failed one last.
fn record_log(
    steps: &mut Vec<StepRecord>,
    log: &RunLog,
    name: impl Fn(&Cmd) -> &'static str,
) {
    for (cmd, execution) in &log.executions {
        steps.push(record(name(cmd), cmd, execution));
    }
    if let Some((cmd, failure)) = &log.failed {
        steps.push(record_failure(name(cmd), failure));
    }
}

fn record_failure(name: &'static str, failure: &CommandFailure) -> StepRecord {
    StepRecord {
        name,
        command: Some(failure.command.clone()),
        cwd: Some(failure.cwd.clone()),
        exit_code: failure.exit_code,
        tolerated: false,
    }
}

fn record(name: &'static str, cmd: &Cmd, execution: &Execution) -> StepRecord {
    StepRecord {
        name,
        command: Some(cmd.to_string()),
        cwd: Some(cmd.cwd.clone()),
        exit_code: execution.outcome.code,
        tolerated: execution.tolerated,
    }
}
