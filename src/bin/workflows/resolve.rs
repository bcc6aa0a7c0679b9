use std::path::PathBuf;

use anyhow::{Context, Result};
use mxnet_image_builder::{BuildRequest, BuilderConfig, Engine, FailurePolicy};

use crate::Cli;

/// Everything a run needs, with CLI flags layered over the config file.
#[derive(Debug)]
pub(crate) struct Invocation {
    pub(crate) main_dir: PathBuf,
    pub(crate) config: BuilderConfig,
    pub(crate) request: BuildRequest,
    pub(crate) dry_run: bool,
    pub(crate) skip_preflight: bool,
}

pub(crate) fn resolve_invocation(cli: Cli) -> Result<Invocation> {
    let main_dir = match cli.main_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("resolving current directory")?,
    };
    let main_dir = main_dir
        .canonicalize()
        .with_context(|| format!("resolving main directory '{}'", main_dir.display()))?;

    let mut config = BuilderConfig::discover(&main_dir, cli.config.as_deref())
        .context("loading builder config")?;
    if cli.permissive {
        config.failure_policy = FailurePolicy::Permissive;
    }
    if let Some(report) = cli.report {
        config.report = Some(report);
    }
    if let Some(repository) = cli.final_image_repository {
        config.final_image_repository = repository;
    }

    let engine = if cli.nvidia_docker {
        Engine::NvidiaDocker
    } else {
        Engine::Docker
    };

    let request = BuildRequest::new(
        &cli.binary,
        &cli.processor,
        &cli.framework_version,
        &cli.python_version,
    )
    .and_then(|request| request.with_repository(&config.final_image_repository))
    .and_then(|request| request.with_tags(cli.final_image_tags))
    .and_then(|request| request.with_build_args(&cli.build_args))
    .context("validating build arguments")?
    .with_engine(engine);

    Ok(Invocation {
        main_dir,
        config,
        request,
        dry_run: cli.dry_run,
        skip_preflight: cli.skip_preflight,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn parse(dir: &TempDir, extra: &[&str]) -> Result<Invocation> {
        let main_dir = dir.path().to_str().unwrap().to_string();
        let mut argv = vec![
            "mxnet-image-builder",
            "https://example.com/mxnet-1.6.0.whl",
            "gpu",
            "1.6.0",
            "3.6.5",
            "--main-dir",
            main_dir.as_str(),
        ];
        argv.extend_from_slice(extra);
        resolve_invocation(Cli::try_parse_from(argv)?)
    }

    #[test]
    fn defaults_match_legacy_script() {
        let dir = TempDir::new().unwrap();
        let invocation = parse(&dir, &[]).unwrap();
        assert_eq!(invocation.request.repository, "preprod-mxnet");
        assert_eq!(invocation.request.engine, Engine::Docker);
        assert_eq!(invocation.request.effective_tags(), vec!["1.6.0-gpu-py3"]);
        assert_eq!(invocation.config.failure_policy, FailurePolicy::FailFast);
    }

    #[test]
    fn flags_override_config_file() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("image-builder.toml"),
            "final_image_repository = \"from-config\"\n",
        )
        .unwrap();

        let invocation = parse(&dir, &[]).unwrap();
        assert_eq!(invocation.request.repository, "from-config");

        let invocation = parse(
            &dir,
            &[
                "--final-image-repository",
                "from-flag",
                "--nvidia-docker",
                "--permissive",
                "--final-image-tags",
                "latest",
                "nightly",
            ],
        )
        .unwrap();
        assert_eq!(invocation.request.repository, "from-flag");
        assert_eq!(invocation.request.engine, Engine::NvidiaDocker);
        assert_eq!(invocation.request.tags, vec!["latest", "nightly"]);
        assert_eq!(invocation.config.failure_policy, FailurePolicy::Permissive);
    }

    #[test]
    fn invalid_processor_is_rejected_by_parser() {
        let result = Cli::try_parse_from([
            "mxnet-image-builder",
            "x.whl",
            "tpu",
            "1.6.0",
            "3.6.5",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn invalid_python_version_is_an_argument_error() {
        let dir = TempDir::new().unwrap();
        let main_dir = dir.path().to_str().unwrap().to_string();
        let cli = Cli::try_parse_from([
            "mxnet-image-builder",
            "x.whl",
            "cpu",
            "1.6.0",
            "python3",
            "--main-dir",
            main_dir.as_str(),
        ])
        .unwrap();
        let err = resolve_invocation(cli).unwrap_err();
        assert!(format!("{err:#}").contains("python_version"));
    }
}
