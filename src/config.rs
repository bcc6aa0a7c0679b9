//! Builder configuration.
//!
//! Loaded from an optional TOML file (`image-builder.toml` in the main
//! directory by default). Every key is optional:
//!
//! ```toml
//! final_image_repository = "preprod-mxnet"
//! base_image_repository = "mxnet-base"
//! docker = "docker"
//! nvidia_docker = "nvidia-docker"
//! fetch_tool = "curl"
//! python = "python3"
//! package_name = "sagemaker_mxnet_container"
//! package_version = "3.1.2"
//! permissive = false
//! report = "build-report.json"
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{BuildError, Result};
use crate::process::FailurePolicy;
use crate::request::{Engine, DEFAULT_FINAL_IMAGE_REPOSITORY};

pub const CONFIG_FILENAME: &str = "image-builder.toml";
pub const DEFAULT_BASE_IMAGE_REPOSITORY: &str = "mxnet-base";

/// Immutable settings shared by every step of a build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuilderConfig {
    pub final_image_repository: String,
    pub base_image_repository: String,
    pub docker: String,
    pub nvidia_docker: String,
    pub fetch_tool: String,
    pub python: String,
    /// Overrides the package name read from `setup.py --name`.
    pub package_name: Option<String>,
    /// Overrides the package version read from `setup.py --version`.
    pub package_version: Option<String>,
    pub failure_policy: FailurePolicy,
    pub report: Option<PathBuf>,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            final_image_repository: DEFAULT_FINAL_IMAGE_REPOSITORY.to_string(),
            base_image_repository: DEFAULT_BASE_IMAGE_REPOSITORY.to_string(),
            docker: "docker".to_string(),
            nvidia_docker: "nvidia-docker".to_string(),
            fetch_tool: "curl".to_string(),
            python: "python".to_string(),
            package_name: None,
            package_version: None,
            failure_policy: FailurePolicy::FailFast,
            report: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct BuilderConfigToml {
    final_image_repository: Option<String>,
    base_image_repository: Option<String>,
    docker: Option<String>,
    nvidia_docker: Option<String>,
    fetch_tool: Option<String>,
    python: Option<String>,
    package_name: Option<String>,
    package_version: Option<String>,
    permissive: Option<bool>,
    report: Option<String>,
}

impl BuilderConfig {
    /// Program name for the selected engine.
    pub fn engine_program(&self, engine: Engine) -> &str {
        match engine {
            Engine::Docker => &self.docker,
            Engine::NvidiaDocker => &self.nvidia_docker,
        }
    }

    /// Loads `explicit` if given (it must exist), else
    /// `<main_dir>/image-builder.toml` if present, else defaults.
    pub fn discover(main_dir: &Path, explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path, main_dir),
            None => {
                let candidate = main_dir.join(CONFIG_FILENAME);
                if candidate.is_file() {
                    Self::load(&candidate, main_dir)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Loads a config file. A relative `report` path resolves against `main_dir`.
    pub fn load(path: &Path, main_dir: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| BuildError::io("reading config", path, err))?;
        let parsed: BuilderConfigToml = toml::from_str(&raw).map_err(|err| BuildError::Config {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;
        Self::from_toml(parsed, path, main_dir)
    }

    fn from_toml(parsed: BuilderConfigToml, path: &Path, main_dir: &Path) -> Result<Self> {
        let defaults = Self::default();
        let non_empty = |key: &str, value: Option<String>, fallback: String| -> Result<String> {
            match value.map(|v| v.trim().to_string()) {
                Some(v) if v.is_empty() => Err(BuildError::Config {
                    path: path.to_path_buf(),
                    reason: format!("{key} must not be empty"),
                }),
                Some(v) => Ok(v),
                None => Ok(fallback),
            }
        };

        Ok(Self {
            final_image_repository: non_empty(
                "final_image_repository",
                parsed.final_image_repository,
                defaults.final_image_repository,
            )?,
            base_image_repository: non_empty(
                "base_image_repository",
                parsed.base_image_repository,
                defaults.base_image_repository,
            )?,
            docker: non_empty("docker", parsed.docker, defaults.docker)?,
            nvidia_docker: non_empty("nvidia_docker", parsed.nvidia_docker, defaults.nvidia_docker)?,
            fetch_tool: non_empty("fetch_tool", parsed.fetch_tool, defaults.fetch_tool)?,
            python: non_empty("python", parsed.python, defaults.python)?,
            package_name: parsed.package_name.filter(|v| !v.trim().is_empty()),
            package_version: parsed.package_version.filter(|v| !v.trim().is_empty()),
            failure_policy: if parsed.permissive.unwrap_or(false) {
                FailurePolicy::Permissive
            } else {
                FailurePolicy::FailFast
            },
            report: parsed.report.map(|p| {
                let p = PathBuf::from(p);
                if p.is_absolute() {
                    p
                } else {
                    main_dir.join(p)
                }
            }),
        })
    }
}
