//! Build request: the immutable input that fully determines a build run.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Serialize;

use crate::error::{BuildError, Result};

/// Repository used for final images when none is configured.
pub const DEFAULT_FINAL_IMAGE_REPOSITORY: &str = "preprod-mxnet";

/// Target processor; selects the `Dockerfile.<processor>` build file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Processor {
    Cpu,
    Gpu,
}

impl Processor {
    pub fn as_str(&self) -> &'static str {
        match self {
            Processor::Cpu => "cpu",
            Processor::Gpu => "gpu",
        }
    }
}

impl fmt::Display for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Processor {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "cpu" => Ok(Processor::Cpu),
            "gpu" => Ok(Processor::Gpu),
            other => Err(BuildError::argument(
                "processor",
                format!("unsupported processor '{other}'; expected 'cpu' or 'gpu'"),
            )),
        }
    }
}

/// Container engine selector.
///
/// `NvidiaDocker` is the accelerated runtime that exposes GPU devices to the
/// build; both engines accept the same `build` arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Engine {
    #[default]
    Docker,
    NvidiaDocker,
}

/// Where the framework binary comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinarySource {
    Local(PathBuf),
    Remote(String),
}

impl BinarySource {
    /// Classifies `raw`: an existing regular file is local, anything else is
    /// treated as a remote link.
    pub fn classify(raw: &str) -> Self {
        let path = Path::new(raw);
        if path.is_file() {
            BinarySource::Local(path.to_path_buf())
        } else {
            BinarySource::Remote(raw.to_string())
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, BinarySource::Remote(_))
    }

    /// Raw source string as given by the caller.
    pub fn display_ref(&self) -> String {
        match self {
            BinarySource::Local(path) => path.display().to_string(),
            BinarySource::Remote(url) => url.clone(),
        }
    }
}

/// Python major version, rendered as `py<major>` in tags and paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PythonTag {
    major: String,
}

impl PythonTag {
    /// Parses the major component of a dotted python version (`3.6.5` -> `3`).
    pub fn from_version(python_version: &str) -> Result<Self> {
        let major = python_version.split('.').next().unwrap_or_default().trim();
        if major.is_empty() || !major.chars().all(|c| c.is_ascii_digit()) {
            return Err(BuildError::argument(
                "python_version",
                format!("'{python_version}' does not start with a numeric major version"),
            ));
        }
        Ok(Self {
            major: major.to_string(),
        })
    }

    /// Major version digits, passed to the final build as `py_version`.
    pub fn major(&self) -> &str {
        &self.major
    }

    /// Short tag, e.g. `py3`.
    pub fn short(&self) -> String {
        format!("py{}", self.major)
    }
}

/// A fully validated build request.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub binary: BinarySource,
    pub processor: Processor,
    pub framework_version: String,
    pub python: PythonTag,
    pub engine: Engine,
    pub repository: String,
    /// Explicit tags in caller order; empty means "use the computed default".
    pub tags: Vec<String>,
    /// Extra `--build-arg` pairs appended to the final build after the fixed ones.
    pub extra_build_args: Vec<(String, String)>,
}

impl BuildRequest {
    /// Validates raw inputs into a request. Nothing touches the filesystem
    /// except the local-file probe on `binary`.
    pub fn new(
        binary: &str,
        processor: &str,
        framework_version: &str,
        python_version: &str,
    ) -> Result<Self> {
        if binary.trim().is_empty() {
            return Err(BuildError::argument("binary", "must not be empty"));
        }
        validate_framework_version(framework_version)?;

        let request = Self {
            binary: BinarySource::classify(binary),
            processor: processor.parse()?,
            framework_version: framework_version.to_string(),
            python: PythonTag::from_version(python_version)?,
            engine: Engine::Docker,
            repository: DEFAULT_FINAL_IMAGE_REPOSITORY.to_string(),
            tags: Vec::new(),
            extra_build_args: Vec::new(),
        };
        request.binary_filename()?;
        Ok(request)
    }

    pub fn with_engine(mut self, engine: Engine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_repository(mut self, repository: &str) -> Result<Self> {
        validate_reference_part("final_image_repository", repository)?;
        self.repository = repository.to_string();
        Ok(self)
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Result<Self> {
        for tag in &tags {
            validate_reference_part("final_image_tags", tag)?;
        }
        self.tags = tags;
        Ok(self)
    }

    pub fn with_build_args(mut self, args: &[String]) -> Result<Self> {
        for raw in args {
            let (key, value) = raw.split_once('=').ok_or_else(|| {
                BuildError::argument("build_arg", format!("'{raw}' is not KEY=VALUE"))
            })?;
            if key.is_empty() {
                return Err(BuildError::argument(
                    "build_arg",
                    format!("'{raw}' has an empty key"),
                ));
            }
            self.extra_build_args
                .push((key.to_string(), value.to_string()));
        }
        Ok(self)
    }

    /// Filename the binary is stored under in the final image directory: the
    /// last `/`-separated segment of the source.
    pub fn binary_filename(&self) -> Result<String> {
        let raw = self.binary.display_ref();
        let name = match &self.binary {
            BinarySource::Local(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            BinarySource::Remote(url) => url.rsplit('/').next().unwrap_or_default().to_string(),
        };
        if name.is_empty() {
            return Err(BuildError::argument(
                "binary",
                format!("cannot derive a filename from '{raw}'"),
            ));
        }
        Ok(name)
    }

    /// `<version>-<processor>-py<major>`, used when no explicit tags are given.
    pub fn default_tag(&self) -> String {
        format!(
            "{}-{}-{}",
            self.framework_version,
            self.processor,
            self.python.short()
        )
    }

    /// Tags the final image receives, in order.
    pub fn effective_tags(&self) -> Vec<String> {
        if self.tags.is_empty() {
            vec![self.default_tag()]
        } else {
            self.tags.clone()
        }
    }
}

fn validate_framework_version(version: &str) -> Result<()> {
    if version.trim().is_empty() {
        return Err(BuildError::argument("framework_version", "must not be empty"));
    }
    if version.contains('/') || version.contains('\\') || version == "." || version == ".." {
        return Err(BuildError::argument(
            "framework_version",
            format!("'{version}' must not contain path separators"),
        ));
    }
    Ok(())
}

fn validate_reference_part(name: &'static str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(BuildError::argument(name, "must not be empty"));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(BuildError::argument(
            name,
            format!("'{value}' must not contain whitespace"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(version: &str, processor: &str, python: &str) -> BuildRequest {
        BuildRequest::new(
            "https://example.com/builds/mxnet-1.6.0-py2.py3-none-manylinux1_x86_64.whl",
            processor,
            version,
            python,
        )
        .unwrap()
    }

    #[test]
    fn default_tag_uses_python_major() {
        assert_eq!(request("1.6.0", "gpu", "3.6.5").default_tag(), "1.6.0-gpu-py3");
        assert_eq!(request("1.0.0", "cpu", "2.7.4").default_tag(), "1.0.0-cpu-py2");
    }

    #[test]
    fn explicit_tags_replace_default_in_order() {
        let req = request("1.6.0", "cpu", "3.6.5")
            .with_tags(vec!["b".into(), "a".into(), "latest".into()])
            .unwrap();
        assert_eq!(req.effective_tags(), vec!["b", "a", "latest"]);
    }

    #[test]
    fn rejects_unknown_processor() {
        let err = BuildRequest::new("x.whl", "tpu", "1.6.0", "3.6.5").unwrap_err();
        assert!(matches!(err, BuildError::Argument { name: "processor", .. }));
    }

    #[test]
    fn rejects_non_numeric_python_version() {
        assert!(PythonTag::from_version("three").is_err());
        assert!(PythonTag::from_version("").is_err());
        assert_eq!(PythonTag::from_version("2.7.4").unwrap().short(), "py2");
    }

    #[test]
    fn multi_digit_major_is_kept_whole() {
        let tag = PythonTag::from_version("10.1").unwrap();
        assert_eq!(tag.major(), "10");
        assert_eq!(tag.short(), "py10");
    }

    #[test]
    fn remote_filename_is_last_segment() {
        let req = request("1.6.0", "cpu", "3.6.5");
        assert!(req.binary.is_remote());
        assert_eq!(
            req.binary_filename().unwrap(),
            "mxnet-1.6.0-py2.py3-none-manylinux1_x86_64.whl"
        );
    }

    #[test]
    fn source_ending_in_slash_is_rejected() {
        let err = BuildRequest::new("https://example.com/builds/", "cpu", "1.6.0", "3.6.5")
            .unwrap_err();
        assert!(matches!(err, BuildError::Argument { name: "binary", .. }));
    }

    #[test]
    fn existing_file_is_local() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("mxnet.whl");
        std::fs::write(&path, b"wheel").unwrap();

        let source = BinarySource::classify(path.to_str().unwrap());
        assert_eq!(source, BinarySource::Local(path));
    }

    #[test]
    fn framework_version_cannot_escape_docker_dir() {
        assert!(BuildRequest::new("x.whl", "cpu", "../1.6.0", "3.6.5").is_err());
        assert!(BuildRequest::new("x.whl", "cpu", "", "3.6.5").is_err());
    }

    #[test]
    fn build_args_must_be_key_value() {
        let req = request("1.6.0", "cpu", "3.6.5");
        assert!(req.clone().with_build_args(&["novalue".into()]).is_err());
        let req = req
            .with_build_args(&["A=1".into(), "B=x=y".into()])
            .unwrap();
        assert_eq!(
            req.extra_build_args,
            vec![("A".into(), "1".into()), ("B".into(), "x=y".into())]
        );
    }

    #[test]
    fn tags_with_whitespace_are_rejected() {
        let req = request("1.6.0", "cpu", "3.6.5");
        assert!(req.with_tags(vec!["bad tag".into()]).is_err());
    }
}
