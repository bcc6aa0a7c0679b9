//! Build report: a JSON record of what a run did.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::engine::ImageReference;
use crate::error::{BuildError, Result};
use crate::layout::PathLayout;
use crate::process::FailurePolicy;
use crate::request::{BuildRequest, Engine, Processor};

/// A file placed in the final image directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactRecord {
    pub filename: String,
    pub path: PathBuf,
    /// `None` when the file is absent (a tolerated fetch failure).
    pub sha256: Option<String>,
    pub size_bytes: Option<u64>,
}

impl ArtifactRecord {
    pub fn inspect(path: &Path) -> Result<Self> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (sha256, size_bytes) = if path.is_file() {
            let (sha, size) = sha256_file(path)?;
            (Some(sha), Some(size))
        } else {
            (None, None)
        };
        Ok(Self {
            filename,
            path: path.to_path_buf(),
            sha256,
            size_bytes,
        })
    }
}

/// One executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub name: &'static str,
    pub command: Option<String>,
    pub cwd: Option<PathBuf>,
    pub exit_code: Option<i32>,
    /// The command failed but the run continued.
    pub tolerated: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestSummary {
    pub binary: String,
    pub processor: Processor,
    pub framework_version: String,
    pub python_tag: String,
    pub engine: Engine,
    pub repository: String,
    pub tags: Vec<String>,
}

impl From<&BuildRequest> for RequestSummary {
    fn from(request: &BuildRequest) -> Self {
        Self {
            binary: request.binary.display_ref(),
            processor: request.processor,
            framework_version: request.framework_version.clone(),
            python_tag: request.python.short(),
            engine: request.engine,
            repository: request.repository.clone(),
            tags: request.effective_tags(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BuildReport {
    pub status: String,
    pub error: Option<String>,
    pub failure_policy: FailurePolicy,
    pub started_at_utc: String,
    pub finished_at_utc: String,
    pub request: RequestSummary,
    pub layout: PathLayout,
    pub steps: Vec<StepRecord>,
    pub base_image: Option<ImageReference>,
    pub images: Vec<ImageReference>,
    pub binary: Option<ArtifactRecord>,
    pub archive: Option<ArtifactRecord>,
}

/// Writes `report` as pretty JSON via a temp file and rename.
pub fn write_report(path: &Path, report: &BuildReport) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)
        .map_err(|err| BuildError::io("creating report directory", parent, err))?;
    let tmp = path.with_extension(format!("tmp-{}", std::process::id()));
    let payload = serde_json::to_vec_pretty(report).map_err(|err| BuildError::Io {
        action: "serializing build report",
        path: path.to_path_buf(),
        source: err.into(),
    })?;
    fs::write(&tmp, payload).map_err(|err| BuildError::io("writing temp file", &tmp, err))?;
    fs::rename(&tmp, path).map_err(|err| BuildError::io("renaming report into", path, err))?;
    Ok(())
}

/// `YYYYMMDDTHHMMSSZ`.
pub fn now_utc_compact() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

fn sha256_file(path: &Path) -> Result<(String, u64)> {
    let file = File::open(path).map_err(|err| BuildError::io("opening", path, err))?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut size = 0u64;
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|err| BuildError::io("reading", path, err))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok((format!("{:x}", hasher.finalize()), size))
}
