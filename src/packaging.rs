//! Source distribution packaging.
//!
//! Runs `setup.py sdist` in the main directory and copies the resulting
//! archive into the final image directory. The archive filename is computed
//! from the package metadata, so stale archives left in `dist/` are never
//! picked up by mistake.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::BuilderConfig;
use crate::error::{BuildError, PackagingError, Result};
use crate::process::{Cmd, CommandRunner, FailurePolicy, RunLog};

pub const DIST_DIR: &str = "dist";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packaging {
    pub sdist: Cmd,
    /// Metadata query; `None` when both name and version are configured.
    pub metadata: Option<Cmd>,
    pub dist_dir: PathBuf,
    pub final_dir: PathBuf,
    name: Option<String>,
    version: Option<String>,
}

/// Archive placed in the final image directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedArchive {
    pub filename: String,
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl Packaging {
    pub fn plan(main_dir: &Path, final_dir: &Path, config: &BuilderConfig) -> Self {
        let name = config.package_name.clone();
        let version = config.package_version.clone();
        let metadata = if name.is_some() && version.is_some() {
            None
        } else {
            Some(
                Cmd::new(&config.python, main_dir)
                    .args(["setup.py", "--name", "--version"])
                    .capture(),
            )
        };
        Self {
            sdist: Cmd::new(&config.python, main_dir).args(["setup.py", "sdist"]),
            metadata,
            dist_dir: main_dir.join(DIST_DIR),
            final_dir: final_dir.to_path_buf(),
            name,
            version,
        }
    }

    /// Builds the archive, resolves its exact name and copies it. Every
    /// command run lands in `log`.
    pub fn execute(
        &self,
        runner: &dyn CommandRunner,
        policy: FailurePolicy,
        log: &mut RunLog,
    ) -> Result<PackagedArchive> {
        info!(cwd = %self.sdist.cwd.display(), "building source distribution");
        log.run(runner, &self.sdist, policy)?;

        let (name, version) = match &self.metadata {
            Some(cmd) => {
                // The query is always checked: without it there is no archive name.
                let execution = log.run(runner, cmd, FailurePolicy::FailFast)?;
                let queried = parse_metadata(cmd, &execution.outcome.stdout)?;
                (
                    self.name.clone().unwrap_or(queried.0),
                    self.version.clone().unwrap_or(queried.1),
                )
            }
            None => (
                self.name.clone().unwrap_or_default(),
                self.version.clone().unwrap_or_default(),
            ),
        };

        let filenames = archive_filenames(&name, &version);
        let Some(filename) = filenames
            .iter()
            .find(|filename| self.dist_dir.join(filename).is_file())
            .cloned()
        else {
            return Err(PackagingError::ArchiveMissing {
                expected: self.dist_dir.join(&filenames[0]),
                candidates: stale_candidates(&self.dist_dir, &name, &filenames)?,
            }
            .into());
        };
        let source = self.dist_dir.join(&filename);

        let destination = self.final_dir.join(&filename);
        fs::copy(&source, &destination)
            .map_err(|err| BuildError::io("copying source archive to", &destination, err))?;
        info!(archive = %filename, to = %destination.display(), "copied source archive");

        Ok(PackagedArchive {
            filename,
            source,
            destination,
        })
    }
}

/// PEP 625 sdist name: runs of `-`, `_` and `.` collapse to `_`, lowercased.
fn normalized_stem(name: &str) -> String {
    let mut stem = String::with_capacity(name.len());
    let mut in_separator = false;
    for c in name.trim().chars() {
        if matches!(c, '-' | '_' | '.') {
            if !in_separator {
                stem.push('_');
            }
            in_separator = true;
        } else {
            stem.extend(c.to_lowercase());
            in_separator = false;
        }
    }
    stem
}

/// Older setuptools only replaced `-` with `_`.
fn legacy_stem(name: &str) -> String {
    name.trim().replace('-', "_")
}

/// Filenames `setup.py sdist` may produce for `name` and `version`, newest
/// setuptools naming first.
pub fn archive_filenames(name: &str, version: &str) -> Vec<String> {
    let version = version.trim();
    let mut filenames = vec![format!("{}-{version}.tar.gz", normalized_stem(name))];
    let legacy = format!("{}-{version}.tar.gz", legacy_stem(name));
    if legacy != filenames[0] {
        filenames.push(legacy);
    }
    filenames
}

/// Name and version are the last two non-empty lines; setup.py may print
/// warnings before them.
fn parse_metadata(cmd: &Cmd, stdout: &str) -> Result<(String, String)> {
    let lines: Vec<&str> = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    match lines.as_slice() {
        [.., name, version] => Ok((name.to_string(), version.to_string())),
        _ => Err(PackagingError::Metadata {
            command: cmd.to_string(),
            reason: format!("expected name and version lines, got {:?}", stdout.trim()),
        }
        .into()),
    }
}

fn stale_candidates(dist_dir: &Path, name: &str, expected: &[String]) -> Result<Vec<String>> {
    if !dist_dir.is_dir() {
        return Ok(Vec::new());
    }
    let prefixes = [
        format!("{}-", normalized_stem(name)),
        format!("{}-", legacy_stem(name).to_lowercase()),
    ];
    let entries =
        fs::read_dir(dist_dir).map_err(|err| BuildError::io("reading", dist_dir, err))?;
    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| BuildError::io("reading entry under", dist_dir, err))?;
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let lowered = name.to_lowercase();
        if !expected.contains(&name)
            && prefixes.iter().any(|prefix| lowered.starts_with(prefix.as_str()))
            && name.ends_with(".tar.gz")
        {
            candidates.push(name);
        }
    }
    candidates.sort();
    Ok(candidates)
}
