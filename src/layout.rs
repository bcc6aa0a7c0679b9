//! Docker directory layout under the main project directory.
//!
//! ```text
//! <main>/docker/<version>/base/Dockerfile.<processor>            (legacy only)
//! <main>/docker/<version>/final/<py-tag>/Dockerfile.<processor>  (legacy)
//! <main>/docker/<version>/final/Dockerfile.<processor>           (all others)
//! ```

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::request::{Processor, PythonTag};

/// How a framework version lays out its docker directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionLayout {
    /// A separate base image is built first; final directories are split per
    /// python tag.
    LegacyNested,
    /// Single self-contained final directory.
    Flat,
}

/// Versions that predate the flat layout. Any version not listed is `Flat`.
pub const VERSION_LAYOUTS: &[(&str, VersionLayout)] = &[
    ("1.0.0", VersionLayout::LegacyNested),
    ("0.12.1", VersionLayout::LegacyNested),
];

pub fn layout_for_version(framework_version: &str) -> VersionLayout {
    VERSION_LAYOUTS
        .iter()
        .find(|(version, _)| *version == framework_version)
        .map(|(_, layout)| *layout)
        .unwrap_or(VersionLayout::Flat)
}

/// `Dockerfile.cpu` / `Dockerfile.gpu`.
pub fn dockerfile_name(processor: Processor) -> String {
    format!("Dockerfile.{}", processor.as_str())
}

/// Resolved directories for one build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathLayout {
    pub version_layout: VersionLayout,
    /// Only present when a base image is built.
    pub base_dir: Option<PathBuf>,
    pub final_dir: PathBuf,
}

impl PathLayout {
    pub fn resolve(main_dir: &Path, framework_version: &str, python: &PythonTag) -> Self {
        let version_dir = main_dir.join("docker").join(framework_version);
        let version_layout = layout_for_version(framework_version);
        match version_layout {
            VersionLayout::LegacyNested => Self {
                version_layout,
                base_dir: Some(version_dir.join("base")),
                final_dir: version_dir.join("final").join(python.short()),
            },
            VersionLayout::Flat => Self {
                version_layout,
                base_dir: None,
                final_dir: version_dir.join("final"),
            },
        }
    }

    pub fn builds_base_image(&self) -> bool {
        self.base_dir.is_some()
    }
}
