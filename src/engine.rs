//! Container engine build invocations.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::layout::dockerfile_name;
use crate::process::Cmd;
use crate::request::{BuildRequest, Processor};

/// `repository:tag`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageReference {
    pub repository: String,
    pub tag: String,
}

impl ImageReference {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// Base image reference for legacy layouts, e.g. `mxnet-base:1.0.0-cpu-py2`.
pub fn base_image(request: &BuildRequest, repository: &str) -> ImageReference {
    ImageReference::new(repository, request.default_tag())
}

/// `<engine> build -t <image> -f Dockerfile.<processor> .` in the base directory.
pub fn base_build_command(
    program: &str,
    base_dir: &Path,
    image: &ImageReference,
    processor: Processor,
) -> Cmd {
    Cmd::new(program, base_dir)
        .arg("build")
        .arg("-t")
        .arg(image.to_string())
        .arg("-f")
        .arg(dockerfile_name(processor))
        .arg(".")
}

/// Final image references, one per effective tag, in order.
pub fn final_images(request: &BuildRequest) -> Vec<ImageReference> {
    request
        .effective_tags()
        .into_iter()
        .map(|tag| ImageReference::new(&request.repository, tag))
        .collect()
}

/// `<engine> build [-t image]... --build-arg py_version=<major>
/// --build-arg framework_installable=<binary> [--build-arg extra]...
/// -f Dockerfile.<processor> .` in the final directory.
pub fn final_build_command(
    program: &str,
    final_dir: &Path,
    request: &BuildRequest,
    images: &[ImageReference],
    binary_filename: &str,
) -> Cmd {
    let mut cmd = Cmd::new(program, final_dir).arg("build");
    for image in images {
        cmd = cmd.arg("-t").arg(image.to_string());
    }
    cmd = cmd
        .arg("--build-arg")
        .arg(format!("py_version={}", request.python.major()))
        .arg("--build-arg")
        .arg(format!("framework_installable={binary_filename}"));
    for (key, value) in &request.extra_build_args {
        cmd = cmd.arg("--build-arg").arg(format!("{key}={value}"));
    }
    cmd.arg("-f").arg(dockerfile_name(request.processor)).arg(".")
}
