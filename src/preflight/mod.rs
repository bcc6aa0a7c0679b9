//! Preflight checks before a build touches anything.
//!
//! Validates that the host has the collaborator tools on PATH and that the
//! main directory has the expected shape, so a run fails up front instead of
//! halfway through with an image half built.
//!
//! # Example
//!
//! ```rust
//! use mxnet_image_builder::preflight::{command_exists, check_required_tools};
//!
//! if !command_exists("docker") {
//!     println!("docker not installed");
//! }
//!
//! let tools = &[("docker", "container engine"), ("curl", "binary fetch")];
//! if let Err(e) = check_required_tools(tools) {
//!     eprintln!("{}", e);
//! }
//! ```

use std::path::Path;

use crate::config::BuilderConfig;
use crate::error::{BuildError, Result};
use crate::layout::PathLayout;
use crate::request::BuildRequest;

/// Check if a command exists on the host system.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Check that specific tools are available.
///
/// Each tuple is (command, purpose). All missing tools are reported together.
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .map(|(tool, purpose)| format!("  {tool} (needed for: {purpose})"))
        .collect::<Vec<_>>();

    if !missing.is_empty() {
        return Err(BuildError::Preflight(format!(
            "missing required host tools:\n{}",
            missing.join("\n")
        )));
    }
    Ok(())
}

/// Tools a given request will invoke.
pub fn required_tools<'a>(
    request: &BuildRequest,
    config: &'a BuilderConfig,
) -> Vec<(&'a str, &'static str)> {
    let mut tools = vec![
        (config.engine_program(request.engine), "container engine"),
        (config.python.as_str(), "source packaging"),
    ];
    if request.binary.is_remote() {
        tools.push((config.fetch_tool.as_str(), "binary fetch"));
    }
    tools
}

/// Checks that the main directory can be packaged and the target image
/// directories exist.
pub fn check_main_dir(main_dir: &Path, layout: &PathLayout) -> Result<()> {
    let mut problems = Vec::new();
    if !main_dir.join("setup.py").is_file() {
        problems.push(format!(
            "  no setup.py in main directory '{}'",
            main_dir.display()
        ));
    }
    if !layout.final_dir.is_dir() {
        problems.push(format!(
            "  final image directory '{}' does not exist",
            layout.final_dir.display()
        ));
    }
    if let Some(base_dir) = &layout.base_dir {
        if !base_dir.is_dir() {
            problems.push(format!(
                "  base image directory '{}' does not exist",
                base_dir.display()
            ));
        }
    }

    if !problems.is_empty() {
        return Err(BuildError::Preflight(problems.join("\n")));
    }
    Ok(())
}

/// Runs every check for `request`.
pub fn check_build(
    main_dir: &Path,
    layout: &PathLayout,
    request: &BuildRequest,
    config: &BuilderConfig,
) -> Result<()> {
    check_required_tools(&required_tools(request, config))?;
    check_main_dir(main_dir, layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_command_exists() {
        // 'ls' should exist on any Unix system
        assert!(command_exists("ls"));
        assert!(!command_exists("definitely_not_a_real_command_12345"));
    }

    #[test]
    fn test_check_required_tools_failure_lists_all_missing() {
        let tools = &[
            ("nonexistent_command_xyz", "engine"),
            ("ls", "listing"),
            ("nonexistent_command_abc", "fetch"),
        ];
        let msg = check_required_tools(tools).unwrap_err().to_string();
        assert!(msg.contains("nonexistent_command_xyz (needed for: engine)"));
        assert!(msg.contains("nonexistent_command_abc (needed for: fetch)"));
        assert!(!msg.contains("ls (needed"));
    }

    #[test]
    fn fetch_tool_only_required_for_remote_binary() {
        let config = BuilderConfig::default();
        let remote = BuildRequest::new("https://h/m.whl", "cpu", "1.6.0", "3.6.5").unwrap();
        let names: Vec<&str> = required_tools(&remote, &config)
            .into_iter()
            .map(|(t, _)| t)
            .collect();
        assert_eq!(names, vec!["docker", "python", "curl"]);

        let dir = TempDir::new().unwrap();
        let wheel = dir.path().join("m.whl");
        fs::write(&wheel, b"w").unwrap();
        let local = BuildRequest::new(wheel.to_str().unwrap(), "cpu", "1.6.0", "3.6.5").unwrap();
        assert_eq!(required_tools(&local, &config).len(), 2);
    }

    #[test]
    fn main_dir_check_reports_missing_pieces() {
        let dir = TempDir::new().unwrap();
        let python = crate::request::PythonTag::from_version("2.7.4").unwrap();
        let layout = PathLayout::resolve(dir.path(), "1.0.0", &python);

        let msg = check_main_dir(dir.path(), &layout).unwrap_err().to_string();
        assert!(msg.contains("no setup.py"));
        assert!(msg.contains("final image directory"));
        assert!(msg.contains("base image directory"));

        fs::write(dir.path().join("setup.py"), "").unwrap();
        fs::create_dir_all(&layout.final_dir).unwrap();
        fs::create_dir_all(layout.base_dir.as_ref().unwrap()).unwrap();
        assert!(check_main_dir(dir.path(), &layout).is_ok());
    }
}
