//! Builds and tags MXNet serving/training container images.
//!
//! A build takes a prebuilt framework binary (a local file or a download
//! link), layers it with the packaged source distribution into the docker
//! directory for the requested framework version, and runs the container
//! engine to produce tagged images.
//!
//! - **Request** - validated inputs ([`BuildRequest`])
//! - **Layout** - version-keyed docker directory table ([`layout`])
//! - **Steps** - binary acquisition, source packaging, engine builds
//! - **Process** - every external tool runs through a [`CommandRunner`]
//!
//! # Example
//!
//! ```rust,ignore
//! use mxnet_image_builder::{BuildRequest, BuilderConfig, ImageBuilder};
//!
//! let request = BuildRequest::new("dist/mxnet-1.6.0.whl", "gpu", "1.6.0", "3.6.5")?;
//! let builder = ImageBuilder::with_system_runner("/src/sagemaker-mxnet", BuilderConfig::default());
//! let outcome = builder.build(&request)?;
//! for image in &outcome.images {
//!     println!("{image}");
//! }
//! ```

pub mod acquire;
pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod layout;
pub mod packaging;
pub mod preflight;
pub mod process;
pub mod report;
pub mod request;

pub use builder::{BuildOutcome, BuildPlan, ImageBuilder};
pub use config::BuilderConfig;
pub use engine::ImageReference;
pub use error::{BuildError, PackagingError, Result};
pub use layout::{PathLayout, VersionLayout};
pub use process::{Cmd, CommandOutcome, CommandRunner, FailurePolicy, SystemRunner};
pub use request::{BinarySource, BuildRequest, Engine, Processor, PythonTag};
