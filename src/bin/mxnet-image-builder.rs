use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

mod workflows;

/// Build MXNet serving/training docker images from a prebuilt binary.
#[derive(Parser, Debug)]
#[command(name = "mxnet-image-builder", version)]
#[command(about = "Build MXNet docker images", long_about = None)]
pub(crate) struct Cli {
    /// Path to the framework binary, or a link to download it from
    pub(crate) binary: String,

    /// Processor the image targets
    #[arg(value_parser = ["cpu", "gpu"])]
    pub(crate) processor: String,

    /// MXNet framework version (e.g. 1.6.0)
    pub(crate) framework_version: String,

    /// Python version to be used (e.g. 3.6.5)
    pub(crate) python_version: String,

    /// Use nvidia-docker instead of docker
    #[arg(long)]
    pub(crate) nvidia_docker: bool,

    /// Repository the final image is tagged into [default: preprod-mxnet]
    #[arg(long)]
    pub(crate) final_image_repository: Option<String>,

    /// Tags for the final image [default: <version>-<processor>-py<major>]
    #[arg(long, num_args = 1..)]
    pub(crate) final_image_tags: Vec<String>,

    /// Project directory containing setup.py and docker/ [default: current directory]
    #[arg(long)]
    pub(crate) main_dir: Option<PathBuf>,

    /// Config file [default: <main-dir>/image-builder.toml when present]
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,

    /// Keep going when an external command fails
    #[arg(long)]
    pub(crate) permissive: bool,

    /// Print the commands that would run, without running them
    #[arg(long)]
    pub(crate) dry_run: bool,

    /// Skip host tool and directory checks
    #[arg(long)]
    pub(crate) skip_preflight: bool,

    /// Write a JSON build report to this path
    #[arg(long)]
    pub(crate) report: Option<PathBuf>,

    /// Extra build argument for the final image (KEY=VALUE), repeatable
    #[arg(long = "build-arg")]
    pub(crate) build_args: Vec<String>,

    /// Log more (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub(crate) verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    workflows::init_logging(cli.verbose);
    workflows::run(cli)
}
