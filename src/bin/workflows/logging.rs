use tracing_subscriber::EnvFilter;

/// Logs go to stderr so stdout carries only progress lines and image names.
/// `RUST_LOG` wins over `-v`.
pub(crate) fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
