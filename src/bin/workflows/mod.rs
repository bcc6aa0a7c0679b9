mod build;
mod logging;
mod resolve;

pub(crate) use build::run;
pub(crate) use logging::init_logging;
pub(crate) use resolve::{resolve_invocation, Invocation};
