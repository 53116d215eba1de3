//! CLI utilities: logging setup, grounded on `clnrm-core/src/cli/utils.rs::setup_logging`.

use crate::error::{AtgError, Result};

/// `verbose` raises the default filter to `debug`; `quiet` drops it to
/// `warn`; otherwise `info`. An explicit `log_file` also tees output to
/// a non-blocking file writer.
pub fn setup_logging(verbose: bool, quiet: bool, log_file: Option<&std::path::Path>) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let builder = fmt::Subscriber::builder().with_env_filter(EnvFilter::new(filter));

    let result = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| AtgError::io(path, e))?;
            tracing::subscriber::set_global_default(builder.with_writer(std::sync::Mutex::new(file)).finish())
        }
        None => tracing::subscriber::set_global_default(builder.finish()),
    };

    result.map_err(|e| AtgError::configuration(format!("failed to install logging subscriber: {e}")))
}
