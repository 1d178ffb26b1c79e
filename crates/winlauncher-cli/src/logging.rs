//! Tracing subscriber setup.

use tracing_subscriber::{fmt, EnvFilter};

/// Install a stderr subscriber.  `RUST_LOG` wins over `verbosity`
/// (0 = warn, 1 = debug, 2+ = trace).  Later calls are no-ops.
pub fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(verbosity > 1)
        .with_writer(std::io::stderr)
        .try_init();
}
