use tracing_subscriber::EnvFilter;

/// Setup logging of events reported by the walk.
///
/// Events are written to standard error. Use the RUST_LOG environment
/// variable to override the level derived from `verbosity`.
///
/// E.g. To see every name as it is found:
///   RUST_LOG=zonewalk=DEBUG
///
/// Or to also trace the DNS transports:
///   RUST_LOG=TRACE
pub fn init_logging(verbosity: i8) {
    let level = match verbosity {
        i8::MIN..=-2 => "off",
        -1 => "error",
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbosity < 0 {
            EnvFilter::new(level)
        } else {
            EnvFilter::new(format!("warn,zonewalk={level}"))
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .try_init()
        .ok();
}
