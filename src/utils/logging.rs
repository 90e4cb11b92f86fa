use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs the global fmt subscriber.
///
/// `RUST_LOG` takes precedence over the configured `log_level`; an invalid
/// directive in either falls back to `info`.
pub fn init_tracing(log_level: &str) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .or_else(|_| EnvFilter::try_new("info"))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_thread_ids(true))
        .with(filter)
        .try_init()?;

    Ok(())
}
