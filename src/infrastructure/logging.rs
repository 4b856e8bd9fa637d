//! Process-wide tracing setup for the binary

use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter, Layer,
};

use crate::config::{LogFormat, LoggingConfig};

/// Installs the global subscriber, writing to stderr so command output keeps stdout.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TryInitError> {
    let directives = filter_directives(config, std::env::var("RUST_LOG").ok());
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("warn"));

    let output = match config.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .compact()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(output)
        .try_init()?;

    tracing::debug!(directives = %directives, "Logging initialized");
    Ok(())
}

fn filter_directives(config: &LoggingConfig, env: Option<String>) -> String {
    env.filter(|directives| !directives.trim().is_empty())
        .unwrap_or_else(|| config.level.clone())
}
