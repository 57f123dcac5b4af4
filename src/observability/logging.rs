//! Logging initialization.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LoggingConfig;

/// Initialize the global tracing subscriber from the logging config.
///
/// `RUST_LOG` overrides the configured level when set. Must be called
/// at most once per process.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let use_stderr = config.output == "stderr";
    let layer = match config.format.as_str() {
        "json" => {
            if use_stderr {
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .boxed()
            } else {
                tracing_subscriber::fmt::layer().json().boxed()
            }
        }
        _ => {
            if use_stderr {
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .boxed()
            } else {
                tracing_subscriber::fmt::layer().boxed()
            }
        }
    };

    tracing_subscriber::registry().with(filter).with(layer).init();
}
