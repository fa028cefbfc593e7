//! # chatte-telemetry
//!
//! Installs the global `tracing` subscriber. `RUST_LOG` takes precedence over
//! the configured level.

#![deny(unsafe_code)]

use chatte_settings::{LogFormat, LoggingSettings};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Failure to install the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// The configured level is not a valid filter directive.
    #[error("invalid log filter '{directive}': {source}")]
    Filter {
        /// The rejected directive.
        directive: String,
        /// Parser error.
        #[source]
        source: tracing_subscriber::filter::ParseError,
    },
    /// A global subscriber was already set.
    #[error("failed to install subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}

/// Build the filter: `RUST_LOG` if set, else `settings.level`.
pub fn build_filter(settings: &LoggingSettings) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&settings.level).map_err(|source| TelemetryError::Filter {
        directive: settings.level.clone(),
        source,
    })
}

/// Initialize logging. Call once at startup.
pub fn init_logging(settings: &LoggingSettings) -> Result<(), TelemetryError> {
    let filter = build_filter(settings)?;

    let fmt_layer = match settings.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true)
            .with_filter(filter)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_filter(filter)
            .boxed(),
    };

    tracing_subscriber::registry().with(fmt_layer).try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_directive_is_rejected() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let settings = LoggingSettings {
            level: "chatte_server=notalevel".into(),
            format: LogFormat::Pretty,
        };
        let err = build_filter(&settings).unwrap_err();
        assert!(err.to_string().contains("chatte_server=notalevel"));
    }

    #[test]
    fn module_directives_are_accepted() {
        let settings = LoggingSettings {
            level: "info,chatte_server=debug".into(),
            format: LogFormat::Json,
        };
        assert!(build_filter(&settings).is_ok());
    }

    #[test]
    fn second_init_fails() {
        let settings = LoggingSettings::default();
        let _ = init_logging(&settings);
        let second = init_logging(&settings);
        assert!(matches!(second, Err(TelemetryError::Install(_))));
    }
}
