//! # Observability Infrastructure
//!
//! Structured logging for the catalogplane control plane, built on the
//! tracing ecosystem. Log level defaults are driven by the `--verbose`
//! flag and can be overridden with `RUST_LOG`; set `LOG_FORMAT=json` for
//! machine-readable output.

use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::errors::Result;

/// Initialize the global tracing subscriber.
///
/// `verbose` lowers the default level to `debug` when `RUST_LOG` is unset.
/// A subscriber that is already installed (e.g. by integration tests) is
/// left in place.
pub fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "debug" } else { "info" };
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", default_level);
    }

    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = FmtSubscriber::builder().with_env_filter(EnvFilter::from_default_env());
    let installed = if json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };

    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed; keeping the existing one");
    }
    Ok(())
}

/// Log the resolved configuration at startup
pub fn log_config_info(config: &crate::config::Config) {
    tracing::info!(
        consul_address = %config.registry.base_url(),
        namespace = %config.namespace,
        filters = ?config.filters,
        health_filter = %config.health_filter,
        xds_address = %config.xds_addr,
        "Catalogplane control plane configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        // First call may install the subscriber, the second must not error.
        assert!(init_logging(false).is_ok());
        assert!(init_logging(true).is_ok());
    }

    #[test]
    fn test_log_config_info() {
        let config = crate::config::Config::default();

        // This should not panic
        log_config_info(&config);
    }
}
