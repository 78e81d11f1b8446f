//! Optional `tracing` subscriber setup for hosts and tests.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{ConfigError, TranslatorConfig};

/// Installs a global `fmt` subscriber filtered by `filter`
/// (for example `"pgql_sqa=debug"`).
pub fn init_logging(filter: &str) -> Result<(), ConfigError> {
    fmt()
        .with_env_filter(EnvFilter::try_new(filter).map_err(|e| ConfigError::Logging {
            detail: format!("invalid log filter: {e}"),
        })?)
        .with_target(true)
        .try_init()
        .map_err(|_| ConfigError::Logging {
            detail: "logging already initialized".into(),
        })
}

/// Installs the subscriber described by `config.log_filter`, if any.
pub fn init_from_config(config: &TranslatorConfig) -> Result<(), ConfigError> {
    match config.log_filter.as_deref() {
        Some(filter) => init_logging(filter),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_single_shot() {
        let config = TranslatorConfig {
            log_filter: Some("pgql_sqa=trace".into()),
            ..TranslatorConfig::default()
        };
        // Another test may have installed the global subscriber already.
        let _ = init_from_config(&config);
        match init_logging("pgql_sqa=debug") {
            Err(ConfigError::Logging { detail }) => assert!(detail.contains("already")),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(init_from_config(&TranslatorConfig::default()).is_ok());
    }
}
