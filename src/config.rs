//! Translator configuration.
//!
//! Settings are plain serde structs so they can be embedded in a host
//! application's TOML file or built in code. Every field has a default that
//! produces the algebra dialect the storage engine expects.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Knobs for the emitted algebra dialect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslatorConfig {
    /// Scope keyword emitted before attribute names.
    pub attribute_scope: String,
    /// Join type emitted in `JOIN`.
    pub join_type: String,
    /// Declared result type of `EXTEND` columns.
    pub extend_result_type: String,
    /// `EnvFilter` directive used by [`crate::logging::init_from_config`].
    pub log_filter: Option<String>,
}

impl Default for TranslatorConfig {
    fn default() -> Self {
        Self {
            attribute_scope: "GLOBAL".to_owned(),
            join_type: "Inner".to_owned(),
            extend_result_type: "STRING".to_owned(),
            log_filter: None,
        }
    }
}

impl TranslatorConfig {
    /// Parses a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse { path: None, source })
    }

    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: Some(path.to_path_buf()),
            source,
        })
    }

    /// Serializes the configuration as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|source| ConfigError::Serialize { source })
    }
}

/// Configuration and logging setup errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The TOML was malformed or had wrongly typed fields.
    #[error("failed to parse config{}: {source}", describe_path(.path))]
    Parse {
        /// File path, when loaded from disk.
        path: Option<PathBuf>,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
    /// The configuration could not be rendered as TOML.
    #[error("failed to serialize config: {source}")]
    Serialize {
        /// Underlying TOML error.
        #[source]
        source: toml::ser::Error,
    },
    /// The log filter was invalid or a subscriber was already installed.
    #[error("logging setup failed: {detail}")]
    Logging {
        /// Description of the failure.
        detail: String,
    },
}

fn describe_path(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(" {}", path.display()),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_documents_fall_back_to_defaults() {
        let config = TranslatorConfig::from_toml_str("join_type = \"LeftOuter\"\n")
            .expect("parse succeeds");
        assert_eq!(config.join_type, "LeftOuter");
        assert_eq!(config.attribute_scope, "GLOBAL");
        assert_eq!(config.extend_result_type, "STRING");
        assert_eq!(config.log_filter, None);
    }

    #[test]
    fn load_reads_file_and_reports_path_on_error() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "attribute_scope = \"NODE\"\nlog_filter = \"pgql_sqa=debug\"")
            .expect("write config");
        let config = TranslatorConfig::load(file.path()).expect("load succeeds");
        assert_eq!(config.attribute_scope, "NODE");
        assert_eq!(config.log_filter.as_deref(), Some("pgql_sqa=debug"));

        let mut bad = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(bad, "join_type = 3").expect("write config");
        match TranslatorConfig::load(bad.path()) {
            Err(ConfigError::Parse { path: Some(path), .. }) => assert_eq!(path, bad.path()),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn round_trips_through_toml() {
        let config = TranslatorConfig::default();
        let text = config.to_toml_string().expect("serialize succeeds");
        assert_eq!(
            TranslatorConfig::from_toml_str(&text).expect("parse succeeds"),
            config
        );
    }
}
