//! Configuration for custodyctl

use custody_ledger::{BackendConfig, LedgerConfig};
use serde::{Deserialize, Serialize};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Ledger backend and verification settings
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl CliConfig {
    /// Load configuration: defaults, then an optional file, then
    /// `CUSTODY_`-prefixed environment variables (`__` between sections).
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&CliConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("CUSTODY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }

    /// Copy safe to print: database passwords are masked.
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if let BackendConfig::Postgres { url, .. } = &mut config.ledger.backend {
            *url = redact_url(url);
        }
        config
    }
}

fn redact_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://").map(|i| i + 3) else {
        return url.to_string();
    };
    let Some(at) = url[scheme_end..].find('@').map(|i| i + scheme_end) else {
        return url.to_string();
    };
    match url[scheme_end..at].find(':') {
        Some(colon) => format!("{}:***{}", &url[..scheme_end + colon], &url[at..]),
        None => url.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custody_ledger::CorrectionStrategy;

    #[test]
    fn test_default_config() {
        let config = CliConfig::default();
        assert!(matches!(config.ledger.backend, BackendConfig::Memory));
        assert_eq!(config.ledger.verification_timeout_secs, 30);
        assert_eq!(config.ledger.corrections, CorrectionStrategy::SideTable);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = CliConfig::load(None).unwrap();
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.ledger.verification_timeout_secs, 30);
    }

    #[test]
    fn test_password_is_redacted() {
        assert_eq!(
            redact_url("postgres://custody:s3cret@db:5432/ledger"),
            "postgres://custody:***@db:5432/ledger"
        );
        assert_eq!(
            redact_url("postgres://db:5432/ledger"),
            "postgres://db:5432/ledger"
        );
        assert_eq!(redact_url("postgres://custody@db/ledger"), "postgres://custody@db/ledger");
    }
}
