//! Configuration types for snare.

mod listen;
mod rules;

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::error::SnareError;
use crate::rule::Rule;

// Re-export all types for library consumers
#[allow(unused_imports)]
pub use listen::{ConnectionPoolConfig, ListenConfig, LogFormat, LoggingConfig, MetricsConfig};
pub use rules::RuleSpec;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub connection_pool: ConnectionPoolConfig,
    /// Ordered rule list; every matching rule applies.
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    ///
    /// Rules are not validated here: an invalid rule is loaded and skipped,
    /// and reported through diagnostics.
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.listen.port == 0 {
            anyhow::bail!("listen.port must be non-zero");
        }

        if self.metrics.enabled && self.metrics.port == self.listen.port {
            anyhow::bail!(
                "metrics.port ({}) must differ from listen.port",
                self.metrics.port
            );
        }

        if self.logging.level.trim().is_empty() {
            anyhow::bail!("logging.level must not be empty");
        }

        if self.connection_pool.connect_timeout_secs == 0 {
            anyhow::bail!("connection_pool.connect_timeout_secs must be non-zero");
        }

        Ok(())
    }

    pub fn build_rules(&self) -> Vec<Rule> {
        self.rules.iter().map(RuleSpec::to_rule).collect()
    }
}

/// A standalone rules file (`rules:` list only), as read by `snare lint`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

impl RuleSet {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SnareError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| SnareError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&contents).map_err(|source| SnareError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }

    pub fn build_rules(&self) -> Vec<Rule> {
        self.rules.iter().map(RuleSpec::to_rule).collect()
    }
}
