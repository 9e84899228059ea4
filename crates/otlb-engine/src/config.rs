//! Bridge configuration, loaded from a TOML file and reloadable at runtime.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

fn default_listen() -> String {
    "0.0.0.0:4317".to_owned()
}

fn default_max_fifo_size() -> usize {
    otlb_metrics::DEFAULT_MAX_FIFO_SIZE
}

fn default_fifo_expiry() -> u64 {
    otlb_metrics::DEFAULT_FIFO_EXPIRY_SECS
}

fn default_export_period() -> u32 {
    60
}

fn default_check_timeout() -> u32 {
    30
}

fn default_max_concurrent_checks() -> u32 {
    100
}

fn default_use_exemplar() -> bool {
    true
}

/// Whole-bridge settings. Fifo bounds and agent target settings may change
/// on reload; the listen endpoint is fixed for the process lifetime.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    /// Endpoint the bridge accepts agent connections on.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Per-metric fifo depth.
    #[serde(default = "default_max_fifo_size")]
    pub max_fifo_size: usize,

    /// Seconds before a buffered point expires.
    #[serde(default = "default_fifo_expiry")]
    pub fifo_expiry: u64,

    /// Seconds between agent exports, pushed to connected agents.
    #[serde(default = "default_export_period")]
    pub export_period: u32,

    /// Seconds a check waits for telemetry before timing out.
    #[serde(default = "default_check_timeout")]
    pub check_timeout: u32,

    /// Concurrency cap pushed to connected agents.
    #[serde(default = "default_max_concurrent_checks")]
    pub max_concurrent_checks: u32,

    /// Whether agents should attach threshold exemplars to their metrics.
    #[serde(default = "default_use_exemplar")]
    pub use_exemplar: bool,

    /// Encryption credentials pushed to agents over encrypted transports.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub salt: Option<String>,

    /// Agents the bridge dials out to instead of waiting for.
    #[serde(default)]
    pub reverse_endpoints: Vec<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_fifo_size: default_max_fifo_size(),
            fifo_expiry: default_fifo_expiry(),
            export_period: default_export_period(),
            check_timeout: default_check_timeout(),
            max_concurrent_checks: default_max_concurrent_checks(),
            use_exemplar: default_use_exemplar(),
            key: None,
            salt: None,
            reverse_endpoints: Vec::new(),
        }
    }
}

impl BridgeConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.max_fifo_size == 0 {
            return Err(EngineError::Config("max_fifo_size must be > 0".into()));
        }
        if self.fifo_expiry == 0 {
            return Err(EngineError::Config("fifo_expiry must be > 0".into()));
        }
        if self.export_period == 0 {
            return Err(EngineError::Config("export_period must be > 0".into()));
        }
        if self.check_timeout == 0 {
            return Err(EngineError::Config("check_timeout must be > 0".into()));
        }
        if self.key.is_some() != self.salt.is_some() {
            return Err(EngineError::Config(
                "key and salt must be set together".into(),
            ));
        }
        Ok(())
    }
}
