//! Configuration management for Scanguard.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, ScanguardError};

/// Prefix for environment overrides, e.g. `SCANGUARD__ADMISSION__MAX_REQUESTS=5`.
const ENV_PREFIX: &str = "SCANGUARD";
const ENV_SEPARATOR: &str = "__";

/// Longest accepted duration setting, one year.
const MAX_DURATION_SECS: u64 = 365 * 24 * 60 * 60;

/// Main configuration for the Scanguard service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanguardConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Admission control configuration
    #[serde(default)]
    pub admission: AdmissionConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 3000))
}

/// Admission control configuration.
///
/// All durations are expressed in whole seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Requests admitted per window before the client is blocked
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Length of the counting window
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// How long a client stays blocked after exceeding the window budget
    #[serde(default = "default_block_secs")]
    pub block_secs: u64,

    /// Quiet period imposed after a completed scan
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Identities allowed to use the service. Empty means everyone.
    #[serde(default)]
    pub allow_list: Vec<String>,

    /// Interval between reaper sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_secs: default_window_secs(),
            block_secs: default_block_secs(),
            cooldown_secs: default_cooldown_secs(),
            allow_list: Vec::new(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_max_requests() -> u32 {
    3
}

fn default_window_secs() -> u64 {
    30
}

fn default_block_secs() -> u64 {
    120
}

fn default_cooldown_secs() -> u64 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    300
}

impl AdmissionConfig {
    /// Duration of the counting window.
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Duration of an escalated block.
    pub fn block(&self) -> Duration {
        Duration::from_secs(self.block_secs)
    }

    /// Duration of the post-scan cooldown.
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    /// Interval between reaper sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Reject settings that would make the limiter meaningless, and
    /// durations long enough to overflow a monotonic deadline.
    pub fn validate(&self) -> Result<()> {
        if self.max_requests == 0 {
            return Err(ScanguardError::Config(
                "admission.max_requests must be greater than zero".to_string(),
            ));
        }

        let durations = [
            ("window_secs", self.window_secs),
            ("block_secs", self.block_secs),
            ("cooldown_secs", self.cooldown_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
        ];

        for (field, secs) in durations {
            if secs == 0 {
                return Err(ScanguardError::Config(format!(
                    "admission.{} must be greater than zero",
                    field
                )));
            }
            if secs > MAX_DURATION_SECS {
                return Err(ScanguardError::Config(format!(
                    "admission.{} must be at most {} seconds, got {}",
                    field, MAX_DURATION_SECS, secs
                )));
            }
        }

        Ok(())
    }
}

impl ScanguardConfig {
    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: ScanguardConfig = serde_yaml::from_str(yaml)
            .map_err(|e| ScanguardError::Config(format!("Failed to parse config: {}", e)))?;
        config.admission.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional file layered under
    /// `SCANGUARD__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Like [`ScanguardConfig::load`], but reads overrides from `env`
    /// instead of the process environment when it is given.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                config::File::from(path).format(config::FileFormat::Yaml),
            );
        }

        let config: ScanguardConfig = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("admission.allow_list")
                    .source(env),
            )
            .build()?
            .try_deserialize()?;

        config.admission.validate()?;
        Ok(config)
    }
}
