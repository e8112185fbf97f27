use std::{collections::HashMap, path::PathBuf, time::Duration};

use config::{Config as ConfigLib, ConfigError, Environment, File};
use serde::Deserialize;

/// Revocation-check policy applied to a peer certificate chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckMode {
    /// No CRL checks are performed.
    Disabled,
    /// A disqualified certificate aborts the connection.
    Enabled,
    /// Failures are logged but the connection proceeds, except for a
    /// confirmed revocation.
    Advisory,
}

/// Per-connection CRL validation settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorConfig {
    pub check_mode: CheckMode,
    pub allow_certificates_without_crl_url: bool,
    pub in_memory_cache: bool,
    pub on_disk_cache: bool,
    pub download_timeout_ms: u64,
}

impl ValidatorConfig {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_millis(self.download_timeout_ms)
    }
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            check_mode: CheckMode::Disabled,
            allow_certificates_without_crl_url: false,
            in_memory_cache: true,
            on_disk_cache: true,
            download_timeout_ms: 10_000,
        }
    }
}

/// Full configuration surface of the CRL subsystem: the per-connection
/// validator settings plus the process-wide cache parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct CrlConfig {
    pub check_mode: CheckMode,
    pub allow_certificates_without_crl_url: bool,
    pub in_memory_cache: bool,
    pub on_disk_cache: bool,
    pub download_timeout_ms: u64,
    /// Cached CRLs are refreshed at least once per this window, even when
    /// their own nextUpdate lies further in the future.
    pub cache_validity_time_ms: u64,
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl CrlConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    pub fn load_with_sources(
        env_vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = ConfigLib::builder()
            .set_default("check_mode", "DISABLED")?
            .set_default("allow_certificates_without_crl_url", false)?
            .set_default("in_memory_cache", true)?
            .set_default("on_disk_cache", true)?
            .set_default("download_timeout_ms", 10_000)?
            .set_default("cache_validity_time_ms", 86_400_000)?
            .add_source(File::with_name("config/settings").required(false));

        // If env_vars is provided, we use it instead of system environment
        // This is to avoid systems variables pollution across tests
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // Should be in the format CRL_CHECK_MODE or CRL_CACHE_DIR
            builder = builder.add_source(Environment::with_prefix("CRL").prefix_separator("_"));
        }

        builder.build()?.try_deserialize()
    }

    /// The per-connection slice of this configuration.
    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            check_mode: self.check_mode,
            allow_certificates_without_crl_url: self.allow_certificates_without_crl_url,
            in_memory_cache: self.in_memory_cache,
            on_disk_cache: self.on_disk_cache,
            download_timeout_ms: self.download_timeout_ms,
        }
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(default_cache_dir)
    }

    pub fn cache_validity(&self) -> Duration {
        Duration::from_millis(self.cache_validity_time_ms)
    }
}

/// Platform cache root plus a fixed `crls` subdirectory.
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("crl-validator")
        .join("crls")
}
