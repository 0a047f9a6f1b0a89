//! Configuration management
//!
//! Handles:
//! - Backend origin and endpoint paths
//! - Timeout tiers
//! - Polling and health-probe cadence
//! - Credential persistence settings
//! - TOML file in the OS config directory, with environment overrides

use crate::error::{Result, TelemetryError};
use crate::source::SourceMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    pub backend: BackendConfig,
    pub timeouts: TimeoutConfig,
    pub polling: PollingSettings,
    pub prober: ProberConfig,
    pub credentials: CredentialConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BackendConfig {
    pub base_url: String,
    pub health_path: String,
    pub metrics_path: String,
    pub login_path: String,
}

/// Deadlines per timeout tier, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub health_ms: u64,
    pub bulk_metrics_ms: u64,
    pub default_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollingSettings {
    pub mode: SourceMode,
    pub interval_secs: u64,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProberConfig {
    pub interval_secs: u64,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CredentialConfig {
    pub persist: bool,
    pub keyring_service: String,
    pub keyring_key: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            timeouts: TimeoutConfig::default(),
            polling: PollingSettings::default(),
            prober: ProberConfig::default(),
            credentials: CredentialConfig::default(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            health_path: "/health".to_string(),
            metrics_path: "/api/dashboard/metrics".to_string(),
            login_path: "/api/auth/login".to_string(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            health_ms: 8_000,
            bulk_metrics_ms: 30_000,
            default_ms: 15_000,
        }
    }
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            mode: SourceMode::Live,
            interval_secs: 5,
            enabled: true,
        }
    }
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            enabled: true,
        }
    }
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            persist: true,
            keyring_service: "aegis-monitor".to_string(),
            keyring_key: "bearer-token".to_string(),
        }
    }
}

impl PollingSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl ProberConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl TelemetryConfig {
    /// Load config from `AEGIS_CONFIG` or the OS-specific location
    pub async fn load() -> Result<Self> {
        let path = match std::env::var("AEGIS_CONFIG") {
            Ok(p) if !p.is_empty() => PathBuf::from(p),
            _ => Self::config_file_path()?,
        };
        let mut config = Self::load_from(&path).await?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load config from a given file; a missing file yields defaults
    pub async fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| TelemetryError::Config(format!("{}: {}", path.display(), e)))?;
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        let config: TelemetryConfig = toml::from_str(&content)
            .map_err(|e| TelemetryError::Config(format!("{}: {}", path.display(), e)))?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TelemetryError::Config(e.to_string()))?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| TelemetryError::Config(e.to_string()))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| TelemetryError::Config(e.to_string()))
    }

    /// Get OS-specific config file path
    pub fn config_file_path() -> Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| TelemetryError::Config("could not find config directory".into()))?;
        path.push("aegis-monitor");
        path.push("config.toml");
        Ok(path)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("AEGIS_BASE_URL") {
            if !url.is_empty() {
                self.backend.base_url = url;
            }
        }
        if let Ok(mode) = std::env::var("AEGIS_MODE") {
            self.polling.mode = mode.parse()?;
        }
        if let Ok(secs) = std::env::var("AEGIS_POLL_INTERVAL_SECS") {
            self.polling.interval_secs = secs
                .parse()
                .map_err(|_| TelemetryError::Config(format!("invalid poll interval: {}", secs)))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.timeouts.health_ms, 8_000);
        assert_eq!(config.timeouts.bulk_metrics_ms, 30_000);
        assert_eq!(config.timeouts.default_ms, 15_000);
        assert_eq!(config.polling.mode, SourceMode::Live);
        assert!(config.polling.enabled);
    }

    #[test]
    fn test_config_file_path() {
        let path = TelemetryConfig::config_file_path().unwrap();
        assert!(path.to_string_lossy().contains("aegis-monitor"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: TelemetryConfig = toml::from_str(
            r#"
            [backend]
            base_url = "https://soc.example.net"

            [polling]
            mode = "simulated"
            "#,
        )
        .unwrap();
        assert_eq!(config.backend.base_url, "https://soc.example.net");
        assert_eq!(config.backend.metrics_path, "/api/dashboard/metrics");
        assert_eq!(config.polling.mode, SourceMode::Simulated);
        assert_eq!(config.polling.interval_secs, 5);
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = TelemetryConfig::default();
        config.polling.interval_secs = 12;
        config.save_to(&path).await.unwrap();

        let loaded = TelemetryConfig::load_from(&path).await.unwrap();
        assert_eq!(loaded, config);
    }

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = TelemetryConfig::load_from(&dir.path().join("absent.toml"))
            .await
            .unwrap();
        assert_eq!(loaded, TelemetryConfig::default());
    }

    #[tokio::test]
    async fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        tokio::fs::write(&path, "[polling]\ninterval_secs = \"soon\"")
            .await
            .unwrap();
        assert!(matches!(
            TelemetryConfig::load_from(&path).await,
            Err(TelemetryError::Config(_))
        ));
    }
}
