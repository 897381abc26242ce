//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_SERVER_URL=https://api.example.com/api                       │
//! │     TALLY_BUSINESS_ID=business-1                                       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tally/sync.toml (Linux)                                  │
//! │     ~/Library/Application Support/com.tally.tally/sync.toml (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │                                                                         │
//! │  The device id is NOT configuration: it lives in the store's           │
//! │  sync_config table and is generated exactly once.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # sync.toml
//! [server]
//! base_url = "https://api.example.com/api"
//! health_path = "/health"
//!
//! [sync]
//! push_interval_secs = 30
//! pull_interval_secs = 120
//! pull_collections = ["customers", "products", "sessions"]
//!
//! [business]
//! id = "business-1"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};
use tally_core::Collection;

// =============================================================================
// Server Settings
// =============================================================================

/// Where the sync endpoints live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Base URL the endpoint paths are appended to.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Static bearer token. Refreshing it is the host application's job.
    #[serde(default)]
    pub api_token: Option<String>,

    /// Liveness probe path.
    #[serde(default = "default_health_path")]
    pub health_path: String,

    /// Batch push path.
    #[serde(default = "default_batch_path")]
    pub batch_path: String,

    /// Incremental pull path.
    #[serde(default = "default_pull_path")]
    pub pull_path: String,
}

fn default_base_url() -> String {
    "http://localhost:3000/api".to_string()
}

fn default_health_path() -> String {
    "/health".to_string()
}

fn default_batch_path() -> String {
    "/sync/batch".to_string()
}

fn default_pull_path() -> String {
    "/sync/pull".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        ServerSettings {
            base_url: default_base_url(),
            api_token: None,
            health_path: default_health_path(),
            batch_path: default_batch_path(),
            pull_path: default_pull_path(),
        }
    }
}

impl ServerSettings {
    /// Joins an endpoint path onto the base URL, keeping any base path.
    ///
    /// `https://host/api` + `/sync/batch` → `https://host/api/sync/batch`
    pub fn endpoint(&self, path: &str) -> SyncResult<Url> {
        let base = format!("{}/", self.base_url.trim_end_matches('/'));
        let url = Url::parse(&base)?.join(path.trim_start_matches('/'))?;
        Ok(url)
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync cadence and timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Push timer period (seconds).
    #[serde(default = "default_push_interval")]
    pub push_interval_secs: u64,

    /// Pull timer period (seconds).
    #[serde(default = "default_pull_interval")]
    pub pull_interval_secs: u64,

    /// Delay of the one-shot startup kick (milliseconds).
    #[serde(default = "default_startup_delay")]
    pub startup_delay_ms: u64,

    /// Delay between a local write and its push kick (milliseconds).
    #[serde(default = "default_local_write_kick")]
    pub local_write_kick_ms: u64,

    /// Health probe timeout (seconds).
    #[serde(default = "default_health_timeout")]
    pub health_timeout_secs: u64,

    /// Batch / pull request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Pause after a 401 before either direction tries again (seconds).
    #[serde(default = "default_auth_cooldown")]
    pub auth_cooldown_secs: u64,

    /// Collections requested by pull.
    #[serde(default = "default_pull_collections")]
    pub pull_collections: Vec<Collection>,
}

fn default_push_interval() -> u64 {
    30
}
fn default_pull_interval() -> u64 {
    120
}
fn default_startup_delay() -> u64 {
    2000
}
fn default_local_write_kick() -> u64 {
    100
}
fn default_health_timeout() -> u64 {
    5
}
fn default_request_timeout() -> u64 {
    30
}
fn default_auth_cooldown() -> u64 {
    60
}
fn default_pull_collections() -> Vec<Collection> {
    vec![Collection::Customers, Collection::Products, Collection::Sessions]
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            push_interval_secs: default_push_interval(),
            pull_interval_secs: default_pull_interval(),
            startup_delay_ms: default_startup_delay(),
            local_write_kick_ms: default_local_write_kick(),
            health_timeout_secs: default_health_timeout(),
            request_timeout_secs: default_request_timeout(),
            auth_cooldown_secs: default_auth_cooldown(),
            pull_collections: default_pull_collections(),
        }
    }
}

impl SyncSettings {
    pub fn push_interval(&self) -> Duration {
        Duration::from_secs(self.push_interval_secs)
    }

    pub fn pull_interval(&self) -> Duration {
        Duration::from_secs(self.pull_interval_secs)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_millis(self.startup_delay_ms)
    }

    pub fn local_write_kick(&self) -> Duration {
        Duration::from_millis(self.local_write_kick_ms)
    }

    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn auth_cooldown(&self) -> Duration {
        Duration::from_secs(self.auth_cooldown_secs)
    }
}

// =============================================================================
// Business Configuration
// =============================================================================

/// The tenant this device writes for.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusinessConfig {
    /// Stamped onto every locally created record.
    pub id: String,
}

impl Default for BusinessConfig {
    fn default() -> Self {
        BusinessConfig {
            id: "default-business".to_string(),
        }
    }
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete sync configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Endpoint settings.
    #[serde(default)]
    pub server: ServerSettings,

    /// Cadence and timeouts.
    #[serde(default)]
    pub sync: SyncSettings,

    /// Tenant scope.
    #[serde(default)]
    pub business: BusinessConfig,
}

impl SyncConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load sync config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        let url = Url::parse(&self.server.base_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SyncError::InvalidUrl(format!(
                "Server URL must start with http:// or https://, got: {}",
                self.server.base_url
            )));
        }

        for (name, path) in [
            ("health_path", &self.server.health_path),
            ("batch_path", &self.server.batch_path),
            ("pull_path", &self.server.pull_path),
        ] {
            if path.trim().is_empty() {
                return Err(SyncError::InvalidConfig(format!("{name} must not be empty")));
            }
        }

        if self.sync.push_interval_secs == 0 || self.sync.pull_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "push and pull intervals must be greater than 0".into(),
            ));
        }

        if self.sync.health_timeout_secs == 0 || self.sync.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "timeouts must be greater than 0".into(),
            ));
        }

        if self.sync.pull_collections.is_empty() {
            return Err(SyncError::InvalidConfig(
                "pull_collections must name at least one collection".into(),
            ));
        }

        if self.business.id.trim().is_empty() {
            return Err(SyncError::InvalidConfig("business.id is required".into()));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("TALLY_SERVER_URL") {
            debug!(url = %url, "Overriding server URL from environment");
            self.server.base_url = url;
        }

        if let Ok(token) = std::env::var("TALLY_API_TOKEN") {
            self.server.api_token = Some(token);
        }

        if let Ok(id) = std::env::var("TALLY_BUSINESS_ID") {
            debug!(business_id = %id, "Overriding business id from environment");
            self.business.id = id;
        }

        if let Ok(secs) = std::env::var("TALLY_PUSH_INTERVAL_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.sync.push_interval_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring invalid TALLY_PUSH_INTERVAL_SECS"),
            }
        }

        if let Ok(secs) = std::env::var("TALLY_PULL_INTERVAL_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.sync.pull_interval_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring invalid TALLY_PULL_INTERVAL_SECS"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "tally", "tally")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Returns the business id.
    pub fn business_id(&self) -> &str {
        &self.business.id
    }

    /// Returns the server base URL.
    pub fn server_url(&self) -> &str {
        &self.server.base_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert_eq!(config.sync.push_interval_secs, 30);
        assert_eq!(config.sync.pull_interval_secs, 120);
        assert_eq!(config.sync.startup_delay_ms, 2000);
        assert_eq!(config.sync.health_timeout_secs, 5);
        assert_eq!(
            config.sync.pull_collections,
            vec![Collection::Customers, Collection::Products, Collection::Sessions]
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();

        config.server.base_url = "ws://localhost:8080".to_string();
        assert!(config.validate().unwrap_err().is_config_error());

        config.server.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.server.base_url = "https://api.example.com/api".to_string();
        assert!(config.validate().is_ok());

        config.sync.push_interval_secs = 0;
        assert!(config.validate().is_err());
        config.sync.push_interval_secs = 30;

        config.business.id = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoint_keeps_base_path() {
        let mut server = ServerSettings::default();
        server.base_url = "https://api.example.com/api/".to_string();

        let url = server.endpoint("/sync/batch").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/api/sync/batch");

        let health = server.endpoint("health").unwrap();
        assert_eq!(health.as_str(), "https://api.example.com/api/health");
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: SyncConfig = toml::from_str(
            r#"
            [server]
            base_url = "https://sync.example.com"

            [sync]
            push_interval_secs = 10
            pull_collections = ["products", "counted_items"]
            "#,
        )
        .unwrap();

        assert_eq!(config.sync.push_interval_secs, 10);
        assert_eq!(config.sync.pull_interval_secs, 120);
        assert_eq!(
            config.sync.pull_collections,
            vec![Collection::Products, Collection::CountedItems]
        );
        assert_eq!(config.server.batch_path, "/sync/batch");
        assert_eq!(config.business.id, "default-business");
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sync.toml");

        let mut config = SyncConfig::default();
        config.server.base_url = "https://sync.example.com".to_string();
        config.business.id = "biz-42".to_string();
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[server]"));
        assert!(contents.contains("[sync]"));

        let loaded: SyncConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.business.id, "biz-42");
        assert_eq!(loaded.server.base_url, "https://sync.example.com");
    }
}
