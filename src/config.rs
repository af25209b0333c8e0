//! Configuration management for the volunteer tracker.
//!
//! Configuration is loaded with figment from defaults, an optional TOML file
//! and `VOLUNTEER_TRACKER_` environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "volunteer-tracker.toml";

/// Environment variable prefix. Nested keys use `__`, e.g.
/// `VOLUNTEER_TRACKER_SERVER__PORT=8080`.
pub const ENV_PREFIX: &str = "VOLUNTEER_TRACKER_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `VOLUNTEER_TRACKER_`)
/// 2. TOML config file
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Admin account configuration.
    pub admin: AdminConfig,
    /// Spreadsheet sync configuration.
    pub sync: SyncConfig,
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// Port to bind.
    pub port: u16,
    /// Directory holding the built web client.
    pub static_dir: PathBuf,
    /// Lifetime of an admin login session in hours.
    pub session_hours: u64,
}

/// Storage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Keep data on disk. When false everything is lost on exit.
    pub persist: bool,
    /// Snapshot file path.
    pub data_path: PathBuf,
}

/// Admin account settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Login name of the admin account.
    pub username: String,
    /// Password given to the admin account when it is first created.
    pub default_password: String,
    /// Minimum length for a new admin password.
    pub min_password_len: usize,
}

/// Spreadsheet sync settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between auto-sync attempts.
    pub auto_interval_secs: u64,
    /// Base URL of the Sheets v4 REST API.
    pub sheets_api_base: String,
    /// OAuth token endpoint used when the key file does not name one.
    pub token_uri: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            static_dir: PathBuf::from("client/dist"),
            session_hours: 24,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            persist: true,
            data_path: PathBuf::from("database/tracker.bin.gz"),
        }
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            default_password: "admin123".to_string(),
            min_password_len: 6,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            auto_interval_secs: 15 * 60,
            sheets_api_base: "https://sheets.googleapis.com/v4".to_string(),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.server.session_hours == 0 {
            return Err(Error::ConfigValidation {
                message: "session_hours must be greater than 0".to_string(),
            });
        }

        if self.sync.auto_interval_secs == 0 {
            return Err(Error::ConfigValidation {
                message: "auto_interval_secs must be greater than 0".to_string(),
            });
        }

        if self.admin.min_password_len == 0 {
            return Err(Error::ConfigValidation {
                message: "min_password_len must be greater than 0".to_string(),
            });
        }

        if self.admin.username.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "admin username cannot be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Address to bind, as `host:port`.
    ///
    /// # Errors
    ///
    /// Returns an error if the host is not an IP address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|_| Error::ConfigValidation {
                message: format!("invalid server host: {}", self.server.host),
            })
    }

    /// Admin session lifetime.
    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.server.session_hours * 60 * 60)
    }

    /// Time between auto-sync ticks.
    #[must_use]
    pub fn auto_sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync.auto_interval_secs)
    }

    /// Snapshot path, or `None` for an in-memory store.
    #[must_use]
    pub fn data_path(&self) -> Option<&PathBuf> {
        self.storage.persist.then_some(&self.storage.data_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.session_hours, 24);
        assert_eq!(config.admin.username, "admin");
        assert_eq!(config.admin.min_password_len, 6);
        assert!(config.storage.persist);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_interval() {
        let mut config = Config::default();
        config.sync.auto_interval_secs = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("auto_interval_secs"));
    }

    #[test]
    fn test_validate_empty_admin() {
        let mut config = Config::default();
        config.admin.username = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bind_addr() {
        let config = Config::default();
        assert_eq!(config.bind_addr().unwrap().to_string(), "127.0.0.1:5000");

        let mut config = Config::default();
        config.server.host = "not a host".to_string();
        assert!(config.bind_addr().is_err());
    }

    #[test]
    fn test_data_path_respects_persist() {
        let mut config = Config::default();
        assert!(config.data_path().is_some());
        config.storage.persist = false;
        assert!(config.data_path().is_none());
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nport = 8080\n\n[storage]\npersist = false\n\n[sync]\nauto_interval_secs = 60"
        )
        .unwrap();

        let config = Config::load_from(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(!config.storage.persist);
        assert_eq!(config.sync.auto_interval_secs, 60);
        assert_eq!(config.server.host, "127.0.0.1");
    }
}
