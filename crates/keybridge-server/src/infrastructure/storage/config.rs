//! TOML configuration for the bridge servers.
//!
//! Every field has a default, so an empty (or absent) file yields a working
//! configuration:
//!
//! ```toml
//! log_level = "info"
//!
//! [observer]
//! socket_path = "/tmp/zmk_ipc.sock"
//! max_clients = 4
//!
//! [kscan]
//! socket_path = "/tmp/zmk_kscan_ipc.sock"
//! rows = 4
//! columns = 12
//! ```
//!
//! Fields annotated with `#[serde(default = "some_fn")]` take the value of
//! `some_fn()` when missing, so older files keep loading when new settings are
//! added.

use std::path::{Path, PathBuf};

use keybridge_core::MatrixGeometry;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed but cannot be used.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BridgeConfig {
    /// `tracing` filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub observer: ObserverConfig,
    #[serde(default)]
    pub kscan: KscanConfig,
}

/// Event broadcast socket.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObserverConfig {
    #[serde(default = "default_observer_socket")]
    pub socket_path: PathBuf,
    /// Size of the subscriber table.  Connections beyond it are closed on
    /// accept.
    #[serde(default = "default_max_clients")]
    pub max_clients: usize,
}

/// Key injection socket and the matrix it feeds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct KscanConfig {
    #[serde(default = "default_kscan_socket")]
    pub socket_path: PathBuf,
    #[serde(default = "default_rows")]
    pub rows: u32,
    /// Used to resolve linear key positions.  Zero disables linear addressing.
    #[serde(default = "default_columns")]
    pub columns: u32,
}

impl KscanConfig {
    pub fn geometry(&self) -> MatrixGeometry {
        MatrixGeometry::new(self.rows, self.columns)
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_observer_socket() -> PathBuf {
    PathBuf::from("/tmp/zmk_ipc.sock")
}
fn default_max_clients() -> usize {
    4
}
fn default_kscan_socket() -> PathBuf {
    PathBuf::from("/tmp/zmk_kscan_ipc.sock")
}
fn default_rows() -> u32 {
    4
}
fn default_columns() -> u32 {
    12
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            observer: ObserverConfig::default(),
            kscan: KscanConfig::default(),
        }
    }
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            socket_path: default_observer_socket(),
            max_clients: default_max_clients(),
        }
    }
}

impl Default for KscanConfig {
    fn default() -> Self {
        Self {
            socket_path: default_kscan_socket(),
            rows: default_rows(),
            columns: default_columns(),
        }
    }
}

impl BridgeConfig {
    /// Rejects settings the servers cannot run with.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Invalid`] for an empty subscriber table or two servers
    /// sharing one socket path.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.observer.max_clients == 0 {
            return Err(ConfigError::Invalid(
                "observer.max_clients must be at least 1".to_string(),
            ));
        }
        if self.observer.socket_path == self.kscan.socket_path {
            return Err(ConfigError::Invalid(format!(
                "observer and kscan share socket path {}",
                self.observer.socket_path.display()
            )));
        }
        Ok(())
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Loads a [`BridgeConfig`] from `path`, returning the defaults if the file
/// does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<BridgeConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let cfg: BridgeConfig = toml::from_str(&content)?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BridgeConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories.
pub fn save_config_to(path: &Path, config: &BridgeConfig) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("keybridge-config-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[test]
    fn test_default_config_matches_firmware_defaults() {
        // Arrange / Act
        let cfg = BridgeConfig::default();

        // Assert
        assert_eq!(cfg.observer.socket_path, PathBuf::from("/tmp/zmk_ipc.sock"));
        assert_eq!(cfg.observer.max_clients, 4);
        assert_eq!(cfg.kscan.socket_path, PathBuf::from("/tmp/zmk_kscan_ipc.sock"));
        assert_eq!(cfg.kscan.geometry(), MatrixGeometry::new(4, 12));
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let cfg: BridgeConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, BridgeConfig::default());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        // Arrange
        let text = "[kscan]\ncolumns = 4\n";

        // Act
        let cfg: BridgeConfig = toml::from_str(text).unwrap();

        // Assert
        assert_eq!(cfg.kscan.columns, 4);
        assert_eq!(cfg.kscan.rows, 4);
        assert_eq!(cfg.observer, ObserverConfig::default());
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let path = temp_path("bad.toml");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "observer = [").unwrap();
        assert!(matches!(load_config_from(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let path = temp_path("absent.toml");
        assert_eq!(load_config_from(&path).unwrap(), BridgeConfig::default());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        // Arrange
        let path = temp_path("config.toml");
        let mut cfg = BridgeConfig::default();
        cfg.observer.max_clients = 8;
        cfg.kscan.socket_path = PathBuf::from("/run/kb/kscan.sock");

        // Act
        save_config_to(&path, &cfg).unwrap();
        let restored = load_config_from(&path).unwrap();

        // Assert
        assert_eq!(restored, cfg);
    }

    #[test]
    fn test_validate_rejects_zero_max_clients() {
        let mut cfg = BridgeConfig::default();
        cfg.observer.max_clients = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_shared_socket_path() {
        let mut cfg = BridgeConfig::default();
        cfg.kscan.socket_path = cfg.observer.socket_path.clone();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_zero_columns() {
        let mut cfg = BridgeConfig::default();
        cfg.kscan.columns = 0;
        assert!(cfg.validate().is_ok());
    }
}
