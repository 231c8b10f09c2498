//! Daemon configuration (SPEC_FULL §10 "Ambient stack detail").
//!
//! Load order, low to high precedence: built-in defaults, then the config
//! file (if present), then `QUICKSHARE_*` environment variables. The file
//! path itself can be overridden with `$QUICKSHARE_CONFIG`; otherwise it is
//! looked up under `$XDG_CONFIG_HOME` (falling back to `~/.config`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Recommended chunk size for file payload pumping (§4.6 "Sender path").
pub const DEFAULT_CHUNK_SIZE_BYTES: usize = 512 * 1024;

/// Keep-alive cadence (§4.5 "Keep-alive").
pub const DEFAULT_KEEPALIVE_INTERVAL_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub listen_addr: String,
    pub listen_port: u16,
    pub download_dir: PathBuf,
    pub chunk_size_bytes: usize,
    pub keepalive_interval_secs: u64,
    pub device_name: String,
    pub device_type: u8,
    pub visible: bool,
    pub ipc_bind_addr: String,
    pub ipc_port: u16,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0".to_string(),
            listen_port: 0,
            download_dir: default_download_dir(),
            chunk_size_bytes: DEFAULT_CHUNK_SIZE_BYTES,
            keepalive_interval_secs: DEFAULT_KEEPALIVE_INTERVAL_SECS,
            device_name: default_device_name(),
            device_type: 3, // opaque per §9 — "3 = laptop/phone" is the only documented value
            visible: true,
            ipc_bind_addr: "127.0.0.1".to_string(),
            ipc_port: 9100,
        }
    }
}

impl DaemonConfig {
    /// Load the effective configuration: defaults, then file (if any),
    /// then environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = Self::file_path();
        if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadFailed(path.clone(), e))?;
            config = toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.clone(), e))?;
        }

        config.apply_env_overrides();
        Ok(config)
    }

    /// The config file path: `$QUICKSHARE_CONFIG` if set, otherwise
    /// `$XDG_CONFIG_HOME/quickshare/config.toml` (or `~/.config/...`).
    pub fn file_path() -> PathBuf {
        if let Ok(path) = std::env::var("QUICKSHARE_CONFIG") {
            return PathBuf::from(path);
        }
        config_dir().join("config.toml")
    }

    /// Write the current configuration to [`file_path`](Self::file_path) if
    /// no file exists there yet. Used by first-run daemon startup.
    pub fn write_default_if_missing(&self) -> Result<(), ConfigError> {
        let path = Self::file_path();
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        let text = toml::to_string_pretty(self).map_err(ConfigError::SerializeFailed)?;
        std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("QUICKSHARE_LISTEN_ADDR") {
            self.listen_addr = v;
        }
        if let Ok(v) = std::env::var("QUICKSHARE_LISTEN_PORT") {
            if let Ok(port) = v.parse() {
                self.listen_port = port;
            }
        }
        if let Ok(v) = std::env::var("QUICKSHARE_DOWNLOAD_DIR") {
            self.download_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("QUICKSHARE_DEVICE_NAME") {
            self.device_name = v;
        }
        if let Ok(v) = std::env::var("QUICKSHARE_IPC_PORT") {
            if let Ok(port) = v.parse() {
                self.ipc_port = port;
            }
        }
    }
}

fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return Path::new(&xdg).join("quickshare");
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/root".to_string());
    Path::new(&home).join(".config").join("quickshare")
}

fn default_download_dir() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/root".to_string());
    Path::new(&home).join("Downloads")
}

fn default_device_name() -> String {
    hostname_or_default()
}

fn hostname_or_default() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "quickshare-device".to_string())
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0:?}: {1}")]
    ReadFailed(PathBuf, std::io::Error),

    #[error("failed to parse config file {0:?}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),

    #[error("failed to write config file {0:?}: {1}")]
    WriteFailed(PathBuf, std::io::Error),

    #[error("failed to serialize config: {0}")]
    SerializeFailed(toml::ser::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = DaemonConfig::default();
        assert_eq!(config.chunk_size_bytes, DEFAULT_CHUNK_SIZE_BYTES);
        assert_eq!(config.keepalive_interval_secs, DEFAULT_KEEPALIVE_INTERVAL_SECS);
        assert!(config.visible);
    }

    #[test]
    fn toml_round_trips() {
        let config = DaemonConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: DaemonConfig = toml::from_str(&text).unwrap();
        assert_eq!(config.listen_addr, parsed.listen_addr);
        assert_eq!(config.chunk_size_bytes, parsed.chunk_size_bytes);
    }

    #[test]
    fn env_override_takes_precedence_over_file() {
        // SAFETY: test-only, single-threaded within this test's scope via serial env use.
        unsafe {
            std::env::set_var("QUICKSHARE_DEVICE_NAME", "env-override-name");
        }
        let mut config = DaemonConfig::default();
        config.apply_env_overrides();
        assert_eq!(config.device_name, "env-override-name");
        unsafe {
            std::env::remove_var("QUICKSHARE_DEVICE_NAME");
        }
    }

    #[test]
    fn config_file_path_honors_explicit_override() {
        unsafe {
            std::env::set_var("QUICKSHARE_CONFIG", "/tmp/quickshare-test-config.toml");
        }
        assert_eq!(
            DaemonConfig::file_path(),
            PathBuf::from("/tmp/quickshare-test-config.toml")
        );
        unsafe {
            std::env::remove_var("QUICKSHARE_CONFIG");
        }
    }
}
