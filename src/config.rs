use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use drainr::daemon::ServeOptions;
use drainr::ipc::{IpcClientConfig, IpcServerConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub server: ServerConfig,
    pub drain: DrainConfig,
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub socket_path: Option<PathBuf>,
    pub max_clients: usize,
    pub event_channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            max_clients: 16,
            event_channel_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DrainConfig {
    pub timeout_ms: u64,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self { timeout_ms: 30000 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30000,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            server: ServerConfig::default(),
            drain: DrainConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        if let Some(config_dir) = dirs::config_dir() {
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Socket path, preferring a command-line override
    pub fn socket_path(&self, override_path: Option<&PathBuf>) -> PathBuf {
        override_path
            .or(self.server.socket_path.as_ref())
            .cloned()
            .unwrap_or_else(drainr::daemon::default_socket_path)
    }

    pub fn serve_options(&self, socket: Option<&PathBuf>, drain_timeout_ms: Option<u64>) -> ServeOptions {
        let mut server = IpcServerConfig::default()
            .with_socket_path(self.socket_path(socket))
            .with_max_clients(self.server.max_clients);
        server.event_channel_capacity = self.server.event_channel_capacity;

        ServeOptions {
            server,
            drain_timeout: Duration::from_millis(drain_timeout_ms.unwrap_or(self.drain.timeout_ms)),
        }
    }

    pub fn client_config(&self, socket: Option<&PathBuf>) -> IpcClientConfig {
        IpcClientConfig::with_socket(self.socket_path(socket))
            .with_request_timeout_ms(self.client.request_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.log_level.as_deref(), Some("info"));
        assert_eq!(config.server.max_clients, 16);
        assert_eq!(config.drain.timeout_ms, 30000);
        assert_eq!(config.client.request_timeout_ms, 30000);
    }

    #[test]
    fn test_load_explicit_file_with_partial_sections() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("drainr.yml");
        fs::write(&path, "drain:\n  timeout_ms: 500\nserver:\n  socket_path: /tmp/d.sock\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.drain.timeout_ms, 500);
        assert_eq!(config.server.socket_path, Some(PathBuf::from("/tmp/d.sock")));
        assert_eq!(config.server.max_clients, 16);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_load_invalid_yaml_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.yml");
        fs::write(&path, "drain: [not, a, map").unwrap();
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_serve_options_overrides() {
        let mut config = Config::default();
        config.server.socket_path = Some(PathBuf::from("/from/config.sock"));
        config.drain.timeout_ms = 1000;

        let options = config.serve_options(None, None);
        assert_eq!(options.server.socket_path, PathBuf::from("/from/config.sock"));
        assert_eq!(options.drain_timeout, Duration::from_millis(1000));

        let cli_socket = PathBuf::from("/from/cli.sock");
        let options = config.serve_options(Some(&cli_socket), Some(250));
        assert_eq!(options.server.socket_path, cli_socket);
        assert_eq!(options.drain_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_client_config() {
        let mut config = Config::default();
        config.client.request_timeout_ms = 42;
        let client = config.client_config(Some(&PathBuf::from("/x.sock")));
        assert_eq!(client.socket_path, PathBuf::from("/x.sock"));
        assert_eq!(client.request_timeout_ms, 42);
    }
}
