use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use ems::ipc::{ByteOrder, MAX_RESERVATION_SIZE, ServerConfig};
use ems::ipc::server::DEFAULT_WORKERS;
use ems::store::DEFAULT_MAX_EVENT_SEATS;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: Option<String>,
    pub server: ServerSection,
    pub client: ClientSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub workers: usize,
    pub access_delay_us: u64,
    pub max_reservation_size: usize,
    pub max_event_seats: usize,
    pub byte_order: ByteOrder,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            access_delay_us: 1,
            max_reservation_size: MAX_RESERVATION_SIZE,
            max_event_seats: DEFAULT_MAX_EVENT_SEATS,
            byte_order: ByteOrder::Native,
        }
    }
}

impl ServerSection {
    /// Server settings for `endpoint`; `delay_us` from the command line wins
    /// over the configured access delay.
    pub fn to_server_config(&self, endpoint: &Path, delay_us: Option<u64>) -> ServerConfig {
        ServerConfig::default()
            .with_endpoint(endpoint)
            .with_workers(self.workers)
            .with_access_delay(Duration::from_micros(delay_us.unwrap_or(self.access_delay_us)))
            .with_max_reservation_size(self.max_reservation_size)
            .with_max_event_seats(self.max_event_seats)
            .with_byte_order(self.byte_order)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    pub byte_order: ByteOrder,
    pub max_reservation_size: usize,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::Native,
            max_reservation_size: MAX_RESERVATION_SIZE,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: Some("info".to_string()),
            server: ServerSection::default(),
            client: ClientSection::default(),
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
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
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
        let project_name = env!("CARGO_PKG_NAME");
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
}
