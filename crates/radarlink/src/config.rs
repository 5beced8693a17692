//! Configuration management for radarlink.
//!
//! Loaded with figment from defaults, a TOML file, and `RADARLINK_`
//! environment variables.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "radarlink";

/// Default history log file name.
const HISTORY_FILE_NAME: &str = "historial.json";

/// Application configuration.
///
/// Precedence, highest first:
/// 1. Environment variables (`RADARLINK_LINK__PORT=/dev/ttyUSB0`)
/// 2. TOML config file at `~/.config/radarlink/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hardware link configuration.
    pub link: LinkConfig,
    /// History log configuration.
    pub storage: StorageConfig,
    /// HTTP/WebSocket server configuration.
    pub server: ServerConfig,
    /// Synthetic generator configuration.
    pub simulation: SimulationConfig,
    /// Radar rendering configuration.
    pub display: DisplayConfig,
}

/// Serial link and framing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Serial port name, e.g. `/dev/ttyACM0` or `COM4`.
    pub port: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Frame terminator. Must be a single ASCII character.
    pub delimiter: char,
    /// Field separator inside a frame. Must be a single ASCII character.
    pub separator: char,
    /// Maximum bytes buffered while waiting for a delimiter.
    pub max_frame_bytes: usize,
    /// Serial read timeout in milliseconds.
    pub read_timeout_ms: u64,
}

/// History log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the JSON history log.
    /// Defaults to `~/.local/share/radarlink/historial.json`
    pub history_path: Option<PathBuf>,
}

/// HTTP/WebSocket server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address.
    pub listen: SocketAddr,
    /// Per-client broadcast buffer; slower clients skip samples.
    pub broadcast_capacity: usize,
    /// Pending appends accepted by the history writer queue.
    pub store_queue: usize,
}

/// Synthetic sample generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Tick period in milliseconds.
    pub tick_ms: u64,
    /// Probability per tick of logging a detection.
    pub detection_probability: f64,
    /// Exclusive upper bound of generated angles.
    pub angle_max: i32,
    /// Inclusive lower bound of generated distances.
    pub distance_min: u32,
    /// Exclusive upper bound of generated distances.
    pub distance_max: u32,
    /// Fixed RNG seed; `None` seeds from entropy.
    pub seed: Option<u64>,
}

/// Radar rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// SVG width in pixels.
    pub width: u32,
    /// SVG height in pixels.
    pub height: u32,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port: default_port().to_string(),
            baud_rate: 9600,
            delimiter: '.',
            separator: ',',
            max_frame_bytes: 1024,
            read_timeout_ms: 100,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 3000)),
            broadcast_capacity: 64,
            store_queue: 256,
        }
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tick_ms: 150,
            detection_probability: 0.3,
            angle_max: 180,
            distance_min: 20,
            distance_max: 220,
            seed: None,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 500,
        }
    }
}

#[cfg(windows)]
fn default_port() -> &'static str {
    "COM4"
}

#[cfg(not(windows))]
fn default_port() -> &'static str {
    "/dev/ttyACM0"
}

impl LinkConfig {
    /// Delimiter as a byte. Only meaningful after validation.
    #[must_use]
    pub fn delimiter_byte(&self) -> u8 {
        ascii_byte(self.delimiter)
    }

    /// Separator as a byte. Only meaningful after validation.
    #[must_use]
    pub fn separator_byte(&self) -> u8 {
        ascii_byte(self.separator)
    }

    /// Read timeout as a Duration.
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

fn ascii_byte(c: char) -> u8 {
    u8::try_from(c).ok().filter(u8::is_ascii).unwrap_or(b'?')
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading, parsing or validation fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("RADARLINK_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        let link = &self.link;
        if link.port.trim().is_empty() {
            return Err(invalid("link.port must not be empty"));
        }
        if link.baud_rate == 0 {
            return Err(invalid("link.baud_rate must be greater than 0"));
        }
        for (name, c) in [("delimiter", link.delimiter), ("separator", link.separator)] {
            if !c.is_ascii() || c.is_ascii_digit() || c == '-' || c == '+' {
                return Err(invalid(format!(
                    "link.{name} must be an ASCII character that cannot appear in a number, got {c:?}"
                )));
            }
        }
        if link.delimiter == link.separator {
            return Err(invalid("link.delimiter and link.separator must differ"));
        }
        if link.max_frame_bytes == 0 {
            return Err(invalid("link.max_frame_bytes must be greater than 0"));
        }

        if self.server.broadcast_capacity == 0 || self.server.store_queue == 0 {
            return Err(invalid(
                "server.broadcast_capacity and server.store_queue must be greater than 0",
            ));
        }

        let sim = &self.simulation;
        if sim.tick_ms == 0 {
            return Err(invalid("simulation.tick_ms must be greater than 0"));
        }
        if !(0.0..=1.0).contains(&sim.detection_probability) {
            return Err(invalid(format!(
                "simulation.detection_probability must be within [0, 1], got {}",
                sim.detection_probability
            )));
        }
        if sim.angle_max <= 0 {
            return Err(invalid("simulation.angle_max must be greater than 0"));
        }
        if sim.distance_min >= sim.distance_max {
            return Err(invalid(format!(
                "simulation.distance_min ({}) must be less than distance_max ({})",
                sim.distance_min, sim.distance_max
            )));
        }

        if self.display.width == 0 || self.display.height == 0 {
            return Err(invalid("display.width and display.height must be greater than 0"));
        }

        Ok(())
    }

    /// Get the history log path, resolving defaults if not set.
    #[must_use]
    pub fn history_path(&self) -> PathBuf {
        self.storage
            .history_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(HISTORY_FILE_NAME))
    }

    /// Get the simulation tick as a Duration.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.simulation.tick_ms)
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}
