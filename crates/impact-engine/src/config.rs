//! Simulation configuration.
//!
//! Provides the driver's tick rate, logging, weapon asset and impact
//! subsystem settings. Configuration can be loaded from and saved to a file.

use impact_gameplay::ImpactConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Configuration file name.
const CONFIG_FILE: &str = "impact.toml";

/// Simulation configuration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // === Simulation ===
    /// Fixed simulation ticks per second
    pub tick_rate: u32,
    /// Seconds of simulated time per run
    pub duration: f32,
    /// Swings performed by the scripted attacker
    pub swings: u32,

    // === Assets ===
    /// Weapon asset (RON); the bundled longsword when unset
    pub weapon_asset: Option<PathBuf>,

    // === Diagnostics ===
    /// Default tracing filter directive
    pub log_filter: String,
    /// Print the run summary as JSON
    pub json_summary: bool,

    // === Impact ===
    /// Impact subsystem settings
    pub impact: ImpactConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_rate: 60,
            duration: 4.0,
            swings: 3,
            weapon_asset: None,
            log_filter: "impact=info".to_string(),
            json_summary: false,
            impact: ImpactConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from the default file location.
    /// Returns default config if file doesn't exist.
    pub fn load() -> Self {
        Self::load_from(Self::config_path())
    }

    /// Load configuration from a specific path.
    /// Returns default config if file doesn't exist or is invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        let mut config: Self = match fs::File::open(path) {
            Ok(mut file) => {
                let mut contents = String::new();
                if let Err(e) = file.read_to_string(&mut contents) {
                    warn!("Failed to read config file: {e}");
                    return Self::default();
                }

                match toml::from_str(&contents) {
                    Ok(config) => {
                        info!("Loaded config from {}", path.display());
                        config
                    },
                    Err(e) => {
                        warn!("Failed to parse config file: {e}");
                        return Self::default();
                    },
                }
            },
            Err(e) => {
                warn!("Failed to open config file: {e}");
                return Self::default();
            },
        };
        config.validate();
        config
    }

    /// Save configuration to the default file location.
    pub fn save(&self) -> io::Result<()> {
        self.save_to(Self::config_path())
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path.
    fn config_path() -> PathBuf {
        if let Some(config_dir) = dirs_config_path() {
            config_dir.join("impact").join(CONFIG_FILE)
        } else {
            PathBuf::from(CONFIG_FILE)
        }
    }

    /// Validate and clamp configuration values to sensible ranges.
    pub fn validate(&mut self) {
        self.tick_rate = self.tick_rate.clamp(10, 240);
        self.duration = self.duration.clamp(0.1, 600.0);
        self.swings = self.swings.min(1000);
        if self.log_filter.trim().is_empty() {
            self.log_filter = Self::default().log_filter;
        }
        self.impact.validate();
    }

    /// Seconds per simulation tick.
    #[must_use]
    pub fn fixed_dt(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }
}

/// Get platform-specific config directory.
fn dirs_config_path() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var("HOME")
            .ok()
            .map(|home| PathBuf::from(home).join("Library/Application Support"))
    }

    #[cfg(target_os = "windows")]
    {
        std::env::var("APPDATA").ok().map(PathBuf::from)
    }

    #[cfg(target_os = "linux")]
    {
        std::env::var("XDG_CONFIG_HOME")
            .ok()
            .map(PathBuf::from)
            .or_else(|| {
                std::env::var("HOME")
                    .ok()
                    .map(|h| PathBuf::from(h).join(".config"))
            })
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        None
    }
}
