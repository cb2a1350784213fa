use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub console: ConsoleConfig,
    #[serde(default)]
    pub listener: ListenerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory backing the shared key-value store (one file per key).
    /// Console and listeners on the same machine must point at the same dir.
    #[serde(default = "default_store_dir")]
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsoleConfig {
    /// Shared-secret gate for the operator surface.  Empty = dev bypass.
    #[serde(default)]
    pub pin: String,
    /// Seed playlist (JSON array of tracks), used when the store holds none.
    #[serde(default = "default_playlist_seed")]
    pub playlist_seed: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    #[serde(default = "default_volume")]
    pub volume: f32,
    /// Headless runs have no tap-to-play gesture to wait for; treat the
    /// gesture as already granted.
    #[serde(default = "default_assume_gesture")]
    pub assume_gesture: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: default_store_dir(),
        }
    }
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            pin: String::new(),
            playlist_seed: default_playlist_seed(),
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            volume: default_volume(),
            assume_gesture: default_assume_gesture(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            console: ConsoleConfig::default(),
            listener: ListenerConfig::default(),
        }
    }
}

fn default_store_dir() -> PathBuf {
    platform::data_dir().join("store")
}

fn default_playlist_seed() -> PathBuf {
    platform::config_dir().join("playlist.json")
}

fn default_volume() -> f32 {
    1.0
}

fn default_assume_gesture() -> bool {
    true
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            let config = Self::default();
            config.save()?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(&config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_path = Self::config_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.console.pin.is_empty());
        assert!(config.listener.assume_gesture);
        assert_eq!(config.listener.volume, 1.0);
        assert!(config.storage.dir.ends_with("onair/store"));
        assert!(config.console.playlist_seed.ends_with("onair/playlist.json"));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str("[console]\npin = \"2468\"\n").unwrap();
        assert_eq!(config.console.pin, "2468");
        assert!(config.listener.assume_gesture);
        assert!(config.storage.dir.ends_with("onair/store"));
    }
}
