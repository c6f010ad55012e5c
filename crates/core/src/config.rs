use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use multitrack_assets::ProvisioningPolicy;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_REMOTE_BASE_URL: &str = "http://localhost:8000/song";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where stems live locally. `None` means `<documents>/song`.
    pub content_dir: Option<PathBuf>,
    /// Stem URLs are `{remote_base_url}/{file_name}`.
    pub remote_base_url: String,
    pub poll_interval_ms: u64,
    pub provisioning_policy: ProvisioningPolicy,
    pub output_channels: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            content_dir: None,
            remote_base_url: DEFAULT_REMOTE_BASE_URL.to_string(),
            poll_interval_ms: 50,
            provisioning_policy: ProvisioningPolicy::default(),
            output_channels: 2,
        }
    }
}

impl Config {
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("multitrack").join("config.toml"))
    }

    /// Load from the user config directory, falling back to defaults.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        match fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                log::warn!("Ignoring invalid config {}: {e}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn content_dir(&self) -> PathBuf {
        self.content_dir.clone().unwrap_or_else(|| {
            dirs::document_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("song")
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(50));
        assert_eq!(config.provisioning_policy, ProvisioningPolicy::Strict);
        assert_eq!(config.output_channels, 2);
        assert!(config.content_dir().ends_with("song"));
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "remote_base_url = \"https://cdn.test/stems\"\nprovisioning_policy = \"click_optional\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.remote_base_url, "https://cdn.test/stems");
        assert_eq!(config.provisioning_policy, ProvisioningPolicy::ClickOptional);
        assert_eq!(config.poll_interval_ms, 50);
    }

    #[test]
    fn test_written_config_loads_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        let config = Config {
            content_dir: Some(dir.path().join("stems")),
            poll_interval_ms: 20,
            ..Config::default()
        };

        fs::write(&path, toml::to_string_pretty(&config).unwrap()).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_load_from_errors() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("absent.toml");
        assert!(matches!(
            Config::load_from(&missing),
            Err(ConfigError::Read { .. })
        ));

        let bad = dir.path().join("bad.toml");
        fs::write(&bad, "poll_interval_ms = \"often\"").unwrap();
        assert!(matches!(Config::load_from(&bad), Err(ConfigError::Parse { .. })));
    }
}
