use std::{
    fs,
    path::{Path, PathBuf},
};

use directories::ProjectDirs;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::{AutosaveSettings, Result, VaultError, DEFAULT_LIST_TTL_SECS, MIN_DELAY};

const CONFIG_FILE_NAME: &str = "config.json";

/// Engine configuration settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Root of the on-disk data; notes live in `data_dir/notes`
    pub data_dir: PathBuf,

    /// How long the all-notes list is served from cache (in seconds)
    pub list_cache_ttl_secs: u64,

    /// Debounce timing for auto-save
    pub autosave: AutosaveSettings,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = project_dirs()
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("notevault-data"));

        Self {
            data_dir,
            list_cache_ttl_secs: DEFAULT_LIST_TTL_SECS,
            autosave: AutosaveSettings::default(),
        }
    }
}

impl Config {
    /// Platform config file location, e.g. `~/.config/notevault/config.json`.
    pub fn default_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Loads the config at `path` (or the default location).
    ///
    /// A missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(path) => path,
            None => {
                debug!("No config location available, using defaults");
                return Ok(Self::default());
            }
        };

        if !path.exists() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(&path)?;
        let config: Config = serde_json::from_str(&raw).map_err(|e| VaultError::ConfigError {
            message: format!("Invalid config file {}: {}", path.display(), e),
        })?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|_| VaultError::DirectoryError {
                path: parent.to_path_buf(),
            })?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Saved configuration to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let autosave = &self.autosave;
        if autosave.base_delay_ms == 0 {
            return Err(VaultError::ConfigError {
                message: "autosave.base_delay_ms must be positive".to_string(),
            });
        }
        if autosave.max_delay() < MIN_DELAY {
            return Err(VaultError::ConfigError {
                message: format!(
                    "autosave.max_delay_ms must be at least {}",
                    MIN_DELAY.as_millis()
                ),
            });
        }
        if autosave.max_delay_ms < autosave.base_delay_ms {
            return Err(VaultError::ConfigError {
                message: "autosave.max_delay_ms must not be below base_delay_ms".to_string(),
            });
        }
        Ok(())
    }

    pub fn notes_dir(&self) -> PathBuf {
        self.data_dir.join("notes")
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "notevault")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_engine_constants() {
        let config = Config::default();
        assert_eq!(config.list_cache_ttl_secs, 300);
        assert_eq!(config.autosave.base_delay_ms, 2000);
        assert_eq!(config.autosave.max_delay_ms, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(Some(&dir.path().join("absent.json"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            data_dir: dir.path().join("data"),
            list_cache_ttl_secs: 30,
            autosave: AutosaveSettings {
                base_delay_ms: 500,
                max_delay_ms: 4000,
            },
        };
        config.save(&path).unwrap();
        assert_eq!(Config::load(Some(&path)).unwrap(), config);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"list_cache_ttl_secs": 10}"#).unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.list_cache_ttl_secs, 10);
        assert_eq!(config.autosave, AutosaveSettings::default());
    }

    #[test]
    fn rejects_inverted_delays() {
        let config = Config {
            autosave: AutosaveSettings {
                base_delay_ms: 5000,
                max_delay_ms: 1000,
            },
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(VaultError::ConfigError { .. })
        ));
    }
}
