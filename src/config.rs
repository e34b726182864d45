use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub remote: RemoteConfig,
  /// Override for the local storage database (defaults to the platform data dir)
  pub storage_path: Option<PathBuf>,
  /// Staleness threshold for autosync, in minutes
  #[serde(default = "default_autosync_minutes")]
  pub autosync_minutes: i64,
}

fn default_autosync_minutes() -> i64 {
  180
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
  /// Base URL of the sync backend
  pub url: String,
  /// Public API key; falls back to the SNIPSYNC_API_KEY environment variable
  pub api_key: Option<String>,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./snipsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/snipsync/config.yaml
  /// 4. ~/.config/snipsync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/snipsync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("snipsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("snipsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Resolve the API key from config or environment.
  pub fn api_key(&self) -> Result<String> {
    if let Some(key) = &self.remote.api_key {
      return Ok(key.clone());
    }
    std::env::var("SNIPSYNC_API_KEY").map_err(|_| {
      eyre!("API key not found. Set remote.api_key or the SNIPSYNC_API_KEY environment variable.")
    })
  }
}
