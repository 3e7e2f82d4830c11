use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Limits applied to `hostStartGame`, loaded from game.json.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    #[serde(rename = "maxPairs", default = "default_max_pairs")]
    pub max_pairs: u64,
    #[serde(rename = "maxGameTime", default = "default_max_game_time")]
    pub max_game_time: u64,
}

fn default_max_pairs() -> u64 {
    104
}

fn default_max_game_time() -> u64 {
    3600
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_pairs: default_max_pairs(),
            max_game_time: default_max_game_time(),
        }
    }
}

/// Resolves a path relative to the config directory.
fn config_path(sub: &str) -> PathBuf {
    let base = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config".to_string());
    Path::new(&base).join(sub)
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> ConfigError + '_ {
    move |source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    }
}

/// Port to listen on, from `PORT`.
pub fn port() -> Result<u16, ConfigError> {
    match std::env::var("PORT") {
        Ok(raw) => raw.parse().map_err(|_| ConfigError::Port(raw)),
        Err(_) => Ok(3000),
    }
}

/// Initialize the config directory with a default game.json if missing.
pub fn init() -> Result<(), ConfigError> {
    init_at(&config_path(""))
}

fn init_at(base: &Path) -> Result<(), ConfigError> {
    if !base.exists() {
        fs::create_dir_all(base).map_err(io_err(base))?;
    }

    let game_path = base.join("game.json");
    if !game_path.exists() {
        let json = serde_json::to_string_pretty(&GameConfig::default()).map_err(|source| {
            ConfigError::Parse {
                path: game_path.display().to_string(),
                source,
            }
        })?;
        fs::write(&game_path, json).map_err(io_err(&game_path))?;
        tracing::info!("Wrote default config to {}", game_path.display());
    }

    Ok(())
}

/// Load the game configuration.
pub fn load_game_config() -> Result<GameConfig, ConfigError> {
    load_from(&config_path("game.json"))
}

fn load_from(path: &Path) -> Result<GameConfig, ConfigError> {
    let data = fs::read_to_string(path).map_err(io_err(path))?;
    serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })
}
