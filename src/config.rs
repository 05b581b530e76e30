//! Loading of the TOML configuration file
//!
//! Lives outside the core: the session only ever sees the resolved
//! [`KeyMap`] and [`SessionSettings`].

use crate::mapping::KeyMap;
use crate::session::SessionSettings;
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = "touchbridge";
const KEYMAP_FILE: &str = "keymap.toml";

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub session: SessionSettings,
    #[serde(default)]
    pub keymap: KeyMap,
}

impl AppConfig {
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(content).map_err(|e| eyre!("Failed to parse config file: {}", e))?;
        config
            .keymap
            .validate()
            .map_err(|e| eyre!("Invalid key map: {}", e))?;
        Ok(config)
    }
}

pub fn default_config_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| {
        warn!("Could not determine config directory, using current directory");
        PathBuf::from(".")
    });
    path.push(CONFIG_DIR);
    path.push(KEYMAP_FILE);
    path
}

/// Reads the config at `path`, or the default location. A missing file
/// yields the defaults.
pub async fn load_config(path: Option<PathBuf>) -> Result<AppConfig> {
    let path = path.unwrap_or_else(default_config_path);

    if !tokio::fs::try_exists(&path)
        .await
        .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
    {
        warn!("Config file {} does not exist, using default", path.display());
        return Ok(AppConfig::default());
    }

    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
    let config = AppConfig::from_toml(&content)?;
    info!(
        "Loaded config from {}: {} key bindings, {} mouse bindings",
        path.display(),
        config.keymap.keys.len(),
        config.keymap.mouse.len()
    );
    Ok(config)
}

/// Writes the default config to `path` unless a file already exists there.
pub async fn ensure_default_config(path: &Path) -> Result<()> {
    if tokio::fs::try_exists(path)
        .await
        .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
    {
        debug!("Config file {} already present", path.display());
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
    }
    let content = toml::to_string_pretty(&AppConfig::default())
        .map_err(|e| eyre!("Failed to serialize default config: {}", e))?;
    tokio::fs::write(path, content)
        .await
        .map_err(|e| eyre!("Failed to write default config: {}", e))?;
    info!("Wrote default config to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::{FrameSize, Point};
    use crate::mapping::GestureDescriptor;

    #[test]
    fn parses_session_and_keymap_sections() {
        let config = AppConfig::from_toml(
            r#"
            [session]
            device_address = "127.0.0.1:5555"
            frame_size = { width = 2340, height = 1080 }

            [[keymap.keys]]
            code = 32
            gesture = { point = { x = 5, y = 6 } }
            "#,
        )
        .unwrap();

        assert_eq!(config.session.device_address, "127.0.0.1:5555");
        assert_eq!(config.session.frame_size, FrameSize::new(2340, 1080));
        assert_eq!(config.session.queue_capacity, 512);
        assert_eq!(
            config.keymap.keys[0].gesture,
            GestureDescriptor::Point(Point::new(5, 6))
        );
    }

    #[test]
    fn invalid_keymap_is_rejected() {
        let result = AppConfig::from_toml(
            r#"
            [[keymap.keys]]
            code = 32
            gesture = { macro = [] }
            "#,
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn default_config_round_trips_through_disk() {
        let path = std::env::temp_dir()
            .join(format!("touchbridge-test-{}", std::process::id()))
            .join(KEYMAP_FILE);

        assert_eq!(load_config(Some(path.clone())).await.unwrap(), AppConfig::default());
        ensure_default_config(&path).await.unwrap();
        ensure_default_config(&path).await.unwrap();
        assert_eq!(load_config(Some(path.clone())).await.unwrap(), AppConfig::default());

        if let Some(dir) = path.parent() {
            let _ = tokio::fs::remove_dir_all(dir).await;
        }
    }
}
