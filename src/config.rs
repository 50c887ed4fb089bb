// Settings loaded from `cube_render.toml`, falling back to defaults when the
// file is missing or malformed.

use crate::entities::ModelKind;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_PATH: &str = "cube_render.toml";

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub scene: SceneConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub mouse_visible: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "CubeRender".to_string(),
            width: 960,
            height: 540,
            mouse_visible: true,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub clear_color: [f32; 4],
    pub frames_in_flight: usize,
    pub pipeline_cache: String,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            frames_in_flight: 3,
            pipeline_cache: "cube_pipeline_cache".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct SceneConfig {
    pub model: ModelKind,
}

impl Config {
    /// Load from the working directory, logging and falling back to defaults on error.
    pub fn load() -> Self {
        Self::load_from_path(CONFIG_PATH).unwrap_or_else(|e| {
            log::warn!("Failed to load {}: {:#}. Using defaults.", CONFIG_PATH, e);
            Config::default()
        })
    }

    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        // At least one frame must be in flight for the ring of sync objects.
        config.graphics.frames_in_flight = config.graphics.frames_in_flight.max(1);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.window.title, "CubeRender");
        assert_eq!((config.window.width, config.window.height), (960, 540));
        assert!(config.window.mouse_visible);
        assert_eq!(config.graphics.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(config.graphics.frames_in_flight, 3);
        assert_eq!(config.scene.model, ModelKind::Cube);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let config = Config::parse(
            r#"
            [window]
            title = "Spinner"

            [scene]
            model = "triangle"
            "#,
        )
        .unwrap();
        assert_eq!(config.window.title, "Spinner");
        assert_eq!(config.window.width, 960);
        assert_eq!(config.scene.model, ModelKind::Triangle);
    }

    #[test]
    fn zero_frames_in_flight_is_clamped() {
        let config = Config::parse("[graphics]\nframes_in_flight = 0\n").unwrap();
        assert_eq!(config.graphics.frames_in_flight, 1);
    }

    #[test]
    fn unknown_model_is_rejected() {
        assert!(Config::parse("[scene]\nmodel = \"teapot\"\n").is_err());
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = Config::load_from_path("definitely/not/here.toml").unwrap();
        assert_eq!(config.scene.model, ModelKind::Cube);
    }
}
