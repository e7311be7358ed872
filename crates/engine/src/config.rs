use scenegraph_common::Color;
use scenegraph_render::RenderSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Window and renderer settings an application starts with.
///
/// Every field has a default, so a config file only lists what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub ambient: f32,
    /// Edge length of shadow maps set up by the applications.
    pub shadow_resolution: u32,
    pub clear_color: Color,
    pub displacement_scale: f32,
    pub vsync: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let render = RenderSettings::default();
        Self {
            title: "scenegraph".into(),
            width: 1280,
            height: 720,
            ambient: render.ambient,
            shadow_resolution: 1024,
            clear_color: render.clear_color,
            displacement_scale: render.displacement_scale,
            vsync: true,
        }
    }
}

impl EngineConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Renderer knobs derived from this config.
    pub fn render_settings(&self) -> RenderSettings {
        let mut settings = RenderSettings::default();
        settings.ambient = self.ambient;
        settings.clear_color = self.clear_color;
        settings.displacement_scale = self.displacement_scale;
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_fields_take_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "title": "Quarto", "width": 800 }}"#).unwrap();
        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.title, "Quarto");
        assert_eq!(config.width, 800);
        assert_eq!(config.height, EngineConfig::default().height);
        assert!(config.vsync);
    }

    #[test]
    fn save_then_load_keeps_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        let config = EngineConfig {
            shadow_resolution: 512,
            clear_color: Color::rgb(0.5, 0.25, 0.0),
            vsync: false,
            ..EngineConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn bad_json_is_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ width: }}").unwrap();
        assert!(matches!(EngineConfig::load(file.path()), Err(ConfigError::Json(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = EngineConfig::load(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn render_settings_follow_config() {
        let config = EngineConfig {
            ambient: 0.3,
            displacement_scale: 0.25,
            ..EngineConfig::default()
        };
        let settings = config.render_settings();
        assert_eq!(settings.ambient, 0.3);
        assert_eq!(settings.displacement_scale, 0.25);
        assert_eq!(settings.tessellation_level(), 1);
    }
}
