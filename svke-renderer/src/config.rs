//! Renderer settings loaded from TOML.
//!
//! Every key is optional; missing keys take the values of
//! [`RenderSettings::default`]. A missing settings file is not an error.
//!
//! ```toml
//! shader_dir = "shaders"
//! vertex_shader = "vertex.spv"
//! fragment_shader = "fragment.spv"
//! rotation_step = [0.0005, 0.001]
//! log_level = "debug"
//! ```

use crate::error::{RendererError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Directory all shader file names are resolved against.
    pub shader_dir: PathBuf,
    pub vertex_shader: String,
    pub fragment_shader: String,
    pub point_light_vertex_shader: String,
    pub point_light_fragment_shader: String,
    /// Radians added to each drawable's X and Y rotation every rendered frame.
    pub rotation_step: [f32; 2],
    pub log_level: String,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            shader_dir: PathBuf::from("shaders"),
            vertex_shader: "vertex.spv".to_string(),
            fragment_shader: "fragment.spv".to_string(),
            point_light_vertex_shader: "point_light.vert.spv".to_string(),
            point_light_fragment_shader: "point_light.frag.spv".to_string(),
            rotation_step: [0.0005, 0.001],
            log_level: "info".to_string(),
        }
    }
}

impl RenderSettings {
    /// Reads and validates settings from `path`, falling back to defaults if it does not exist.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = match std::fs::read_to_string(path) {
            Ok(content) => {
                debug!("Parsing render settings from {}", path.display());
                toml::from_str::<Self>(&content).map_err(|e| RendererError::Settings {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No render settings at {}, using defaults.", path.display());
                Self::default()
            }
            Err(source) => {
                return Err(RendererError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let settings: Self = toml::from_str(content).map_err(|e| RendererError::Settings {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        let names = [
            ("vertex_shader", &self.vertex_shader),
            ("fragment_shader", &self.fragment_shader),
            ("point_light_vertex_shader", &self.point_light_vertex_shader),
            ("point_light_fragment_shader", &self.point_light_fragment_shader),
        ];
        for (key, value) in names {
            if value.trim().is_empty() {
                return Err(RendererError::Config(format!("'{}' must not be empty", key)));
            }
        }
        if self.rotation_step.iter().any(|s| !s.is_finite()) {
            return Err(RendererError::Config(format!(
                "rotation_step must be finite, got {:?}",
                self.rotation_step
            )));
        }
        if !VALID_LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(RendererError::Config(format!(
                "unknown log_level '{}', expected one of {:?}",
                self.log_level, VALID_LOG_LEVELS
            )));
        }
        Ok(())
    }

    /// Joins a shader file name onto `shader_dir`.
    pub fn shader_path(&self, file_name: &str) -> PathBuf {
        self.shader_dir.join(file_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let settings = RenderSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.shader_path(&settings.vertex_shader), Path::new("shaders/vertex.spv"));
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let toml = "shader_dir = \"assets/spv\"\nrotation_step = [0.0, 0.01]";
        let settings = RenderSettings::from_toml_str(toml).unwrap();
        assert_eq!(settings.shader_dir, PathBuf::from("assets/spv"));
        assert_eq!(settings.rotation_step, [0.0, 0.01]);
        assert_eq!(settings.fragment_shader, "fragment.spv");
        assert_eq!(settings.log_level, "info");
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = RenderSettings::load(dir.path().join("renderer.toml")).unwrap();
        assert_eq!(settings, RenderSettings::default());
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "vertex_shader = \"simple.vert.spv\"\nlog_level = \"DEBUG\"").unwrap();
        let settings = RenderSettings::load(file.path()).unwrap();
        assert_eq!(settings.vertex_shader, "simple.vert.spv");
        assert_eq!(settings.log_level, "DEBUG");
    }

    #[test]
    fn malformed_file_is_settings_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "rotation_step = \"fast\"").unwrap();
        let err = RenderSettings::load(file.path()).unwrap_err();
        assert!(matches!(err, RendererError::Settings { .. }));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(
            RenderSettings::from_toml_str("vertex_shader = \"  \""),
            Err(RendererError::Config(_))
        ));
        assert!(matches!(
            RenderSettings::from_toml_str("log_level = \"loud\""),
            Err(RendererError::Config(_))
        ));

        let settings = RenderSettings {
            rotation_step: [f32::NAN, 0.0],
            ..RenderSettings::default()
        };
        assert!(matches!(settings.validate(), Err(RendererError::Config(_))));
    }
}
