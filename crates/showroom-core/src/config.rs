//! Demo configuration
//!
//! Every value defaults to the constants the demo ships with, so an empty TOML
//! document (or no document at all) yields the stock scene.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::rig::WheelSelector;

/// Largest cube face edge; six faces at this size are already ~400 MB of RGBA
pub const MAX_CAPTURE_RESOLUTION: u32 = 4096;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DemoConfig {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub bloom: BloomConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub animation: AnimationConfig,
    #[serde(default)]
    pub driver: DriverConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Path of the car glTF, relative to the asset root
    #[serde(default = "default_model_path")]
    pub path: String,
    /// Directory of the mesh decompression codec
    #[serde(default = "default_decoder_path")]
    pub decoder_path: String,
    /// Uniform scale applied to the loaded root
    #[serde(default = "default_model_scale")]
    pub scale: f32,
    #[serde(default = "default_model_position")]
    pub position: [f32; 3],
    /// Environment reflection multiplier for every car mesh
    #[serde(default = "default_env_intensity")]
    pub env_intensity: f32,
    /// The four wheels, resolved once after load. Each entry is a child-index
    /// path from the model root such as `"0/0/0/2"`, or a node name.
    #[serde(default = "default_wheel_nodes")]
    pub wheel_nodes: Vec<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            decoder_path: default_decoder_path(),
            scale: default_model_scale(),
            position: default_model_position(),
            env_intensity: default_env_intensity(),
            wheel_nodes: default_wheel_nodes(),
        }
    }
}

fn default_model_path() -> String {
    "models/chevrolet-c7/scene.gltf".to_string()
}

fn default_decoder_path() -> String {
    "/examples/js/libs/draco/".to_string()
}

fn default_model_scale() -> f32 {
    0.005
}

fn default_model_position() -> [f32; 3] {
    [0.0, -0.05, 0.0]
}

fn default_env_intensity() -> f32 {
    20.0
}

/// The stock car keeps its wheels at every other child of the third nested group
fn default_wheel_nodes() -> Vec<String> {
    ["0/0/0/0", "0/0/0/2", "0/0/0/4", "0/0/0/6"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Vertical field of view in degrees
    #[serde(default = "default_fov")]
    pub fov_degrees: f32,
    #[serde(default = "default_near")]
    pub near: f32,
    #[serde(default = "default_far")]
    pub far: f32,
    /// Where the camera sits once the model has loaded
    #[serde(default = "default_camera_position")]
    pub position: [f32; 3],
    #[serde(default)]
    pub target: [f32; 3],
    /// Fraction of pending orbit motion applied per frame
    #[serde(default = "default_damping")]
    pub damping_factor: f32,
    /// Optional per-frame lerp toward `position` while the intro runs
    #[serde(default)]
    pub intro_lerp: Option<f32>,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: default_fov(),
            near: default_near(),
            far: default_far(),
            position: default_camera_position(),
            target: [0.0; 3],
            damping_factor: default_damping(),
            intro_lerp: None,
        }
    }
}

fn default_fov() -> f32 {
    45.0
}

fn default_near() -> f32 {
    0.1
}

fn default_far() -> f32 {
    100.0
}

fn default_camera_position() -> [f32; 3] {
    [1.2, 0.95, 3.5]
}

fn default_damping() -> f32 {
    0.05
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BloomConfig {
    #[serde(default)]
    pub threshold: f32,
    #[serde(default = "default_strength")]
    pub strength: f32,
    #[serde(default = "default_radius")]
    pub radius: f32,
    #[serde(default = "default_true")]
    pub fxaa: bool,
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            threshold: 0.0,
            strength: default_strength(),
            radius: default_radius(),
            fxaa: true,
        }
    }
}

fn default_strength() -> f32 {
    3.25
}

fn default_radius() -> f32 {
    0.15
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Edge length of each cube face in pixels
    #[serde(default = "default_resolution")]
    pub resolution: u32,
    #[serde(default = "default_near")]
    pub near: f32,
    #[serde(default = "default_far")]
    pub far: f32,
    /// Half extents of the reflection volume, used when the car's own bounds
    /// are not known
    #[serde(default = "default_probe_extent")]
    pub probe_extent: [f32; 3],
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            resolution: default_resolution(),
            near: default_near(),
            far: default_far(),
            probe_extent: default_probe_extent(),
        }
    }
}

fn default_resolution() -> u32 {
    256
}

fn default_probe_extent() -> [f32; 3] {
    [3.0, 1.5, 3.0]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimationConfig {
    /// Wheel spin in radians per second
    #[serde(default = "default_spin_rate")]
    pub wheel_spin_rate: f32,
    #[serde(default = "default_box_count")]
    pub box_count: usize,
    #[serde(default = "default_ring_count")]
    pub ring_count: usize,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            wheel_spin_rate: default_spin_rate(),
            box_count: default_box_count(),
            ring_count: default_ring_count(),
        }
    }
}

fn default_spin_rate() -> f32 {
    2.0
}

fn default_box_count() -> usize {
    8
}

fn default_ring_count() -> usize {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Real-time delay after the first frame before the intro counts as done
    #[serde(default = "default_warmup")]
    pub warmup_secs: f32,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            warmup_secs: default_warmup(),
        }
    }
}

fn default_warmup() -> f32 {
    10.0
}

impl DemoConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: DemoConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.wheel_nodes.len() != 4 {
            return Err(ConfigError::Invalid(format!(
                "expected 4 wheel nodes, got {}",
                self.model.wheel_nodes.len()
            )));
        }
        for entry in &self.model.wheel_nodes {
            WheelSelector::parse(entry).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        let res = self.capture.resolution;
        if res == 0 || !res.is_power_of_two() || res > MAX_CAPTURE_RESOLUTION {
            return Err(ConfigError::Invalid(format!(
                "capture resolution must be a power of two up to {}, got {}",
                MAX_CAPTURE_RESOLUTION, res
            )));
        }
        if !(self.camera.damping_factor > 0.0 && self.camera.damping_factor <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "damping factor must be in (0, 1], got {}",
                self.camera.damping_factor
            )));
        }
        if !self.animation.wheel_spin_rate.is_finite() {
            return Err(ConfigError::Invalid("wheel spin rate must be finite".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_shipped_config_matches_defaults() {
        let config = DemoConfig::from_toml_str(include_str!("../../../showroom.toml")).unwrap();
        let stock = DemoConfig::default();
        assert_eq!(config.model.wheel_nodes, stock.model.wheel_nodes);
        assert_eq!(config.camera.position, stock.camera.position);
        assert_eq!(config.capture.probe_extent, stock.capture.probe_extent);
        assert_eq!(config.animation.box_count, stock.animation.box_count);
    }

    #[test]
    fn test_empty_document_is_stock_scene() {
        let config = DemoConfig::from_toml_str("").unwrap();
        assert_eq!(config.model.path, "models/chevrolet-c7/scene.gltf");
        assert_eq!(config.capture.resolution, 256);
        assert_eq!(config.bloom.strength, 3.25);
        assert_eq!(config.driver.warmup_secs, 10.0);
        assert!(config.camera.intro_lerp.is_none());
    }

    #[test]
    fn test_partial_override() {
        let config = DemoConfig::from_toml_str(
            r#"
            [bloom]
            strength = 5.0

            [camera]
            intro_lerp = 0.01
            "#,
        )
        .unwrap();
        assert_eq!(config.bloom.strength, 5.0);
        assert_eq!(config.bloom.radius, 0.15);
        assert_eq!(config.camera.intro_lerp, Some(0.01));
    }

    #[test]
    fn test_rejects_bad_resolution() {
        let err = DemoConfig::from_toml_str("[capture]\nresolution = 300\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_oversized_capture() {
        let err = DemoConfig::from_toml_str("[capture]\nresolution = 65536\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(DemoConfig::from_toml_str("[capture]\nresolution = 4096\n").is_ok());
    }

    #[test]
    fn test_rejects_empty_wheel_entry() {
        let err = DemoConfig::from_toml_str("[model]\nwheel_nodes = [\"0/0/0/0\", \"\", \"b\", \"c\"]\n")
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_rejects_wrong_wheel_count() {
        let err = DemoConfig::from_toml_str("[model]\nwheel_nodes = [\"a\", \"b\"]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[animation]\nwheel_spin_rate = 4.0").unwrap();
        let config = DemoConfig::load(file.path()).unwrap();
        assert_eq!(config.animation.wheel_spin_rate, 4.0);
    }

    #[test]
    fn test_missing_file() {
        let err = DemoConfig::load(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::IoError(_)));
    }
}
