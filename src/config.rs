//! Configuration parsing and management for focaltrack

use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};

use crate::camera::CameraConfig;
use crate::driver::{DriverConfig, FixedRateParams, TrajectoryConfig};
use crate::error::{ConfigError, FocalTrackError};
use crate::geometry::{DevicePlacement, LayoutPreset};
use crate::haptics::{ControllerConfig, LinkKind, Waveform};
use crate::tracking::landmark::{LandmarkSource, NUM_HAND_LANDMARKS};
use crate::tracking::{ContactAreaConfig, FingertipConfig, LandmarkConfig};
use crate::viewer::ViewerConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub controller: ControllerConfig,
    pub geometry: GeometryConfig,
    pub softness: SoftnessConfig,
    pub texture: TextureConfig,
    pub camera: CameraConfig,
    pub landmark: LandmarkConfig,
    pub viewer: ViewerConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, FocalTrackError> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            ConfigError::ReadFile(format!("{}: {}", path.as_ref().display(), e))
        })?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string
    pub fn from_str(s: &str) -> Result<Self, FocalTrackError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()).into())
    }

    /// Load configuration from default paths
    pub fn load() -> Result<Self, FocalTrackError> {
        let paths = [
            PathBuf::from("focaltrack.toml"),
            PathBuf::from("config/focaltrack.toml"),
            dirs_path().join("focaltrack.toml"),
        ];

        for path in &paths {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), FocalTrackError> {
        if self.geometry.placements().is_empty() {
            return Err(invalid(
                "geometry.devices",
                "A custom layout needs at least one device",
            ));
        }

        validate_driver("softness.driver", &self.softness.driver)?;
        validate_driver("texture.driver", &self.texture.driver)?;

        if self.softness.fingertip.landmark >= NUM_HAND_LANDMARKS {
            return Err(invalid(
                "softness.fingertip.landmark",
                "Landmark index must be below 21",
            ));
        }
        let fov = self.softness.fingertip.fov;
        if !fov.iter().all(|f| *f > 0.0 && *f < 180.0) {
            return Err(invalid(
                "softness.fingertip.fov",
                "Field of view must be between 0 and 180 degrees",
            ));
        }

        let threshold = &self.texture.contact.threshold;
        if threshold.min_dist < 0.0 || threshold.min_dist >= threshold.max_dist {
            return Err(invalid(
                "texture.contact.threshold",
                "Need 0 <= min_dist < max_dist",
            ));
        }
        if self.texture.contact.roi_half_size == 0 {
            return Err(invalid(
                "texture.contact.roi_half_size",
                "ROI half size must be greater than 0",
            ));
        }

        if self.camera.width == 0 || self.camera.height == 0 || self.camera.fps == 0 {
            return Err(invalid(
                "camera",
                "Width, height and fps must be greater than 0",
            ));
        }
        if self.camera.synthetic.depth_scale <= 0.0 {
            return Err(invalid(
                "camera.synthetic.depth_scale",
                "Depth scale must be greater than 0",
            ));
        }

        if self.landmark.source == LandmarkSource::Udp {
            // The helper runs its own webcam; its pixels do not index synthetic depth frames.
            return Err(invalid(
                "landmark.source",
                "UDP landmarks need the frame source to be the helper's camera; \
                 use \"nearest\" with the synthetic camera",
            ));
        }

        if self.controller.link == LinkKind::Udp && self.controller.udp.remote.is_empty() {
            return Err(invalid("controller.udp.remote", "Remote address is required"));
        }

        if self.viewer.width == 0 || self.viewer.height == 0 {
            return Err(invalid(
                "viewer",
                "Window size must be greater than 0",
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> FocalTrackError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        message: message.to_string(),
    }
    .into()
}

fn validate_driver(section: &str, driver: &DriverConfig) -> Result<(), FocalTrackError> {
    if driver.trajectory.stm_freq() <= 0.0 {
        return Err(invalid(
            &format!("{}.trajectory.stm_freq", section),
            "STM frequency must be greater than 0",
        ));
    }
    match &driver.trajectory {
        TrajectoryConfig::StepLength(p) => {
            if p.step <= 0.0 || p.zero_radius <= 0.0 {
                return Err(invalid(
                    &format!("{}.trajectory", section),
                    "Step and zero_radius must be greater than 0",
                ));
            }
            if p.max_height_delta < 0.0 || p.radius_gain < 0.0 {
                return Err(invalid(
                    &format!("{}.trajectory", section),
                    "max_height_delta and radius_gain must not be negative",
                ));
            }
        }
        TrajectoryConfig::FixedRate(p) => {
            if p.time_step <= 0.0 || p.radius < 0.0 {
                return Err(invalid(
                    &format!("{}.trajectory", section),
                    "time_step must be greater than 0 and radius not negative",
                ));
            }
        }
    }
    if let Waveform::Sine { freq, .. } = driver.waveform {
        if freq <= 0.0 {
            return Err(invalid(
                &format!("{}.waveform.freq", section),
                "Modulation frequency must be greater than 0",
            ));
        }
    }
    Ok(())
}

/// Array layout
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    pub preset: LayoutPreset,
    /// Devices for `preset = "custom"`
    pub devices: Vec<DevicePlacement>,
}

impl GeometryConfig {
    pub fn placements(&self) -> Vec<DevicePlacement> {
        match self.preset {
            LayoutPreset::Custom => self.devices.clone(),
            preset => preset.placements(),
        }
    }
}

/// Softness rendering: fingertip tracking, widening step-length circle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoftnessConfig {
    /// Added to tracked positions (mm); camera housing 4 mm plus the 4.2 mm depth origin
    pub calibration_offset: [f64; 3],
    pub fingertip: FingertipConfig,
    #[serde(deserialize_with = "softness_driver")]
    pub driver: DriverConfig,
}

impl Default for SoftnessConfig {
    fn default() -> Self {
        Self {
            calibration_offset: [0.0, 0.0, -4.0 - 4.2],
            fingertip: FingertipConfig::default(),
            driver: DriverConfig::default(),
        }
    }
}

/// Texture rendering: contact-area tracking, fixed-rate circle, sine modulation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextureConfig {
    /// Added to tracked positions (mm); camera housing 9 mm plus the 4.2 mm depth origin
    pub calibration_offset: [f64; 3],
    pub contact: ContactAreaConfig,
    #[serde(deserialize_with = "texture_driver")]
    pub driver: DriverConfig,
}

impl Default for TextureConfig {
    fn default() -> Self {
        Self {
            calibration_offset: [0.0, 0.0, -9.0 - 4.2],
            contact: ContactAreaConfig::default(),
            driver: DriverConfig {
                waveform: Waveform::sine(100.0),
                trajectory: TrajectoryConfig::FixedRate(FixedRateParams::default()),
                initial_height: 280.0,
                send_timeout_ms: Some(0),
                ..DriverConfig::default()
            },
        }
    }
}

fn softness_driver<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DriverConfig, D::Error> {
    overlay_driver(SoftnessConfig::default().driver, deserializer)
}

fn texture_driver<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DriverConfig, D::Error> {
    overlay_driver(TextureConfig::default().driver, deserializer)
}

/// Apply a partial `[<demo>.driver]` table on top of that demo's own defaults.
///
/// Nested tables (`waveform`, `trajectory`) are merged key by key as long as
/// they keep the default's `type`; a table naming another `type` replaces it.
fn overlay_driver<'de, D: Deserializer<'de>>(
    defaults: DriverConfig,
    deserializer: D,
) -> Result<DriverConfig, D::Error> {
    let overrides = toml::Table::deserialize(deserializer)?;
    let mut merged = match toml::Value::try_from(&defaults).map_err(D::Error::custom)? {
        toml::Value::Table(table) => table,
        other => {
            return Err(D::Error::custom(format!(
                "driver defaults serialized to {}",
                other.type_str()
            )))
        }
    };

    for (key, value) in overrides {
        if let (Some(toml::Value::Table(current)), toml::Value::Table(patch)) =
            (merged.get_mut(&key), &value)
        {
            let same_kind = patch
                .get("type")
                .map_or(true, |kind| current.get("type") == Some(kind));
            if same_kind {
                for (field, v) in patch {
                    current.insert(field.clone(), v.clone());
                }
                continue;
            }
        }
        merged.insert(key, value);
    }

    DriverConfig::deserialize(toml::Value::Table(merged)).map_err(D::Error::custom)
}

/// Get the platform-specific configuration directory
fn dirs_path() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        if let Some(config_dir) = std::env::var_os("XDG_CONFIG_HOME") {
            return PathBuf::from(config_dir).join("focaltrack");
        }
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join(".config/focaltrack");
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = std::env::var_os("HOME") {
            return PathBuf::from(home).join("Library/Application Support/focaltrack");
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("focaltrack");
        }
    }

    PathBuf::from(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::StepLengthParams;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.controller.link, LinkKind::Nop);
        assert_eq!(config.geometry.placements().len(), 4);
        assert_eq!(config.softness.driver.initial_height, 200.0);
        assert_eq!(config.texture.driver.initial_height, 280.0);
        assert_eq!(config.texture.driver.send_timeout_ms, Some(0));
        assert!((config.softness.calibration_offset[2] + 8.2).abs() < 1e-12);
        assert!((config.texture.calibration_offset[2] + 13.2).abs() < 1e-12);
        assert_eq!(config.viewer.width, 800);
        assert_eq!(config.camera.fps, 30);
    }

    #[test]
    fn test_config_validation() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            [controller]
            link = "udp"
            ack_timeout_ms = 50

            [controller.udp]
            remote = "192.168.1.20:9000"

            [softness.driver.trajectory]
            type = "step_length"
            step = 0.5

            [texture.driver.waveform]
            type = "sine"
            freq = 150.0

            [landmark]
            port = 5005
        "#;

        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.controller.link, LinkKind::Udp);
        assert_eq!(config.controller.ack_timeout_ms, 50);
        assert_eq!(config.controller.udp.remote, "192.168.1.20:9000");
        match config.softness.driver.trajectory {
            TrajectoryConfig::StepLength(p) => {
                assert_eq!(p.step, 0.5);
                assert_eq!(p.stm_freq, 6.0);
            }
            other => panic!("unexpected trajectory {:?}", other),
        }
        assert_eq!(config.texture.driver.waveform, Waveform::sine(150.0));
        // Untouched fields keep their defaults.
        assert_eq!(config.texture.driver.initial_height, 280.0);
        assert_eq!(config.landmark.source, LandmarkSource::Nearest);
        assert_eq!(config.landmark.port, 5005);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_texture_keeps_its_defaults_under_partial_override() {
        let config =
            Config::from_str("[texture.driver.waveform]\ntype = \"sine\"\nfreq = 150.0\n").unwrap();
        let texture = &config.texture.driver;
        assert_eq!(texture.waveform, Waveform::sine(150.0));
        assert_eq!(
            texture.trajectory,
            TrajectoryConfig::FixedRate(FixedRateParams::default())
        );
        assert_eq!(texture.initial_height, 280.0);
        assert_eq!(texture.send_timeout_ms, Some(0));

        // A trajectory table without `type` tunes the demo's own trajectory.
        let config =
            Config::from_str("[texture.driver.trajectory]\nradius = 4.5\n").unwrap();
        match config.texture.driver.trajectory {
            TrajectoryConfig::FixedRate(p) => {
                assert_eq!(p.radius, 4.5);
                assert_eq!(p.time_step, FixedRateParams::default().time_step);
            }
            other => panic!("unexpected trajectory {:?}", other),
        }
        assert_eq!(config.texture.driver.waveform, Waveform::sine(100.0));

        let config = Config::from_str("[texture.driver]\ninitial_height = 300.0\n").unwrap();
        assert_eq!(config.texture.driver.initial_height, 300.0);
        assert_eq!(config.texture.driver.send_timeout_ms, Some(0));
        assert!(matches!(
            config.texture.driver.trajectory,
            TrajectoryConfig::FixedRate(_)
        ));
    }

    #[test]
    fn test_softness_keeps_its_defaults_under_partial_override() {
        let config = Config::from_str("[softness.driver]\nspin_window_us = 500\n").unwrap();
        let softness = &config.softness.driver;
        assert_eq!(softness.spin_window_us, 500);
        assert_eq!(softness.waveform, Waveform::full());
        assert_eq!(
            softness.trajectory,
            TrajectoryConfig::StepLength(StepLengthParams::default())
        );
        assert_eq!(softness.initial_height, 200.0);
        assert_eq!(softness.send_timeout_ms, None);
        // The other demo is untouched.
        assert_eq!(config.texture, TextureConfig::default());
    }

    #[test]
    fn test_trajectory_type_switch_replaces_params() {
        let toml = r#"
            [softness.driver.trajectory]
            type = "fixed_rate"
            radius = 2.0
        "#;
        let config = Config::from_str(toml).unwrap();
        match config.softness.driver.trajectory {
            TrajectoryConfig::FixedRate(p) => {
                assert_eq!(p.radius, 2.0);
                // Not carried over from the step-length defaults.
                assert_eq!(p.stm_freq, FixedRateParams::default().stm_freq);
            }
            other => panic!("unexpected trajectory {:?}", other),
        }
        assert_eq!(config.softness.driver.initial_height, 200.0);
    }

    #[test]
    fn test_custom_geometry() {
        let toml = r#"
            [geometry]
            preset = "custom"

            [[geometry.devices]]
            position = [0.0, 0.0, 0.0]
            rotation_zyz = [0.0, 0.0, 0.0]
        "#;
        let config = Config::from_str(toml).unwrap();
        assert_eq!(config.geometry.placements().len(), 1);
        assert!(config.validate().is_ok());

        let empty = Config::from_str("[geometry]\npreset = \"custom\"\n").unwrap();
        assert!(matches!(
            empty.validate(),
            Err(FocalTrackError::Config(ConfigError::InvalidValue { .. }))
        ));
    }

    #[test]
    fn test_invalid_values() {
        let mut config = Config::default();
        config.texture.contact.threshold.min_dist = 0.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.softness.driver.trajectory = TrajectoryConfig::StepLength(Default::default());
        if let TrajectoryConfig::StepLength(p) = &mut config.softness.driver.trajectory {
            p.step = 0.0;
        }
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.viewer.width = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.softness.fingertip.landmark = 21;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_udp_landmarks_rejected_with_synthetic_frames() {
        let config = Config::from_str("[landmark]\nsource = \"udp\"\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(FocalTrackError::Config(ConfigError::InvalidValue { ref field, .. }))
                if field == "landmark.source"
        ));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[viewer]\nwidth = 1024\nvsync = false").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.viewer.width, 1024);
        assert_eq!(config.viewer.height, 600);
        assert!(!config.viewer.vsync);
    }

    #[test]
    fn test_missing_file_and_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Config::from_file(&missing),
            Err(FocalTrackError::Config(ConfigError::ReadFile(_)))
        ));
        assert!(matches!(
            Config::from_str("[camera\nwidth = 1"),
            Err(FocalTrackError::Config(ConfigError::Parse(_)))
        ));
    }
}
