//! Depth camera abstraction
//!
//! - Frame and intrinsics types mirroring what depth camera SDKs deliver
//! - Pixel deprojection and depth post-processing
//! - A synthetic camera for running without hardware

pub mod deproject;
pub mod filter;
pub mod frame;
pub mod synthetic;

pub use deproject::{deproject_pixel_to_point, fov_offset, project_point_to_pixel};
pub use filter::{AlignToColor, ThresholdFilter};
pub use frame::{
    ColorFrame, DepthFrame, DistortionModel, Extrinsics, FrameSet, Intrinsics, SensorInfo,
    StreamKind, StreamProfile, COLOR_SENSOR_NAME,
};
pub use synthetic::{SyntheticCamera, SyntheticCameraConfig};

use serde::{Deserialize, Serialize};

use crate::error::CameraError;

/// A device (or stand-in) producing depth and colour frames
pub trait FrameSource: Send {
    /// Sensor modules present on the device
    fn sensors(&self) -> Vec<SensorInfo>;

    /// Start streaming the requested profiles
    fn start(&mut self, profiles: &[StreamProfile]) -> Result<(), CameraError>;

    /// Block until the next frame set is available.
    ///
    /// `Ok(None)` means no frames this time (e.g. a timeout); the stream is
    /// still alive. `Err(CameraError::Closed)` ends the stream.
    fn wait_for_frames(&mut self) -> Result<Option<FrameSet>, CameraError>;

    fn stop(&mut self);
}

/// Whether `source` reports a colour module
pub fn has_color_sensor(source: &dyn FrameSource) -> bool {
    source
        .sensors()
        .iter()
        .any(|s| s.name == COLOR_SENSOR_NAME)
}

/// Stream settings shared by both demos
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub synthetic: SyntheticCameraConfig,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
            synthetic: SyntheticCameraConfig::default(),
        }
    }
}

impl CameraConfig {
    pub fn depth_profile(&self) -> StreamProfile {
        StreamProfile::depth(self.width, self.height, self.fps)
    }

    pub fn color_profile(&self) -> StreamProfile {
        StreamProfile::color(self.width, self.height, self.fps)
    }
}
