//! Frame and stream types

use serde::{Deserialize, Serialize};

/// Lens distortion model of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistortionModel {
    #[default]
    None,
    /// Distortion applied on projection, with radial terms scaling the tangential ones
    ModifiedBrownConrady,
    /// Coefficients describe the undistortion, applied on deprojection
    InverseBrownConrady,
    /// Standard Brown-Conrady, undistorted iteratively on deprojection
    BrownConrady,
}

/// Pinhole intrinsics of a video stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intrinsics {
    pub width: u32,
    pub height: u32,
    /// Principal point, pixels from the left edge
    pub ppx: f32,
    /// Principal point, pixels from the top edge
    pub ppy: f32,
    /// Focal length in multiples of pixel width
    pub fx: f32,
    /// Focal length in multiples of pixel height
    pub fy: f32,
    pub model: DistortionModel,
    /// k1, k2, p1, p2, k3
    pub coeffs: [f32; 5],
}

impl Intrinsics {
    /// Distortion-free intrinsics from a field of view in degrees, principal
    /// point at the image centre.
    pub fn from_fov(width: u32, height: u32, hfov_deg: f32, vfov_deg: f32) -> Self {
        let fx = (width as f32 / 2.0) / (hfov_deg.to_radians() / 2.0).tan();
        let fy = (height as f32 / 2.0) / (vfov_deg.to_radians() / 2.0).tan();
        Self {
            width,
            height,
            ppx: width as f32 / 2.0,
            ppy: height as f32 / 2.0,
            fx,
            fy,
            model: DistortionModel::None,
            coeffs: [0.0; 5],
        }
    }

    /// Horizontal and vertical field of view in degrees
    pub fn fov(&self) -> [f32; 2] {
        [
            (2.0 * (self.ppx / self.fx).atan()).to_degrees(),
            (2.0 * (self.ppy / self.fy).atan()).to_degrees(),
        ]
    }
}

/// Rigid transform between two streams' coordinate frames
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extrinsics {
    /// Column-major 3x3 rotation
    pub rotation: [f32; 9],
    /// Translation in metres
    pub translation: [f32; 3],
}

impl Default for Extrinsics {
    fn default() -> Self {
        Self {
            rotation: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
            translation: [0.0; 3],
        }
    }
}

impl Extrinsics {
    pub fn transform(&self, p: [f32; 3]) -> [f32; 3] {
        let r = &self.rotation;
        let t = &self.translation;
        [
            r[0] * p[0] + r[3] * p[1] + r[6] * p[2] + t[0],
            r[1] * p[0] + r[4] * p[1] + r[7] * p[2] + t[1],
            r[2] * p[0] + r[5] * p[1] + r[8] * p[2] + t[2],
        ]
    }
}

/// 16-bit depth image
#[derive(Debug, Clone, PartialEq)]
pub struct DepthFrame {
    pub width: u32,
    pub height: u32,
    /// Metres per depth unit
    pub depth_scale: f32,
    pub intrinsics: Intrinsics,
    pub frame_number: u64,
    /// Row-major depth units, 0 = no data
    pub data: Vec<u16>,
}

impl DepthFrame {
    /// Blank (all zero) frame
    pub fn new(intrinsics: Intrinsics, depth_scale: f32, frame_number: u64) -> Self {
        Self {
            width: intrinsics.width,
            height: intrinsics.height,
            depth_scale,
            intrinsics,
            frame_number,
            data: vec![0; (intrinsics.width * intrinsics.height) as usize],
        }
    }

    fn index(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height).then(|| (y * self.width + x) as usize)
    }

    /// Raw depth units at (`x`, `y`), 0 when out of bounds
    pub fn get(&self, x: u32, y: u32) -> u16 {
        self.index(x, y).map_or(0, |i| self.data[i])
    }

    pub fn set(&mut self, x: u32, y: u32, value: u16) {
        if let Some(i) = self.index(x, y) {
            self.data[i] = value;
        }
    }

    /// Distance in metres at (`x`, `y`), 0.0 when unknown
    pub fn get_distance(&self, x: u32, y: u32) -> f32 {
        self.get(x, y) as f32 * self.depth_scale
    }

    /// Number of pixels carrying depth
    pub fn valid_pixels(&self) -> usize {
        self.data.iter().filter(|&&d| d > 0).count()
    }
}

/// 8-bit BGR image
#[derive(Debug, Clone, PartialEq)]
pub struct ColorFrame {
    pub width: u32,
    pub height: u32,
    pub intrinsics: Intrinsics,
    pub frame_number: u64,
    /// Row-major BGR pixels
    pub data: Vec<[u8; 3]>,
}

impl ColorFrame {
    pub fn new(intrinsics: Intrinsics, frame_number: u64) -> Self {
        Self {
            width: intrinsics.width,
            height: intrinsics.height,
            intrinsics,
            frame_number,
            data: vec![[0; 3]; (intrinsics.width * intrinsics.height) as usize],
        }
    }

    pub fn get(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        (x < self.width && y < self.height).then(|| self.data[(y * self.width + x) as usize])
    }

    pub fn set(&mut self, x: u32, y: u32, bgr: [u8; 3]) {
        if x < self.width && y < self.height {
            self.data[(y * self.width + x) as usize] = bgr;
        }
    }
}

/// Frames delivered together by one `wait_for_frames` call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameSet {
    pub depth: Option<DepthFrame>,
    pub color: Option<ColorFrame>,
    /// Depth-to-colour transform, present when both streams run
    pub depth_to_color: Option<Extrinsics>,
}

/// Stream type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Depth,
    Color,
}

/// A requested stream configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamProfile {
    pub kind: StreamKind,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl StreamProfile {
    pub fn depth(width: u32, height: u32, fps: u32) -> Self {
        Self {
            kind: StreamKind::Depth,
            width,
            height,
            fps,
        }
    }

    pub fn color(width: u32, height: u32, fps: u32) -> Self {
        Self {
            kind: StreamKind::Color,
            width,
            height,
            fps,
        }
    }
}

/// Sensor module reported by a device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorInfo {
    pub name: String,
}

/// Name under which depth cameras report their colour module
pub const COLOR_SENSOR_NAME: &str = "RGB Camera";
