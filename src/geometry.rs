//! Array geometry: device placement and transducer layout.
//!
//! Each device is a 18 × 14 grid of transducers at 10.16 mm pitch, with
//! three grid positions left unpopulated for mounting holes. Devices are
//! placed with a translation and a ZYZ Euler rotation, and the geometry is
//! fixed once built.

use std::f64::consts::PI;

use glam::{DQuat, DVec3};
use serde::{Deserialize, Serialize};

/// Transducer pitch in millimetres
pub const TRANS_SPACING: f64 = 10.16;
/// Transducer columns per device
pub const NUM_TRANS_X: usize = 18;
/// Transducer rows per device
pub const NUM_TRANS_Y: usize = 14;
/// Grid positions without a transducer
pub const MISSING_TRANSDUCERS: [(usize, usize); 3] = [(1, 1), (2, 1), (16, 1)];
/// Populated transducers per device
pub const NUM_TRANS_IN_UNIT: usize = NUM_TRANS_X * NUM_TRANS_Y - MISSING_TRANSDUCERS.len();
/// Device board width in millimetres
pub const DEVICE_WIDTH: f64 = 192.0;
/// Device board height in millimetres
pub const DEVICE_HEIGHT: f64 = 151.4;

/// Whether grid position (`x`, `y`) carries no transducer
pub fn is_missing_transducer(x: usize, y: usize) -> bool {
    MISSING_TRANSDUCERS.contains(&(x, y))
}

/// Placement of one device, as written in configuration files
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DevicePlacement {
    /// Origin of the device (first transducer) in millimetres
    pub position: [f64; 3],
    /// ZYZ Euler angles in radians
    #[serde(default)]
    pub rotation_zyz: [f64; 3],
}

impl DevicePlacement {
    pub fn new(position: [f64; 3], rotation_zyz: [f64; 3]) -> Self {
        Self {
            position,
            rotation_zyz,
        }
    }
}

/// A single placed array unit
#[derive(Debug, Clone, PartialEq)]
pub struct Device {
    idx: usize,
    position: DVec3,
    rotation: DQuat,
    transducers: Vec<DVec3>,
}

impl Device {
    fn new(idx: usize, position: DVec3, rotation: DQuat) -> Self {
        let mut transducers = Vec::with_capacity(NUM_TRANS_IN_UNIT);
        for y in 0..NUM_TRANS_Y {
            for x in 0..NUM_TRANS_X {
                if is_missing_transducer(x, y) {
                    continue;
                }
                let local = DVec3::new(x as f64 * TRANS_SPACING, y as f64 * TRANS_SPACING, 0.0);
                transducers.push(position + rotation * local);
            }
        }

        Self {
            idx,
            position,
            rotation,
            transducers,
        }
    }

    pub fn idx(&self) -> usize {
        self.idx
    }

    pub fn position(&self) -> DVec3 {
        self.position
    }

    pub fn rotation(&self) -> DQuat {
        self.rotation
    }

    /// World positions of every populated transducer
    pub fn transducers(&self) -> &[DVec3] {
        &self.transducers
    }

    /// Mean of the transducer positions
    pub fn center(&self) -> DVec3 {
        mean(&self.transducers)
    }

    /// Unit normal of the emitting surface
    pub fn axial_direction(&self) -> DVec3 {
        self.rotation * DVec3::Z
    }

    /// Board corners in world space, counter-clockwise from the origin
    pub fn corners(&self) -> [DVec3; 4] {
        let local = [
            DVec3::ZERO,
            DVec3::new(DEVICE_WIDTH, 0.0, 0.0),
            DVec3::new(DEVICE_WIDTH, DEVICE_HEIGHT, 0.0),
            DVec3::new(0.0, DEVICE_HEIGHT, 0.0),
        ];
        local.map(|p| self.position + self.rotation * p)
    }
}

/// Rotation from ZYZ Euler angles: `Rz(a) · Ry(b) · Rz(c)`.
pub fn rotation_from_euler_zyz(angles: [f64; 3]) -> DQuat {
    DQuat::from_rotation_z(angles[0])
        * DQuat::from_rotation_y(angles[1])
        * DQuat::from_rotation_z(angles[2])
}

/// Immutable collection of placed devices
#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    devices: Vec<Device>,
}

impl Geometry {
    pub fn new(placements: &[DevicePlacement]) -> Self {
        let devices = placements
            .iter()
            .enumerate()
            .map(|(idx, p)| {
                Device::new(
                    idx,
                    DVec3::from_array(p.position),
                    rotation_from_euler_zyz(p.rotation_zyz),
                )
            })
            .collect();
        Self { devices }
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn num_devices(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn num_transducers(&self) -> usize {
        self.devices.iter().map(|d| d.transducers.len()).sum()
    }

    /// Mean position of every transducer across all devices
    pub fn center(&self) -> DVec3 {
        let n = self.num_transducers();
        if n == 0 {
            return DVec3::ZERO;
        }
        self.devices
            .iter()
            .flat_map(|d| d.transducers.iter())
            .fold(DVec3::ZERO, |acc, p| acc + *p)
            / n as f64
    }

    /// Axis-aligned bounds of all board corners as (min, max)
    pub fn bounds(&self) -> Option<(DVec3, DVec3)> {
        let mut corners = self.devices.iter().flat_map(|d| d.corners());
        let first = corners.next()?;
        Some(corners.fold((first, first), |(lo, hi), c| (lo.min(c), hi.max(c))))
    }
}

fn mean(points: &[DVec3]) -> DVec3 {
    if points.is_empty() {
        return DVec3::ZERO;
    }
    points.iter().fold(DVec3::ZERO, |acc, p| acc + *p) / points.len() as f64
}

/// Named device arrangements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayoutPreset {
    /// Four boards tilted 15° towards the centre, used by the rendering demos
    #[default]
    TiltedQuad,
    /// Two flat and two 60°-tilted boards in a 2 × 2 arrangement
    ViewerGrid,
    /// A single flat board at the origin
    Single,
    /// Placements listed in the configuration file
    Custom,
}

impl LayoutPreset {
    /// Placements for this preset. `Custom` yields an empty list.
    pub fn placements(&self) -> Vec<DevicePlacement> {
        match self {
            Self::TiltedQuad => tilted_quad(),
            Self::ViewerGrid => viewer_grid(),
            Self::Single => vec![DevicePlacement::new([0.0; 3], [0.0; 3])],
            Self::Custom => Vec::new(),
        }
    }
}

/// Tilted four-board arrangement (numbered as seen from above):
///
/// ```text
/// 1 → 2
///     ↓
/// 4 ← 3
/// ```
pub fn tilted_quad() -> Vec<DevicePlacement> {
    let tilt = PI / 12.0;
    let w_cos = tilt.cos() * DEVICE_WIDTH;
    let inset = w_cos - (DEVICE_WIDTH - w_cos);

    vec![
        DevicePlacement::new([inset, DEVICE_HEIGHT - 10.0 + 12.5, 0.0], [PI, tilt, 0.0]),
        DevicePlacement::new([inset, -10.0 - 12.5, 0.0], [PI, tilt, 0.0]),
        DevicePlacement::new([-inset, 12.5, 0.0], [0.0, tilt, 0.0]),
        DevicePlacement::new([-inset, -DEVICE_HEIGHT - 12.5, 0.0], [0.0, tilt, 0.0]),
    ]
}

/// 2 × 2 arrangement with the right-hand column tilted by 60°.
pub fn viewer_grid() -> Vec<DevicePlacement> {
    let gap = 25.0;
    vec![
        DevicePlacement::new([0.0, 0.0, 0.0], [0.0, 0.0, 0.0]),
        DevicePlacement::new([DEVICE_WIDTH, 0.0, 0.0], [0.0, -PI / 3.0, 0.0]),
        DevicePlacement::new([DEVICE_WIDTH, -DEVICE_HEIGHT - gap, 0.0], [0.0, -PI / 3.0, 0.0]),
        DevicePlacement::new([0.0, -DEVICE_HEIGHT - gap, 0.0], [0.0, 0.0, 0.0]),
    ]
}
