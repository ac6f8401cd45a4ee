//! Fingertip localizer
//!
//! Aligns depth to colour, asks a landmark detector for the index fingertip
//! and converts its pixel and depth into millimetres using the colour
//! camera's field of view.

use serde::{Deserialize, Serialize};

use super::landmark::{LandmarkDetector, INDEX_FINGER_TIP};
use super::{Localizer, PositionSample};
use crate::camera::{fov_offset, AlignToColor, FrameSet, StreamKind};

/// Fingertip localizer settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FingertipConfig {
    /// Landmark index to track
    pub landmark: usize,
    /// Colour camera field of view in degrees (h, v)
    pub fov: [f32; 2],
}

impl Default for FingertipConfig {
    fn default() -> Self {
        Self {
            landmark: INDEX_FINGER_TIP,
            fov: [69.0, 42.0],
        }
    }
}

pub struct FingertipLocalizer<D> {
    detector: D,
    config: FingertipConfig,
    align: AlignToColor,
}

impl<D: LandmarkDetector> FingertipLocalizer<D> {
    pub fn new(detector: D, config: &FingertipConfig) -> Self {
        Self {
            detector,
            config: *config,
            align: AlignToColor,
        }
    }
}

impl<D: LandmarkDetector> Localizer for FingertipLocalizer<D> {
    fn name(&self) -> &'static str {
        "fingertip"
    }

    fn streams(&self) -> &'static [StreamKind] {
        &[StreamKind::Depth, StreamKind::Color]
    }

    fn localize(&mut self, frames: FrameSet) -> Option<PositionSample> {
        if frames.depth.is_none() || frames.color.is_none() {
            return None;
        }
        let frames = self.align.process(frames);
        let (depth, color) = (frames.depth.as_ref()?, frames.color.as_ref()?);

        // First detected hand wins.
        let hands = self.detector.detect(&frames);
        let tip = hands.iter().find_map(|h| h.get(self.config.landmark))?;
        let [px, py] = tip.to_pixel(color.width, color.height)?;

        let depth_mm = depth.get_distance(px, py) * 1000.0;
        if depth_mm <= 0.0 {
            return None;
        }

        let p = fov_offset(
            [px as f32, py as f32],
            [color.width, color.height],
            self.config.fov,
            depth_mm,
        );
        tracing::debug!("Fingertip at pixel ({}, {}), {:.1} mm", px, py, depth_mm);
        Some(PositionSample::new(p[0] as f64, p[1] as f64, p[2] as f64))
    }
}
