//! Contact-area localizer
//!
//! Thresholds the depth frame to the near field, takes the centred region of
//! interest and uses the centroid of the remaining pixels as the contact point.

use serde::{Deserialize, Serialize};

use super::{Localizer, PositionSample};
use crate::camera::{deproject_pixel_to_point, FrameSet, StreamKind, ThresholdFilter};

/// Contact-area localizer settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactAreaConfig {
    pub threshold: ThresholdFilter,
    /// Half size of the square region of interest around the image centre (px)
    pub roi_half_size: u32,
}

impl Default for ContactAreaConfig {
    fn default() -> Self {
        Self {
            threshold: ThresholdFilter::default(),
            roi_half_size: 50,
        }
    }
}

pub struct ContactAreaLocalizer {
    config: ContactAreaConfig,
}

impl ContactAreaLocalizer {
    pub fn new(config: &ContactAreaConfig) -> Self {
        Self { config: *config }
    }
}

impl Localizer for ContactAreaLocalizer {
    fn name(&self) -> &'static str {
        "contact-area"
    }

    fn streams(&self) -> &'static [StreamKind] {
        &[StreamKind::Depth]
    }

    fn localize(&mut self, frames: FrameSet) -> Option<PositionSample> {
        let depth = self.config.threshold.process(frames.depth.as_ref()?);

        let half = self.config.roi_half_size;
        let (cx, cy) = (depth.width / 2, depth.height / 2);
        let (u0, v0) = (cx.saturating_sub(half), cy.saturating_sub(half));
        let u1 = (cx + half).min(depth.width);
        let v1 = (cy + half).min(depth.height);

        let (mut sum_u, mut sum_v, mut count) = (0u64, 0u64, 0u64);
        for v in v0..v1 {
            for u in u0..u1 {
                if depth.get(u, v) > 0 {
                    sum_u += u as u64;
                    sum_v += v as u64;
                    count += 1;
                }
            }
        }
        if count == 0 {
            return None;
        }

        let u = (sum_u / count) as u32;
        let v = (sum_v / count) as u32;
        let dist = depth.get_distance(u, v);
        if dist <= 0.0 {
            // Centroid fell into a hole of a ring-shaped blob.
            return None;
        }

        let p = deproject_pixel_to_point(&depth.intrinsics, [u as f32, v as f32], dist);
        tracing::debug!("Contact centroid ({}, {}) from {} px at {:.3} m", u, v, count, dist);
        Some(PositionSample::new(
            p[0] as f64 * 1000.0,
            p[1] as f64 * 1000.0,
            p[2] as f64 * 1000.0,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{DepthFrame, Intrinsics};

    fn frames(width: u32, height: u32, blob: &[(u32, u32, u16)]) -> FrameSet {
        let intr = Intrinsics::from_fov(width, height, 87.0, 58.0);
        let mut depth = DepthFrame::new(intr, 0.001, 1);
        for v in 0..height {
            for u in 0..width {
                depth.set(u, v, 800);
            }
        }
        for &(u, v, d) in blob {
            depth.set(u, v, d);
        }
        FrameSet {
            depth: Some(depth),
            ..Default::default()
        }
    }

    #[test]
    fn test_centred_blob_lies_on_axis() {
        let blob: Vec<_> = (318..=322)
            .flat_map(|u| (238..=242).map(move |v| (u, v, 250)))
            .collect();
        let mut loc = ContactAreaLocalizer::new(&ContactAreaConfig::default());
        let p = loc.localize(frames(640, 480, &blob)).unwrap();
        assert!(p.x.abs() < 1e-6);
        assert!(p.y.abs() < 1e-6);
        assert!((p.z - 250.0).abs() < 1e-3);
    }

    #[test]
    fn test_centroid_is_integer_mean() {
        // Mean column 904 / 3 truncates to 301, which carries 210.
        let blob = [(300, 240, 200), (303, 240, 200), (301, 240, 210)];
        let mut loc = ContactAreaLocalizer::new(&ContactAreaConfig::default());
        let p = loc.localize(frames(640, 480, &blob)).unwrap();
        assert!((p.z - 210.0).abs() < 1e-3);
        assert!(p.x < 0.0);
    }

    #[test]
    fn test_blob_outside_roi_is_ignored() {
        let mut loc = ContactAreaLocalizer::new(&ContactAreaConfig::default());
        assert!(loc.localize(frames(640, 480, &[(10, 10, 200)])).is_none());
    }

    #[test]
    fn test_missing_depth_is_skipped() {
        let mut loc = ContactAreaLocalizer::new(&ContactAreaConfig::default());
        assert!(loc.localize(FrameSet::default()).is_none());
    }

    #[test]
    fn test_roi_clamped_to_small_frames() {
        let mut loc = ContactAreaLocalizer::new(&ContactAreaConfig::default());
        let p = loc.localize(frames(40, 30, &[(20, 15, 150)])).unwrap();
        assert!((p.z - 150.0).abs() < 1e-3);
    }
}
