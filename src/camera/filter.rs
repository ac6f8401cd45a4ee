//! Depth post-processing: distance thresholding and depth-to-colour alignment.

use serde::{Deserialize, Serialize};

use super::deproject::{deproject_pixel_to_point, project_point_to_pixel};
use super::frame::{DepthFrame, Extrinsics, FrameSet, Intrinsics};

/// Zeroes every depth pixel outside `[min_dist, max_dist]` metres
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdFilter {
    pub min_dist: f32,
    pub max_dist: f32,
}

impl Default for ThresholdFilter {
    fn default() -> Self {
        Self {
            min_dist: 0.0,
            max_dist: 0.3,
        }
    }
}

impl ThresholdFilter {
    pub fn new(min_dist: f32, max_dist: f32) -> Self {
        Self { min_dist, max_dist }
    }

    pub fn process(&self, frame: &DepthFrame) -> DepthFrame {
        let mut out = frame.clone();
        for d in out.data.iter_mut() {
            let dist = *d as f32 * frame.depth_scale;
            if dist < self.min_dist || dist > self.max_dist {
                *d = 0;
            }
        }
        out
    }
}

/// Re-projects depth into the colour stream's viewpoint so that depth and
/// colour pixels with the same coordinates see the same point.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlignToColor;

impl AlignToColor {
    pub fn process(&self, frames: FrameSet) -> FrameSet {
        let (depth, color) = match (&frames.depth, &frames.color) {
            (Some(d), Some(c)) => (d, c),
            _ => return frames,
        };

        let extrinsics = frames.depth_to_color.unwrap_or_default();
        let aligned = align_depth(depth, &color.intrinsics, &extrinsics);

        FrameSet {
            depth: Some(aligned),
            color: frames.color,
            depth_to_color: Some(Extrinsics::default()),
        }
    }
}

fn align_depth(depth: &DepthFrame, target: &Intrinsics, extrinsics: &Extrinsics) -> DepthFrame {
    let mut out = DepthFrame::new(*target, depth.depth_scale, depth.frame_number);
    let max_x = target.width as f32 - 1.0;
    let max_y = target.height as f32 - 1.0;

    let to_target = |pixel: [f32; 2], z: f32| -> Option<[f32; 2]> {
        let point = deproject_pixel_to_point(&depth.intrinsics, pixel, z);
        let moved = extrinsics.transform(point);
        (moved[2] > 0.0).then(|| project_point_to_pixel(target, moved))
    };

    for v in 0..depth.height {
        for u in 0..depth.width {
            let raw = depth.get(u, v);
            if raw == 0 {
                continue;
            }
            let z = raw as f32 * depth.depth_scale;
            let (u, v) = (u as f32, v as f32);

            // Splat the whole pixel footprint so magnified depth leaves no holes.
            let (p0, p1) = match (to_target([u - 0.5, v - 0.5], z), to_target([u + 0.5, v + 0.5], z)) {
                (Some(a), Some(b)) => (a, b),
                _ => continue,
            };
            let x0 = (p0[0] + 0.5 + 1e-3).floor();
            let y0 = (p0[1] + 0.5 + 1e-3).floor();
            let x1 = (p1[0] - 0.5 - 1e-3).ceil().max(x0);
            let y1 = (p1[1] - 0.5 - 1e-3).ceil().max(y0);
            if x1 < 0.0 || y1 < 0.0 || x0 > max_x || y0 > max_y {
                continue;
            }

            for y in y0.max(0.0) as u32..=y1.min(max_y) as u32 {
                for x in x0.max(0.0) as u32..=x1.min(max_x) as u32 {
                    let existing = out.get(x, y);
                    // Nearest surface wins where several depth pixels land together.
                    if existing == 0 || raw < existing {
                        out.set(x, y, raw);
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::frame::ColorFrame;

    fn frame_with(values: &[(u32, u32, u16)]) -> DepthFrame {
        let intr = Intrinsics::from_fov(8, 6, 60.0, 45.0);
        let mut f = DepthFrame::new(intr, 0.001, 1);
        for &(x, y, d) in values {
            f.set(x, y, d);
        }
        f
    }

    #[test]
    fn test_threshold_keeps_in_range() {
        let f = frame_with(&[(0, 0, 100), (1, 0, 300), (2, 0, 301), (3, 0, 900)]);
        let out = ThresholdFilter::new(0.0, 0.3).process(&f);
        assert_eq!(out.get(0, 0), 100);
        assert_eq!(out.get(1, 0), 300);
        assert_eq!(out.get(2, 0), 0);
        assert_eq!(out.get(3, 0), 0);
    }

    #[test]
    fn test_threshold_min_dist() {
        let f = frame_with(&[(0, 0, 50), (1, 0, 150)]);
        let out = ThresholdFilter::new(0.1, 0.3).process(&f);
        assert_eq!(out.get(0, 0), 0);
        assert_eq!(out.get(1, 0), 150);
    }

    #[test]
    fn test_identity_alignment_preserves_depth() {
        let depth = frame_with(&[(2, 3, 250), (5, 1, 400)]);
        let color = ColorFrame::new(depth.intrinsics, 1);
        let frames = FrameSet {
            depth: Some(depth.clone()),
            color: Some(color),
            depth_to_color: Some(Extrinsics::default()),
        };
        let aligned = AlignToColor.process(frames);
        let d = aligned.depth.unwrap();
        assert_eq!(d.get(2, 3), 250);
        assert_eq!(d.get(5, 1), 400);
        assert_eq!(d.valid_pixels(), 2);
    }

    #[test]
    fn test_alignment_without_color_is_passthrough() {
        let depth = frame_with(&[(1, 1, 10)]);
        let frames = FrameSet {
            depth: Some(depth.clone()),
            color: None,
            depth_to_color: None,
        };
        assert_eq!(AlignToColor.process(frames).depth, Some(depth));
    }

    #[test]
    fn test_narrower_colour_fov_leaves_no_holes() {
        let intr = Intrinsics::from_fov(32, 24, 87.0, 58.0);
        let mut depth = DepthFrame::new(intr, 0.001, 1);
        for v in 0..24 {
            for u in 0..32 {
                depth.set(u, v, 500);
            }
        }
        let color = ColorFrame::new(Intrinsics::from_fov(32, 24, 69.0, 42.0), 1);
        let frames = FrameSet {
            depth: Some(depth),
            color: Some(color),
            depth_to_color: Some(Extrinsics::default()),
        };
        let aligned = AlignToColor.process(frames).depth.unwrap();
        assert_eq!(aligned.valid_pixels(), 32 * 24);
    }
}
