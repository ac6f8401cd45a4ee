//! Synthetic depth camera
//!
//! Renders a fingertip hovering over the lens and pressing down on a fixed
//! cycle, so the whole tracking pipeline can run without hardware.

use std::f32::consts::PI;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::frame::{
    ColorFrame, DepthFrame, Extrinsics, FrameSet, Intrinsics, SensorInfo, StreamKind,
    StreamProfile, COLOR_SENSOR_NAME,
};
use super::FrameSource;
use crate::error::CameraError;

const BACKGROUND_BGR: [u8; 3] = [30, 30, 30];
const SKIN_BGR: [u8; 3] = [120, 160, 220];

/// Synthetic camera settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticCameraConfig {
    /// Report a colour module
    pub color_sensor: bool,
    /// Depth stream field of view in degrees (h, v)
    pub depth_fov: [f32; 2],
    /// Colour stream field of view in degrees (h, v)
    pub color_fov: [f32; 2],
    /// Metres per depth unit
    pub depth_scale: f32,
    /// Depth of the scene behind the finger in mm (0 = no return)
    pub background_mm: f32,
    /// Fingertip radius in pixels
    pub fingertip_radius_px: f32,
    /// Closest fingertip distance in mm
    pub near_mm: f32,
    /// Farthest fingertip distance in mm
    pub far_mm: f32,
    /// Length of one press cycle in seconds
    pub press_period_s: f32,
    /// Lateral wander of the fingertip in pixels
    pub wander_px: f32,
    /// Pace frames at the stream frame rate
    pub realtime: bool,
    /// Every n-th frame set arrives without depth (0 = never)
    pub dropout_every: u64,
    /// End the stream after this many frames
    pub max_frames: Option<u64>,
}

impl Default for SyntheticCameraConfig {
    fn default() -> Self {
        Self {
            color_sensor: true,
            depth_fov: [87.0, 58.0],
            color_fov: [69.0, 42.0],
            depth_scale: 0.001,
            background_mm: 800.0,
            fingertip_radius_px: 18.0,
            near_mm: 180.0,
            far_mm: 230.0,
            press_period_s: 4.0,
            wander_px: 15.0,
            realtime: true,
            dropout_every: 0,
            max_frames: None,
        }
    }
}

/// Ground truth for one rendered frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticPose {
    /// Fingertip centre, pixels
    pub pixel: [f32; 2],
    /// Fingertip distance, mm
    pub depth_mm: f32,
}

pub struct SyntheticCamera {
    config: SyntheticCameraConfig,
    depth: Option<StreamProfile>,
    color: Option<StreamProfile>,
    frame_number: u64,
    next_frame: Option<Instant>,
}

impl SyntheticCamera {
    pub fn new(config: &SyntheticCameraConfig) -> Self {
        Self {
            config: config.clone(),
            depth: None,
            color: None,
            frame_number: 0,
            next_frame: None,
        }
    }

    fn fps(&self) -> u32 {
        self.depth
            .or(self.color)
            .map(|p| p.fps.max(1))
            .unwrap_or(30)
    }

    /// Fingertip pose at `frame_number` for a `width` × `height` image
    pub fn pose_at(&self, frame_number: u64, width: u32, height: u32) -> SyntheticPose {
        let t = frame_number as f32 / self.fps() as f32;
        let phase = 2.0 * PI * t / self.config.press_period_s.max(f32::EPSILON);

        let mid = (self.config.near_mm + self.config.far_mm) / 2.0;
        let amp = (self.config.far_mm - self.config.near_mm) / 2.0;

        SyntheticPose {
            pixel: [
                width as f32 / 2.0 + self.config.wander_px * (phase / 2.0).cos(),
                height as f32 / 2.0 + self.config.wander_px * (phase / 2.0).sin(),
            ],
            depth_mm: mid + amp * phase.cos(),
        }
    }

    fn render_depth(&self, profile: &StreamProfile, pose: &SyntheticPose) -> DepthFrame {
        let intr = Intrinsics::from_fov(
            profile.width,
            profile.height,
            self.config.depth_fov[0],
            self.config.depth_fov[1],
        );
        let mut frame = DepthFrame::new(intr, self.config.depth_scale, self.frame_number);
        let to_units = |mm: f32| (mm / 1000.0 / self.config.depth_scale).round().max(0.0) as u16;

        let background = to_units(self.config.background_mm);
        let r = self.config.fingertip_radius_px.max(1.0);

        for v in 0..profile.height {
            for u in 0..profile.width {
                let du = u as f32 - pose.pixel[0];
                let dv = v as f32 - pose.pixel[1];
                let d2 = du * du + dv * dv;

                let mm = if d2 <= r * r {
                    // Rounded tip: centre is closest.
                    Some(pose.depth_mm + 8.0 * d2 / (r * r))
                } else if dv > 0.0 && du.abs() <= r {
                    // Finger shaft receding towards the bottom edge.
                    Some(pose.depth_mm + 10.0 + 0.2 * dv)
                } else {
                    None
                };

                let value = match mm {
                    Some(mm) => to_units(mm),
                    None => background,
                };
                frame.set(u, v, value);
            }
        }
        frame
    }

    fn render_color(&self, profile: &StreamProfile, pose: &SyntheticPose) -> ColorFrame {
        let intr = Intrinsics::from_fov(
            profile.width,
            profile.height,
            self.config.color_fov[0],
            self.config.color_fov[1],
        );
        let mut frame = ColorFrame::new(intr, self.frame_number);
        let r = self.config.fingertip_radius_px.max(1.0);

        for v in 0..profile.height {
            for u in 0..profile.width {
                let du = u as f32 - pose.pixel[0];
                let dv = v as f32 - pose.pixel[1];
                let finger = du * du + dv * dv <= r * r || (dv > 0.0 && du.abs() <= r);
                frame.set(u, v, if finger { SKIN_BGR } else { BACKGROUND_BGR });
            }
        }
        frame
    }

    fn pace(&mut self) {
        if !self.config.realtime {
            return;
        }
        let period = Duration::from_secs_f64(1.0 / self.fps() as f64);
        let now = Instant::now();
        let deadline = *self.next_frame.get_or_insert(now);
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        // Do not try to catch up on frames we were too slow for.
        self.next_frame = Some(deadline.max(now) + period);
    }
}

impl FrameSource for SyntheticCamera {
    fn sensors(&self) -> Vec<SensorInfo> {
        let mut sensors = vec![SensorInfo {
            name: "Stereo Module".to_string(),
        }];
        if self.config.color_sensor {
            sensors.push(SensorInfo {
                name: COLOR_SENSOR_NAME.to_string(),
            });
        }
        sensors
    }

    fn start(&mut self, profiles: &[StreamProfile]) -> Result<(), CameraError> {
        for profile in profiles {
            match profile.kind {
                StreamKind::Depth => self.depth = Some(*profile),
                StreamKind::Color => {
                    if !self.config.color_sensor {
                        return Err(CameraError::MissingSensor(COLOR_SENSOR_NAME.to_string()));
                    }
                    self.color = Some(*profile);
                }
            }
        }
        if self.depth.is_none() {
            return Err(CameraError::StreamDisabled("depth".to_string()));
        }

        self.frame_number = 0;
        self.next_frame = None;
        tracing::info!(
            "Synthetic camera started (depth: {:?}, color: {:?})",
            self.depth,
            self.color
        );
        Ok(())
    }

    fn wait_for_frames(&mut self) -> Result<Option<FrameSet>, CameraError> {
        let depth_profile = self
            .depth
            .ok_or_else(|| CameraError::StreamDisabled("depth".to_string()))?;

        if let Some(max) = self.config.max_frames {
            if self.frame_number >= max {
                return Err(CameraError::Closed);
            }
        }

        self.pace();
        self.frame_number += 1;

        let pose = self.pose_at(self.frame_number, depth_profile.width, depth_profile.height);
        let dropout =
            self.config.dropout_every > 0 && self.frame_number % self.config.dropout_every == 0;

        let depth = (!dropout).then(|| self.render_depth(&depth_profile, &pose));
        let color = self.color.map(|profile| {
            let pose = self.pose_at(self.frame_number, profile.width, profile.height);
            self.render_color(&profile, &pose)
        });
        let depth_to_color = color.as_ref().map(|_| Extrinsics::default());

        Ok(Some(FrameSet {
            depth,
            color,
            depth_to_color,
        }))
    }

    fn stop(&mut self) {
        if self.depth.take().is_some() {
            tracing::info!("Synthetic camera stopped after {} frames", self.frame_number);
        }
        self.color = None;
    }
}
