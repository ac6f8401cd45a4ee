//! Tracking module
//!
//! Turns camera frames into fingertip positions for the driver:
//! - `ContactAreaLocalizer`: thresholded depth blob centroid (texture demo)
//! - `FingertipLocalizer`: hand landmark + aligned depth (softness demo)
//! - Landmark detectors (UDP helper protocol, nearest depth point)

pub mod contact;
pub mod fingertip;
pub mod landmark;
pub mod subprocess;

pub use contact::{ContactAreaConfig, ContactAreaLocalizer};
pub use fingertip::{FingertipConfig, FingertipLocalizer};
pub use landmark::{
    create_detector, HandLandmarks, Landmark, LandmarkConfig, LandmarkDetector, LandmarkSource,
    NearestPointDetector, UdpLandmarkReceiver, INDEX_FINGER_TIP,
};
pub use subprocess::{HelperState, LandmarkSubprocess};

use std::ops::Add;

use glam::DVec3;

use crate::camera::{FrameSource, StreamKind, StreamProfile, COLOR_SENSOR_NAME};
use crate::error::{CameraError, FocalTrackError};
use crate::mailbox::Publisher;
use crate::ShutdownSignal;

/// Fingertip position in millimetres, camera frame
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PositionSample {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl PositionSample {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn to_vec3(self) -> DVec3 {
        DVec3::new(self.x, self.y, self.z)
    }
}

impl From<[f64; 3]> for PositionSample {
    fn from(v: [f64; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl Add<[f64; 3]> for PositionSample {
    type Output = PositionSample;

    fn add(self, offset: [f64; 3]) -> Self::Output {
        Self::new(self.x + offset[0], self.y + offset[1], self.z + offset[2])
    }
}

/// Finds the point of interest in a frame set
pub trait Localizer: Send {
    fn name(&self) -> &'static str;

    /// Streams this localizer needs
    fn streams(&self) -> &'static [StreamKind];

    /// Camera-frame point in mm, `None` when nothing was found
    fn localize(&mut self, frames: crate::camera::FrameSet) -> Option<PositionSample>;
}

impl<L: Localizer + ?Sized> Localizer for Box<L> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn streams(&self) -> &'static [StreamKind] {
        (**self).streams()
    }

    fn localize(&mut self, frames: crate::camera::FrameSet) -> Option<PositionSample> {
        (**self).localize(frames)
    }
}

/// Counters reported when the tracker stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrackerStats {
    pub frames: u64,
    pub published: u64,
    /// Frame sets without the required frames
    pub incomplete: u64,
    /// Frame sets where nothing was localized
    pub misses: u64,
}

/// Capture → localize → offset → publish loop
pub struct Tracker<S, L> {
    source: S,
    localizer: L,
    /// Added to every localized point (mm)
    calibration: [f64; 3],
    width: u32,
    height: u32,
    fps: u32,
}

impl<S: FrameSource, L: Localizer> Tracker<S, L> {
    pub fn new(source: S, localizer: L, calibration: [f64; 3]) -> Self {
        Self {
            source,
            localizer,
            calibration,
            width: 640,
            height: 480,
            fps: 30,
        }
    }

    /// Stream resolution and rate requested from the source
    pub fn with_stream(mut self, width: u32, height: u32, fps: u32) -> Self {
        self.width = width;
        self.height = height;
        self.fps = fps;
        self
    }

    fn profiles(&self) -> Vec<StreamProfile> {
        self.localizer
            .streams()
            .iter()
            .map(|kind| StreamProfile {
                kind: *kind,
                width: self.width,
                height: self.height,
                fps: self.fps,
            })
            .collect()
    }

    /// Check capabilities and start streaming
    pub fn start(&mut self) -> Result<(), FocalTrackError> {
        let needs_color = self.localizer.streams().contains(&StreamKind::Color);
        if needs_color && !crate::camera::has_color_sensor(&self.source) {
            return Err(CameraError::MissingSensor(COLOR_SENSOR_NAME.to_string()).into());
        }

        let profiles = self.profiles();
        self.source.start(&profiles)?;
        tracing::info!(
            "Tracker started ({}, {}x{} @ {} fps)",
            self.localizer.name(),
            self.width,
            self.height,
            self.fps
        );
        Ok(())
    }

    /// One frame: `Ok(Some(sample))` if a position was published
    pub fn step(
        &mut self,
        publisher: &Publisher<PositionSample>,
        stats: &mut TrackerStats,
    ) -> Result<Option<PositionSample>, CameraError> {
        let frames = match self.source.wait_for_frames()? {
            Some(f) => f,
            None => {
                stats.incomplete += 1;
                return Ok(None);
            }
        };
        stats.frames += 1;

        let complete = self.localizer.streams().iter().all(|kind| match kind {
            StreamKind::Depth => frames.depth.is_some(),
            StreamKind::Color => frames.color.is_some(),
        });
        if !complete {
            stats.incomplete += 1;
            return Ok(None);
        }

        let point = match self.localizer.localize(frames) {
            Some(p) => p,
            None => {
                stats.misses += 1;
                return Ok(None);
            }
        };

        let sample = point + self.calibration;
        publisher.publish(sample);
        stats.published += 1;
        Ok(Some(sample))
    }

    /// Start, then run until shutdown, end of stream or the driver hanging up.
    pub fn run(
        mut self,
        publisher: Publisher<PositionSample>,
        shutdown: &ShutdownSignal,
    ) -> Result<TrackerStats, FocalTrackError> {
        self.start()?;

        let mut stats = TrackerStats::default();
        let result = loop {
            if shutdown.is_triggered() {
                break Ok(());
            }
            if publisher.is_disconnected() {
                tracing::info!("Driver went away, stopping tracker");
                break Ok(());
            }
            match self.step(&publisher, &mut stats) {
                Ok(Some(sample)) => tracing::debug!(
                    "Position ({:.1}, {:.1}, {:.1}) mm",
                    sample.x,
                    sample.y,
                    sample.z
                ),
                Ok(None) => {}
                Err(CameraError::Closed) => {
                    tracing::info!("Frame source closed");
                    break Ok(());
                }
                Err(e) => break Err(e),
            }
        };

        self.source.stop();
        tracing::info!(
            "Tracker stopped: {} frames, {} published, {} incomplete, {} misses",
            stats.frames,
            stats.published,
            stats.incomplete,
            stats.misses
        );
        result?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{SyntheticCamera, SyntheticCameraConfig};
    use crate::mailbox::{mailbox, TryRecvError};

    fn camera(config: SyntheticCameraConfig) -> SyntheticCamera {
        SyntheticCamera::new(&SyntheticCameraConfig {
            realtime: false,
            ..config
        })
    }

    #[test]
    fn test_sample_add_offset() {
        let s = PositionSample::new(1.0, 2.0, 200.0) + [0.0, 0.0, -8.2];
        assert_eq!(s.x, 1.0);
        assert!((s.z - 191.8).abs() < 1e-9);
        assert_eq!(s.to_vec3(), DVec3::new(1.0, 2.0, s.z));
    }

    #[test]
    fn test_fingertip_requires_color_sensor() {
        let cam = camera(SyntheticCameraConfig {
            color_sensor: false,
            ..Default::default()
        });
        let detector = NearestPointDetector::new(&LandmarkConfig::default());
        let loc = FingertipLocalizer::new(detector, &FingertipConfig::default());
        let (tx, _rx) = mailbox();
        let err = Tracker::new(cam, loc, [0.0; 3])
            .with_stream(64, 48, 30)
            .run(tx, &ShutdownSignal::new())
            .unwrap_err();
        assert!(matches!(
            err,
            FocalTrackError::Camera(CameraError::MissingSensor(_))
        ));
    }

    #[test]
    fn test_contact_tracker_publishes_with_offset() {
        let cam = camera(SyntheticCameraConfig {
            max_frames: Some(5),
            ..Default::default()
        });
        let loc = ContactAreaLocalizer::new(&ContactAreaConfig::default());
        let (tx, rx) = mailbox();
        let stats = Tracker::new(cam, loc, [0.0, 0.0, -13.2])
            .with_stream(160, 120, 30)
            .run(tx, &ShutdownSignal::new())
            .unwrap();

        assert_eq!(stats.frames, 5);
        assert_eq!(stats.published, 5);
        let last = rx.try_take().unwrap();
        // Press cycle keeps the tip between 180 and 230 mm; the centroid may sit on the shaft.
        assert!(last.z > 150.0 && last.z < 260.0);
        assert_eq!(rx.try_take(), Err(TryRecvError::Disconnected));
    }

    #[test]
    fn test_dropouts_are_skipped() {
        let cam = camera(SyntheticCameraConfig {
            max_frames: Some(6),
            dropout_every: 3,
            ..Default::default()
        });
        let loc = ContactAreaLocalizer::new(&ContactAreaConfig::default());
        let (tx, _rx) = mailbox();
        let stats = Tracker::new(cam, loc, [0.0; 3])
            .with_stream(160, 120, 30)
            .run(tx, &ShutdownSignal::new())
            .unwrap();
        assert_eq!(stats.frames, 6);
        assert_eq!(stats.incomplete, 2);
        assert_eq!(stats.published, 4);
    }

    #[test]
    fn test_fingertip_tracker_with_nearest_point() {
        let cam = camera(SyntheticCameraConfig {
            max_frames: Some(3),
            ..Default::default()
        });
        let detector = NearestPointDetector::new(&LandmarkConfig::default());
        let loc = FingertipLocalizer::new(detector, &FingertipConfig::default());
        let (tx, rx) = mailbox();
        let stats = Tracker::new(cam, loc, [0.0, 0.0, -8.2])
            .with_stream(160, 120, 30)
            .run(tx, &ShutdownSignal::new())
            .unwrap();
        assert_eq!(stats.published, 3);
        let sample = rx.try_take().unwrap();
        assert!(sample.z > 150.0 && sample.z < 240.0);
    }

    #[test]
    fn test_shutdown_stops_before_first_frame() {
        let cam = camera(SyntheticCameraConfig::default());
        let loc = ContactAreaLocalizer::new(&ContactAreaConfig::default());
        let (tx, rx) = mailbox();
        let shutdown = ShutdownSignal::new();
        shutdown.trigger();
        let stats = Tracker::new(cam, loc, [0.0; 3])
            .with_stream(32, 24, 30)
            .run(tx, &shutdown)
            .unwrap();
        assert_eq!(stats, TrackerStats::default());
        assert_eq!(rx.try_take(), Err(TryRecvError::Disconnected));
    }

    #[test]
    fn test_stops_when_subscriber_dropped() {
        let cam = camera(SyntheticCameraConfig::default());
        let loc = ContactAreaLocalizer::new(&ContactAreaConfig::default());
        let (tx, rx) = mailbox();
        drop(rx);
        let stats = Tracker::new(cam, loc, [0.0; 3])
            .with_stream(32, 24, 30)
            .run(tx, &ShutdownSignal::new())
            .unwrap();
        assert_eq!(stats.frames, 0);
    }
}
