//! Hand landmark detection
//!
//! Two detectors:
//! - `UdpLandmarkReceiver` takes JSON-over-UDP packets from an external hand
//!   tracking helper (see `subprocess`), latest packet wins.
//! - `NearestPointDetector` treats the closest depth return as the fingertip,
//!   which needs no model at all.

use std::net::UdpSocket;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::camera::FrameSet;
use crate::error::{FocalTrackError, TrackingError};

/// Landmarks per hand in the 21-point hand model
pub const NUM_HAND_LANDMARKS: usize = 21;
/// Wrist landmark index
pub const WRIST: usize = 0;
/// Index fingertip landmark index
pub const INDEX_FINGER_TIP: usize = 8;

/// A landmark in normalised image coordinates (0..1 across width / height)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    /// Relative depth from the model, unitless
    #[serde(default)]
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y, z: 0.0 }
    }

    /// Pixel (`floor(x·W)`, `floor(y·H)`), or `None` if outside the image
    pub fn to_pixel(&self, width: u32, height: u32) -> Option<[u32; 2]> {
        let px = (self.x * width as f32).floor();
        let py = (self.y * height as f32).floor();
        if !px.is_finite() || !py.is_finite() || px < 0.0 || py < 0.0 {
            return None;
        }
        let (px, py) = (px as u32, py as u32);
        (px < width && py < height).then_some([px, py])
    }
}

/// Landmarks of one detected hand; detectors may fill only some joints.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HandLandmarks {
    points: [Option<Landmark>; NUM_HAND_LANDMARKS],
}

impl HandLandmarks {
    pub fn from_points(points: &[[f32; 3]]) -> Self {
        let mut hand = Self::default();
        for (slot, p) in hand.points.iter_mut().zip(points) {
            *slot = Some(Landmark {
                x: p[0],
                y: p[1],
                z: p[2],
            });
        }
        hand
    }

    /// Hand with only the index fingertip known
    pub fn fingertip_only(tip: Landmark) -> Self {
        let mut hand = Self::default();
        hand.points[INDEX_FINGER_TIP] = Some(tip);
        hand
    }

    pub fn get(&self, idx: usize) -> Option<Landmark> {
        self.points.get(idx).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.points.iter().filter(|p| p.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Finds hands in a frame set
pub trait LandmarkDetector: Send {
    /// Hands found in `frames`, possibly none
    fn detect(&mut self, frames: &FrameSet) -> Vec<HandLandmarks>;
}

/// One JSON packet from the hand tracking helper
#[derive(Debug, Clone, Deserialize)]
pub struct LandmarkPacket {
    /// Whether any hand was detected this frame
    pub hand_detected: bool,
    /// 21 normalised `[x, y, z]` points of the detected hand
    #[serde(default)]
    pub landmarks: Vec<[f32; 3]>,
}

/// Landmark source selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LandmarkSource {
    /// Closest depth return
    #[default]
    Nearest,
    /// External helper over UDP
    Udp,
}

/// Hand landmark configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LandmarkConfig {
    pub source: LandmarkSource,
    /// Listen address for the UDP receiver
    pub listen_address: String,
    /// UDP port to receive landmark packets on
    pub port: u16,
    /// Ignore packets older than this (ms)
    pub stale_after_ms: u64,
    /// Path to the helper script
    pub tracker_script: String,
    /// Camera device index passed to the helper
    pub camera_device: u32,
    /// Minimum detection confidence passed to the helper
    pub min_detection_confidence: f32,
    /// Minimum tracking confidence passed to the helper
    pub min_tracking_confidence: f32,
    /// Nearest-point detector: ignore returns beyond this (m)
    pub nearest_max_dist: f32,
    /// Nearest-point detector: average pixels within this of the minimum (mm)
    pub nearest_tolerance_mm: f32,
}

impl Default for LandmarkConfig {
    fn default() -> Self {
        Self {
            source: LandmarkSource::Nearest,
            listen_address: "127.0.0.1".to_string(),
            port: 12347,
            stale_after_ms: 200,
            tracker_script: "scripts/hand_tracker.py".to_string(),
            camera_device: 0,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            nearest_max_dist: 0.5,
            nearest_tolerance_mm: 3.0,
        }
    }
}

/// Fingertip = closest valid depth return
#[derive(Debug, Clone)]
pub struct NearestPointDetector {
    max_dist: f32,
    tolerance_mm: f32,
}

impl NearestPointDetector {
    pub fn new(config: &LandmarkConfig) -> Self {
        Self {
            max_dist: config.nearest_max_dist,
            tolerance_mm: config.nearest_tolerance_mm,
        }
    }
}

impl LandmarkDetector for NearestPointDetector {
    fn detect(&mut self, frames: &FrameSet) -> Vec<HandLandmarks> {
        let depth = match &frames.depth {
            Some(d) => d,
            None => return Vec::new(),
        };

        let max_units = (self.max_dist / depth.depth_scale) as u32;
        let nearest = depth
            .data
            .iter()
            .copied()
            .filter(|&d| d > 0 && (d as u32) <= max_units)
            .min();
        let nearest = match nearest {
            Some(n) => n as u32,
            None => return Vec::new(),
        };

        let tol_units = (self.tolerance_mm / 1000.0 / depth.depth_scale) as u32;
        let (mut sum_x, mut sum_y, mut count) = (0u64, 0u64, 0u64);
        for (i, &d) in depth.data.iter().enumerate() {
            if d > 0 && (d as u32) <= nearest + tol_units {
                sum_x += i as u64 % depth.width as u64;
                sum_y += i as u64 / depth.width as u64;
                count += 1;
            }
        }

        // Centre of the pixel, normalised, so `to_pixel` maps back onto it.
        let cx = (sum_x as f32 / count as f32).round() + 0.5;
        let cy = (sum_y as f32 / count as f32).round() + 0.5;
        vec![HandLandmarks::fingertip_only(Landmark::new(
            cx / depth.width as f32,
            cy / depth.height as f32,
        ))]
    }
}

/// Hand landmark receiver for the JSON-over-UDP helper protocol
pub struct UdpLandmarkReceiver {
    config: LandmarkConfig,
    socket: Option<UdpSocket>,
    latest: Option<(Instant, LandmarkPacket)>,
}

impl UdpLandmarkReceiver {
    /// Create a new receiver (does not bind yet)
    pub fn new(config: &LandmarkConfig) -> Self {
        Self {
            config: config.clone(),
            socket: None,
            latest: None,
        }
    }

    /// Bind the UDP socket
    pub fn start(&mut self) -> Result<(), FocalTrackError> {
        let addr = format!("{}:{}", self.config.listen_address, self.config.port);

        let socket = UdpSocket::bind(&addr).map_err(|e| {
            TrackingError::Receiver(format!("Failed to bind to {}: {}", addr, e))
        })?;

        socket.set_nonblocking(true).map_err(|e| {
            TrackingError::Receiver(format!("Failed to set non-blocking: {}", e))
        })?;

        tracing::info!("Landmark receiver listening on {}", addr);
        self.socket = Some(socket);

        Ok(())
    }

    pub fn local_addr(&self) -> Option<std::net::SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Drain pending datagrams, keeping the newest parseable packet.
    pub fn poll(&mut self) -> Result<(), FocalTrackError> {
        let socket = match &self.socket {
            Some(s) => s,
            None => return Ok(()),
        };

        let mut buf = [0u8; 65536];
        loop {
            match socket.recv(&mut buf) {
                Ok(0) => continue,
                Ok(size) => match serde_json::from_slice::<LandmarkPacket>(&buf[..size]) {
                    Ok(packet) => self.latest = Some((Instant::now(), packet)),
                    Err(e) => tracing::debug!("Dropping landmark packet: {}", e),
                },
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(()),
                Err(e) => {
                    return Err(TrackingError::Receiver(format!("Receive error: {}", e)).into());
                }
            }
        }
    }

    /// Hands from the newest packet, if it is recent enough
    pub fn current_hands(&self) -> Vec<HandLandmarks> {
        let stale_after = Duration::from_millis(self.config.stale_after_ms);
        match &self.latest {
            Some((at, packet))
                if packet.hand_detected
                    && !packet.landmarks.is_empty()
                    && at.elapsed() <= stale_after =>
            {
                vec![HandLandmarks::from_points(&packet.landmarks)]
            }
            _ => Vec::new(),
        }
    }

    /// Stop the receiver
    pub fn stop(&mut self) {
        self.socket = None;
        tracing::info!("Landmark receiver stopped");
    }
}

impl LandmarkDetector for UdpLandmarkReceiver {
    fn detect(&mut self, _frames: &FrameSet) -> Vec<HandLandmarks> {
        if let Err(e) = self.poll() {
            tracing::warn!("{}", e);
        }
        self.current_hands()
    }
}

impl<D: LandmarkDetector + ?Sized> LandmarkDetector for Box<D> {
    fn detect(&mut self, frames: &FrameSet) -> Vec<HandLandmarks> {
        (**self).detect(frames)
    }
}

/// Build the configured detector. The UDP receiver is bound immediately.
pub fn create_detector(config: &LandmarkConfig) -> Result<Box<dyn LandmarkDetector>, FocalTrackError> {
    Ok(match config.source {
        LandmarkSource::Nearest => Box::new(NearestPointDetector::new(config)),
        LandmarkSource::Udp => {
            let mut receiver = UdpLandmarkReceiver::new(config);
            receiver.start()?;
            Box::new(receiver)
        }
    })
}
