//! Haptics driver loop
//!
//! Owns the controller session. Every tick it focuses the array on the
//! fingertip plus the trajectory offset, picks up the newest position from the
//! tracker if there is one, advances the trajectory and sleeps for the tick.

pub mod trajectory;

pub use trajectory::{
    FixedRate, FixedRateParams, StepLength, StepLengthParams, Trajectory, TrajectoryConfig,
};

use std::time::Duration;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::error::{FocalTrackError, HapticsError};
use crate::haptics::{Command, Controller, FirmwareInfo, Link, Waveform};
use crate::mailbox::{Subscriber, TryRecvError};
use crate::timing::PreciseSleeper;
use crate::tracking::PositionSample;
use crate::ShutdownSignal;

const BANNER: &str =
    "================================== Firmware information ====================================";
const BANNER_END: &str =
    "============================================================================================";

/// Driver loop settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Amplitude modulation of the focal point
    pub waveform: Waveform,
    pub trajectory: TrajectoryConfig,
    /// Height before the first position arrives (mm)
    pub initial_height: f64,
    /// Ack wait per drive command (ms); unset uses the controller default, 0 does not wait
    pub send_timeout_ms: Option<u64>,
    /// Added to the geometry centre (mm)
    pub center_offset: [f64; 3],
    /// Busy-wait tail of each tick sleep (µs)
    pub spin_window_us: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            waveform: Waveform::full(),
            trajectory: TrajectoryConfig::StepLength(StepLengthParams::default()),
            initial_height: 200.0,
            send_timeout_ms: None,
            center_offset: [0.0; 3],
            spin_window_us: 1000,
        }
    }
}

impl DriverConfig {
    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout_ms.map(Duration::from_millis)
    }
}

/// Counters reported when the driver stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverStats {
    pub ticks: u64,
    /// Positions taken from the tracker
    pub samples: u64,
    pub ack_timeouts: u64,
}

pub struct Driver<L: Link> {
    controller: Controller<L>,
    config: DriverConfig,
    trajectory: Box<dyn Trajectory>,
    sleeper: PreciseSleeper,
    center: DVec3,
    /// Last known fingertip `(x, y, height)`
    position: PositionSample,
    stats: DriverStats,
    tracker_gone: bool,
}

impl<L: Link> Driver<L> {
    pub fn new(controller: Controller<L>, config: DriverConfig) -> Self {
        let center = controller.geometry().center() + DVec3::from_array(config.center_offset);
        Self {
            trajectory: config.trajectory.build(),
            sleeper: PreciseSleeper::new(Duration::from_micros(config.spin_window_us)),
            position: PositionSample::new(0.0, 0.0, config.initial_height),
            center,
            controller,
            config,
            stats: DriverStats::default(),
            tracker_gone: false,
        }
    }

    pub fn position(&self) -> PositionSample {
        self.position
    }

    pub fn trajectory(&self) -> &dyn Trajectory {
        self.trajectory.as_ref()
    }

    pub fn stats(&self) -> DriverStats {
        self.stats
    }

    pub fn controller(&self) -> &Controller<L> {
        &self.controller
    }

    /// Focal point for the current position and phase
    pub fn focal_target(&self) -> DVec3 {
        self.center + self.position.to_vec3() + self.trajectory.offset()
    }

    /// Synchronize, report firmware and configure the silencer.
    pub fn prepare(&mut self) -> Result<Vec<FirmwareInfo>, HapticsError> {
        self.controller.synchronize()?;

        let firmware = self.controller.firmware_info_list()?;
        tracing::info!("{}", BANNER);
        for info in &firmware {
            tracing::info!("{}", info);
        }
        tracing::info!("{}", BANNER_END);

        self.controller.configure_silencer()?;
        tracing::info!(
            "Driver ready: {} around ({:.1}, {:.1}, {:.1}) mm",
            self.config.waveform,
            self.center.x,
            self.center.y,
            self.center.z
        );
        Ok(firmware)
    }

    /// One control tick without the sleep; returns the tick length.
    pub fn tick(&mut self, subscriber: &Subscriber<PositionSample>) -> Result<Duration, HapticsError> {
        let target = self.focal_target();
        match self.controller.send(
            Command::drive(self.config.waveform, target),
            self.config.send_timeout(),
        ) {
            Ok(()) => {}
            Err(HapticsError::AckTimeout(t)) => {
                self.stats.ack_timeouts += 1;
                tracing::warn!("Drive command not acknowledged within {:?}", t);
            }
            Err(e) => return Err(e),
        }

        match subscriber.try_take() {
            Ok(sample) => {
                self.position = sample;
                self.stats.samples += 1;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                if !self.tracker_gone {
                    self.tracker_gone = true;
                    tracing::warn!("Tracker stopped publishing, holding last position");
                }
            }
        }

        let dt = self.trajectory.advance(self.position.z);
        self.stats.ticks += 1;
        Ok(dt)
    }

    /// Silence the array and close the session.
    pub fn finish(mut self) -> Result<DriverStats, HapticsError> {
        let stats = self.stats;
        let stopped = self.controller.stop();
        let closed = self.controller.close();
        tracing::info!(
            "Driver finished: {} ticks, {} samples, {} ack timeouts",
            stats.ticks,
            stats.samples,
            stats.ack_timeouts
        );
        stopped?;
        closed?;
        Ok(stats)
    }

    /// Prepare, tick until shutdown, then stop and close.
    pub fn run(
        mut self,
        subscriber: Subscriber<PositionSample>,
        shutdown: &ShutdownSignal,
    ) -> Result<DriverStats, FocalTrackError> {
        self.prepare()?;

        while !shutdown.is_triggered() {
            let dt = self.tick(&subscriber)?;
            self.sleeper.sleep(dt);
        }

        tracing::info!("Driver shutting down");
        Ok(self.finish()?)
    }
}
