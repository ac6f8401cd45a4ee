//! Hand tracking helper subprocess
//!
//! Launches the Python hand tracker (scripts/hand_tracker.py) that feeds the
//! `UdpLandmarkReceiver`. The child is killed when the manager is dropped.

use std::process::Stdio;

use tokio::process::{Child, Command};

use crate::error::{FocalTrackError, TrackingError};
use crate::tracking::landmark::LandmarkConfig;

const PYTHON: &str = "python3";

/// Where the helper is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelperState {
    /// Never started, or stopped before it was started
    Idle,
    Running,
    /// Exited with this code; `None` if it was killed by a signal
    Exited(Option<i32>),
}

/// Manages the hand tracker subprocess
pub struct LandmarkSubprocess {
    child: Option<Child>,
    exit_code: Option<Option<i32>>,
    config: LandmarkConfig,
    width: u32,
    height: u32,
    fps: u32,
}

impl LandmarkSubprocess {
    /// Create a new subprocess manager (does not start the process)
    pub fn new(config: &LandmarkConfig, width: u32, height: u32, fps: u32) -> Self {
        Self {
            child: None,
            exit_code: None,
            config: config.clone(),
            width,
            height,
            fps,
        }
    }

    /// Command line the helper is launched with
    pub fn args(&self) -> Vec<String> {
        let c = &self.config;
        let mut args = vec![c.tracker_script.clone()];
        for (flag, value) in [
            ("--ip", c.listen_address.clone()),
            ("--port", c.port.to_string()),
            ("--capture", c.camera_device.to_string()),
            ("--width", self.width.to_string()),
            ("--height", self.height.to_string()),
            ("--fps", self.fps.to_string()),
            ("--min-detection-confidence", c.min_detection_confidence.to_string()),
            ("--min-tracking-confidence", c.min_tracking_confidence.to_string()),
        ] {
            args.push(flag.to_string());
            args.push(value);
        }
        args
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(PYTHON);
        cmd.args(self.args())
            .kill_on_drop(true)
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }

    /// Launch the helper. Must be called inside a tokio runtime.
    pub fn start(&mut self) -> Result<(), FocalTrackError> {
        if self.state() == HelperState::Running {
            return Ok(());
        }

        let child = self.command().spawn().map_err(|e| {
            TrackingError::Subprocess(format!(
                "Failed to launch hand tracker at '{}': {}",
                self.config.tracker_script, e
            ))
        })?;

        tracing::info!(
            pid = ?child.id(),
            camera = self.config.camera_device,
            port = self.config.port,
            "Hand tracker started"
        );

        self.child = Some(child);
        self.exit_code = None;
        Ok(())
    }

    /// Poll the child without blocking.
    pub fn state(&mut self) -> HelperState {
        let Some(child) = self.child.as_mut() else {
            return match self.exit_code {
                Some(code) => HelperState::Exited(code),
                None => HelperState::Idle,
            };
        };

        match child.try_wait() {
            Ok(None) => HelperState::Running,
            Ok(Some(status)) => {
                tracing::warn!("Hand tracker exited: {}", status);
                self.child = None;
                self.exit_code = Some(status.code());
                HelperState::Exited(status.code())
            }
            // Status unknown; assume the child is still there until a later poll says otherwise.
            Err(e) => {
                tracing::debug!("Hand tracker status unavailable: {}", e);
                HelperState::Running
            }
        }
    }

    pub fn is_running(&mut self) -> bool {
        self.state() == HelperState::Running
    }

    /// Kill the helper, reap it and report how it ended.
    pub async fn stop(&mut self) -> HelperState {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.start_kill() {
                tracing::debug!("Hand tracker already gone: {}", e);
            }
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(e) => {
                    tracing::warn!("Failed to reap hand tracker: {}", e);
                    None
                }
            };
            tracing::info!("Hand tracker stopped");
            self.exit_code = Some(code);
        }
        self.state()
    }

    /// Whether `python3` can import the `mediapipe` package the helper needs.
    pub async fn mediapipe_available() -> bool {
        Command::new(PYTHON)
            .args(["-c", "import mediapipe"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_carry_config() {
        let config = LandmarkConfig {
            port: 4242,
            camera_device: 2,
            ..Default::default()
        };
        let sub = LandmarkSubprocess::new(&config, 640, 480, 30);
        let args = sub.args();
        assert_eq!(args[0], "scripts/hand_tracker.py");
        // Script plus flag/value pairs.
        assert_eq!(args.len(), 1 + 2 * 8);
        let port = args.iter().position(|a| a == "--port").unwrap();
        assert_eq!(args[port + 1], "4242");
        let capture = args.iter().position(|a| a == "--capture").unwrap();
        assert_eq!(args[capture + 1], "2");
        let width = args.iter().position(|a| a == "--width").unwrap();
        assert_eq!(args[width + 1], "640");
    }

    #[test]
    fn test_idle_before_start() {
        let mut sub = LandmarkSubprocess::new(&LandmarkConfig::default(), 640, 480, 30);
        assert_eq!(sub.state(), HelperState::Idle);
        assert!(!sub.is_running());
    }

    #[tokio::test]
    async fn test_stop_without_start_stays_idle() {
        let mut sub = LandmarkSubprocess::new(&LandmarkConfig::default(), 640, 480, 30);
        assert_eq!(sub.stop().await, HelperState::Idle);
        assert!(!sub.is_running());
    }
}
