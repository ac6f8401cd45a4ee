//! Commands understood by the array controller.

use std::f64::consts::PI;
use std::fmt;

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Amplitude modulation applied to the focal point drive signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Waveform {
    /// Constant amplitude
    Static {
        #[serde(default = "default_intensity")]
        intensity: f64,
    },
    /// Sinusoidal amplitude modulation
    Sine {
        freq: f64,
        #[serde(default = "default_intensity")]
        intensity: f64,
        #[serde(default = "default_offset")]
        offset: f64,
    },
}

fn default_intensity() -> f64 {
    1.0
}

fn default_offset() -> f64 {
    0.5
}

impl Default for Waveform {
    fn default() -> Self {
        Self::full()
    }
}

impl Waveform {
    /// Full-intensity static waveform
    pub fn full() -> Self {
        Self::Static { intensity: 1.0 }
    }

    /// Sine modulation at `freq` Hz, full swing
    pub fn sine(freq: f64) -> Self {
        Self::Sine {
            freq,
            intensity: 1.0,
            offset: 0.5,
        }
    }

    /// Normalised amplitude (0..=1) at time `t` seconds
    pub fn amplitude(&self, t: f64) -> f64 {
        match *self {
            Self::Static { intensity } => intensity.clamp(0.0, 1.0),
            Self::Sine {
                freq,
                intensity,
                offset,
            } => (intensity / 2.0 * (2.0 * PI * freq * t).sin() + offset).clamp(0.0, 1.0),
        }
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Static { intensity } => write!(f, "Static({:.2})", intensity),
            Self::Sine { freq, .. } => write!(f, "Sine({} Hz)", freq),
        }
    }
}

/// Phase/intensity transition smoothing on the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SilencerConfig {
    /// Intensity update rate per ultrasound period
    pub step_intensity: u16,
    /// Phase update rate per ultrasound period
    pub step_phase: u16,
}

impl Default for SilencerConfig {
    fn default() -> Self {
        Self {
            step_intensity: 10,
            step_phase: 10,
        }
    }
}

impl SilencerConfig {
    /// Silencer off: updates apply immediately
    pub fn disable() -> Self {
        Self {
            step_intensity: u16::MAX,
            step_phase: u16::MAX,
        }
    }
}

/// One command sent over a link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Command {
    /// Align the devices' internal clocks
    Synchronize,
    /// Configure the silencer
    Silencer(SilencerConfig),
    /// Focus on `focus` (mm, device space) with `waveform`
    Drive { waveform: Waveform, focus: [f64; 3] },
    /// Silence output
    Stop,
    /// Request firmware versions
    ReadFirmwareInfo,
}

impl Command {
    pub fn drive(waveform: Waveform, focus: DVec3) -> Self {
        Self::Drive {
            waveform,
            focus: focus.to_array(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Synchronize => "synchronize",
            Self::Silencer(_) => "silencer",
            Self::Drive { .. } => "drive",
            Self::Stop => "stop",
            Self::ReadFirmwareInfo => "read_firmware_info",
        }
    }
}

/// A sequence-numbered command as it travels over the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub seq: u32,
    #[serde(flatten)]
    pub command: Command,
}

/// Reply from the remote end of a link
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    pub seq: u32,
    #[serde(default)]
    pub firmware: Vec<FirmwareInfo>,
}

/// Firmware versions reported by one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareInfo {
    pub idx: usize,
    pub cpu_version: String,
    pub fpga_version: String,
}

impl FirmwareInfo {
    pub fn unknown(idx: usize) -> Self {
        Self {
            idx,
            cpu_version: "unknown".to_string(),
            fpga_version: "unknown".to_string(),
        }
    }
}

impl fmt::Display for FirmwareInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: CPU = {}, FPGA = {}",
            self.idx, self.cpu_version, self.fpga_version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_amplitude() {
        let w = Waveform::full();
        assert_eq!(w.amplitude(0.0), 1.0);
        assert_eq!(w.amplitude(123.4), 1.0);
    }

    #[test]
    fn test_sine_amplitude_range() {
        let w = Waveform::sine(100.0);
        assert!((w.amplitude(0.0) - 0.5).abs() < 1e-12);
        assert!((w.amplitude(0.0025) - 1.0).abs() < 1e-9);
        assert!(w.amplitude(0.0075).abs() < 1e-9);
    }

    #[test]
    fn test_frame_wire_format() {
        let frame = Frame {
            seq: 3,
            command: Command::drive(Waveform::sine(150.0), DVec3::new(1.0, 2.0, 3.0)),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["seq"], 3);
        assert_eq!(json["cmd"], "drive");
        assert_eq!(json["waveform"]["type"], "sine");
        assert_eq!(json["focus"][2], 3.0);

        let back: Frame = serde_json::from_value(json).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn test_unit_commands_on_wire() {
        let frame = Frame {
            seq: 1,
            command: Command::Stop,
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"seq":1,"cmd":"stop"}"#);
    }

    #[test]
    fn test_ack_without_firmware() {
        let ack: Ack = serde_json::from_str(r#"{"seq":9}"#).unwrap();
        assert_eq!(ack.seq, 9);
        assert!(ack.firmware.is_empty());
    }

    #[test]
    fn test_firmware_display() {
        let info = FirmwareInfo {
            idx: 2,
            cpu_version: "v10.0.0".to_string(),
            fpga_version: "v10.0.0".to_string(),
        };
        assert_eq!(info.to_string(), "2: CPU = v10.0.0, FPGA = v10.0.0");
    }
}
