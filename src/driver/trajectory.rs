//! Focal point trajectories around the fingertip.
//!
//! Both trajectories trace a circle in the device XY plane; they differ in how
//! the phase and the tick length are derived.

use std::f64::consts::TAU;
use std::time::Duration;

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::timing::secs_to_duration;

/// Circular spatio-temporal modulation pattern
pub trait Trajectory: Send {
    /// Current circle radius (mm)
    fn radius(&self) -> f64;

    /// Accumulated phase (rad), never wrapped
    fn theta(&self) -> f64;

    /// `(r cos θ, r sin θ, 0)`
    fn offset(&self) -> DVec3 {
        let (s, c) = self.theta().sin_cos();
        DVec3::new(self.radius() * c, self.radius() * s, 0.0)
    }

    /// Advance one tick for the latest `height` and return the tick length.
    fn advance(&mut self, height: f64) -> Duration;
}

/// Fixed arc length per tick; the radius widens as the finger presses down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepLengthParams {
    /// Radius at or above `zero_height` (mm)
    pub zero_radius: f64,
    /// Arc length per tick (mm)
    pub step: f64,
    /// Revolutions per second
    pub stm_freq: f64,
    /// Height at which the finger is considered untouched (mm)
    pub zero_height: f64,
    /// Press depth beyond which the radius stops growing (mm)
    pub max_height_delta: f64,
    /// Radius growth per mm of press depth
    pub radius_gain: f64,
}

impl Default for StepLengthParams {
    fn default() -> Self {
        Self {
            zero_radius: 1.0,
            step: 0.2,
            stm_freq: 6.0,
            zero_height: 200.0,
            max_height_delta: 20.0,
            radius_gain: 0.25,
        }
    }
}

impl StepLengthParams {
    /// `zero_radius + clamp(zero_height − height, 0, max_height_delta) · radius_gain`
    pub fn radius_for_height(&self, height: f64) -> f64 {
        let delta = (self.zero_height - height).clamp(0.0, self.max_height_delta);
        self.zero_radius + delta * self.radius_gain
    }

    /// Ticks per revolution at `radius`, at least one
    pub fn points_per_revolution(&self, radius: f64) -> f64 {
        (TAU * radius / self.step).floor().max(1.0)
    }
}

#[derive(Debug, Clone)]
pub struct StepLength {
    params: StepLengthParams,
    radius: f64,
    theta: f64,
}

impl StepLength {
    pub fn new(params: StepLengthParams) -> Self {
        Self {
            radius: params.zero_radius,
            theta: 0.0,
            params,
        }
    }

    pub fn params(&self) -> &StepLengthParams {
        &self.params
    }
}

impl Trajectory for StepLength {
    fn radius(&self) -> f64 {
        self.radius
    }

    fn theta(&self) -> f64 {
        self.theta
    }

    fn advance(&mut self, height: f64) -> Duration {
        self.radius = self.params.radius_for_height(height);
        self.theta += self.params.step / self.radius;
        let points = self.params.points_per_revolution(self.radius);
        secs_to_duration(1.0 / self.params.stm_freq / points)
    }
}

/// Constant radius, constant angular rate and fixed tick.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixedRateParams {
    pub radius: f64,
    /// Tick length (s)
    pub time_step: f64,
    /// Revolutions per second
    pub stm_freq: f64,
}

impl Default for FixedRateParams {
    fn default() -> Self {
        Self {
            radius: 3.0,
            time_step: 0.002,
            stm_freq: 5.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FixedRate {
    params: FixedRateParams,
    theta: f64,
}

impl FixedRate {
    pub fn new(params: FixedRateParams) -> Self {
        Self { params, theta: 0.0 }
    }
}

impl Trajectory for FixedRate {
    fn radius(&self) -> f64 {
        self.params.radius
    }

    fn theta(&self) -> f64 {
        self.theta
    }

    fn advance(&mut self, _height: f64) -> Duration {
        self.theta += TAU * self.params.stm_freq * self.params.time_step;
        secs_to_duration(self.params.time_step)
    }
}

/// Trajectory selection as it appears in the config file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrajectoryConfig {
    StepLength(StepLengthParams),
    FixedRate(FixedRateParams),
}

impl TrajectoryConfig {
    pub fn build(&self) -> Box<dyn Trajectory> {
        match *self {
            Self::StepLength(p) => Box::new(StepLength::new(p)),
            Self::FixedRate(p) => Box::new(FixedRate::new(p)),
        }
    }

    pub fn stm_freq(&self) -> f64 {
        match self {
            Self::StepLength(p) => p.stm_freq,
            Self::FixedRate(p) => p.stm_freq,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untouched_finger_keeps_zero_radius() {
        let p = StepLengthParams::default();
        assert_eq!(p.radius_for_height(200.0), 1.0);
        assert_eq!(p.radius_for_height(260.0), 1.0);
    }

    #[test]
    fn test_radius_clamped_and_monotone() {
        let p = StepLengthParams::default();
        let mut last = p.radius_for_height(240.0);
        for h in (150..=240).rev() {
            let r = p.radius_for_height(h as f64);
            assert!(r >= last);
            assert!((1.0..=6.0).contains(&r));
            last = r;
        }
        assert_eq!(p.radius_for_height(190.0), 3.5);
        assert_eq!(p.radius_for_height(100.0), 6.0);
    }

    #[test]
    fn test_step_length_advance() {
        let mut t = StepLength::new(StepLengthParams::default());
        assert_eq!(t.radius(), 1.0);

        // floor(2π · 1 / 0.2) = 31 points per revolution at 6 Hz.
        let dt = t.advance(200.0);
        assert!((t.theta() - 0.2).abs() < 1e-12);
        let expected = 1.0 / 6.0 / 31.0;
        assert!((dt.as_secs_f64() - expected).abs() < 1e-9);

        let before = t.theta();
        t.advance(190.0);
        assert_eq!(t.radius(), 3.5);
        assert!((t.theta() - before - 0.2 / 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_tiny_radius_has_one_point() {
        let p = StepLengthParams {
            zero_radius: 0.01,
            ..Default::default()
        };
        assert_eq!(p.points_per_revolution(0.01), 1.0);
        let mut t = StepLength::new(p);
        let dt = t.advance(200.0);
        assert!((dt.as_secs_f64() - 1.0 / 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_fixed_rate_advance() {
        let mut t = FixedRate::new(FixedRateParams::default());
        let mut last = t.theta();
        for _ in 0..10 {
            let dt = t.advance(123.0);
            assert!((dt.as_secs_f64() - 0.002).abs() < 1e-9);
            assert!((t.theta() - last - TAU * 5.0 * 0.002).abs() < 1e-12);
            last = t.theta();
        }
        assert_eq!(t.radius(), 3.0);
    }

    #[test]
    fn test_offset_on_circle() {
        let mut t = FixedRate::new(FixedRateParams {
            radius: 2.0,
            time_step: 0.05,
            stm_freq: 5.0,
        });
        assert!((t.offset() - DVec3::new(2.0, 0.0, 0.0)).length() < 1e-12);
        // 2π · 5 · 0.05 = π/2
        t.advance(0.0);
        assert!((t.offset() - DVec3::new(0.0, 2.0, 0.0)).length() < 1e-12);
    }

    #[test]
    fn test_config_serde() {
        let cfg: TrajectoryConfig =
            toml::from_str("type = \"fixed_rate\"\nradius = 4.0\n").unwrap();
        match cfg {
            TrajectoryConfig::FixedRate(p) => {
                assert_eq!(p.radius, 4.0);
                assert_eq!(p.stm_freq, 5.0);
            }
            _ => panic!("expected fixed rate"),
        }
        assert_eq!(cfg.build().radius(), 4.0);
    }
}
