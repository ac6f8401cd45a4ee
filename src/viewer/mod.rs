//! Geometry viewer
//!
//! Shows a device layout either in a native window (`native-ui` feature) or
//! as a plain-text device table.

#[cfg(feature = "native-ui")]
mod app;

#[cfg(feature = "native-ui")]
pub use app::GeometryViewerApp;

use std::fmt::Write as _;

use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};

use crate::error::FocalTrackError;
use crate::geometry::{Geometry, LayoutPreset};

/// Viewer window settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    /// Layout shown by the `geometry` subcommand
    pub preset: LayoutPreset,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            vsync: true,
            preset: LayoutPreset::ViewerGrid,
        }
    }
}

/// Plane the layout is projected onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Projection {
    /// Looking down the Z axis
    #[default]
    Top,
    /// Looking along the Y axis
    Front,
    /// Looking along the X axis
    Side,
}

impl Projection {
    pub const ALL: [Projection; 3] = [Projection::Top, Projection::Front, Projection::Side];

    pub fn project(&self, p: DVec3) -> DVec2 {
        match self {
            Self::Top => DVec2::new(p.x, p.y),
            Self::Front => DVec2::new(p.x, p.z),
            Self::Side => DVec2::new(p.y, p.z),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Top => "Top (XY)",
            Self::Front => "Front (XZ)",
            Self::Side => "Side (YZ)",
        }
    }
}

/// Maps projected millimetres onto a screen rectangle, Y up, aspect preserved.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewTransform {
    scale: f64,
    /// Screen position of the projected origin
    origin: DVec2,
    height: f64,
}

impl ViewTransform {
    /// Fit `geometry` into a `width` × `height` screen area with `margin` pixels to spare.
    pub fn fit(geometry: &Geometry, projection: Projection, size: DVec2, margin: f64) -> Self {
        let mut lo = DVec2::splat(f64::MAX);
        let mut hi = DVec2::splat(f64::MIN);
        for device in geometry.devices() {
            for c in device.corners() {
                let p = projection.project(c);
                lo = lo.min(p);
                hi = hi.max(p);
            }
        }
        if geometry.is_empty() {
            lo = DVec2::ZERO;
            hi = DVec2::ONE;
        }

        let extent = (hi - lo).max(DVec2::splat(1.0));
        let usable = (size - DVec2::splat(2.0 * margin)).max(DVec2::splat(1.0));
        let scale = (usable.x / extent.x).min(usable.y / extent.y);
        let centre = (lo + hi) / 2.0;

        Self {
            scale,
            origin: size / 2.0 - DVec2::new(centre.x, -centre.y) * scale,
            height: size.y,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Screen coordinates (Y down) of projected point `p`
    pub fn to_screen(&self, p: DVec2) -> DVec2 {
        DVec2::new(self.origin.x + p.x * self.scale, self.origin.y - p.y * self.scale)
    }

    pub fn height(&self) -> f64 {
        self.height
    }
}

/// Plain-text table of the devices in `geometry`
pub fn device_table(geometry: &Geometry) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>3}  {:>26}  {:>26}  {:>24}  {:>5}",
        "dev", "origin (mm)", "centre (mm)", "normal", "trans"
    );
    for d in geometry.devices() {
        let _ = writeln!(
            out,
            "{:>3}  {:>26}  {:>26}  {:>24}  {:>5}",
            d.idx(),
            fmt_vec(d.position(), 1),
            fmt_vec(d.center(), 1),
            fmt_vec(d.axial_direction(), 3),
            d.transducers().len()
        );
    }
    let _ = writeln!(
        out,
        "{} devices, {} transducers, centre {}",
        geometry.num_devices(),
        geometry.num_transducers(),
        fmt_vec(geometry.center(), 1)
    );
    if let Some((lo, hi)) = geometry.bounds() {
        let _ = writeln!(out, "bounds {} .. {}", fmt_vec(lo, 1), fmt_vec(hi, 1));
    }
    out
}

fn fmt_vec(v: DVec3, precision: usize) -> String {
    format!(
        "({:.p$}, {:.p$}, {:.p$})",
        v.x,
        v.y,
        v.z,
        p = precision
    )
}

/// Builder-style geometry viewer
#[derive(Debug, Clone)]
pub struct GeometryViewer {
    width: u32,
    height: u32,
    vsync: bool,
    headless: bool,
}

impl Default for GeometryViewer {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            vsync: true,
            headless: false,
        }
    }
}

impl GeometryViewer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &ViewerConfig) -> Self {
        Self::new()
            .window_size(config.width, config.height)
            .vsync(config.vsync)
    }

    pub fn window_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }

    /// Print the device table instead of opening a window
    pub fn headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn is_vsync(&self) -> bool {
        self.vsync
    }

    /// Show `geometry`. Blocks until the window is closed.
    pub fn view(&self, geometry: &Geometry) -> Result<(), FocalTrackError> {
        if geometry.is_empty() {
            return Err(FocalTrackError::Viewer("geometry has no devices".to_string()));
        }

        #[cfg(feature = "native-ui")]
        if !self.headless {
            tracing::info!(
                "Opening geometry viewer ({}x{}, vsync {})",
                self.width,
                self.height,
                self.vsync
            );
            return GeometryViewerApp::run(geometry.clone(), self.width, self.height, self.vsync)
                .map_err(|e| FocalTrackError::Viewer(e.to_string()));
        }

        #[cfg(not(feature = "native-ui"))]
        if !self.headless {
            tracing::warn!("Built without native-ui, printing the layout instead");
        }

        print!("{}", device_table(geometry));
        Ok(())
    }
}
