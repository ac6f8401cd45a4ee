//! focaltrack - finger-tracked focal point rendering for ultrasound haptics
//!
//! Two loops cooperate in one process:
//! - a tracker turning depth camera frames into fingertip positions
//! - a driver steering the array's focal point around that fingertip
//!
//! They share nothing but a latest-wins [`mailbox`] and a [`ShutdownSignal`].

pub mod camera;
pub mod config;
pub mod driver;
pub mod error;
pub mod geometry;
pub mod haptics;
pub mod mailbox;
pub mod timing;
pub mod tracking;
pub mod viewer;

pub use config::Config;
pub use error::{FocalTrackError, Result};

use crossbeam_channel::{bounded, Receiver, Sender};

/// Cooperative shutdown flag shared by the worker loops
///
/// Every clone shares one `bounded(1)` channel that nobody receives from;
/// once a stop message sits in it, the signal stays triggered.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        Self { stop_tx, stop_rx }
    }

    /// Ask every holder of this signal to stop
    pub fn trigger(&self) {
        let _ = self.stop_tx.try_send(());
    }

    pub fn is_triggered(&self) -> bool {
        !self.stop_rx.is_empty()
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_signal_is_shared() {
        let a = ShutdownSignal::new();
        let b = a.clone();
        assert!(!b.is_triggered());
        a.trigger();
        assert!(b.is_triggered());
        // Triggering twice keeps it triggered.
        b.trigger();
        assert!(a.is_triggered());
        assert!(!ShutdownSignal::default().is_triggered());
    }
}
