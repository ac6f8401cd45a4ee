//! Haptics array controller session
//!
//! A [`Controller`] owns one [`Link`] and the array [`Geometry`] for the
//! lifetime of a session: open, synchronize, configure the silencer, stream
//! drive commands, stop, close.

pub mod command;
pub mod link;

pub use command::{Command, FirmwareInfo, Frame, SilencerConfig, Waveform};
pub use link::{create_link, Link, LinkKind, NopLink, UdpLink, UdpLinkConfig};

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HapticsError, LinkError};
use crate::geometry::Geometry;

/// Called with a reason when the link to the hardware is lost
pub type OnLostCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Controller session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Transport to the array
    pub link: LinkKind,
    /// UDP link settings (used when `link = "udp"`)
    pub udp: UdpLinkConfig,
    /// Acknowledgement timeout used when a send passes no explicit timeout (ms)
    pub ack_timeout_ms: u64,
    /// Silencer applied right after synchronization
    pub silencer: SilencerConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            link: LinkKind::Nop,
            udp: UdpLinkConfig::default(),
            ack_timeout_ms: 20,
            silencer: SilencerConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

/// An open session with the array
pub struct Controller<L: Link> {
    link: L,
    geometry: Geometry,
    config: ControllerConfig,
    on_lost: Option<OnLostCallback>,
    seq: u32,
    is_open: bool,
    lost: bool,
}

impl<L: Link> Controller<L> {
    /// Open a session over `link` for `geometry`.
    pub fn open(
        geometry: Geometry,
        mut link: L,
        config: ControllerConfig,
        on_lost: Option<OnLostCallback>,
    ) -> Result<Self, HapticsError> {
        if geometry.is_empty() {
            return Err(HapticsError::EmptyGeometry);
        }

        link.open(&geometry)?;

        tracing::info!(
            "Controller opened: {} devices, {} transducers",
            geometry.num_devices(),
            geometry.num_transducers()
        );

        Ok(Self {
            link,
            geometry,
            config,
            on_lost,
            seq: 0,
            is_open: true,
            lost: false,
        })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    /// Align device clocks
    pub fn synchronize(&mut self) -> Result<(), HapticsError> {
        self.send(Command::Synchronize, None)
    }

    /// Apply the configured silencer
    pub fn configure_silencer(&mut self) -> Result<(), HapticsError> {
        let silencer = self.config.silencer;
        self.send(Command::Silencer(silencer), None)
    }

    /// Send `command`.
    ///
    /// `timeout` bounds the wait for the device acknowledgement; `None` uses
    /// the configured default, `Some(Duration::ZERO)` returns as soon as the
    /// frame is handed to the link.
    pub fn send(&mut self, command: Command, timeout: Option<Duration>) -> Result<(), HapticsError> {
        if !self.is_open {
            return Err(HapticsError::NotOpen);
        }

        let frame = Frame {
            seq: self.next_seq(),
            command,
        };

        if let Err(e) = self.link.send(&frame) {
            return Err(self.link_failed(e));
        }

        let timeout = timeout.unwrap_or_else(|| self.config.ack_timeout());
        if timeout.is_zero() {
            return Ok(());
        }

        match self.link.wait_ack(frame.seq, timeout) {
            Ok(true) => Ok(()),
            Ok(false) => Err(HapticsError::AckTimeout(timeout)),
            Err(e) => Err(self.link_failed(e)),
        }
    }

    /// Silence the array
    pub fn stop(&mut self) -> Result<(), HapticsError> {
        self.send(Command::Stop, None)
    }

    /// Firmware versions of every device
    pub fn firmware_info_list(&mut self) -> Result<Vec<FirmwareInfo>, HapticsError> {
        if !self.is_open {
            return Err(HapticsError::NotOpen);
        }
        let n = self.geometry.num_devices();
        let seq = self.next_seq();
        match self.link.firmware_info(seq, n) {
            Ok(info) => Ok(info),
            Err(e) => Err(self.link_failed(e)),
        }
    }

    /// Close the session and release the link.
    pub fn close(mut self) -> Result<(), HapticsError> {
        self.close_link()
    }

    fn close_link(&mut self) -> Result<(), HapticsError> {
        if !self.is_open {
            return Ok(());
        }
        self.is_open = false;
        self.link.close()?;
        tracing::info!("Controller closed");
        Ok(())
    }

    /// Every frame on the link, firmware requests included, gets its own number.
    fn next_seq(&mut self) -> u32 {
        self.seq = self.seq.wrapping_add(1);
        self.seq
    }

    /// Report a lost link to the callback once, then hand the error back.
    fn link_failed(&mut self, err: LinkError) -> HapticsError {
        if let LinkError::Lost(ref reason) = err {
            if !self.lost {
                self.lost = true;
                tracing::error!("Link lost: {}", reason);
                if let Some(on_lost) = &self.on_lost {
                    on_lost(reason);
                }
            }
        }
        err.into()
    }
}

impl<L: Link> Drop for Controller<L> {
    fn drop(&mut self) {
        if self.is_open {
            tracing::debug!("Controller dropped while open, closing link");
            if let Err(e) = self.close_link() {
                tracing::warn!("Failed to close link on drop: {}", e);
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{LinkEvent, RecordingLink};
    use super::*;
    use crate::geometry::{Geometry, LayoutPreset};
    use crate::haptics::command::Ack;
    use std::net::UdpSocket;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn open(link: RecordingLink) -> Controller<RecordingLink> {
        Controller::open(
            Geometry::new(&LayoutPreset::TiltedQuad.placements()),
            link,
            ControllerConfig::default(),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_session_lifecycle() {
        let link = RecordingLink::new();
        let mut controller = open(link.clone());

        controller.synchronize().unwrap();
        controller.configure_silencer().unwrap();
        controller.send(
            Command::drive(Waveform::full(), controller.geometry().center()),
            Some(Duration::ZERO),
        )
        .unwrap();
        controller.stop().unwrap();
        controller.close().unwrap();

        let events = link.events();
        assert_eq!(events.first(), Some(&LinkEvent::Open));
        assert_eq!(events[1], LinkEvent::Send(Command::Synchronize));
        assert!(matches!(events[2], LinkEvent::Send(Command::Silencer(_))));
        assert!(matches!(events[3], LinkEvent::Send(Command::Drive { .. })));
        assert_eq!(events[4], LinkEvent::Send(Command::Stop));
        assert_eq!(events[5], LinkEvent::Close);
        assert_eq!(events.len(), 6);
    }

    #[test]
    fn test_empty_geometry_rejected() {
        let result = Controller::open(
            Geometry::new(&[]),
            RecordingLink::new(),
            ControllerConfig::default(),
            None,
        );
        assert!(matches!(result, Err(HapticsError::EmptyGeometry)));
    }

    #[test]
    fn test_ack_timeout_only_when_waiting() {
        let link = RecordingLink::new();
        link.withhold_acks.store(true, Ordering::SeqCst);
        let mut controller = open(link.clone());

        // Zero timeout never waits, so a missing ack is not an error.
        assert!(controller.send(Command::Stop, Some(Duration::ZERO)).is_ok());
        assert!(matches!(
            controller.send(Command::Stop, None),
            Err(HapticsError::AckTimeout(_))
        ));
    }

    #[test]
    fn test_on_lost_called_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_cb = Arc::clone(&calls);
        let link = RecordingLink::new();
        let mut controller = Controller::open(
            Geometry::new(&LayoutPreset::Single.placements()),
            link.clone(),
            ControllerConfig::default(),
            Some(Box::new(move |_msg: &str| {
                calls_cb.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .unwrap();

        link.fail_lost.store(true, Ordering::SeqCst);
        assert!(matches!(
            controller.send(Command::Stop, Some(Duration::ZERO)),
            Err(HapticsError::Link(LinkError::Lost(_)))
        ));
        assert!(controller.send(Command::Stop, Some(Duration::ZERO)).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_closes_open_session() {
        let link = RecordingLink::new();
        {
            let _controller = open(link.clone());
        }
        assert_eq!(link.events().last(), Some(&LinkEvent::Close));
    }

    #[test]
    fn test_firmware_info_defaults_to_unknown() {
        let mut controller = open(RecordingLink::new());
        let info = controller.firmware_info_list().unwrap();
        assert_eq!(info.len(), 4);
        assert!(info.iter().all(|i| i.cpu_version == "unknown"));
    }

    #[test]
    fn test_firmware_request_takes_its_own_seq() {
        let link = RecordingLink::new();
        let mut controller = open(link.clone());

        controller.synchronize().unwrap();
        controller.firmware_info_list().unwrap();
        controller.configure_silencer().unwrap();
        controller.stop().unwrap();

        assert_eq!(*link.seqs.lock().unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_udp_session_never_reuses_seq() {
        let remote = UdpSocket::bind("127.0.0.1:0").unwrap();
        remote
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let config = ControllerConfig {
            link: LinkKind::Udp,
            udp: UdpLinkConfig {
                remote: remote.local_addr().unwrap().to_string(),
                bind: "127.0.0.1:0".to_string(),
                firmware_timeout_ms: 500,
            },
            ack_timeout_ms: 500,
            ..Default::default()
        };

        // Acks every frame until it sees the stop command.
        let responder = std::thread::spawn(move || {
            let mut received = Vec::new();
            let mut buf = [0u8; 2048];
            loop {
                let (size, from) = remote.recv_from(&mut buf).unwrap();
                let frame: Frame = serde_json::from_slice(&buf[..size]).unwrap();
                let ack = Ack {
                    seq: frame.seq,
                    firmware: Vec::new(),
                };
                remote
                    .send_to(&serde_json::to_vec(&ack).unwrap(), from)
                    .unwrap();
                let done = frame.command == Command::Stop;
                received.push((frame.seq, frame.command.name().to_string()));
                if done {
                    return received;
                }
            }
        });

        let link = UdpLink::new(&config.udp);
        let mut controller = Controller::open(
            Geometry::new(&LayoutPreset::Single.placements()),
            link,
            config,
            None,
        )
        .unwrap();
        controller.synchronize().unwrap();
        controller.firmware_info_list().unwrap();
        controller.stop().unwrap();
        controller.close().unwrap();

        let received = responder.join().unwrap();
        let seqs: Vec<u32> = received.iter().map(|(seq, _)| *seq).collect();
        assert_eq!(seqs, vec![1, 2, 3]);
        assert_eq!(received[1].1, Command::ReadFirmwareInfo.name());
    }
}
