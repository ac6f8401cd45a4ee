//! Transports between the controller and the array hardware.
//!
//! A [`Link`] only moves frames and acknowledgements; focusing itself happens
//! on the other side. `NopLink` keeps everything in-process for dry runs,
//! `UdpLink` talks JSON datagrams to a remote simulator or bridge.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use super::command::{Ack, Command, FirmwareInfo, Frame};
use crate::error::LinkError;
use crate::geometry::Geometry;

/// Transport abstraction for the array controller
pub trait Link: Send {
    /// Open the transport for the given geometry
    fn open(&mut self, geometry: &Geometry) -> Result<(), LinkError>;

    /// Release the transport
    fn close(&mut self) -> Result<(), LinkError>;

    /// Push one frame without waiting for a reply
    fn send(&mut self, frame: &Frame) -> Result<(), LinkError>;

    /// Wait up to `timeout` for the acknowledgement of `seq`.
    /// Returns `Ok(false)` when the wait timed out.
    fn wait_ack(&mut self, seq: u32, timeout: Duration) -> Result<bool, LinkError>;

    /// Firmware versions of the connected devices, requested under `seq`
    fn firmware_info(
        &mut self,
        _seq: u32,
        num_devices: usize,
    ) -> Result<Vec<FirmwareInfo>, LinkError> {
        Ok((0..num_devices).map(FirmwareInfo::unknown).collect())
    }

    fn is_open(&self) -> bool;
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn open(&mut self, geometry: &Geometry) -> Result<(), LinkError> {
        (**self).open(geometry)
    }

    fn close(&mut self) -> Result<(), LinkError> {
        (**self).close()
    }

    fn send(&mut self, frame: &Frame) -> Result<(), LinkError> {
        (**self).send(frame)
    }

    fn wait_ack(&mut self, seq: u32, timeout: Duration) -> Result<bool, LinkError> {
        (**self).wait_ack(seq, timeout)
    }

    fn firmware_info(&mut self, seq: u32, num_devices: usize) -> Result<Vec<FirmwareInfo>, LinkError> {
        (**self).firmware_info(seq, num_devices)
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

/// Link selection in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    /// Discard all frames locally
    #[default]
    Nop,
    /// JSON datagrams to a remote endpoint
    Udp,
}

/// Link that acknowledges everything and drives nothing
#[derive(Debug, Default)]
pub struct NopLink {
    open: bool,
    num_devices: usize,
    frames_sent: u64,
    last_seq: Option<u32>,
}

impl NopLink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent
    }
}

impl Link for NopLink {
    fn open(&mut self, geometry: &Geometry) -> Result<(), LinkError> {
        self.open = true;
        self.num_devices = geometry.num_devices();
        tracing::info!("Nop link opened ({} devices)", self.num_devices);
        Ok(())
    }

    fn close(&mut self) -> Result<(), LinkError> {
        if self.open {
            tracing::info!("Nop link closed after {} frames", self.frames_sent);
        }
        self.open = false;
        Ok(())
    }

    fn send(&mut self, frame: &Frame) -> Result<(), LinkError> {
        if !self.open {
            return Err(LinkError::Closed);
        }
        tracing::trace!(seq = frame.seq, cmd = frame.command.name(), "nop send");
        self.frames_sent += 1;
        self.last_seq = Some(frame.seq);
        Ok(())
    }

    fn wait_ack(&mut self, seq: u32, _timeout: Duration) -> Result<bool, LinkError> {
        if !self.open {
            return Err(LinkError::Closed);
        }
        Ok(self.last_seq == Some(seq))
    }

    fn firmware_info(&mut self, seq: u32, num_devices: usize) -> Result<Vec<FirmwareInfo>, LinkError> {
        if !self.open {
            return Err(LinkError::Closed);
        }
        self.last_seq = Some(seq);
        Ok((0..num_devices)
            .map(|idx| FirmwareInfo {
                idx,
                cpu_version: "emulated".to_string(),
                fpga_version: "emulated".to_string(),
            })
            .collect())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

/// UDP link configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UdpLinkConfig {
    /// Remote simulator / bridge address
    pub remote: String,
    /// Local bind address
    pub bind: String,
    /// How long to wait for a firmware info reply (ms)
    pub firmware_timeout_ms: u64,
}

impl Default for UdpLinkConfig {
    fn default() -> Self {
        Self {
            remote: "127.0.0.1:8080".to_string(),
            bind: "0.0.0.0:0".to_string(),
            firmware_timeout_ms: 200,
        }
    }
}

/// Link sending JSON-encoded frames over UDP.
///
/// The remote end answers each frame with an [`Ack`] carrying the same
/// sequence number. Socket-level errors (e.g. ICMP port unreachable) mean the
/// remote is gone and are reported as [`LinkError::Lost`].
pub struct UdpLink {
    config: UdpLinkConfig,
    socket: Option<UdpSocket>,
}

impl UdpLink {
    pub fn new(config: &UdpLinkConfig) -> Self {
        Self {
            config: config.clone(),
            socket: None,
        }
    }

    /// Local address of the bound socket
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    fn socket(&self) -> Result<&UdpSocket, LinkError> {
        self.socket.as_ref().ok_or(LinkError::Closed)
    }

    /// Receive replies until `deadline`, returning the first matching `seq`.
    fn recv_ack(&self, seq: u32, deadline: Instant) -> Result<Option<Ack>, LinkError> {
        let socket = self.socket()?;
        let mut buf = [0u8; 65536];

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            socket
                .set_read_timeout(Some(deadline - now))
                .map_err(|e| LinkError::Lost(format!("set_read_timeout: {}", e)))?;

            match socket.recv(&mut buf) {
                Ok(size) => match serde_json::from_slice::<Ack>(&buf[..size]) {
                    Ok(ack) if ack.seq == seq => return Ok(Some(ack)),
                    Ok(ack) => {
                        tracing::trace!("Ignoring stale ack {} (waiting for {})", ack.seq, seq);
                    }
                    Err(e) => {
                        tracing::debug!("Malformed ack datagram: {}", e);
                    }
                },
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    return Ok(None);
                }
                Err(e) => return Err(LinkError::Lost(format!("receive failed: {}", e))),
            }
        }
    }
}

impl Link for UdpLink {
    fn open(&mut self, geometry: &Geometry) -> Result<(), LinkError> {
        let socket = UdpSocket::bind(&self.config.bind).map_err(|e| {
            LinkError::Open(format!("Failed to bind to {}: {}", self.config.bind, e))
        })?;
        socket.connect(&self.config.remote).map_err(|e| {
            LinkError::Open(format!("Failed to connect to {}: {}", self.config.remote, e))
        })?;

        tracing::info!(
            "UDP link opened to {} ({} devices)",
            self.config.remote,
            geometry.num_devices()
        );
        self.socket = Some(socket);
        Ok(())
    }

    fn close(&mut self) -> Result<(), LinkError> {
        if self.socket.take().is_some() {
            tracing::info!("UDP link to {} closed", self.config.remote);
        }
        Ok(())
    }

    fn send(&mut self, frame: &Frame) -> Result<(), LinkError> {
        let payload = serde_json::to_vec(frame).map_err(|e| LinkError::Encode(e.to_string()))?;
        self.socket()?
            .send(&payload)
            .map_err(|e| LinkError::Lost(format!("send to {} failed: {}", self.config.remote, e)))?;
        Ok(())
    }

    fn wait_ack(&mut self, seq: u32, timeout: Duration) -> Result<bool, LinkError> {
        Ok(self.recv_ack(seq, Instant::now() + timeout)?.is_some())
    }

    fn firmware_info(&mut self, seq: u32, num_devices: usize) -> Result<Vec<FirmwareInfo>, LinkError> {
        self.send(&Frame {
            seq,
            command: Command::ReadFirmwareInfo,
        })?;

        let deadline = Instant::now() + Duration::from_millis(self.config.firmware_timeout_ms);
        match self.recv_ack(seq, deadline)? {
            Some(ack) if !ack.firmware.is_empty() => Ok(ack.firmware),
            _ => {
                tracing::warn!("No firmware info reply from {}", self.config.remote);
                Ok((0..num_devices).map(FirmwareInfo::unknown).collect())
            }
        }
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }
}

/// Build the configured link behind a trait object
pub fn create_link(kind: LinkKind, udp: &UdpLinkConfig) -> Box<dyn Link> {
    match kind {
        LinkKind::Nop => Box::new(NopLink::new()),
        LinkKind::Udp => Box::new(UdpLink::new(udp)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::LayoutPreset;

    fn geometry() -> Geometry {
        Geometry::new(&LayoutPreset::Single.placements())
    }

    fn remote() -> (UdpSocket, UdpLinkConfig) {
        let remote = UdpSocket::bind("127.0.0.1:0").unwrap();
        remote
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let config = UdpLinkConfig {
            remote: remote.local_addr().unwrap().to_string(),
            bind: "127.0.0.1:0".to_string(),
            firmware_timeout_ms: 500,
        };
        (remote, config)
    }

    #[test]
    fn test_nop_link_acks_last_frame() {
        let mut link = NopLink::new();
        link.open(&geometry()).unwrap();
        link.send(&Frame {
            seq: 4,
            command: Command::Synchronize,
        })
        .unwrap();
        assert!(link.wait_ack(4, Duration::ZERO).unwrap());
        assert!(!link.wait_ack(5, Duration::ZERO).unwrap());
        assert_eq!(link.frames_sent(), 1);

        link.close().unwrap();
        assert!(matches!(
            link.send(&Frame {
                seq: 5,
                command: Command::Stop
            }),
            Err(LinkError::Closed)
        ));
    }

    #[test]
    fn test_udp_send_and_ack() {
        let (remote, config) = remote();
        let mut link = UdpLink::new(&config);
        link.open(&geometry()).unwrap();

        link.send(&Frame {
            seq: 1,
            command: Command::Stop,
        })
        .unwrap();

        let mut buf = [0u8; 1024];
        let (size, from) = remote.recv_from(&mut buf).unwrap();
        let frame: Frame = serde_json::from_slice(&buf[..size]).unwrap();
        assert_eq!(frame.seq, 1);
        assert_eq!(frame.command, Command::Stop);

        // A stale ack first, then the one we wait for.
        remote.send_to(br#"{"seq":0}"#, from).unwrap();
        remote.send_to(br#"{"seq":1}"#, from).unwrap();
        assert!(link.wait_ack(1, Duration::from_secs(1)).unwrap());
    }

    #[test]
    fn test_udp_ack_timeout() {
        let (_remote, config) = remote();
        let mut link = UdpLink::new(&config);
        link.open(&geometry()).unwrap();
        link.send(&Frame {
            seq: 1,
            command: Command::Synchronize,
        })
        .unwrap();

        let start = Instant::now();
        assert!(!link.wait_ack(1, Duration::from_millis(30)).unwrap());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_udp_firmware_info_reply() {
        let (remote, config) = remote();
        let mut link = UdpLink::new(&config);
        link.open(&geometry()).unwrap();

        let responder = std::thread::spawn(move || {
            let mut buf = [0u8; 1024];
            let (size, from) = remote.recv_from(&mut buf).unwrap();
            let frame: Frame = serde_json::from_slice(&buf[..size]).unwrap();
            assert_eq!(frame.command, Command::ReadFirmwareInfo);
            let ack = Ack {
                seq: frame.seq,
                firmware: vec![FirmwareInfo {
                    idx: 0,
                    cpu_version: "v10.0.1".to_string(),
                    fpga_version: "v10.0.1".to_string(),
                }],
            };
            remote
                .send_to(&serde_json::to_vec(&ack).unwrap(), from)
                .unwrap();
        });

        let info = link.firmware_info(1, 1).unwrap();
        responder.join().unwrap();
        assert_eq!(info.len(), 1);
        assert_eq!(info[0].cpu_version, "v10.0.1");
    }

    #[test]
    fn test_udp_send_before_open() {
        let mut link = UdpLink::new(&UdpLinkConfig::default());
        assert!(!link.is_open());
        assert!(matches!(
            link.send(&Frame {
                seq: 1,
                command: Command::Stop
            }),
            Err(LinkError::Closed)
        ));
    }
}
