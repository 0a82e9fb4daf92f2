//! One [`PacketPort`] per configured bridge: the capture socket, the
//! optional trusted-port socket and trap rules (MITM mode), the interface
//! address cache and the raw send paths.

use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;

use mac_address::{mac_address_by_name, MacAddress};
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::agent::PortContext;
use crate::core::config::{InterfaceConfig, Mode};
use crate::core::errors::AgentError;
use crate::netio::bridge::{FdbEntry, FdbLookup, NullTap, SysfsFdb, TapGuard, TrafficTap};
use crate::netio::capture::{interface_ipv4, PacketSocket};
use crate::netio::frame::{self, Direction};
use crate::utils::fmt::{format_ip, format_mac};

/// A frame captured on a bridge, already stripped to its DHCP payload.
#[derive(Debug)]
pub struct PortEvent {
    pub port: String,
    pub payload: Vec<u8>,
    pub src_ip: Ipv4Addr,
    pub src_mac: MacAddress,
}

/// Factory for the per-bridge platform adapters a port owns.
pub trait PortAdapters: Send {
    fn tap(&self, bridge: &str) -> Box<dyn TrafficTap>;
    fn fdb(&self, bridge: &str) -> Box<dyn FdbLookup>;
}

/// Default adapters: sysfs forwarding database, logging tap installer.
pub struct SysAdapters;

impl PortAdapters for SysAdapters {
    fn tap(&self, _bridge: &str) -> Box<dyn TrafficTap> {
        Box::new(NullTap)
    }

    fn fdb(&self, bridge: &str) -> Box<dyn FdbLookup> {
        Box::new(SysfsFdb::new(bridge))
    }
}

/// The capture socket registered with the readiness multiplexer.
struct CaptureIo {
    fd: AsyncFd<PacketSocket>,
}

impl CaptureIo {
    fn open(name: &str) -> io::Result<Self> {
        Ok(CaptureIo { fd: AsyncFd::new(PacketSocket::capture(name)?)? })
    }

    /// Read the next DHCP payload. `Ok(None)` once the socket is drained;
    /// frames the parser rejects are skipped.
    fn recv(&self) -> io::Result<Option<(Vec<u8>, Ipv4Addr, MacAddress)>> {
        let mut buf = [0u8; 2048];
        loop {
            match self.fd.get_ref().recv(&mut buf) {
                Ok(len) => {
                    if let Some(parsed) = frame::parse(&buf[..len]) {
                        return Ok(Some(parsed));
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(err) => return Err(err),
            }
        }
    }

    fn send(&self, frame: &[u8]) -> Result<(), AgentError> {
        match self.fd.get_ref().send(frame) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Err(AgentError::Timeout),
            Err(err) => Err(AgentError::Io(err)),
        }
    }
}

/// Drain the capture socket whenever it turns readable, forwarding frames
/// to the dispatcher until the port is closed.
async fn pump(io: Arc<CaptureIo>, port: String, tx: mpsc::Sender<PortEvent>) {
    loop {
        let mut guard = match io.fd.readable().await {
            Ok(guard) => guard,
            Err(err) => {
                log::error!("capture wait failed on {}: {}", port, err);
                return;
            }
        };
        loop {
            match io.recv() {
                Ok(Some((payload, src_ip, src_mac))) => {
                    let event = PortEvent { port: port.clone(), payload, src_ip, src_mac };
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
                Ok(None) => {
                    guard.clear_ready();
                    break;
                }
                Err(err) => {
                    log::error!("capture read failed on {}: {}", port, err);
                    guard.clear_ready();
                    break;
                }
            }
        }
    }
}

pub struct PacketPort {
    name: String,
    mode: Mode,
    ipaddr: Option<Ipv4Addr>,
    mac: MacAddress,
    // declared before the sockets so trap rules are removed first
    _taps: Option<TapGuard>,
    io: Arc<CaptureIo>,
    trusted: Option<PacketSocket>,
    fdb: Box<dyn FdbLookup>,
    reader: Option<JoinHandle<()>>,
}

impl PacketPort {
    /// Acquire everything the mode calls for. Failing anywhere releases
    /// what was already acquired.
    pub fn open(cfg: &InterfaceConfig, adapters: &dyn PortAdapters) -> Result<Self, AgentError> {
        let io = Arc::new(CaptureIo::open(&cfg.name)?);
        let mac = mac_address_by_name(&cfg.name)
            .map_err(|err| {
                AgentError::Io(io::Error::new(io::ErrorKind::Other, err.to_string()))
            })?
            .ok_or_else(|| {
                AgentError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("no hardware address on {}", cfg.name),
                ))
            })?;
        let ipaddr = interface_ipv4(&cfg.name);
        let (trusted, taps) = match &cfg.mode {
            Mode::Mitm { trusted } => {
                let sock = PacketSocket::transmit(trusted)?;
                let guard =
                    TapGuard::install(adapters.tap(&cfg.name), &cfg.name, Some(trusted))?;
                (Some(sock), Some(guard))
            }
            Mode::UdpRelay { .. } => (None, None),
        };
        log::debug!("instantiated packet port for {}", cfg.name);
        Ok(PacketPort {
            name: cfg.name.clone(),
            mode: cfg.mode.clone(),
            ipaddr,
            mac,
            _taps: taps,
            io,
            trusted,
            fdb: adapters.fdb(&cfg.name),
            reader: None,
        })
    }

    /// Start the reader pump feeding `tx`.
    pub fn spawn_reader(&mut self, tx: mpsc::Sender<PortEvent>) {
        self.reader = Some(tokio::spawn(pump(self.io.clone(), self.name.clone(), tx)));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Read the next captured DHCP payload, non-blocking.
    pub fn recv(&self) -> io::Result<Option<(Vec<u8>, Ipv4Addr, MacAddress)>> {
        self.io.recv()
    }

    /// Broadcast toward clients on this bridge, sport 67 dport 68. Absent
    /// overrides fall back to the interface addresses.
    pub fn send_client(
        &self,
        payload: &[u8],
        src_ip: Option<Ipv4Addr>,
        src_mac: Option<MacAddress>,
    ) -> Result<(), AgentError> {
        let ip = src_ip.or(self.ipaddr).unwrap_or(Ipv4Addr::UNSPECIFIED);
        let mac = src_mac.unwrap_or(self.mac);
        log::debug!(
            "raw socket to client on {} using {}/{}",
            self.name,
            format_ip(&ip.octets()),
            format_mac(&mac.bytes())
        );
        self.io.send(&frame::build(payload, ip, mac, Direction::ToClient))
    }

    /// Send toward the upstream server through the trusted port, sport 68
    /// dport 67. MITM mode only.
    pub fn send_upstream(
        &self,
        payload: &[u8],
        src_ip: Option<Ipv4Addr>,
        src_mac: Option<MacAddress>,
    ) -> Result<(), AgentError> {
        let Some(trusted) = &self.trusted else {
            return Err(AgentError::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("{} has no trusted port socket", self.name),
            )));
        };
        let ip = src_ip.or(self.ipaddr).unwrap_or(Ipv4Addr::UNSPECIFIED);
        let mac = src_mac.unwrap_or(self.mac);
        log::debug!(
            "raw socket to server on {} using {}/{}",
            self.name,
            format_ip(&ip.octets()),
            format_mac(&mac.bytes())
        );
        match trusted.send(&frame::build(payload, ip, mac, Direction::ToServer)) {
            Ok(_) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => Err(AgentError::Timeout),
            Err(err) => Err(AgentError::Io(err)),
        }
    }

    /// Release the pump, trap rules and sockets.
    pub fn close(self) {
        log::debug!("closing packet port {}", self.name);
    }
}

impl Drop for PacketPort {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

impl PortContext for PacketPort {
    fn id(&self) -> &str {
        &self.name
    }

    fn mode(&self) -> &Mode {
        &self.mode
    }

    fn ipaddr(&self) -> Option<Ipv4Addr> {
        self.ipaddr
    }

    fn fdb_lookup(&self, mac: &str) -> Option<FdbEntry> {
        self.fdb.lookup(mac)
    }
}
