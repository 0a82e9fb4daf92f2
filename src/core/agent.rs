//! The transaction-correlation state machine.
//!
//! Requests captured on a bridge open a table entry keyed by `xid`;
//! replies arriving on the shared UDP socket are matched against the table
//! and pushed back out of the bridge they came in on. Option 82 injection
//! and `giaddr` rewriting happen on the request path.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::{Duration, Instant};

use mac_address::MacAddress;
use nohash_hasher::BuildNoHashHasher;

use crate::codec::message::{Message, BOOT_REQUEST};
use crate::codec::options::{DhcpOption, Supported};
use crate::core::config::Mode;
use crate::netio::bridge::FdbEntry;

/// Seconds a transaction entry may sit without a matching reply.
pub const TIMEOUT: Duration = Duration::from_secs(300);

/// What the agent needs to know about the bridge a packet arrived on.
pub trait PortContext {
    fn id(&self) -> &str;
    fn mode(&self) -> &Mode;
    fn ipaddr(&self) -> Option<Ipv4Addr>;
    fn fdb_lookup(&self, mac: &str) -> Option<FdbEntry>;
}

struct TxnEntry {
    port: String,
    src_ip: Option<Ipv4Addr>,
    src_mac: Option<MacAddress>,
    stamp: Instant,
}

/// Where a processed packet goes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    /// Raw broadcast toward clients on the origin bridge.
    Client,
    /// Datagram to the configured server over the shared UDP socket.
    UdpRelay { dst: Ipv4Addr },
    /// Raw frame out of the origin bridge's trusted port.
    Mitm,
}

/// A packed packet ready to leave, with the frame overrides to apply.
pub struct Emission {
    pub payload: Vec<u8>,
    pub port: String,
    pub src_ip: Option<Ipv4Addr>,
    pub src_mac: Option<MacAddress>,
    pub action: Action,
}

pub struct Agent {
    state: HashMap<u32, TxnEntry, BuildNoHashHasher<u32>>,
    supported: Supported,
}

impl Agent {
    pub fn new() -> Self {
        Agent { state: HashMap::default(), supported: Supported::builtin() }
    }

    /// Number of transactions awaiting a reply.
    pub fn pending(&self) -> usize {
        self.state.len()
    }

    /// Process one packet. `port` is the bridge it was captured on, absent
    /// for datagrams read off the shared UDP socket. Returns nothing when
    /// the packet is dropped.
    pub fn process(
        &mut self,
        payload: &[u8],
        port: Option<&dyn PortContext>,
        src_ip: Option<Ipv4Addr>,
        src_mac: Option<MacAddress>,
    ) -> Option<Emission> {
        self.process_at(payload, port, src_ip, src_mac, Instant::now())
    }

    pub fn process_at(
        &mut self,
        payload: &[u8],
        port: Option<&dyn PortContext>,
        src_ip: Option<Ipv4Addr>,
        src_mac: Option<MacAddress>,
        now: Instant,
    ) -> Option<Emission> {
        log::debug!("processing dhcp packet");
        let mut parsed = match Message::unpack(payload) {
            Ok(parsed) => parsed,
            Err(err) => {
                log::error!("failed to parse dhcp packet: {}", err);
                return None;
            }
        };
        let op = parsed.op()?;
        let xid = parsed.xid()?;

        let Some(port) = port else {
            // off the udp socket: replies only, correlated by xid
            if op == BOOT_REQUEST {
                log::debug!("spurious udp read");
                return None;
            }
            let Some(entry) = self.state.remove(&xid) else {
                log::debug!("no matching state entry for {:x}", xid);
                return None;
            };
            parsed.set_giaddr("0.0.0.0").ok()?;
            let payload = self.repack(&parsed)?;
            // overrides cleared so the emit path fills in the port's own
            // addresses
            return Some(Emission {
                payload,
                port: entry.port,
                src_ip: None,
                src_mac: None,
                action: Action::Client,
            });
        };

        let mut action = Action::Client;
        if op == BOOT_REQUEST {
            self.state.insert(
                xid,
                TxnEntry { port: port.id().to_string(), src_ip, src_mac, stamp: now },
            );
            let found = parsed.chaddr().map(str::to_string).and_then(|mac| port.fdb_lookup(&mac));
            match found {
                Some(found) => {
                    log::debug!("looked up source port as {}", found.ifname);
                    let circuit = DhcpOption::circuit_id(found.ifname);
                    if let Err(err) =
                        parsed.encode_options(&[circuit], Some(&self.supported), true)
                    {
                        log::error!("failed to append relay agent information: {}", err);
                    }
                }
                None => log::error!("failed to lookup port"),
            }
            match port.mode() {
                Mode::UdpRelay { dst } => {
                    let Some(addr) = port.ipaddr() else {
                        log::warn!("no ipv4 address on {}, cannot relay", port.id());
                        return None;
                    };
                    parsed.set_giaddr(&addr.to_string()).ok()?;
                    action = Action::UdpRelay { dst: *dst };
                }
                Mode::Mitm { .. } => action = Action::Mitm,
            }
        }
        let payload = self.repack(&parsed)?;
        Some(Emission { payload, port: port.id().to_string(), src_ip, src_mac, action })
    }

    fn repack(&self, parsed: &Message) -> Option<Vec<u8>> {
        match parsed.pack() {
            Ok(payload) => Some(payload),
            Err(err) => {
                log::error!("failed to pack dhcp packet: {}", err);
                None
            }
        }
    }

    /// Drop every transaction entry older than [`TIMEOUT`].
    pub fn run_expiry(&mut self) {
        self.expire_at(Instant::now());
    }

    pub fn expire_at(&mut self, now: Instant) {
        self.state.retain(|xid, entry| {
            let keep = now.duration_since(entry.stamp) <= TIMEOUT;
            if !keep {
                log::debug!("deleting xid {:x}", xid);
            }
            keep
        });
    }
}

impl Default for Agent {
    fn default() -> Self {
        Agent::new()
    }
}
