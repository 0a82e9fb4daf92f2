//! Bridge-side adapters: the forwarding-database lookup used for
//! circuit-id injection and the trap-rule installer used in MITM mode.
//!
//! The production FDB backend reads the Linux bridge sysfs tables. Trap
//! programming is platform ACL territory; the trait carries the contract
//! and the shipped implementation records what would be programmed.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use crate::core::errors::AgentError;
use crate::netio::frame::{DHCP_CLIENT_PORT, DHCP_SERVER_PORT};
use crate::utils::fmt::format_mac;

/// One forwarding-database entry for a client MAC.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FdbEntry {
    pub ifname: String,
    pub age: u32,
    pub is_local: bool,
}

/// Maps a client hardware address (lowercase colon-hex) to the bridge port
/// it was learned on.
pub trait FdbLookup: Send {
    fn lookup(&self, mac: &str) -> Option<FdbEntry>;
}

/// Installs and removes the ACL rules that trap DHCP to the control plane.
pub trait TrafficTap: Send {
    /// Install the trap rules for `bridge`, leaving `exclude` (the trusted
    /// port) out of the match set.
    fn install(&mut self, bridge: &str, exclude: Option<&str>) -> Result<(), AgentError>;
    /// Remove whatever `install` programmed for `bridge`.
    fn remove(&mut self, bridge: &str) -> Result<(), AgentError>;
}

/// Member ports of a bridge, with the excluded port filtered out by name.
pub fn bridge_ports(bridge: &str, exclude: Option<&str>) -> io::Result<Vec<String>> {
    ports_under(Path::new("/sys/class/net"), bridge, exclude)
}

fn ports_under(root: &Path, bridge: &str, exclude: Option<&str>) -> io::Result<Vec<String>> {
    let brif = root.join(bridge).join("brif");
    let mut ports = Vec::new();
    for entry in fs::read_dir(brif)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if Some(name.as_str()) != exclude {
            ports.push(name);
        }
    }
    ports.sort();
    Ok(ports)
}

// struct __fdb_entry: mac[6], port_no, is_local, ageing u32, port_hi,
// pad, unused u16
const FDB_ENTRY_LEN: usize = 16;

/// Parse the binary `brforward` table given the port_no -> name map.
fn parse_forward_table(
    data: &[u8],
    ports: &HashMap<u16, String>,
) -> HashMap<String, FdbEntry> {
    let mut macs = HashMap::new();
    for entry in data.chunks_exact(FDB_ENTRY_LEN) {
        let mac = format_mac(&entry[..6]);
        let port_no = entry[6] as u16 | ((entry[12] as u16) << 8);
        let is_local = entry[7] > 0;
        let age = u32::from_le_bytes([entry[8], entry[9], entry[10], entry[11]]);
        let Some(ifname) = ports.get(&port_no) else {
            log::debug!("fdb entry for {} names unknown port {}", mac, port_no);
            continue;
        };
        macs.insert(mac, FdbEntry { ifname: ifname.clone(), age, is_local });
    }
    macs
}

/// The Linux bridge forwarding database, re-read from sysfs on every
/// lookup so freshly learned clients resolve.
pub struct SysfsFdb {
    bridge: String,
}

impl SysfsFdb {
    pub fn new(bridge: impl Into<String>) -> Self {
        SysfsFdb { bridge: bridge.into() }
    }

    fn port_map(&self) -> io::Result<HashMap<u16, String>> {
        let mut map = HashMap::new();
        for port in bridge_ports(&self.bridge, None)? {
            let path = Path::new("/sys/class/net")
                .join(&self.bridge)
                .join("brif")
                .join(&port)
                .join("port_no");
            let text = fs::read_to_string(path)?;
            let text = text.trim();
            let port_no = if let Some(hex) = text.strip_prefix("0x") {
                u16::from_str_radix(hex, 16)
            } else {
                text.parse::<u16>()
            }
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "bad port_no"))?;
            map.insert(port_no, port);
        }
        Ok(map)
    }

    fn refresh(&self) -> io::Result<HashMap<String, FdbEntry>> {
        let ports = self.port_map()?;
        let data = fs::read(Path::new("/sys/class/net").join(&self.bridge).join("brforward"))?;
        Ok(parse_forward_table(&data, &ports))
    }
}

impl FdbLookup for SysfsFdb {
    fn lookup(&self, mac: &str) -> Option<FdbEntry> {
        match self.refresh() {
            Ok(macs) => macs.get(mac).cloned(),
            Err(err) => {
                log::debug!("fdb refresh failed on {}: {}", self.bridge, err);
                None
            }
        }
    }
}

/// The rule set a tap installer programs per bridge: one entry per DHCP
/// port, named after the bridge, trusted port excluded from the ports
/// match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TapRule {
    pub name: String,
    pub dst_port: u16,
    pub priority: u32,
    pub ports: Vec<String>,
}

pub fn tap_rules(bridge: &str, exclude: Option<&str>) -> io::Result<Vec<TapRule>> {
    let ports = bridge_ports(bridge, exclude)?;
    Ok(vec![
        TapRule {
            name: format!("snoop-dhcps-{}", bridge),
            dst_port: DHCP_SERVER_PORT,
            priority: 512,
            ports: ports.clone(),
        },
        TapRule {
            name: format!("snoop-dhcpc-{}", bridge),
            dst_port: DHCP_CLIENT_PORT,
            priority: 512,
            ports,
        },
    ])
}

/// Tap installer for platforms whose ACL backend is managed elsewhere:
/// computes and logs the rule set without programming anything.
pub struct NullTap;

impl TrafficTap for NullTap {
    fn install(&mut self, bridge: &str, exclude: Option<&str>) -> Result<(), AgentError> {
        match tap_rules(bridge, exclude) {
            Ok(rules) => {
                for rule in rules {
                    log::debug!(
                        "tap {} (udp dst {}, prio {}) on ports {:?}",
                        rule.name,
                        rule.dst_port,
                        rule.priority,
                        rule.ports
                    );
                }
                Ok(())
            }
            Err(err) => Err(AgentError::Io(err)),
        }
    }

    fn remove(&mut self, bridge: &str) -> Result<(), AgentError> {
        log::debug!("removing taps snoop-dhcps-{0} and snoop-dhcpc-{0}", bridge);
        Ok(())
    }
}

/// Holds installed trap rules for one bridge and removes them when the
/// owning port goes away, on every exit path. Removal failures are logged,
/// never propagated.
pub struct TapGuard {
    tap: Box<dyn TrafficTap>,
    bridge: String,
}

impl TapGuard {
    pub fn install(
        mut tap: Box<dyn TrafficTap>,
        bridge: &str,
        exclude: Option<&str>,
    ) -> Result<Self, AgentError> {
        tap.install(bridge, exclude)?;
        Ok(TapGuard { tap, bridge: bridge.to_string() })
    }
}

impl Drop for TapGuard {
    fn drop(&mut self) {
        if let Err(err) = self.tap.remove(&self.bridge) {
            log::error!("failed to remove taps on {}: {}", self.bridge, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn entry(mac: [u8; 6], port_no: u8, is_local: u8, age: u32, port_hi: u8) -> Vec<u8> {
        let mut e = Vec::with_capacity(FDB_ENTRY_LEN);
        e.extend(mac);
        e.push(port_no);
        e.push(is_local);
        e.extend(age.to_le_bytes());
        e.push(port_hi);
        e.extend([0, 0, 0]);
        e
    }

    #[test]
    fn forward_table_parsing() {
        let mut ports = HashMap::new();
        ports.insert(1u16, "veth0".to_string());
        ports.insert(0x102u16, "veth2".to_string());

        let mut data = entry([0x1e, 0x4b, 0xad, 0x91, 0x68, 0x3a], 1, 0, 17, 0);
        data.extend(entry([0x02, 0, 0, 0, 0, 1], 2, 1, 0, 1));
        data.extend(entry([0x02, 0, 0, 0, 0, 2], 9, 0, 0, 0)); // unknown port

        let macs = parse_forward_table(&data, &ports);
        assert_eq!(
            macs.get("1e:4b:ad:91:68:3a"),
            Some(&FdbEntry { ifname: "veth0".to_string(), age: 17, is_local: false })
        );
        assert_eq!(
            macs.get("02:00:00:00:00:01"),
            Some(&FdbEntry { ifname: "veth2".to_string(), age: 0, is_local: true })
        );
        assert_eq!(macs.len(), 2);
    }

    #[test]
    fn forward_table_ignores_trailing_bytes() {
        let ports = HashMap::new();
        let macs = parse_forward_table(&[1, 2, 3], &ports);
        assert!(macs.is_empty());
    }

    #[test]
    fn port_listing_excludes_trusted_by_name() {
        let root = std::env::temp_dir().join(format!("brif-test-{}", std::process::id()));
        let brif = root.join("br100").join("brif");
        for port in ["veth0", "veth1", "eth0"] {
            fs::create_dir_all(brif.join(port)).unwrap();
        }

        let all = ports_under(&root, "br100", None).unwrap();
        assert_eq!(all, vec!["eth0", "veth0", "veth1"]);
        let filtered = ports_under(&root, "br100", Some("eth0")).unwrap();
        assert_eq!(filtered, vec!["veth0", "veth1"]);

        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn port_listing_fails_on_absent_bridge() {
        assert!(bridge_ports("no-such-bridge-0", None).is_err());
    }

    #[test]
    fn sysfs_fdb_miss_on_absent_bridge() {
        let fdb = SysfsFdb::new("no-such-bridge-0");
        assert_eq!(fdb.lookup("1e:4b:ad:91:68:3a"), None);
    }

    pub(crate) struct RecordingTap {
        pub calls: Arc<Mutex<Vec<String>>>,
    }

    impl TrafficTap for RecordingTap {
        fn install(&mut self, bridge: &str, exclude: Option<&str>) -> Result<(), AgentError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("install {} exclude {:?}", bridge, exclude));
            Ok(())
        }

        fn remove(&mut self, bridge: &str) -> Result<(), AgentError> {
            self.calls.lock().unwrap().push(format!("remove {}", bridge));
            Ok(())
        }
    }

    #[test]
    fn tap_guard_removes_on_drop() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let tap = Box::new(RecordingTap { calls: calls.clone() });
        let guard = TapGuard::install(tap, "br100", Some("eth0")).unwrap();
        drop(guard);
        assert_eq!(
            *calls.lock().unwrap(),
            vec!["install br100 exclude Some(\"eth0\")".to_string(), "remove br100".to_string()]
        );
    }
}
