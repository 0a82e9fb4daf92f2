//! The configuration the agent consumes: an ordered set of interface
//! records, each in exactly one relay mode, plus the JSON mock-file loader
//! used when the platform config channel is not available.

use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

use crate::core::errors::{AgentError, CodecError};

/// How DHCP on one bridge is handled.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Rewrite giaddr and relay requests to `dst` over the shared UDP
    /// socket.
    UdpRelay { dst: Ipv4Addr },
    /// Intercept on the bridge, egress upstream through `trusted`.
    Mitm { trusted: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InterfaceConfig {
    pub name: String,
    pub mode: Mode,
}

/// The active configuration: an ordered set of interfaces, unique by name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigSnapshot {
    entries: Vec<InterfaceConfig>,
}

impl ConfigSnapshot {
    /// Add a new interface; a name already present is rejected.
    pub fn create(&mut self, iface: InterfaceConfig) -> Result<(), CodecError> {
        if self.entries.iter().any(|e| e.name == iface.name) {
            return Err(CodecError::BadValue(format!(
                "interface {} is already configured",
                iface.name
            )));
        }
        self.entries.push(iface);
        Ok(())
    }

    /// Remove an interface by name.
    pub fn delete(&mut self, name: &str) -> Result<(), CodecError> {
        let before = self.entries.len();
        self.entries.retain(|e| e.name != name);
        if self.entries.len() == before {
            Err(CodecError::BadKey(format!("no configured interface {}", name)))
        } else {
            Ok(())
        }
    }

    /// Replace the mode of an existing interface: both mode fields are
    /// dropped, the provided one applied.
    pub fn set(&mut self, name: &str, mode: Mode) -> Result<(), CodecError> {
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => {
                entry.mode = mode;
                Ok(())
            }
            None => Err(CodecError::BadKey(format!("no configured interface {}", name))),
        }
    }

    /// Fetch entries, optionally narrowed to one interface name.
    pub fn get(&self, narrow_by: Option<&str>) -> Vec<&InterfaceConfig> {
        self.entries
            .iter()
            .filter(|e| narrow_by.is_none() || narrow_by == Some(e.name.as_str()))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &InterfaceConfig> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One record of the mock config file. Exactly one of the two mode fields
/// must be present.
#[derive(Debug, Deserialize)]
struct RawEntry {
    name: String,
    #[serde(rename = "dhcp-server")]
    dhcp_server: Option<String>,
    trusted: Option<String>,
}

impl TryFrom<RawEntry> for InterfaceConfig {
    type Error = CodecError;

    fn try_from(raw: RawEntry) -> Result<Self, CodecError> {
        let mode = match (raw.dhcp_server, raw.trusted) {
            (Some(dst), None) => {
                let dst = Ipv4Addr::from_str(&dst).map_err(|_| {
                    CodecError::BadValue(format!("{}: bad dhcp-server {:?}", raw.name, dst))
                })?;
                Mode::UdpRelay { dst }
            }
            (None, Some(trusted)) => Mode::Mitm { trusted },
            _ => {
                return Err(CodecError::BadValue(format!(
                    "{}: exactly one of dhcp-server and trusted must be set",
                    raw.name
                )))
            }
        };
        Ok(InterfaceConfig { name: raw.name, mode })
    }
}

/// Load a mock configuration: a JSON array of interface records.
pub fn load_mock(path: impl AsRef<Path>) -> Result<ConfigSnapshot, AgentError> {
    let text = fs::read_to_string(path)?;
    parse_mock(&text)
}

fn parse_mock(text: &str) -> Result<ConfigSnapshot, AgentError> {
    let raw: Vec<RawEntry> = serde_json::from_str(text)
        .map_err(|err| AgentError::bad_value(format!("config parse: {}", err)))?;
    let mut snapshot = ConfigSnapshot::default();
    for entry in raw {
        snapshot.create(InterfaceConfig::try_from(entry)?)?;
    }
    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay(name: &str, dst: [u8; 4]) -> InterfaceConfig {
        InterfaceConfig { name: name.to_string(), mode: Mode::UdpRelay { dst: dst.into() } }
    }

    #[test]
    fn create_rejects_duplicates() {
        let mut snap = ConfigSnapshot::default();
        snap.create(relay("br100", [10, 0, 0, 1])).unwrap();
        assert!(matches!(
            snap.create(relay("br100", [10, 0, 0, 2])),
            Err(CodecError::BadValue(_))
        ));
        assert_eq!(snap.len(), 1);
    }

    #[test]
    fn delete_by_name() {
        let mut snap = ConfigSnapshot::default();
        snap.create(relay("br100", [10, 0, 0, 1])).unwrap();
        snap.delete("br100").unwrap();
        assert!(snap.is_empty());
        assert!(matches!(snap.delete("br100"), Err(CodecError::BadKey(_))));
    }

    #[test]
    fn set_replaces_mode() {
        let mut snap = ConfigSnapshot::default();
        snap.create(relay("br100", [10, 0, 0, 1])).unwrap();
        snap.set("br100", Mode::Mitm { trusted: "eth0".to_string() }).unwrap();
        assert_eq!(
            snap.get(Some("br100"))[0].mode,
            Mode::Mitm { trusted: "eth0".to_string() }
        );
        assert!(matches!(
            snap.set("br200", Mode::Mitm { trusted: "eth0".to_string() }),
            Err(CodecError::BadKey(_))
        ));
    }

    #[test]
    fn get_narrowed() {
        let mut snap = ConfigSnapshot::default();
        snap.create(relay("br100", [10, 0, 0, 1])).unwrap();
        snap.create(relay("br200", [10, 0, 0, 2])).unwrap();
        assert_eq!(snap.get(None).len(), 2);
        let narrowed = snap.get(Some("br200"));
        assert_eq!(narrowed.len(), 1);
        assert_eq!(narrowed[0].name, "br200");
        assert!(snap.get(Some("br300")).is_empty());
    }

    #[test]
    fn mock_file_parses_both_modes() {
        let snap = parse_mock(
            r#"[
                {"name": "br100", "dhcp-server": "10.0.0.1"},
                {"name": "br200", "trusted": "eth0"}
            ]"#,
        )
        .unwrap();
        let entries: Vec<&InterfaceConfig> = snap.iter().collect();
        assert_eq!(entries[0].mode, Mode::UdpRelay { dst: Ipv4Addr::new(10, 0, 0, 1) });
        assert_eq!(entries[1].mode, Mode::Mitm { trusted: "eth0".to_string() });
    }

    #[test]
    fn mock_file_mode_exclusivity() {
        let both = r#"[{"name": "br100", "dhcp-server": "10.0.0.1", "trusted": "eth0"}]"#;
        assert!(matches!(
            parse_mock(both),
            Err(AgentError::Codec(CodecError::BadValue(_)))
        ));
        let neither = r#"[{"name": "br100"}]"#;
        assert!(matches!(
            parse_mock(neither),
            Err(AgentError::Codec(CodecError::BadValue(_)))
        ));
        let bad_addr = r#"[{"name": "br100", "dhcp-server": "10.0.0"}]"#;
        assert!(matches!(
            parse_mock(bad_addr),
            Err(AgentError::Codec(CodecError::BadValue(_)))
        ));
    }

    #[test]
    fn mock_file_rejects_garbage() {
        assert!(parse_mock("not json").is_err());
    }
}
