//! DHCP options: the trailer value type, the registry of supported
//! options and the built-in per-tag codecs.
//!
//! The trailer itself only knows Pad/End framing and TLV records. Giving a
//! record a meaning is the registry's job: [`Supported`] maps option names
//! to tags and applies a per-tag codec, falling back to plain TLV with a
//! colon-hex value, and finally to passing the item through untouched.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use enum_iterator::{all, Sequence};

use crate::codec::value::{
    latin1_bytes, latin1_text, EnumT, HexStringT, IPv4T, IntT, RawOption, Value, ValueType,
};
use crate::core::errors::CodecError;

pub const TAG_PAD: u8 = 0;
pub const TAG_END: u8 = 255;

/// The options trailer as a field type: a sequence of [`RawOption`]
/// records, canonically terminated by exactly one End.
pub struct OptionsT;

impl ValueType for OptionsT {
    fn canonicalize(&self, val: &Value) -> Result<Value, CodecError> {
        let Value::Options(records) = val else {
            return Err(CodecError::BadType(format!("expected options, got {:?}", val)));
        };
        let mut canonical = Vec::with_capacity(records.len() + 1);
        for record in records {
            let record = match record {
                RawOption::Pad => RawOption::Pad,
                RawOption::End => continue,
                RawOption::Tlv { tag: TAG_PAD, .. } => RawOption::Pad,
                RawOption::Tlv { tag: TAG_END, .. } => continue,
                RawOption::Tlv { tag, length, value } => {
                    if *length as usize != value.len() {
                        return Err(CodecError::BadValue(format!(
                            "option {} claims {} octets, carries {}",
                            tag,
                            length,
                            value.len()
                        )));
                    }
                    record.clone()
                }
            };
            canonical.push(record);
        }
        canonical.push(RawOption::End);
        Ok(Value::Options(canonical))
    }

    fn pack(&self, val: &Value) -> Result<Vec<u8>, CodecError> {
        let Value::Options(records) = val else {
            return Err(CodecError::BadType(format!("expected options, got {:?}", val)));
        };
        let mut octets = Vec::new();
        for record in records {
            match record {
                RawOption::Pad => octets.push(TAG_PAD),
                RawOption::End => octets.push(TAG_END),
                RawOption::Tlv { tag, length, value } => {
                    octets.push(*tag);
                    octets.push(*length);
                    octets.extend_from_slice(value);
                }
            }
        }
        Ok(octets)
    }

    fn unpack<'a>(&self, octets: &'a [u8]) -> Result<(Value, &'a [u8]), CodecError> {
        let mut records = Vec::new();
        let mut rest = octets;
        while let Some((&tag, tail)) = rest.split_first() {
            rest = tail;
            match tag {
                TAG_PAD => records.push(RawOption::Pad),
                TAG_END => {
                    records.push(RawOption::End);
                    break;
                }
                tag => {
                    let Some((&length, tail)) = rest.split_first() else {
                        return Err(CodecError::Short { needed: 1, have: 0 });
                    };
                    rest = tail;
                    if rest.len() < length as usize {
                        return Err(CodecError::Short {
                            needed: length as usize,
                            have: rest.len(),
                        });
                    }
                    let (value, tail) = rest.split_at(length as usize);
                    rest = tail;
                    records.push(RawOption::Tlv { tag, length, value: value.to_vec() });
                }
            }
        }
        Ok((Value::Options(records), rest))
    }
}

/// An option as seen above the trailer: still raw, a lexical TLV with a
/// colon-hex value, or fully decoded with a name and canonical value.
#[derive(Clone, Debug, PartialEq)]
pub enum DhcpOption {
    Raw(RawOption),
    Hex { tag: u8, length: u8, value: String },
    Named { option: String, value: Option<Value> },
}

impl DhcpOption {
    pub fn named(option: impl Into<String>, value: Value) -> Self {
        DhcpOption::Named { option: option.into(), value: Some(value) }
    }

    /// A Relay Agent Information option carrying a single circuit-id.
    pub fn circuit_id(ifname: impl Into<String>) -> Self {
        let mut map = BTreeMap::new();
        map.insert("circuit-id".to_string(), Value::text(ifname.into()));
        DhcpOption::named(RELAY_AGENT_INFORMATION, Value::Map(map))
    }
}

/// One registered option implementation.
pub trait OptionDef: Send + Sync {
    fn name(&self) -> &'static str;
    fn tag(&self) -> u8;
    fn fixed_length(&self) -> Option<u8> {
        None
    }
    fn carries_value(&self) -> bool {
        true
    }
    fn encode_value(&self, val: &Value) -> Result<Vec<u8>, CodecError>;
    fn decode_value(&self, octets: &[u8]) -> Result<Value, CodecError>;

    /// Encode a named option into a raw trailer record.
    fn encode(&self, value: Option<&Value>) -> Result<RawOption, CodecError> {
        if !self.carries_value() {
            return Ok(match self.tag() {
                TAG_PAD => RawOption::Pad,
                TAG_END => RawOption::End,
                tag => RawOption::tlv(tag, Vec::new()),
            });
        }
        let value = value
            .ok_or_else(|| CodecError::Missing(format!("value for option {}", self.name())))?;
        let octets = self.encode_value(value)?;
        if octets.len() > 255 {
            return Err(CodecError::BadValue(format!(
                "option {} value of {} octets",
                self.name(),
                octets.len()
            )));
        }
        Ok(RawOption::tlv(self.tag(), octets))
    }

    /// Decode a raw trailer record into a named option.
    fn decode(&self, raw: &RawOption) -> Result<DhcpOption, CodecError> {
        match raw {
            RawOption::Pad | RawOption::End
                if !self.carries_value() && raw.tag() == self.tag() =>
            {
                Ok(DhcpOption::Named { option: self.name().to_string(), value: None })
            }
            RawOption::Tlv { tag, length, value } if self.carries_value() && *tag == self.tag() => {
                if let Some(fixed) = self.fixed_length() {
                    if *length != fixed {
                        return Err(CodecError::BadValue(format!(
                            "option {} expects {} octets, got {}",
                            self.name(),
                            fixed,
                            length
                        )));
                    }
                }
                if *length as usize != value.len() {
                    return Err(CodecError::BadValue(format!(
                        "option {} claims {} octets, carries {}",
                        self.name(),
                        length,
                        value.len()
                    )));
                }
                let decoded = self.decode_value(value)?;
                Ok(DhcpOption::Named { option: self.name().to_string(), value: Some(decoded) })
            }
            _ => Err(CodecError::BadValue(format!(
                "record does not match option {}",
                self.name()
            ))),
        }
    }
}

/// Pad and End carry no value.
struct TagOnly {
    name: &'static str,
    tag: u8,
}

impl OptionDef for TagOnly {
    fn name(&self) -> &'static str {
        self.name
    }

    fn tag(&self) -> u8 {
        self.tag
    }

    fn carries_value(&self) -> bool {
        false
    }

    fn encode_value(&self, _val: &Value) -> Result<Vec<u8>, CodecError> {
        Err(CodecError::BadValue(format!("option {} carries no value", self.name)))
    }

    fn decode_value(&self, _octets: &[u8]) -> Result<Value, CodecError> {
        Err(CodecError::BadValue(format!("option {} carries no value", self.name)))
    }
}

/// A TLV option whose value is a single field-typed value.
struct TypedOption {
    name: &'static str,
    tag: u8,
    length: Option<u8>,
    vtype: Box<dyn ValueType>,
}

impl OptionDef for TypedOption {
    fn name(&self) -> &'static str {
        self.name
    }

    fn tag(&self) -> u8 {
        self.tag
    }

    fn fixed_length(&self) -> Option<u8> {
        self.length
    }

    fn encode_value(&self, val: &Value) -> Result<Vec<u8>, CodecError> {
        let encoded = self.vtype.encode(val)?;
        self.vtype.pack(&encoded)
    }

    fn decode_value(&self, octets: &[u8]) -> Result<Value, CodecError> {
        let (raw, rest) = self.vtype.unpack(octets)?;
        if !rest.is_empty() {
            return Err(CodecError::BadValue(format!(
                "option {} has {} trailing octets",
                self.name,
                rest.len()
            )));
        }
        self.vtype.decode(&raw)
    }
}

/// Host Name: a latin-1 string of whatever length fits a TLV.
struct HostNameOpt;

impl OptionDef for HostNameOpt {
    fn name(&self) -> &'static str {
        HOST_NAME
    }

    fn tag(&self) -> u8 {
        12
    }

    fn encode_value(&self, val: &Value) -> Result<Vec<u8>, CodecError> {
        match val {
            Value::Text(s) => latin1_bytes(s),
            other => Err(CodecError::BadType(format!("host name from {:?}", other))),
        }
    }

    fn decode_value(&self, octets: &[u8]) -> Result<Value, CodecError> {
        Ok(Value::Text(latin1_text(octets)))
    }
}

/// Parameter Request List: one tag octet per requested option, at least one.
struct ParameterRequestListOpt;

impl OptionDef for ParameterRequestListOpt {
    fn name(&self) -> &'static str {
        PARAMETER_REQUEST_LIST
    }

    fn tag(&self) -> u8 {
        55
    }

    fn encode_value(&self, val: &Value) -> Result<Vec<u8>, CodecError> {
        let Value::List(items) = val else {
            return Err(CodecError::BadType(format!("parameter list from {:?}", val)));
        };
        items
            .iter()
            .map(|item| match item {
                Value::Int(v) if (0..=255).contains(v) => Ok(*v as u8),
                other => Err(CodecError::BadValue(format!("parameter tag {:?}", other))),
            })
            .collect()
    }

    fn decode_value(&self, octets: &[u8]) -> Result<Value, CodecError> {
        if octets.is_empty() {
            return Err(CodecError::BadValue("empty parameter request list".to_string()));
        }
        Ok(Value::List(octets.iter().map(|&b| Value::Int(b as i64)).collect()))
    }
}

const SUBTAG_CIRCUIT_ID: u8 = 1;
const SUBTAG_REMOTE_ID: u8 = 2;

/// Relay Agent Information (RFC 3046): a sub-TLV map over circuit-id and
/// remote-id, emitted in ascending sub-tag order.
struct RelayAgentInformationOpt;

impl RelayAgentInformationOpt {
    fn subtag(key: &str) -> Option<u8> {
        match key {
            "circuit-id" => Some(SUBTAG_CIRCUIT_ID),
            "remote-id" => Some(SUBTAG_REMOTE_ID),
            _ => None,
        }
    }

    fn subname(tag: u8) -> Option<&'static str> {
        match tag {
            SUBTAG_CIRCUIT_ID => Some("circuit-id"),
            SUBTAG_REMOTE_ID => Some("remote-id"),
            _ => None,
        }
    }
}

impl OptionDef for RelayAgentInformationOpt {
    fn name(&self) -> &'static str {
        RELAY_AGENT_INFORMATION
    }

    fn tag(&self) -> u8 {
        82
    }

    fn encode_value(&self, val: &Value) -> Result<Vec<u8>, CodecError> {
        let Value::Map(map) = val else {
            return Err(CodecError::BadType(format!("relay agent info from {:?}", val)));
        };
        let mut subs = Vec::with_capacity(map.len());
        for (key, value) in map {
            let tag = Self::subtag(key)
                .ok_or_else(|| CodecError::BadKey(format!("unknown sub-option {:?}", key)))?;
            let Value::Text(text) = value else {
                return Err(CodecError::BadType(format!("sub-option {} from {:?}", key, value)));
            };
            let octets = latin1_bytes(text)?;
            if octets.len() > 255 {
                return Err(CodecError::BadValue(format!(
                    "sub-option {} value of {} octets",
                    key,
                    octets.len()
                )));
            }
            subs.push((tag, octets));
        }
        subs.sort_by_key(|(tag, _)| *tag);
        let mut octets = Vec::new();
        for (tag, value) in subs {
            octets.push(tag);
            octets.push(value.len() as u8);
            octets.extend(value);
        }
        Ok(octets)
    }

    fn decode_value(&self, octets: &[u8]) -> Result<Value, CodecError> {
        if octets.len() < 2 {
            return Err(CodecError::Short { needed: 2, have: octets.len() });
        }
        let mut map = BTreeMap::new();
        let mut rest = octets;
        while let Some((&tag, tail)) = rest.split_first() {
            let Some((&length, tail)) = tail.split_first() else {
                return Err(CodecError::Short { needed: 1, have: 0 });
            };
            if tail.len() < length as usize {
                return Err(CodecError::Short { needed: length as usize, have: tail.len() });
            }
            let key = Self::subname(tag)
                .ok_or_else(|| CodecError::BadKey(format!("unknown sub-option tag {}", tag)))?;
            let (value, tail) = tail.split_at(length as usize);
            // duplicate sub-tags: last value wins
            map.insert(key.to_string(), Value::Text(latin1_text(value)));
            rest = tail;
        }
        Ok(Value::Map(map))
    }
}

/// DHCP message types, RFC 2132 section 9.6.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Sequence)]
pub enum MessageKind {
    Discover,
    Offer,
    Request,
    Decline,
    Ack,
    Nak,
    Release,
    Inform,
}

impl MessageKind {
    pub fn code(self) -> i64 {
        match self {
            MessageKind::Discover => 1,
            MessageKind::Offer => 2,
            MessageKind::Request => 3,
            MessageKind::Decline => 4,
            MessageKind::Ack => 5,
            MessageKind::Nak => 6,
            MessageKind::Release => 7,
            MessageKind::Inform => 8,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            MessageKind::Discover => "DISCOVER",
            MessageKind::Offer => "OFFER",
            MessageKind::Request => "REQUEST",
            MessageKind::Decline => "DECLINE",
            MessageKind::Ack => "ACK",
            MessageKind::Nak => "NAK",
            MessageKind::Release => "RELEASE",
            MessageKind::Inform => "INFORM",
        }
    }
}

fn message_type_enum() -> EnumT {
    EnumT::new(
        IntT::u8_range(1, 8),
        all::<MessageKind>().map(|kind| (kind.code(), kind.label())).collect(),
    )
}

pub const PAD: &str = "Pad";
pub const END: &str = "End";
pub const SUBNET_MASK: &str = "Subnet Mask";
pub const TIME_OFFSET: &str = "Time Offset";
pub const HOST_NAME: &str = "Host Name";
pub const REQUESTED_IP_ADDRESS: &str = "Requested IP Address";
pub const DHCP_MESSAGE_TYPE: &str = "DHCP Message Type";
pub const PARAMETER_REQUEST_LIST: &str = "Parameter Request List";
pub const RELAY_AGENT_INFORMATION: &str = "Relay Agent Information";

/// A set of supported options, keyed both ways.
pub struct Supported {
    by_name: HashMap<&'static str, Arc<dyn OptionDef>>,
    by_tag: HashMap<u8, Arc<dyn OptionDef>>,
}

impl Supported {
    /// No options registered: every transform degrades to the TLV path.
    pub fn empty() -> Self {
        Supported { by_name: HashMap::new(), by_tag: HashMap::new() }
    }

    /// The built-in option set, registered once at startup.
    pub fn builtin() -> Self {
        let mut supported = Supported::empty();
        for def in builtin_defs() {
            supported.register(def);
        }
        supported
    }

    fn register(&mut self, def: Arc<dyn OptionDef>) {
        debug_assert!(
            !self.by_name.contains_key(def.name()) && !self.by_tag.contains_key(&def.tag()),
            "built-in option registered twice"
        );
        self.by_name.insert(def.name(), def.clone());
        self.by_tag.insert(def.tag(), def);
    }

    /// Register an additional option implementation; names and tags must be
    /// unique within this set.
    pub fn add(&mut self, def: Arc<dyn OptionDef>) -> Result<(), CodecError> {
        if self.by_name.contains_key(def.name()) {
            return Err(CodecError::BadValue(format!(
                "option {} is already registered",
                def.name()
            )));
        }
        if self.by_tag.contains_key(&def.tag()) {
            return Err(CodecError::BadValue(format!("tag {} is already registered", def.tag())));
        }
        self.register(def);
        Ok(())
    }

    /// Turn named options into raw trailer records. Items the named codec
    /// cannot handle fall back to the generic TLV path (colon-hex value to
    /// octets); items neither path can handle pass through unchanged.
    pub fn encode(&self, options: &[DhcpOption]) -> Vec<DhcpOption> {
        let hex = HexStringT::new(256);
        options
            .iter()
            .map(|item| {
                if let DhcpOption::Named { option, value } = item {
                    if let Some(def) = self.by_name.get(option.as_str()) {
                        if let Ok(raw) = def.encode(value.as_ref()) {
                            return DhcpOption::Raw(raw);
                        }
                    }
                }
                if let DhcpOption::Hex { tag, length, value } = item {
                    if let Ok(octets) = hex.to_octets(value) {
                        return DhcpOption::Raw(RawOption::Tlv {
                            tag: *tag,
                            length: *length,
                            value: octets,
                        });
                    }
                }
                item.clone()
            })
            .collect()
    }

    /// Mirror of [`Supported::encode`], keyed by tag: raw records become
    /// named options, unknown or undecodable tags become colon-hex TLVs,
    /// and anything else passes through unchanged.
    pub fn decode(&self, options: &[RawOption]) -> Vec<DhcpOption> {
        let hex = HexStringT::new(256);
        options
            .iter()
            .map(|record| {
                if let Some(def) = self.by_tag.get(&record.tag()) {
                    if let Ok(named) = def.decode(record) {
                        return named;
                    }
                }
                if let RawOption::Tlv { tag, length, value } = record {
                    if let Ok(text) = hex.to_text(value) {
                        return DhcpOption::Hex { tag: *tag, length: *length, value: text };
                    }
                }
                DhcpOption::Raw(record.clone())
            })
            .collect()
    }
}

fn builtin_defs() -> Vec<Arc<dyn OptionDef>> {
    vec![
        Arc::new(TagOnly { name: PAD, tag: TAG_PAD }),
        Arc::new(TagOnly { name: END, tag: TAG_END }),
        Arc::new(TypedOption {
            name: SUBNET_MASK,
            tag: 1,
            length: Some(4),
            vtype: Box::new(IPv4T),
        }),
        Arc::new(TypedOption {
            name: TIME_OFFSET,
            tag: 2,
            length: Some(4),
            vtype: Box::new(IntT::s32()),
        }),
        Arc::new(HostNameOpt),
        Arc::new(TypedOption {
            name: REQUESTED_IP_ADDRESS,
            tag: 50,
            length: Some(4),
            vtype: Box::new(IPv4T),
        }),
        Arc::new(TypedOption {
            name: DHCP_MESSAGE_TYPE,
            tag: 53,
            length: Some(1),
            vtype: Box::new(message_type_enum()),
        }),
        Arc::new(ParameterRequestListOpt),
        Arc::new(RelayAgentInformationOpt),
    ]
}
