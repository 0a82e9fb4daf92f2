//! The RFC 2131 DHCP message: the fixed header, the magic cookie and the
//! options trailer, expressed over the record framework.

use std::sync::OnceLock;

use crate::codec::options::{DhcpOption, OptionsT, Supported};
use crate::codec::record::{Record, Spec};
use crate::codec::value::{
    CookieT, HexStringT, IPv4T, IntT, NulStringT, RawOption, Value,
};
use crate::core::errors::CodecError;

/// `op` value of a client-originated message.
pub const BOOT_REQUEST: i64 = 1;
/// `op` value of a server-originated message.
pub const BOOT_REPLY: i64 = 2;

fn message_spec() -> &'static Spec {
    static SPEC: OnceLock<Spec> = OnceLock::new();
    SPEC.get_or_init(|| {
        Spec::new(
            "RFC 2131 DHCP message",
            vec![
                ("op", Box::new(IntT::u8_range(1, 2))),
                ("htype", Box::new(IntT::u8())),
                ("hlen", Box::new(IntT::u8_range(1, 16))),
                ("hops", Box::new(IntT::u8())),
                ("xid", Box::new(IntT::u32())),
                ("secs", Box::new(IntT::u16())),
                ("flags", Box::new(IntT::u16())),
                ("ciaddr", Box::new(IPv4T)),
                ("yiaddr", Box::new(IPv4T)),
                ("siaddr", Box::new(IPv4T)),
                ("giaddr", Box::new(IPv4T)),
                ("chaddr", Box::new(HexStringT::new(16))),
                ("sname", Box::new(NulStringT::new(64))),
                ("file", Box::new(NulStringT::new(128))),
                ("cookie", Box::new(CookieT)),
                ("options", Box::new(OptionsT)),
            ],
        )
    })
}

/// A DHCP message. Field mutations validate against the spec above, and any
/// mutation touching `hlen` or `chaddr` keeps `chaddr` truncated to `hlen`
/// colon-hex elements.
#[derive(Clone)]
pub struct Message {
    rec: Record,
}

impl Message {
    pub fn new() -> Self {
        Message { rec: Record::new(message_spec()) }
    }

    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self, CodecError>
    where
        I: IntoIterator<Item = (&'a str, Value)>,
    {
        let mut msg = Message { rec: Record::from_pairs(message_spec(), pairs)? };
        msg.truncate_chaddr();
        Ok(msg)
    }

    /// Unpack a wire message. Trailing octets are treated as padding.
    pub fn unpack(octets: &[u8]) -> Result<Self, CodecError> {
        let mut msg = Message { rec: Record::unpack(message_spec(), octets)? };
        msg.truncate_chaddr();
        Ok(msg)
    }

    pub fn pack(&self) -> Result<Vec<u8>, CodecError> {
        self.rec.pack()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.rec.get(key)
    }

    pub fn set(&mut self, key: &str, val: Value) -> Result<(), CodecError> {
        self.rec.set(key, val)?;
        if key == "hlen" || key == "chaddr" {
            self.truncate_chaddr();
        }
        Ok(())
    }

    /// Atomic bulk update; `chaddr` is re-truncated afterwards.
    pub fn update<'a, I>(&mut self, pairs: I) -> Result<(), CodecError>
    where
        I: IntoIterator<Item = (&'a str, Value)>,
    {
        self.rec.update(pairs)?;
        self.truncate_chaddr();
        Ok(())
    }

    /// Rewrite `chaddr` so it holds at most `hlen` colon-hex elements. Does
    /// nothing when either field has no value.
    pub fn truncate_chaddr(&mut self) {
        let hlen = match self.rec.get("hlen") {
            Some(Value::Int(v)) => *v as usize,
            _ => return,
        };
        let chaddr = match self.rec.get("chaddr") {
            Some(Value::Text(s)) => s.clone(),
            _ => return,
        };
        self.rec.set("chaddr", Value::Text(HexStringT::truncate(&chaddr, hlen))).ok();
    }

    /// Decoded copy of the options trailer. Without a registry, options come
    /// back as TLVs with colon-hex values.
    pub fn decode_options(&self, supported: Option<&Supported>) -> Result<Vec<DhcpOption>, CodecError> {
        let Some(Value::Options(records)) = self.rec.get("options") else {
            return Err(CodecError::Missing("options".to_string()));
        };
        let fallback;
        let supported = match supported {
            Some(s) => s,
            None => {
                fallback = Supported::empty();
                &fallback
            }
        };
        Ok(supported.decode(records))
    }

    /// Encode `options` through `supported` and store them, either replacing
    /// the current trailer or appending to it.
    pub fn encode_options(
        &mut self,
        options: &[DhcpOption],
        supported: Option<&Supported>,
        append: bool,
    ) -> Result<(), CodecError> {
        let fallback;
        let supported = match supported {
            Some(s) => s,
            None => {
                fallback = Supported::empty();
                &fallback
            }
        };
        let mut encoded = Vec::with_capacity(options.len());
        for item in supported.encode(options) {
            match item {
                DhcpOption::Raw(raw) => encoded.push(raw),
                other => {
                    return Err(CodecError::BadValue(format!(
                        "option cannot be encoded: {:?}",
                        other
                    )))
                }
            }
        }
        let combined = if append {
            let Some(Value::Options(existing)) = self.rec.get("options") else {
                return Err(CodecError::Missing("options".to_string()));
            };
            let mut combined = existing.clone();
            combined.extend(encoded);
            combined
        } else {
            encoded
        };
        self.rec.set("options", Value::Options(combined))
    }

    pub fn op(&self) -> Option<i64> {
        match self.rec.get("op") {
            Some(Value::Int(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn xid(&self) -> Option<u32> {
        match self.rec.get("xid") {
            Some(Value::Int(v)) => Some(*v as u32),
            _ => None,
        }
    }

    pub fn chaddr(&self) -> Option<&str> {
        match self.rec.get("chaddr") {
            Some(Value::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn giaddr(&self) -> Option<&str> {
        match self.rec.get("giaddr") {
            Some(Value::Text(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn set_giaddr(&mut self, addr: &str) -> Result<(), CodecError> {
        self.set("giaddr", Value::text(addr))
    }
}

impl Default for Message {
    fn default() -> Self {
        Message::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::options::{
        DHCP_MESSAGE_TYPE, END, HOST_NAME, PARAMETER_REQUEST_LIST, RELAY_AGENT_INFORMATION,
        REQUESTED_IP_ADDRESS,
    };
    use std::collections::BTreeMap;

    fn hex_to_bytes(s: &str) -> Option<Vec<u8>> {
        if s.len() % 2 == 0 {
            (0..s.len())
                .step_by(2)
                .map(|i| s.get(i..i + 2).and_then(|sub| u8::from_str_radix(sub, 16).ok()))
                .collect()
        } else {
            None
        }
    }

    /// A captured client REQUEST: relay agent header fields plus options
    /// 53, 50, 12, 55 and 82, padded with trailing zeroes.
    fn client_request() -> Vec<u8> {
        let mut hex = String::new();
        hex.push_str("01010600");
        hex.push_str("766a3089");
        hex.push_str("0000");
        hex.push_str("0000");
        hex.push_str(&"00".repeat(12));
        hex.push_str("c0a86201");
        hex.push_str("1e4bad91683a");
        hex.push_str(&"00".repeat(10));
        hex.push_str(&"00".repeat(64));
        hex.push_str(&"00".repeat(128));
        hex.push_str("63825363");
        hex.push_str("350103");
        hex.push_str("3204c0a86288");
        hex.push_str("0c0c44656269616e546573746572");
        hex.push_str("370d011c02030f06770c2c2f1a792a");
        hex.push_str("520c010a76657468533049393956");
        hex.push_str("ff");
        hex.push_str(&"00".repeat(12));
        hex_to_bytes(&hex).unwrap()
    }

    fn expected_options() -> Vec<RawOption> {
        vec![
            RawOption::tlv(53, vec![0x03]),
            RawOption::tlv(50, vec![0xc0, 0xa8, 0x62, 0x88]),
            RawOption::tlv(12, b"DebianTester".to_vec()),
            RawOption::tlv(
                55,
                vec![0x01, 0x1c, 0x02, 0x03, 0x0f, 0x06, 0x77, 0x0c, 0x2c, 0x2f, 0x1a, 0x79, 0x2a],
            ),
            RawOption::tlv(82, {
                let mut v = vec![0x01, 0x0a];
                v.extend(b"vethS0I99V");
                v
            }),
            RawOption::End,
        ]
    }

    #[test]
    fn parse_known_request() {
        let octets = client_request();
        let msg = Message::unpack(&octets).unwrap();
        assert_eq!(msg.op(), Some(BOOT_REQUEST));
        assert_eq!(msg.get("htype"), Some(&Value::Int(1)));
        assert_eq!(msg.get("hlen"), Some(&Value::Int(6)));
        assert_eq!(msg.get("hops"), Some(&Value::Int(0)));
        assert_eq!(msg.xid(), Some(0x766A3089));
        assert_eq!(msg.get("secs"), Some(&Value::Int(0)));
        assert_eq!(msg.get("flags"), Some(&Value::Int(0)));
        assert_eq!(msg.get("ciaddr"), Some(&Value::text("0.0.0.0")));
        assert_eq!(msg.get("yiaddr"), Some(&Value::text("0.0.0.0")));
        assert_eq!(msg.get("siaddr"), Some(&Value::text("0.0.0.0")));
        assert_eq!(msg.giaddr(), Some("192.168.98.1"));
        assert_eq!(msg.chaddr(), Some("1e:4b:ad:91:68:3a"));
        assert_eq!(msg.get("sname"), Some(&Value::text("")));
        assert_eq!(msg.get("file"), Some(&Value::text("")));
        assert_eq!(msg.get("cookie"), Some(&Value::Flag(true)));
        assert_eq!(msg.get("options"), Some(&Value::Options(expected_options())));
    }

    #[test]
    fn pack_reproduces_leading_octets() {
        let octets = client_request();
        let mut msg = Message::unpack(&octets).unwrap();
        // truncation is a no-op on a well-formed message
        msg.truncate_chaddr();
        let packed = msg.pack().unwrap();
        assert_eq!(&octets[..packed.len()], &packed[..]);
        assert!(octets[packed.len()..].iter().all(|b| *b == 0));
    }

    #[test]
    fn unpack_round_trip() {
        let octets = client_request();
        let msg = Message::unpack(&octets).unwrap();
        let packed = msg.pack().unwrap();
        let again = Message::unpack(&packed).unwrap();
        assert_eq!(again.get("options"), msg.get("options"));
        assert_eq!(again.chaddr(), msg.chaddr());
        assert_eq!(again.pack().unwrap(), packed);
    }

    #[test]
    fn decode_options_as_tlv() {
        let msg = Message::unpack(&client_request()).unwrap();
        let decoded = msg.decode_options(None).unwrap();
        assert_eq!(
            decoded[..2],
            [
                DhcpOption::Hex { tag: 53, length: 1, value: "03".to_string() },
                DhcpOption::Hex { tag: 50, length: 4, value: "c0:a8:62:88".to_string() },
            ]
        );
        assert_eq!(decoded.last(), Some(&DhcpOption::Raw(RawOption::End)));
    }

    #[test]
    fn decode_options_named() {
        let supported = Supported::builtin();
        let msg = Message::unpack(&client_request()).unwrap();
        let decoded = msg.decode_options(Some(&supported)).unwrap();
        let mut relay = BTreeMap::new();
        relay.insert("circuit-id".to_string(), Value::text("vethS0I99V"));
        assert_eq!(
            decoded,
            vec![
                DhcpOption::named(DHCP_MESSAGE_TYPE, Value::text("REQUEST")),
                DhcpOption::named(REQUESTED_IP_ADDRESS, Value::text("192.168.98.136")),
                DhcpOption::named(HOST_NAME, Value::text("DebianTester")),
                DhcpOption::named(
                    PARAMETER_REQUEST_LIST,
                    Value::List(
                        [1, 28, 2, 3, 15, 6, 119, 12, 44, 47, 26, 121, 42]
                            .iter()
                            .map(|v| Value::Int(*v))
                            .collect()
                    ),
                ),
                DhcpOption::named(RELAY_AGENT_INFORMATION, Value::Map(relay)),
                DhcpOption::Named { option: END.to_string(), value: None },
            ]
        );
    }

    #[test]
    fn decode_options_of_chopped_message() {
        let octets = client_request();
        // header + cookie only: the trailer canonicalizes to a bare End
        let msg = Message::unpack(&octets[..240]).unwrap();
        assert_eq!(msg.get("options"), Some(&Value::Options(vec![RawOption::End])));
        assert_eq!(msg.decode_options(None).unwrap(), vec![DhcpOption::Raw(RawOption::End)]);
    }

    #[test]
    fn encode_options_replace_and_append() {
        let octets = client_request();
        let mut msg = Message::unpack(&octets[..240]).unwrap();
        let supported = Supported::builtin();

        msg.encode_options(&[], Some(&supported), false).unwrap();
        assert_eq!(msg.get("options"), Some(&Value::Options(vec![RawOption::End])));

        msg.encode_options(
            &[
                DhcpOption::named(DHCP_MESSAGE_TYPE, Value::text("REQUEST")),
                DhcpOption::named(REQUESTED_IP_ADDRESS, Value::text("192.168.98.136")),
            ],
            Some(&supported),
            false,
        )
        .unwrap();
        assert_eq!(
            msg.get("options"),
            Some(&Value::Options(vec![
                RawOption::tlv(53, vec![3]),
                RawOption::tlv(50, vec![192, 168, 98, 136]),
                RawOption::End,
            ]))
        );

        // appending re-canonicalizes: the interim End is dropped
        msg.encode_options(&[DhcpOption::circuit_id("veth0")], Some(&supported), true).unwrap();
        let Some(Value::Options(records)) = msg.get("options") else {
            panic!("options missing");
        };
        assert_eq!(records.len(), 4);
        assert_eq!(records[2].tag(), 82);
        assert_eq!(records[3], RawOption::End);
    }

    #[test]
    fn encode_options_rejects_unencodable() {
        let mut msg = Message::unpack(&client_request()).unwrap();
        let err = msg
            .encode_options(&[DhcpOption::named("No Such Option", Value::Int(1))], None, false)
            .unwrap_err();
        assert!(matches!(err, CodecError::BadValue(_)));
    }

    #[test]
    fn truncate_long_chaddr() {
        let msg = Message::from_pairs([
            ("hlen", Value::Int(6)),
            ("chaddr", Value::text("00:11:22:33:44:55:66:77:88:99:AA:BB:CC:DD:EE:FF")),
        ])
        .unwrap();
        assert_eq!(msg.chaddr(), Some("00:11:22:33:44:55"));
    }

    #[test]
    fn truncate_follows_hlen_mutation() {
        let mut msg = Message::from_pairs([
            ("hlen", Value::Int(16)),
            ("chaddr", Value::text("00:11:22:33:44:55:66:77")),
        ])
        .unwrap();
        assert_eq!(msg.chaddr(), Some("00:11:22:33:44:55:66:77"));
        msg.set("hlen", Value::Int(4)).unwrap();
        assert_eq!(msg.chaddr(), Some("00:11:22:33"));
    }

    #[test]
    fn truncate_benign_when_fields_absent() {
        let mut msg = Message::new();
        msg.truncate_chaddr();
        msg.set("hlen", Value::Int(6)).unwrap();
        assert_eq!(msg.chaddr(), None);
    }

    #[test]
    fn bad_header_values_rejected() {
        let mut bad = client_request();
        bad[0] = 0; // op outside 1..2
        assert!(matches!(Message::unpack(&bad), Err(CodecError::BadValue(_))));
        assert!(matches!(
            Message::from_pairs([("bogus", Value::Int(1))]),
            Err(CodecError::BadKey(_))
        ));
    }
}
