//! Typed field values for wire codecs.
//!
//! A [`ValueType`] knows how to take a lexical [`Value`] to its canonical
//! form, how to pack and unpack the binary form, and how to transform
//! between the canonical and packed representations (`encode`/`decode`).
//! Containers such as records and TLV codecs apply `encode` before `pack`
//! and `decode` after `unpack`.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::str::FromStr;

use itertools::Itertools;

use crate::core::errors::CodecError;
use crate::utils::fmt::parse_hex_octet;

/// The lexical and canonical value space of the codec.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int(i64),
    Text(String),
    Flag(bool),
    Octets(Vec<u8>),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Options(Vec<RawOption>),
}

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Text(_) => "text",
            Value::Flag(_) => "flag",
            Value::Octets(_) => "octets",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Options(_) => "options",
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Flag(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Octets(v)
    }
}

/// One record of a DHCP options trailer. `length` always matches
/// `value.len()` once canonicalized; until then it carries whatever the
/// caller claimed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RawOption {
    Pad,
    End,
    Tlv { tag: u8, length: u8, value: Vec<u8> },
}

impl RawOption {
    pub fn tlv(tag: u8, value: impl Into<Vec<u8>>) -> Self {
        let value = value.into();
        RawOption::Tlv { tag, length: value.len() as u8, value }
    }

    pub fn tag(&self) -> u8 {
        match self {
            RawOption::Pad => 0,
            RawOption::End => 255,
            RawOption::Tlv { tag, .. } => *tag,
        }
    }
}

/// Capability shared by every field type.
pub trait ValueType: Send + Sync {
    /// Normalize a lexical value to its canonical form.
    fn canonicalize(&self, val: &Value) -> Result<Value, CodecError>;

    /// Pack the encoded representation to octets.
    fn pack(&self, val: &Value) -> Result<Vec<u8>, CodecError>;

    /// Unpack one value from the head of `octets`, returning it together
    /// with the octets not consumed.
    fn unpack<'a>(&self, octets: &'a [u8]) -> Result<(Value, &'a [u8]), CodecError>;

    /// Transform a canonical value into its packable representation.
    fn encode(&self, val: &Value) -> Result<Value, CodecError> {
        Ok(val.clone())
    }

    /// Transform an unpacked representation back to a canonical value.
    fn decode(&self, val: &Value) -> Result<Value, CodecError> {
        Ok(val.clone())
    }
}

/// Parse a lexical integer the way the config boundary spells them:
/// decimal by default, `0x`/`0o`/`0b` prefixes for other bases.
pub fn parse_int(text: &str) -> Result<i64, CodecError> {
    let text = text.trim();
    let (neg, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };
    let parsed = if let Some(hex) = body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16)
    } else if let Some(oct) = body.strip_prefix("0o").or_else(|| body.strip_prefix("0O")) {
        i64::from_str_radix(oct, 8)
    } else if let Some(bin) = body.strip_prefix("0b").or_else(|| body.strip_prefix("0B")) {
        i64::from_str_radix(bin, 2)
    } else {
        body.parse::<i64>()
    };
    match parsed {
        Ok(v) => Ok(if neg { -v } else { v }),
        Err(_) => Err(CodecError::BadValue(format!("not an integer: {:?}", text))),
    }
}

pub(crate) fn latin1_bytes(text: &str) -> Result<Vec<u8>, CodecError> {
    text.chars()
        .map(|c| {
            let code = c as u32;
            if code <= 0xFF {
                Ok(code as u8)
            } else {
                Err(CodecError::BadValue(format!("not latin-1: {:?}", text)))
            }
        })
        .collect()
}

pub(crate) fn latin1_text(octets: &[u8]) -> String {
    octets.iter().map(|&b| b as char).collect()
}

fn take<'a>(octets: &'a [u8], n: usize) -> Result<(&'a [u8], &'a [u8]), CodecError> {
    if octets.len() < n {
        Err(CodecError::Short { needed: n, have: octets.len() })
    } else {
        Ok(octets.split_at(n))
    }
}

/// Fixed binary widths for integer fields, network byte order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Width {
    U8,
    U16,
    U32,
    S32,
}

impl Width {
    fn size(self) -> usize {
        match self {
            Width::U8 => 1,
            Width::U16 => 2,
            Width::U32 => 4,
            Width::S32 => 4,
        }
    }

    fn span(self) -> (i64, i64) {
        match self {
            Width::U8 => (0, 0xFF),
            Width::U16 => (0, 0xFFFF),
            Width::U32 => (0, 0xFFFF_FFFF),
            Width::S32 => (-0x8000_0000, 0x7FFF_FFFF),
        }
    }
}

/// A bounded integer field.
pub struct IntT {
    min: i64,
    max: i64,
    width: Width,
}

impl IntT {
    /// Bounds must lie within the width's representable span.
    pub fn new(min: i64, max: i64, width: Width) -> Self {
        let (lo, hi) = width.span();
        assert!(lo <= min && max <= hi && min <= max, "bad integer bounds");
        IntT { min, max, width }
    }

    pub fn u8() -> Self {
        IntT::new(0, 0xFF, Width::U8)
    }

    pub fn u8_range(min: i64, max: i64) -> Self {
        IntT::new(min, max, Width::U8)
    }

    pub fn u16() -> Self {
        IntT::new(0, 0xFFFF, Width::U16)
    }

    pub fn u32() -> Self {
        IntT::new(0, 0xFFFF_FFFF, Width::U32)
    }

    pub fn s32() -> Self {
        IntT::new(-0x8000_0000, 0x7FFF_FFFF, Width::S32)
    }

    fn admit(&self, v: i64) -> Result<i64, CodecError> {
        if v < self.min || v > self.max {
            Err(CodecError::BadValue(format!(
                "integer {} outside [{}, {}]",
                v, self.min, self.max
            )))
        } else {
            Ok(v)
        }
    }
}

impl ValueType for IntT {
    fn canonicalize(&self, val: &Value) -> Result<Value, CodecError> {
        let v = match val {
            Value::Int(v) => *v,
            Value::Text(s) => parse_int(s)?,
            other => {
                return Err(CodecError::BadType(format!("expected int, got {}", other.kind())))
            }
        };
        Ok(Value::Int(self.admit(v)?))
    }

    fn pack(&self, val: &Value) -> Result<Vec<u8>, CodecError> {
        let Value::Int(v) = val else {
            return Err(CodecError::BadType(format!("expected int, got {}", val.kind())));
        };
        let (lo, hi) = self.width.span();
        if *v < lo || *v > hi {
            return Err(CodecError::BadValue(format!("integer {} does not fit field width", v)));
        }
        Ok(match self.width {
            Width::U8 => vec![*v as u8],
            Width::U16 => (*v as u16).to_be_bytes().to_vec(),
            Width::U32 => (*v as u32).to_be_bytes().to_vec(),
            Width::S32 => (*v as i32).to_be_bytes().to_vec(),
        })
    }

    fn unpack<'a>(&self, octets: &'a [u8]) -> Result<(Value, &'a [u8]), CodecError> {
        let (head, rest) = take(octets, self.width.size())?;
        let v = match self.width {
            Width::U8 => head[0] as i64,
            Width::U16 => u16::from_be_bytes([head[0], head[1]]) as i64,
            Width::U32 => u32::from_be_bytes([head[0], head[1], head[2], head[3]]) as i64,
            Width::S32 => i32::from_be_bytes([head[0], head[1], head[2], head[3]]) as i64,
        };
        Ok((Value::Int(v), rest))
    }
}

/// An integer field whose canonical form is a string label.
pub struct EnumT {
    base: IntT,
    labels: Vec<(i64, &'static str)>,
}

impl EnumT {
    pub fn new(base: IntT, labels: Vec<(i64, &'static str)>) -> Self {
        EnumT { base, labels }
    }

    fn label_of(&self, v: i64) -> Option<&'static str> {
        self.labels.iter().find(|(code, _)| *code == v).map(|(_, l)| *l)
    }

    fn value_of(&self, label: &str) -> Option<i64> {
        self.labels.iter().find(|(_, l)| *l == label).map(|(code, _)| *code)
    }
}

impl ValueType for EnumT {
    fn canonicalize(&self, val: &Value) -> Result<Value, CodecError> {
        if let Value::Text(s) = val {
            if self.value_of(s).is_some() {
                return Ok(val.clone());
            }
        }
        let v = match self.base.canonicalize(val)? {
            Value::Int(v) => v,
            other => return Err(CodecError::BadType(format!("expected int, got {}", other.kind()))),
        };
        match self.label_of(v) {
            Some(label) => Ok(Value::text(label)),
            None => Err(CodecError::BadValue(format!("no label for enum value {}", v))),
        }
    }

    fn pack(&self, val: &Value) -> Result<Vec<u8>, CodecError> {
        self.base.pack(val)
    }

    fn unpack<'a>(&self, octets: &'a [u8]) -> Result<(Value, &'a [u8]), CodecError> {
        self.base.unpack(octets)
    }

    fn encode(&self, val: &Value) -> Result<Value, CodecError> {
        let Value::Text(s) = val else {
            return Err(CodecError::BadType(format!("expected label, got {}", val.kind())));
        };
        match self.value_of(s) {
            Some(v) => Ok(Value::Int(v)),
            None => Err(CodecError::BadValue(format!("unknown enum label {:?}", s))),
        }
    }

    fn decode(&self, val: &Value) -> Result<Value, CodecError> {
        let Value::Int(v) = val else {
            return Err(CodecError::BadType(format!("expected int, got {}", val.kind())));
        };
        match self.label_of(*v) {
            Some(label) => Ok(Value::text(label)),
            None => Err(CodecError::BadValue(format!("no label for enum value {}", v))),
        }
    }
}

/// A dotted-quad IPv4 address field, packed as 4 octets.
pub struct IPv4T;

impl ValueType for IPv4T {
    fn canonicalize(&self, val: &Value) -> Result<Value, CodecError> {
        let Value::Text(s) = val else {
            return Err(CodecError::BadType(format!("expected ipv4 text, got {}", val.kind())));
        };
        Ipv4Addr::from_str(s)
            .map_err(|_| CodecError::BadValue(format!("not an ipv4 address: {:?}", s)))?;
        Ok(val.clone())
    }

    fn pack(&self, val: &Value) -> Result<Vec<u8>, CodecError> {
        match val {
            Value::Octets(o) if o.len() == 4 => Ok(o.clone()),
            Value::Octets(o) => {
                Err(CodecError::BadValue(format!("ipv4 needs 4 octets, got {}", o.len())))
            }
            other => Err(CodecError::BadType(format!("expected octets, got {}", other.kind()))),
        }
    }

    fn unpack<'a>(&self, octets: &'a [u8]) -> Result<(Value, &'a [u8]), CodecError> {
        let (head, rest) = take(octets, 4)?;
        Ok((Value::Octets(head.to_vec()), rest))
    }

    fn encode(&self, val: &Value) -> Result<Value, CodecError> {
        let Value::Text(s) = val else {
            return Err(CodecError::BadType(format!("expected ipv4 text, got {}", val.kind())));
        };
        let addr = Ipv4Addr::from_str(s)
            .map_err(|_| CodecError::BadValue(format!("not an ipv4 address: {:?}", s)))?;
        Ok(Value::Octets(addr.octets().to_vec()))
    }

    fn decode(&self, val: &Value) -> Result<Value, CodecError> {
        match val {
            Value::Octets(o) if o.len() == 4 => {
                Ok(Value::text(Ipv4Addr::new(o[0], o[1], o[2], o[3]).to_string()))
            }
            other => Err(CodecError::BadValue(format!("cannot decode ipv4 from {}", other.kind()))),
        }
    }
}

/// A latin-1 string stored in a fixed region of `max` octets, NUL
/// terminated. The encoded value must leave room for at least one
/// terminating zero.
pub struct NulStringT {
    max: usize,
}

impl NulStringT {
    pub fn new(max: usize) -> Self {
        NulStringT { max }
    }

    fn encoded(&self, text: &str) -> Result<Vec<u8>, CodecError> {
        let stripped = text.trim_end_matches('\0');
        let octets = latin1_bytes(stripped)?;
        if octets.len() < self.max {
            Ok(octets)
        } else {
            Err(CodecError::BadValue(format!(
                "string of {} octets does not fit in {}",
                octets.len(),
                self.max
            )))
        }
    }
}

impl ValueType for NulStringT {
    fn canonicalize(&self, val: &Value) -> Result<Value, CodecError> {
        let Value::Text(s) = val else {
            return Err(CodecError::BadType(format!("expected text, got {}", val.kind())));
        };
        self.encoded(s)?;
        Ok(val.clone())
    }

    fn pack(&self, val: &Value) -> Result<Vec<u8>, CodecError> {
        let Value::Octets(o) = val else {
            return Err(CodecError::BadType(format!("expected octets, got {}", val.kind())));
        };
        if o.len() >= self.max {
            return Err(CodecError::BadValue(format!(
                "string of {} octets does not fit in {}",
                o.len(),
                self.max
            )));
        }
        let mut packed = o.clone();
        packed.resize(self.max, 0);
        Ok(packed)
    }

    fn unpack<'a>(&self, octets: &'a [u8]) -> Result<(Value, &'a [u8]), CodecError> {
        let (head, rest) = take(octets, self.max)?;
        Ok((Value::Octets(head.to_vec()), rest))
    }

    fn encode(&self, val: &Value) -> Result<Value, CodecError> {
        let Value::Text(s) = val else {
            return Err(CodecError::BadType(format!("expected text, got {}", val.kind())));
        };
        Ok(Value::Octets(self.encoded(s)?))
    }

    fn decode(&self, val: &Value) -> Result<Value, CodecError> {
        let Value::Octets(o) = val else {
            return Err(CodecError::BadType(format!("expected octets, got {}", val.kind())));
        };
        let text = latin1_text(o);
        let cut = match text.find('\0') {
            Some(idx) => text[..idx].to_string(),
            None => text,
        };
        self.canonicalize(&Value::Text(cut.clone()))?;
        Ok(Value::Text(cut))
    }
}

/// A colon-separated hex string stored in a fixed region of `max` octets.
/// Canonical values keep the case they were supplied in; decoded values are
/// always lowercase.
pub struct HexStringT {
    max: usize,
}

impl HexStringT {
    pub fn new(max: usize) -> Self {
        HexStringT { max }
    }

    pub fn to_octets(&self, text: &str) -> Result<Vec<u8>, CodecError> {
        let octets = if text.is_empty() {
            Vec::new()
        } else {
            text.split(':')
                .map(|elem| {
                    parse_hex_octet(elem)
                        .ok_or_else(|| CodecError::BadValue(format!("not hex: {:?}", elem)))
                })
                .collect::<Result<Vec<u8>, CodecError>>()?
        };
        if octets.len() <= self.max {
            Ok(octets)
        } else {
            Err(CodecError::BadValue(format!(
                "hex string of {} octets exceeds {}",
                octets.len(),
                self.max
            )))
        }
    }

    pub fn to_text(&self, octets: &[u8]) -> Result<String, CodecError> {
        if octets.len() > self.max {
            return Err(CodecError::BadValue(format!(
                "hex string of {} octets exceeds {}",
                octets.len(),
                self.max
            )));
        }
        Ok(octets.iter().map(|b| format!("{:02x}", b)).join(":"))
    }

    /// Keep at most the first `max` colon-separated elements of `val`.
    pub fn truncate(val: &str, max: usize) -> String {
        val.split(':').take(max).join(":")
    }
}

impl ValueType for HexStringT {
    fn canonicalize(&self, val: &Value) -> Result<Value, CodecError> {
        let Value::Text(s) = val else {
            return Err(CodecError::BadType(format!("expected text, got {}", val.kind())));
        };
        self.to_octets(s)?;
        Ok(val.clone())
    }

    fn pack(&self, val: &Value) -> Result<Vec<u8>, CodecError> {
        let Value::Octets(o) = val else {
            return Err(CodecError::BadType(format!("expected octets, got {}", val.kind())));
        };
        if o.len() > self.max {
            return Err(CodecError::BadValue(format!(
                "hex string of {} octets exceeds {}",
                o.len(),
                self.max
            )));
        }
        let mut packed = o.clone();
        packed.resize(self.max, 0);
        Ok(packed)
    }

    fn unpack<'a>(&self, octets: &'a [u8]) -> Result<(Value, &'a [u8]), CodecError> {
        let (head, rest) = take(octets, self.max)?;
        Ok((Value::Octets(head.to_vec()), rest))
    }

    fn encode(&self, val: &Value) -> Result<Value, CodecError> {
        let Value::Text(s) = val else {
            return Err(CodecError::BadType(format!("expected text, got {}", val.kind())));
        };
        Ok(Value::Octets(self.to_octets(s)?))
    }

    fn decode(&self, val: &Value) -> Result<Value, CodecError> {
        let Value::Octets(o) = val else {
            return Err(CodecError::BadType(format!("expected octets, got {}", val.kind())));
        };
        Ok(Value::Text(self.to_text(o)?))
    }
}

/// The BOOTP magic cookie. Canonical value is a flag: present or absent.
pub struct CookieT;

pub const MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];

impl ValueType for CookieT {
    fn canonicalize(&self, val: &Value) -> Result<Value, CodecError> {
        match val {
            Value::Flag(f) => Ok(Value::Flag(*f)),
            Value::Int(v) => Ok(Value::Flag(*v != 0)),
            other => Err(CodecError::BadType(format!("expected flag, got {}", other.kind()))),
        }
    }

    fn pack(&self, val: &Value) -> Result<Vec<u8>, CodecError> {
        match val {
            Value::Flag(true) => Ok(MAGIC_COOKIE.to_vec()),
            Value::Flag(false) => Ok(Vec::new()),
            other => Err(CodecError::BadType(format!("expected flag, got {}", other.kind()))),
        }
    }

    fn unpack<'a>(&self, octets: &'a [u8]) -> Result<(Value, &'a [u8]), CodecError> {
        if octets.len() >= 4 && octets[..4] == MAGIC_COOKIE {
            Ok((Value::Flag(true), &octets[4..]))
        } else {
            Ok((Value::Flag(false), octets))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_canonicalize_lexical_forms() {
        let t = IntT::u8();
        assert_eq!(t.canonicalize(&Value::Int(7)).unwrap(), Value::Int(7));
        assert_eq!(t.canonicalize(&Value::text("7")).unwrap(), Value::Int(7));
        assert_eq!(t.canonicalize(&Value::text("0x1f")).unwrap(), Value::Int(31));
        assert_eq!(t.canonicalize(&Value::text("0o17")).unwrap(), Value::Int(15));
        assert!(matches!(t.canonicalize(&Value::Int(256)), Err(CodecError::BadValue(_))));
        assert!(matches!(t.canonicalize(&Value::Int(-1)), Err(CodecError::BadValue(_))));
        assert!(matches!(t.canonicalize(&Value::text("x")), Err(CodecError::BadValue(_))));
        assert!(matches!(t.canonicalize(&Value::Flag(true)), Err(CodecError::BadType(_))));
    }

    #[test]
    fn int_range_subset() {
        let t = IntT::u8_range(1, 2);
        assert!(t.canonicalize(&Value::Int(1)).is_ok());
        assert!(t.canonicalize(&Value::Int(3)).is_err());
    }

    #[test]
    fn int_pack_unpack_widths() {
        let t = IntT::u16();
        assert_eq!(t.pack(&Value::Int(0x1234)).unwrap(), vec![0x12, 0x34]);
        let (v, rest) = t.unpack(&[0x12, 0x34, 0xff]).unwrap();
        assert_eq!(v, Value::Int(0x1234));
        assert_eq!(rest, &[0xff]);

        let t = IntT::s32();
        assert_eq!(t.pack(&Value::Int(-2)).unwrap(), vec![0xff, 0xff, 0xff, 0xfe]);
        let (v, _) = t.unpack(&[0xff, 0xff, 0xff, 0xfe]).unwrap();
        assert_eq!(v, Value::Int(-2));

        assert!(matches!(
            IntT::u8().unpack(&[]),
            Err(CodecError::Short { needed: 1, have: 0 })
        ));
    }

    #[test]
    fn enum_labels_and_values() {
        let t = EnumT::new(IntT::u8_range(1, 2), vec![(1, "ON"), (2, "OFF")]);
        assert_eq!(t.canonicalize(&Value::text("ON")).unwrap(), Value::text("ON"));
        assert_eq!(t.canonicalize(&Value::Int(2)).unwrap(), Value::text("OFF"));
        assert_eq!(t.canonicalize(&Value::text("0x1")).unwrap(), Value::text("ON"));
        assert!(t.canonicalize(&Value::text("MAYBE")).is_err());
        assert_eq!(t.encode(&Value::text("ON")).unwrap(), Value::Int(1));
        assert_eq!(t.decode(&Value::Int(2)).unwrap(), Value::text("OFF"));
        assert!(t.decode(&Value::Int(9)).is_err());
    }

    #[test]
    fn ipv4_round_trip() {
        let t = IPv4T;
        assert!(t.canonicalize(&Value::text("192.168.98.1")).is_ok());
        assert!(t.canonicalize(&Value::text("192.168.98")).is_err());
        assert!(t.canonicalize(&Value::text("299.0.0.1")).is_err());
        let enc = t.encode(&Value::text("192.168.98.1")).unwrap();
        assert_eq!(enc, Value::Octets(vec![192, 168, 98, 1]));
        assert_eq!(t.decode(&enc).unwrap(), Value::text("192.168.98.1"));
        assert_eq!(t.pack(&enc).unwrap(), vec![192, 168, 98, 1]);
    }

    #[test]
    fn nul_string_bounds() {
        let t = NulStringT::new(4);
        assert!(t.canonicalize(&Value::text("abc")).is_ok());
        assert!(t.canonicalize(&Value::text("abcd")).is_err());
        // trailing NULs are stripped before the length check
        assert!(t.canonicalize(&Value::text("abc\0\0")).is_ok());
        assert!(t.canonicalize(&Value::Int(1)).is_err());

        let enc = t.encode(&Value::text("ab")).unwrap();
        assert_eq!(t.pack(&enc).unwrap(), vec![b'a', b'b', 0, 0]);
        let (v, rest) = t.unpack(&[b'a', b'b', 0, 0, 9]).unwrap();
        assert_eq!(rest, &[9]);
        assert_eq!(t.decode(&v).unwrap(), Value::text("ab"));
    }

    #[test]
    fn nul_string_decode_cuts_at_nul() {
        let t = NulStringT::new(8);
        let v = Value::Octets(vec![b'h', b'i', 0, b'x', 0, 0, 0, 0]);
        assert_eq!(t.decode(&v).unwrap(), Value::text("hi"));
    }

    #[test]
    fn hex_string_case_and_length() {
        let t = HexStringT::new(6);
        assert!(t.canonicalize(&Value::text("1E:4B:AD:91:68:3A")).is_ok());
        assert!(t.canonicalize(&Value::text("")).is_ok());
        assert!(t.canonicalize(&Value::text("00:11:22:33:44:55:66")).is_err());
        assert!(t.canonicalize(&Value::text("zz")).is_err());

        let enc = t.encode(&Value::text("1E:4B:AD:91:68:3A")).unwrap();
        assert_eq!(enc, Value::Octets(vec![0x1e, 0x4b, 0xad, 0x91, 0x68, 0x3a]));
        // decode always yields lowercase; byte length preserved
        assert_eq!(t.decode(&enc).unwrap(), Value::text("1e:4b:ad:91:68:3a"));
    }

    #[test]
    fn hex_string_pack_pads() {
        let t = HexStringT::new(4);
        let enc = t.encode(&Value::text("aa:bb")).unwrap();
        assert_eq!(t.pack(&enc).unwrap(), vec![0xaa, 0xbb, 0, 0]);
        let (v, _) = t.unpack(&[0xaa, 0xbb, 0, 0]).unwrap();
        assert_eq!(t.decode(&v).unwrap(), Value::text("aa:bb:00:00"));
    }

    #[test]
    fn hex_string_truncate() {
        let full = "00:11:22:33:44:55:66:77";
        assert_eq!(HexStringT::truncate(full, 6), "00:11:22:33:44:55");
        assert_eq!(HexStringT::truncate("aa", 6), "aa");
    }

    #[test]
    fn cookie_magic() {
        let t = CookieT;
        assert_eq!(t.canonicalize(&Value::Int(5)).unwrap(), Value::Flag(true));
        assert_eq!(t.pack(&Value::Flag(true)).unwrap(), vec![0x63, 0x82, 0x53, 0x63]);
        assert_eq!(t.pack(&Value::Flag(false)).unwrap(), Vec::<u8>::new());

        let (v, rest) = t.unpack(&[0x63, 0x82, 0x53, 0x63, 0xff]).unwrap();
        assert_eq!(v, Value::Flag(true));
        assert_eq!(rest, &[0xff]);
        let (v, rest) = t.unpack(&[0x63, 0x82, 0x53]).unwrap();
        assert_eq!(v, Value::Flag(false));
        assert_eq!(rest.len(), 3);
    }
}
