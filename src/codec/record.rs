//! Declarative records over an ordered field list.
//!
//! A [`Spec`] names the record and lists its fields in wire order; a
//! [`Record`] carries the values. Every mutation is validated against the
//! field's [`ValueType`], packing walks the spec in order, and unpacking is
//! greedy with trailing octets discarded.

use crate::codec::value::{Value, ValueType};
use crate::core::errors::CodecError;

pub struct Spec {
    name: &'static str,
    fields: Vec<(&'static str, Box<dyn ValueType>)>,
}

impl Spec {
    pub fn new(name: &'static str, fields: Vec<(&'static str, Box<dyn ValueType>)>) -> Self {
        Spec { name, fields }
    }

    fn len(&self) -> usize {
        self.fields.len()
    }

    fn index(&self, key: &str) -> Option<usize> {
        self.fields.iter().position(|(name, _)| *name == key)
    }

    fn field_type(&self, key: &str) -> Option<&dyn ValueType> {
        self.index(key).map(|i| self.fields[i].1.as_ref())
    }

    /// Canonicalize `val` for field `key`, or reject it with the taxon the
    /// failure calls for.
    fn screen(&self, key: &str, val: &Value) -> Result<Value, CodecError> {
        match self.field_type(key) {
            Some(vtype) => vtype.canonicalize(val).map_err(|err| match err {
                CodecError::BadValue(msg) => {
                    CodecError::BadValue(format!("{} field {}: {}", self.name, key, msg))
                }
                CodecError::BadType(msg) => {
                    CodecError::BadType(format!("{} field {}: {}", self.name, key, msg))
                }
                other => other,
            }),
            None => Err(CodecError::BadKey(format!("{} has no field {}", self.name, key))),
        }
    }
}

#[derive(Clone)]
pub struct Record {
    spec: &'static Spec,
    values: Vec<Option<Value>>,
}

impl std::fmt::Debug for Record {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("spec", &self.spec.name)
            .field("values", &self.values)
            .finish()
    }
}

impl Record {
    pub fn new(spec: &'static Spec) -> Self {
        Record { spec, values: vec![None; spec.len()] }
    }

    /// Build a record from `(key, value)` pairs, validating each one.
    pub fn from_pairs<'a, I>(spec: &'static Spec, pairs: I) -> Result<Self, CodecError>
    where
        I: IntoIterator<Item = (&'a str, Value)>,
    {
        let mut rec = Record::new(spec);
        for (key, val) in pairs {
            rec.set(key, val)?;
        }
        Ok(rec)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.spec.index(key).and_then(|i| self.values[i].as_ref())
    }

    /// Validate and store one field value.
    pub fn set(&mut self, key: &str, val: Value) -> Result<(), CodecError> {
        let canonical = self.spec.screen(key, &val)?;
        let idx = self
            .spec
            .index(key)
            .ok_or_else(|| CodecError::BadKey(format!("{} has no field {}", self.spec.name, key)))?;
        self.values[idx] = Some(canonical);
        Ok(())
    }

    /// Apply every pair or none: all values are screened before the first
    /// assignment happens.
    pub fn update<'a, I>(&mut self, pairs: I) -> Result<(), CodecError>
    where
        I: IntoIterator<Item = (&'a str, Value)>,
    {
        let mut screened = Vec::new();
        for (key, val) in pairs {
            let canonical = self.spec.screen(key, &val)?;
            let idx = self.spec.index(key).ok_or_else(|| {
                CodecError::BadKey(format!("{} has no field {}", self.spec.name, key))
            })?;
            screened.push((idx, canonical));
        }
        for (idx, canonical) in screened {
            self.values[idx] = Some(canonical);
        }
        Ok(())
    }

    /// Concatenate `encode ∘ pack` of every field in spec order.
    pub fn pack(&self) -> Result<Vec<u8>, CodecError> {
        let mut octets = Vec::new();
        for ((name, vtype), val) in self.spec.fields.iter().zip(self.values.iter()) {
            let val = val
                .as_ref()
                .ok_or_else(|| CodecError::Missing(format!("{} field {}", self.spec.name, name)))?;
            let encoded = vtype.encode(val)?;
            octets.extend(vtype.pack(&encoded)?);
        }
        Ok(octets)
    }

    /// Read every field in spec order, decoding and re-canonicalizing each
    /// unpacked value. Octets past the last field are discarded.
    pub fn unpack(spec: &'static Spec, octets: &[u8]) -> Result<Self, CodecError> {
        let mut rec = Record::new(spec);
        let mut rest = octets;
        for (name, vtype) in spec.fields.iter() {
            let (raw, tail) = vtype.unpack(rest)?;
            let decoded = vtype.decode(&raw)?;
            rec.set(name, decoded)?;
            rest = tail;
        }
        Ok(rec)
    }
}
