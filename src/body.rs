//! Positional decoding of message bodies into typed envelopes.

use crate::{
    bus::{ObjectPath, Value},
    error::Error,
    event::{Address, Domain, EntryGroupState, HostName, Record, Service, ServiceType},
    Result,
};
use std::convert::TryFrom;

/// Reads the fields of a body in order, checking the type of each one.
///
/// A body decodes either completely or not at all: a missing field, a field
/// of the wrong type or a trailing field is an [`Error::Decode`].
pub(crate) struct BodyReader<'a> {
    fields: &'a [Value],
    pos: usize,
}

macro_rules! read_scalar {
    ($name:ident, $variant:ident, $ty:ty, $expected:expr) => {
        pub fn $name(&mut self) -> Result<$ty> {
            match self.next_field($expected)? {
                Value::$variant(v) => Ok(*v),
                other => Err(self.mismatch($expected, other)),
            }
        }
    };
}

impl<'a> BodyReader<'a> {
    pub fn new(fields: &'a [Value]) -> Self {
        Self { fields, pos: 0 }
    }

    fn next_field(&mut self, expected: &str) -> Result<&'a Value> {
        let fields: &'a [Value] = self.fields;
        let pos = self.pos;
        let field = fields.get(pos).ok_or_else(|| {
            Error::Decode(format!(
                "missing field {} ({}), body has {} field(s)",
                pos,
                expected,
                fields.len()
            ))
        })?;
        self.pos += 1;
        Ok(field)
    }

    fn mismatch(&self, expected: &str, found: &Value) -> Error {
        Error::Decode(format!(
            "field {}: expected {}, found {}",
            self.pos - 1,
            expected,
            found.type_name()
        ))
    }

    read_scalar!(read_bool, Bool, bool, "bool");
    read_scalar!(read_i16, Int16, i16, "int16");
    read_scalar!(read_u16, UInt16, u16, "uint16");
    read_scalar!(read_i32, Int32, i32, "int32");
    read_scalar!(read_u32, UInt32, u32, "uint32");

    pub fn read_string(&mut self) -> Result<String> {
        match self.next_field("string")? {
            Value::Str(s) => Ok(s.clone()),
            other => Err(self.mismatch("string", other)),
        }
    }

    pub fn read_path(&mut self) -> Result<ObjectPath> {
        match self.next_field("object path")? {
            Value::Path(p) => Ok(p.clone()),
            other => Err(self.mismatch("object path", other)),
        }
    }

    /// Reads a byte sequence. The bytes are copied out of the body.
    pub fn read_bytes(&mut self) -> Result<Vec<u8>> {
        match self.next_field("byte array")? {
            Value::Bytes(b) => Ok(b.clone()),
            other => Err(self.mismatch("byte array", other)),
        }
    }

    /// Reads a sequence of byte sequences, copying every one of them.
    pub fn read_byte_arrays(&mut self) -> Result<Vec<Vec<u8>>> {
        match self.next_field("array of byte arrays")? {
            Value::ByteArrays(v) => Ok(v.clone()),
            other => Err(self.mismatch("array of byte arrays", other)),
        }
    }

    /// Reads an `int32` protocol code.
    pub fn read_protocol(&mut self) -> Result<crate::Protocol> {
        let code = self.read_i32()?;
        crate::Protocol::try_from(code)
    }

    /// Fails if any field was left unread.
    pub fn finish(self) -> Result<()> {
        if self.pos != self.fields.len() {
            return Err(Error::Decode(format!(
                "expected {} field(s), body has {}",
                self.pos,
                self.fields.len()
            )));
        }
        Ok(())
    }
}

/// Types that decode from one whole body.
///
/// ```compile_fail
/// use avahi_bus::FromBody;
/// ```
pub(crate) trait FromBody: Sized {
    fn from_body(body: &[Value]) -> Result<Self>;
}

/// Reply of a `*New` call: the path of the newly created object.
impl FromBody for ObjectPath {
    fn from_body(body: &[Value]) -> Result<Self> {
        let mut reader = BodyReader::new(body);
        let path = reader.read_path()?;
        reader.finish()?;
        Ok(path)
    }
}

macro_rules! from_single_field {
    ($ty:ty, $read:ident) => {
        impl FromBody for $ty {
            fn from_body(body: &[Value]) -> Result<Self> {
                let mut reader = BodyReader::new(body);
                let v = reader.$read()?;
                reader.finish()?;
                Ok(v)
            }
        }
    };
}

from_single_field!(bool, read_bool);
from_single_field!(i32, read_i32);
from_single_field!(u32, read_u32);
from_single_field!(String, read_string);

/// Empty reply.
impl FromBody for () {
    fn from_body(body: &[Value]) -> Result<Self> {
        BodyReader::new(body).finish()
    }
}

/// `(iface, proto, domain, flags)`
impl FromBody for Domain {
    fn from_body(body: &[Value]) -> Result<Self> {
        let mut r = BodyReader::new(body);
        let domain = Domain {
            interface: r.read_i32()?,
            protocol: r.read_protocol()?,
            domain: r.read_string()?,
            flags: r.read_u32()?,
        };
        r.finish()?;
        Ok(domain)
    }
}

/// `(iface, proto, name, aproto, address, flags)`
impl FromBody for HostName {
    fn from_body(body: &[Value]) -> Result<Self> {
        let mut r = BodyReader::new(body);
        let host = HostName {
            interface: r.read_i32()?,
            protocol: r.read_protocol()?,
            name: r.read_string()?,
            address_protocol: r.read_protocol()?,
            address: r.read_string()?,
            flags: r.read_u32()?,
        };
        r.finish()?;
        Ok(host)
    }
}

/// `(iface, proto, aproto, address, name, flags)`
impl FromBody for Address {
    fn from_body(body: &[Value]) -> Result<Self> {
        let mut r = BodyReader::new(body);
        let addr = Address {
            interface: r.read_i32()?,
            protocol: r.read_protocol()?,
            address_protocol: r.read_protocol()?,
            address: r.read_string()?,
            name: r.read_string()?,
            flags: r.read_u32()?,
        };
        r.finish()?;
        Ok(addr)
    }
}

/// `(iface, proto, type, domain, flags)`
impl FromBody for ServiceType {
    fn from_body(body: &[Value]) -> Result<Self> {
        let mut r = BodyReader::new(body);
        let ty = ServiceType {
            interface: r.read_i32()?,
            protocol: r.read_protocol()?,
            service_type: r.read_string()?,
            domain: r.read_string()?,
            flags: r.read_u32()?,
        };
        r.finish()?;
        Ok(ty)
    }
}

/// `(iface, proto, name, class, type, rdata, flags)`
impl FromBody for Record {
    fn from_body(body: &[Value]) -> Result<Self> {
        let mut r = BodyReader::new(body);
        let record = Record {
            interface: r.read_i32()?,
            protocol: r.read_protocol()?,
            name: r.read_string()?,
            class: r.read_u16()?,
            record_type: r.read_u16()?,
            rdata: r.read_bytes()?,
            flags: r.read_u32()?,
        };
        r.finish()?;
        Ok(record)
    }
}

/// `(state, error)`
impl FromBody for EntryGroupState {
    fn from_body(body: &[Value]) -> Result<Self> {
        let mut r = BodyReader::new(body);
        let state = EntryGroupState {
            state: crate::EntryGroupStateKind::try_from(r.read_i32()?)?,
            error: r.read_string()?,
        };
        r.finish()?;
        Ok(state)
    }
}

/// A fully resolved service:
/// `(iface, proto, name, type, domain, host, aproto, address, port, txt, flags)`
impl FromBody for Service {
    fn from_body(body: &[Value]) -> Result<Self> {
        let mut r = BodyReader::new(body);
        let service = Service {
            interface: r.read_i32()?,
            protocol: r.read_protocol()?,
            name: r.read_string()?,
            service_type: r.read_string()?,
            domain: r.read_string()?,
            host: r.read_string()?,
            address_protocol: r.read_protocol()?,
            address: r.read_string()?,
            port: r.read_u16()?,
            txt: r.read_byte_arrays()?,
            flags: r.read_u32()?,
        };
        r.finish()?;
        Ok(service)
    }
}

impl Service {
    /// Decodes a service browser item:
    /// `(iface, proto, name, type, domain, flags)`.
    ///
    /// Fields only known after resolving are left empty.
    pub(crate) fn from_browse_item(body: &[Value]) -> Result<Self> {
        let mut r = BodyReader::new(body);
        let service = Service {
            interface: r.read_i32()?,
            protocol: r.read_protocol()?,
            name: r.read_string()?,
            service_type: r.read_string()?,
            domain: r.read_string()?,
            host: String::new(),
            address_protocol: crate::Protocol::Unspec,
            address: String::new(),
            port: 0,
            txt: Vec::new(),
            flags: r.read_u32()?,
        };
        r.finish()?;
        Ok(service)
    }
}
