//! The boundary to the message bus transport.
//!
//! This library does not speak the bus wire protocol itself. Instead it
//! relies on an already connected bus client that implements [`Bus`]: a
//! synchronous call primitive plus one ordered feed of inbound signals.

use crate::{Receiver, Result};
use std::fmt;

/// Well-known bus name of the Avahi daemon.
pub const AVAHI_SERVICE: &str = "org.freedesktop.Avahi";

/// Prefix shared by every interface the daemon implements.
pub const AVAHI_INTERFACE_PREFIX: &str = "org.freedesktop.Avahi";

/// The match rule installed at startup: every signal under the daemon's
/// interface namespace.
pub const MATCH_RULE_DEFAULT: &str = "type='signal',interface='org.freedesktop.Avahi.*'";

pub(crate) const SERVER_PATH: &str = "/";

pub(crate) const SERVER_INTERFACE: &str = "org.freedesktop.Avahi.Server";

/// Returns the interface-qualified name of `member` in `interface`,
/// e.g. `org.freedesktop.Avahi.ServiceBrowser.ItemNew`.
pub(crate) fn qualified(interface: &str, member: &str) -> String {
    format!("{}.{}", interface, member)
}

/// Identity of one remote object on the bus.
///
/// Paths are assigned by the daemon and are treated as opaque keys: no
/// structure is parsed or derived from them.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ObjectPath(String);

impl ObjectPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ObjectPath {
    fn from(val: &str) -> Self {
        Self::new(val)
    }
}

impl From<String> for ObjectPath {
    fn from(val: String) -> Self {
        Self(val)
    }
}

/// One untyped field in the body of a call, a reply or a signal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Bool(bool),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Str(String),
    Path(ObjectPath),
    /// A byte sequence (`ay`).
    Bytes(Vec<u8>),
    /// A sequence of byte sequences (`aay`), e.g. TXT records.
    ByteArrays(Vec<Vec<u8>>),
}

impl Value {
    /// The short type name used in decode errors.
    pub(crate) fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int16(_) => "int16",
            Self::UInt16(_) => "uint16",
            Self::Int32(_) => "int32",
            Self::UInt32(_) => "uint32",
            Self::Str(_) => "string",
            Self::Path(_) => "object path",
            Self::Bytes(_) => "byte array",
            Self::ByteArrays(_) => "array of byte arrays",
        }
    }
}

impl From<bool> for Value {
    fn from(val: bool) -> Self {
        Self::Bool(val)
    }
}

impl From<i16> for Value {
    fn from(val: i16) -> Self {
        Self::Int16(val)
    }
}

impl From<u16> for Value {
    fn from(val: u16) -> Self {
        Self::UInt16(val)
    }
}

impl From<i32> for Value {
    fn from(val: i32) -> Self {
        Self::Int32(val)
    }
}

impl From<u32> for Value {
    fn from(val: u32) -> Self {
        Self::UInt32(val)
    }
}

impl From<&str> for Value {
    fn from(val: &str) -> Self {
        Self::Str(val.to_string())
    }
}

impl From<String> for Value {
    fn from(val: String) -> Self {
        Self::Str(val)
    }
}

impl From<ObjectPath> for Value {
    fn from(val: ObjectPath) -> Self {
        Self::Path(val)
    }
}

impl From<&[u8]> for Value {
    fn from(val: &[u8]) -> Self {
        Self::Bytes(val.to_vec())
    }
}

impl From<Vec<u8>> for Value {
    fn from(val: Vec<u8>) -> Self {
        Self::Bytes(val)
    }
}

impl From<&[Vec<u8>]> for Value {
    fn from(val: &[Vec<u8>]) -> Self {
        Self::ByteArrays(val.to_vec())
    }
}

impl From<Vec<Vec<u8>>> for Value {
    fn from(val: Vec<Vec<u8>>) -> Self {
        Self::ByteArrays(val)
    }
}

/// An inbound signal as delivered by the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signal {
    /// Path of the remote object that emitted the signal.
    pub path: ObjectPath,

    /// Interface-qualified member name, e.g.
    /// `org.freedesktop.Avahi.ServiceBrowser.ItemNew`.
    pub name: String,

    /// Body fields in wire order.
    pub body: Vec<Value>,
}

impl Signal {
    pub fn new(path: impl Into<ObjectPath>, name: impl Into<String>, body: Vec<Value>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            body,
        }
    }
}

/// A connected message bus client.
///
/// Implementations must be safe to call from several threads at once.
/// Transport failures are reported as [`Error::Transport`](crate::Error::Transport),
/// error replies from the daemon as [`Error::Protocol`](crate::Error::Protocol).
pub trait Bus: Send + Sync {
    /// Calls `member` (interface-qualified) on the daemon object at `path`
    /// and returns the reply body.
    fn call(&self, path: &ObjectPath, member: &str, args: Vec<Value>) -> Result<Vec<Value>>;

    /// Asks the bus to route signals matching `rule` to this connection.
    fn add_match(&self, rule: &str) -> Result<()>;

    /// Returns the single ordered feed of inbound signals.
    ///
    /// The feed ends (disconnects) when the transport can no longer deliver
    /// signals.
    fn signals(&self) -> Result<Receiver<Signal>>;

    /// Closes the connection.
    fn close(&self);
}
