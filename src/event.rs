//! Typed events decoded from daemon signals and replies.
//!
//! All envelopes are plain values: they are produced by decoding a body
//! and handed to the consumer of a subscription as is.

use crate::{error::Error, Result};
use std::convert::TryFrom;

/// Interface index meaning "all interfaces".
pub const IF_UNSPEC: i32 = -1;

/// Network protocol family of a lookup or an address.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// IPv4
    Inet,
    /// IPv6
    Inet6,
    /// Unspecified, i.e. all protocols.
    Unspec,
}

impl From<Protocol> for i32 {
    fn from(val: Protocol) -> Self {
        match val {
            Protocol::Inet => 0,
            Protocol::Inet6 => 1,
            Protocol::Unspec => -1,
        }
    }
}

impl TryFrom<i32> for Protocol {
    type Error = Error;

    fn try_from(val: i32) -> Result<Self> {
        match val {
            0 => Ok(Self::Inet),
            1 => Ok(Self::Inet6),
            -1 => Ok(Self::Unspec),
            x => Err(Error::Decode(format!("unknown protocol {}", x))),
        }
    }
}

/// A browsing or registration domain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Domain {
    pub interface: i32,
    pub protocol: Protocol,
    pub domain: String,
    pub flags: u32,
}

/// A host name resolved to an address.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HostName {
    pub interface: i32,
    pub protocol: Protocol,
    pub name: String,
    pub address_protocol: Protocol,
    pub address: String,
    pub flags: u32,
}

/// An address resolved to a host name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Address {
    pub interface: i32,
    pub protocol: Protocol,
    pub address_protocol: Protocol,
    pub address: String,
    pub name: String,
    pub flags: u32,
}

/// A service type available in a domain, e.g. `_http._tcp`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceType {
    pub interface: i32,
    pub protocol: Protocol,
    pub service_type: String,
    pub domain: String,
    pub flags: u32,
}

/// A service instance.
///
/// Browsers only fill in the identity of the instance (interface, protocol,
/// name, type, domain and flags). Resolvers fill in every field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Service {
    pub interface: i32,
    pub protocol: Protocol,
    pub name: String,
    pub service_type: String,
    pub domain: String,
    pub host: String,
    pub address_protocol: Protocol,
    pub address: String,
    pub port: u16,
    /// TXT records in wire order.
    pub txt: Vec<Vec<u8>>,
    pub flags: u32,
}

/// A raw DNS resource record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub interface: i32,
    pub protocol: Protocol,
    pub name: String,
    pub class: u16,
    pub record_type: u16,
    pub rdata: Vec<u8>,
    pub flags: u32,
}

/// States of an entry group.
///
/// ```text
/// Uncommitted --commit--> Registering --> Established
///      ^                              \-> Collision
///      |                               \-> Failure
///      +------------- reset ------------------+
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryGroupStateKind {
    /// The group has not been committed yet.
    Uncommitted,
    /// The entries of the group are being registered.
    Registering,
    /// The entries have been established on the network.
    Established,
    /// A name collision was detected; the entries were withdrawn.
    Collision,
    /// Some failure happened; the entries were withdrawn.
    Failure,
}

impl TryFrom<i32> for EntryGroupStateKind {
    type Error = Error;

    fn try_from(val: i32) -> Result<Self> {
        match val {
            0 => Ok(Self::Uncommitted),
            1 => Ok(Self::Registering),
            2 => Ok(Self::Established),
            3 => Ok(Self::Collision),
            4 => Ok(Self::Failure),
            x => Err(Error::Decode(format!("unknown entry group state {}", x))),
        }
    }
}

/// A state change of an entry group.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryGroupState {
    pub state: EntryGroupStateKind,
    /// Empty unless the daemon attached an error to the transition.
    pub error: String,
}

/// States of the daemon itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ServerState {
    /// Invalid state (initial).
    Invalid,
    /// Host records are being registered.
    Registering,
    /// All host records have been established.
    Running,
    /// A host record collided; a new host name should be set.
    Collision,
    /// A fatal failure happened; the daemon cannot proceed.
    Failure,
}

impl TryFrom<i32> for ServerState {
    type Error = Error;

    fn try_from(val: i32) -> Result<Self> {
        match val {
            0 => Ok(Self::Invalid),
            1 => Ok(Self::Registering),
            2 => Ok(Self::Running),
            3 => Ok(Self::Collision),
            4 => Ok(Self::Failure),
            x => Err(Error::Decode(format!("unknown server state {}", x))),
        }
    }
}

/// What kind of domains a domain browser looks for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DomainBrowserType {
    /// Domains recommended for browsing.
    Browse,
    /// The default domain for browsing.
    BrowseDefault,
    /// Domains recommended for registering services.
    Register,
    /// The default domain for registering services.
    RegisterDefault,
    /// Legacy browsing domains.
    BrowseLegacy,
}

impl From<DomainBrowserType> for u32 {
    fn from(val: DomainBrowserType) -> Self {
        match val {
            DomainBrowserType::Browse => 0,
            DomainBrowserType::BrowseDefault => 1,
            DomainBrowserType::Register => 2,
            DomainBrowserType::RegisterDefault => 3,
            DomainBrowserType::BrowseLegacy => 4,
        }
    }
}
