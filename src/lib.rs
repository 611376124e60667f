//! A small and safe client library for the Avahi mDNS daemon.
//!
//! The daemon lives in another process and is reachable only through a
//! message bus (D-Bus). It exposes many remote objects, such as service
//! browsers, resolvers and entry groups, which report their results
//! asynchronously as bus signals. This library keeps one [`Server`] per bus
//! connection; the server runs a single dispatch thread that takes every
//! signal from the bus and forwards it, decoded, to the subscription that
//! owns the signal's object path. Each subscription hands its events to the
//! application through [`flume`](https://crates.io/crates/flume) channels,
//! which support both `recv()` and `recv_async()`.
//!
//! For example, a client browsing for a service type behaves like this:
//!```text
//!  Client        Server / dispatch thread         Avahi daemon
//!    |                      |                           |
//!    | service_browser_new  |  --- ServiceBrowserNew -> |
//!    |  <- ServiceBrowser - |  <-- object path -------- |
//!    |                      |  <-- ItemNew signal ----- |
//!    |  <-- added(A) -----  |                           |
//!    |                      |  <-- ItemRemove signal -- |
//!    |  <-- removed(A) ---  |                           |
//!    | service_browser_free |  --- Free --------------> |
//!```
//!
//! The bus transport itself is not part of this library. Any connected bus
//! client can be plugged in by implementing the [`Bus`] trait.
//!
//! # Usage
//!
//! ```rust,ignore
//! use avahi_bus::{Server, IF_UNSPEC, Protocol};
//!
//! let server = Server::new(bus)?;
//! let browser = server.service_browser_new(IF_UNSPEC, Protocol::Unspec, "_http._tcp", "local", 0)?;
//!
//! let added = browser.added();
//! std::thread::spawn(move || {
//!     while let Ok(service) = added.recv() {
//!         println!("found {} in {}", service.name, service.domain);
//!     }
//! });
//!
//! // Later on.
//! server.service_browser_free(&browser);
//! server.close();
//! ```
//!
//! # Subscription lifetime
//!
//! Every subscription is bound to one remote object. Freeing it, either
//! explicitly through the `*_free` methods or implicitly by
//! [`Server::close`], releases the remote object and closes the delivery
//! channels, so consumers observe the end of the stream. A delivery that is
//! still waiting on a full channel when its subscription is freed is
//! dropped.

#![forbid(unsafe_code)]

// log for logging (optional).
#[cfg(feature = "logging")]
mod log {
    pub(crate) use ::log::{debug, error, trace};
}

#[cfg(not(feature = "logging"))]
#[macro_use]
mod log {
    macro_rules! trace {
        ($($arg:expr),*) => {
            {
                let _ = ($($arg),*); // avoid warnings about unused variables.
            }
        };
    }

    macro_rules! debug {
        ($($arg:expr),*) => {
            {
                let _ = ($($arg),*);
            }
        };
    }

    macro_rules! error {
        ($($arg:expr),*) => {
            {
                let _ = ($($arg),*);
            }
        };
    }
}

mod body;
mod browser;
mod bus;
mod dispatch;
mod entry_group;
mod error;
mod event;
mod registry;
mod resolver;
mod server;
mod subscription;

pub use browser::{
    BrowseItem, Browser, DomainBrowser, RecordBrowser, ServiceBrowser, ServiceTypeBrowser,
};
pub use bus::{
    Bus, ObjectPath, Signal, Value, AVAHI_INTERFACE_PREFIX, AVAHI_SERVICE, MATCH_RULE_DEFAULT,
};
pub use dispatch::{Metrics, ServerEvent};
pub use entry_group::EntryGroup;
pub use error::{Error, Result};
pub use event::{
    Address, Domain, DomainBrowserType, EntryGroupState, EntryGroupStateKind, HostName, Protocol,
    Record, Service, ServiceType, ServerState, IF_UNSPEC,
};
pub use resolver::{AddressResolver, HostNameResolver, Resolved, Resolver, ServiceResolver};
pub use server::{Server, ServerStatus, EVENT_CAPACITY_DEFAULT};
pub use subscription::Subscription;

/// Re-export from `flume`.
pub use flume::Receiver;
