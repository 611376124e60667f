//! Browsers: subscriptions that stream an unbounded sequence of
//! added/removed items until freed.

#[cfg(feature = "logging")]
use crate::log::{debug, trace};
use crate::{
    body::FromBody,
    bus::{Bus, ObjectPath, Value},
    event::{Domain, Record, Service, ServiceType},
    subscription::{
        sealed::Sealed, Delivery, Endpoint, Outlet, RemoteObject, Subscription, Teardown,
    },
    Receiver, Result,
};
use std::sync::Arc;

const ITEM_NEW: &str = "ItemNew";
const ITEM_REMOVE: &str = "ItemRemove";

/// An item reported by one kind of browser.
pub trait BrowseItem: Sized + Send + 'static {
    /// Interface of the remote browser object.
    const INTERFACE: &'static str;

    /// Decodes the body of an `ItemNew` or `ItemRemove` signal.
    fn decode_item(body: &[Value]) -> Result<Self>;
}

impl BrowseItem for Domain {
    const INTERFACE: &'static str = "org.freedesktop.Avahi.DomainBrowser";

    fn decode_item(body: &[Value]) -> Result<Self> {
        Self::from_body(body)
    }
}

impl BrowseItem for Service {
    const INTERFACE: &'static str = "org.freedesktop.Avahi.ServiceBrowser";

    fn decode_item(body: &[Value]) -> Result<Self> {
        Self::from_browse_item(body)
    }
}

impl BrowseItem for ServiceType {
    const INTERFACE: &'static str = "org.freedesktop.Avahi.ServiceTypeBrowser";

    fn decode_item(body: &[Value]) -> Result<Self> {
        Self::from_body(body)
    }
}

impl BrowseItem for Record {
    const INTERFACE: &'static str = "org.freedesktop.Avahi.RecordBrowser";

    fn decode_item(body: &[Value]) -> Result<Self> {
        Self::from_body(body)
    }
}

/// Browses for domains.
pub type DomainBrowser = Browser<Domain>;

/// Browses for service instances of one type.
pub type ServiceBrowser = Browser<Service>;

/// Browses for service types in a domain.
pub type ServiceTypeBrowser = Browser<ServiceType>;

/// Browses for raw DNS records.
pub type RecordBrowser = Browser<Record>;

/// A browser subscription.
///
/// Items appearing on the network are delivered on [`added`](Browser::added),
/// items going away on [`removed`](Browser::removed). Both channels end when
/// the browser is freed.
pub struct Browser<E> {
    remote: RemoteObject,
    teardown: Teardown,
    added: Outlet<E>,
    removed: Outlet<E>,
}

impl<E: BrowseItem> Browser<E> {
    pub(crate) fn new(
        bus: Arc<dyn Bus>,
        path: ObjectPath,
        capacity: usize,
        shutdown: Receiver<()>,
    ) -> Self {
        Self {
            remote: RemoteObject::new(bus, path, E::INTERFACE),
            teardown: Teardown::new(shutdown),
            added: Outlet::new(capacity),
            removed: Outlet::new(capacity),
        }
    }

    /// Returns a receiver of the items that appeared.
    pub fn added(&self) -> Receiver<E> {
        self.added.receiver()
    }

    /// Returns a receiver of the items that went away.
    pub fn removed(&self) -> Receiver<E> {
        self.removed.receiver()
    }
}

impl<E: BrowseItem> Sealed for Browser<E> {}

impl<E: BrowseItem> Subscription for Browser<E> {
    fn path(&self) -> &ObjectPath {
        self.remote.path()
    }
}

impl<E: BrowseItem> Endpoint for Browser<E> {
    fn dispatch_signal(&self, name: &str, body: &[Value]) -> Result<()> {
        let outlet = if self.remote.is_member(name, ITEM_NEW) {
            &self.added
        } else if self.remote.is_member(name, ITEM_REMOVE) {
            &self.removed
        } else {
            trace!("{}: ignored signal {}", self.path(), name);
            return Ok(());
        };

        let item = E::decode_item(body)?;
        if outlet.deliver(item, &self.teardown) == Delivery::Dropped {
            debug!("{}: dropped {} during teardown", self.path(), name);
        }
        Ok(())
    }

    fn free(&self) {
        if !self.teardown.request() {
            return;
        }
        self.remote.release();
        self.added.close();
        self.removed.close();
    }
}
