//! Resolvers: subscriptions that answer one query with a `Found` event.

#[cfg(feature = "logging")]
use crate::log::{debug, trace};
use crate::{
    body::FromBody,
    bus::{Bus, ObjectPath, Value},
    event::{Address, HostName, Service},
    subscription::{
        sealed::Sealed, Delivery, Endpoint, Outlet, RemoteObject, Subscription, Teardown,
    },
    Receiver, Result,
};
use std::sync::Arc;

const FOUND: &str = "Found";

/// The result of one kind of resolver.
pub trait Resolved: Sized + Send + 'static {
    /// Interface of the remote resolver object.
    const INTERFACE: &'static str;

    /// Decodes the body of a `Found` signal.
    fn decode_found(body: &[Value]) -> Result<Self>;
}

impl Resolved for Address {
    const INTERFACE: &'static str = "org.freedesktop.Avahi.AddressResolver";

    fn decode_found(body: &[Value]) -> Result<Self> {
        Self::from_body(body)
    }
}

impl Resolved for HostName {
    const INTERFACE: &'static str = "org.freedesktop.Avahi.HostNameResolver";

    fn decode_found(body: &[Value]) -> Result<Self> {
        Self::from_body(body)
    }
}

impl Resolved for Service {
    const INTERFACE: &'static str = "org.freedesktop.Avahi.ServiceResolver";

    fn decode_found(body: &[Value]) -> Result<Self> {
        Self::from_body(body)
    }
}

/// Resolves an address to a host name.
pub type AddressResolver = Resolver<Address>;

/// Resolves a host name to an address.
pub type HostNameResolver = Resolver<HostName>;

/// Resolves a service instance to its host, address, port and TXT records.
pub type ServiceResolver = Resolver<Service>;

/// A resolver subscription.
///
/// The daemon reports the answer once on [`found`](Resolver::found); the
/// caller is then expected to free the resolver.
pub struct Resolver<E> {
    remote: RemoteObject,
    teardown: Teardown,
    found: Outlet<E>,
}

impl<E: Resolved> Resolver<E> {
    pub(crate) fn new(
        bus: Arc<dyn Bus>,
        path: ObjectPath,
        capacity: usize,
        shutdown: Receiver<()>,
    ) -> Self {
        Self {
            remote: RemoteObject::new(bus, path, E::INTERFACE),
            teardown: Teardown::new(shutdown),
            found: Outlet::new(capacity),
        }
    }

    /// Returns a receiver of the resolved result.
    pub fn found(&self) -> Receiver<E> {
        self.found.receiver()
    }
}

impl<E: Resolved> Sealed for Resolver<E> {}

impl<E: Resolved> Subscription for Resolver<E> {
    fn path(&self) -> &ObjectPath {
        self.remote.path()
    }
}

impl<E: Resolved> Endpoint for Resolver<E> {
    fn dispatch_signal(&self, name: &str, body: &[Value]) -> Result<()> {
        if !self.remote.is_member(name, FOUND) {
            trace!("{}: ignored signal {}", self.path(), name);
            return Ok(());
        }

        let found = E::decode_found(body)?;
        if self.found.deliver(found, &self.teardown) == Delivery::Dropped {
            debug!("{}: dropped {} during teardown", self.path(), name);
        }
        Ok(())
    }

    fn free(&self) {
        if !self.teardown.request() {
            return;
        }
        self.remote.release();
        self.found.close();
    }
}

#[cfg(test)]
mod tests {
    use super::{AddressResolver, HostNameResolver};
    use crate::{
        bus::{testing::RecordingBus, ObjectPath, Value},
        event::Protocol,
        subscription::Endpoint,
    };
    use flume::bounded;
    use std::sync::Arc;

    #[test]
    fn test_host_name_found() {
        let bus = Arc::new(RecordingBus::new());
        let (_trigger, shutdown) = bounded(1);
        let resolver = HostNameResolver::new(
            bus,
            ObjectPath::new("/Client1/HostNameResolver1"),
            10,
            shutdown,
        );

        let body = vec![
            Value::Int32(2),
            Value::Int32(1),
            Value::from("nas.local"),
            Value::Int32(1),
            Value::from("fe80::1"),
            Value::UInt32(0),
        ];
        resolver
            .dispatch_signal("org.freedesktop.Avahi.HostNameResolver.Found", &body)
            .unwrap();
        // Failure is not a Found event.
        resolver
            .dispatch_signal(
                "org.freedesktop.Avahi.HostNameResolver.Failure",
                &[Value::from("Timeout reached")],
            )
            .unwrap();

        let found = resolver.found();
        let host = found.try_recv().unwrap();
        assert_eq!(host.address_protocol, Protocol::Inet6);
        assert_eq!(host.address, "fe80::1");
        assert!(found.try_recv().is_err());
    }

    #[test]
    fn test_short_body_is_not_delivered() {
        let bus = Arc::new(RecordingBus::new());
        let (_trigger, shutdown) = bounded(1);
        let resolver =
            AddressResolver::new(bus, ObjectPath::new("/Client1/AddressResolver1"), 10, shutdown);

        let body = vec![
            Value::Int32(2),
            Value::Int32(0),
            Value::Int32(0),
            Value::from("192.168.1.20"),
            Value::from("printer.local"),
        ];
        assert!(resolver
            .dispatch_signal("org.freedesktop.Avahi.AddressResolver.Found", &body)
            .is_err());
        assert!(resolver.found().is_empty());
    }
}
