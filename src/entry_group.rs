//! Entry groups: sets of records published by this client.

#[cfg(feature = "logging")]
use crate::log::{debug, trace};
use crate::{
    body::FromBody,
    bus::{Bus, ObjectPath, Value},
    event::{EntryGroupState, EntryGroupStateKind, Protocol},
    subscription::{
        sealed::Sealed, Delivery, Endpoint, Outlet, RemoteObject, Subscription, Teardown,
    },
    Receiver, Result,
};
use std::{convert::TryFrom, sync::Arc};

const INTERFACE: &str = "org.freedesktop.Avahi.EntryGroup";
const STATE_CHANGED: &str = "StateChanged";

/// A group of services, addresses and records published together.
///
/// Entries are added while the group is uncommitted, then published with
/// [`commit`](EntryGroup::commit). The daemon reports every state
/// transition on [`state_changed`](EntryGroup::state_changed):
/// `Registering`, then `Established`, `Collision` or `Failure`.
/// [`reset`](EntryGroup::reset) withdraws all entries and returns the group
/// to `Uncommitted`.
pub struct EntryGroup {
    remote: RemoteObject,
    teardown: Teardown,
    state_changed: Outlet<EntryGroupState>,
}

impl EntryGroup {
    pub(crate) fn new(
        bus: Arc<dyn Bus>,
        path: ObjectPath,
        capacity: usize,
        shutdown: Receiver<()>,
    ) -> Self {
        Self {
            remote: RemoteObject::new(bus, path, INTERFACE),
            teardown: Teardown::new(shutdown),
            state_changed: Outlet::new(capacity),
        }
    }

    /// Returns a receiver of the state changes of this group.
    pub fn state_changed(&self) -> Receiver<EntryGroupState> {
        self.state_changed.receiver()
    }

    /// Publishes the entries of the group.
    pub fn commit(&self) -> Result<()> {
        self.remote.call("Commit", Vec::new())
    }

    /// Withdraws all entries and empties the group.
    pub fn reset(&self) -> Result<()> {
        self.remote.call("Reset", Vec::new())
    }

    pub fn get_state(&self) -> Result<EntryGroupStateKind> {
        let code: i32 = self.remote.call("GetState", Vec::new())?;
        EntryGroupStateKind::try_from(code)
    }

    /// Returns `true` if no entry was added since creation or last reset.
    pub fn is_empty(&self) -> Result<bool> {
        self.remote.call("IsEmpty", Vec::new())
    }

    /// Adds a service instance `name` of `service_type`.
    ///
    /// An empty `domain` or `host` lets the daemon fill in its defaults.
    #[allow(clippy::too_many_arguments)]
    pub fn add_service(
        &self,
        interface: i32,
        protocol: Protocol,
        flags: u32,
        name: &str,
        service_type: &str,
        domain: &str,
        host: &str,
        port: u16,
        txt: &[Vec<u8>],
    ) -> Result<()> {
        self.remote.call(
            "AddService",
            vec![
                interface.into(),
                i32::from(protocol).into(),
                flags.into(),
                name.into(),
                service_type.into(),
                domain.into(),
                host.into(),
                port.into(),
                txt.into(),
            ],
        )
    }

    /// Adds a subtype, e.g. `_printer._sub._http._tcp`, to a service
    /// already in the group.
    #[allow(clippy::too_many_arguments)]
    pub fn add_service_subtype(
        &self,
        interface: i32,
        protocol: Protocol,
        flags: u32,
        name: &str,
        service_type: &str,
        domain: &str,
        subtype: &str,
    ) -> Result<()> {
        self.remote.call(
            "AddServiceSubtype",
            vec![
                interface.into(),
                i32::from(protocol).into(),
                flags.into(),
                name.into(),
                service_type.into(),
                domain.into(),
                subtype.into(),
            ],
        )
    }

    /// Replaces the TXT records of a service already published.
    #[allow(clippy::too_many_arguments)]
    pub fn update_service_txt(
        &self,
        interface: i32,
        protocol: Protocol,
        flags: u32,
        name: &str,
        service_type: &str,
        domain: &str,
        txt: &[Vec<u8>],
    ) -> Result<()> {
        self.remote.call(
            "UpdateServiceTxt",
            vec![
                interface.into(),
                i32::from(protocol).into(),
                flags.into(),
                name.into(),
                service_type.into(),
                domain.into(),
                txt.into(),
            ],
        )
    }

    /// Adds an address record and its reverse mapping for host `name`.
    pub fn add_address(
        &self,
        interface: i32,
        protocol: Protocol,
        flags: u32,
        name: &str,
        address: &str,
    ) -> Result<()> {
        self.remote.call(
            "AddAddress",
            vec![
                interface.into(),
                i32::from(protocol).into(),
                flags.into(),
                name.into(),
                address.into(),
            ],
        )
    }

    /// Adds a raw DNS record.
    #[allow(clippy::too_many_arguments)]
    pub fn add_record(
        &self,
        interface: i32,
        protocol: Protocol,
        flags: u32,
        name: &str,
        class: u16,
        record_type: u16,
        ttl: u32,
        rdata: &[u8],
    ) -> Result<()> {
        self.remote.call(
            "AddRecord",
            vec![
                interface.into(),
                i32::from(protocol).into(),
                flags.into(),
                name.into(),
                class.into(),
                record_type.into(),
                ttl.into(),
                rdata.into(),
            ],
        )
    }
}

impl Sealed for EntryGroup {}

impl Subscription for EntryGroup {
    fn path(&self) -> &ObjectPath {
        self.remote.path()
    }
}

impl Endpoint for EntryGroup {
    fn dispatch_signal(&self, name: &str, body: &[Value]) -> Result<()> {
        if !self.remote.is_member(name, STATE_CHANGED) {
            trace!("{}: ignored signal {}", self.path(), name);
            return Ok(());
        }

        let state = EntryGroupState::from_body(body)?;
        trace!("{}: state changed to {:?}", self.path(), state.state);
        if self.state_changed.deliver(state, &self.teardown) == Delivery::Dropped {
            debug!("{}: dropped {} during teardown", self.path(), name);
        }
        Ok(())
    }

    fn free(&self) {
        if !self.teardown.request() {
            return;
        }
        self.remote.release();
        self.state_changed.close();
    }
}
