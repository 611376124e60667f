//! The server: entry point owning the bus, the registry and the dispatch thread.

#[cfg(feature = "logging")]
use crate::log::{debug, error};
use crate::{
    body::FromBody,
    browser::{DomainBrowser, RecordBrowser, ServiceBrowser, ServiceTypeBrowser},
    bus::{Bus, ObjectPath, Value, MATCH_RULE_DEFAULT, SERVER_INTERFACE, SERVER_PATH},
    dispatch::{dispatch_thread, Counter, Metrics, ServerEvent, Shared},
    entry_group::EntryGroup,
    error::{e_fmt, Error},
    event::{Address, DomainBrowserType, HostName, Protocol, ServerState, Service},
    resolver::{AddressResolver, HostNameResolver, ServiceResolver},
    subscription::{lock, Endpoint, RemoteObject, Subscription},
    Receiver, Result,
};
use flume::{bounded, Sender};
use std::{
    convert::TryFrom,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    thread::{self, JoinHandle},
};

/// The default bound of every delivery channel of a subscription.
pub const EVENT_CAPACITY_DEFAULT: usize = 10;

/// Status of a [`Server`].
#[derive(Debug, PartialEq, Clone, Eq)]
#[non_exhaustive]
pub enum ServerStatus {
    /// The dispatch thread is running.
    Running,

    /// The bus signal feed ended and every subscription was freed. Calls
    /// fail with [`Error::Transport`] until the server is closed.
    Disconnected,

    /// The server has been closed.
    Closed,
}

/// A connection to the Avahi daemon.
///
/// Creating a server installs the signal match rule on the bus and spawns
/// one dispatch thread. Every subscription created through the server is
/// registered under its object path, so the dispatch thread can forward the
/// signals of the remote object to it.
///
/// The server is `Sync`: wrap it in an `Arc` to share it between threads.
pub struct Server {
    bus: Arc<dyn Bus>,

    /// The daemon's root object, implementing `org.freedesktop.Avahi.Server`.
    root: RemoteObject,

    shared: Arc<Shared>,

    /// Dropping this sender is the shutdown signal.
    shutdown_trigger: Mutex<Option<Sender<()>>>,
    shutdown: Receiver<()>,

    dispatcher: Mutex<Option<JoinHandle<()>>>,

    event_capacity: AtomicUsize,
}

impl Server {
    /// Creates a server on an already connected `bus` and spawns its
    /// dispatch thread.
    pub fn new(bus: Arc<dyn Bus>) -> Result<Self> {
        bus.add_match(MATCH_RULE_DEFAULT)?;
        let feed = bus.signals()?;

        let shared = Arc::new(Shared::new());
        let (shutdown_trigger, shutdown) = bounded(1);

        let dispatcher = {
            let shared = shared.clone();
            let quit = shutdown.clone();
            thread::Builder::new()
                .name("avahi_dispatch".to_string())
                .spawn(move || dispatch_thread(shared, feed, quit))
                .map_err(|e| e_fmt!("thread builder failed to spawn: {}", e))?
        };

        let root = RemoteObject::new(bus.clone(), ObjectPath::new(SERVER_PATH), SERVER_INTERFACE);

        Ok(Self {
            bus,
            root,
            shared,
            shutdown_trigger: Mutex::new(Some(shutdown_trigger)),
            shutdown,
            dispatcher: Mutex::new(Some(dispatcher)),
            event_capacity: AtomicUsize::new(EVENT_CAPACITY_DEFAULT),
        })
    }

    fn ensure_running(&self) -> Result<()> {
        if self.shutdown.is_disconnected() {
            return Err(Error::Closed);
        }
        if self.shared.is_feed_lost() {
            return Err(Error::Transport("signal feed closed".to_string()));
        }
        Ok(())
    }

    /// Calls `member` on the daemon's root object.
    fn call<R: FromBody>(&self, member: &str, args: Vec<Value>) -> Result<R> {
        self.ensure_running()?;
        self.root.call(member, args)
    }

    /// Creates a remote object with `method` and registers its proxy.
    ///
    /// Nothing is registered if the call fails. The call runs without the
    /// registry held, so the dispatch thread keeps draining the feed; it
    /// parks signals for unknown paths until the creation ends.
    fn create<S, F>(&self, method: &str, args: Vec<Value>, make: F) -> Result<Arc<S>>
    where
        S: Endpoint + 'static,
        F: FnOnce(Arc<dyn Bus>, ObjectPath, usize, Receiver<()>) -> S,
    {
        self.ensure_running()?;
        let capacity = self.event_capacity.load(Ordering::Relaxed);

        let _creation = self.shared.begin_creation();
        let path: ObjectPath = self.root.call(method, args)?;
        let subscription = Arc::new(make(
            self.bus.clone(),
            path,
            capacity,
            self.shutdown.clone(),
        ));
        // Checked under the registry, so `close` or a lost feed frees
        // whatever got in.
        self.shared
            .registry
            .register(subscription.clone(), || self.ensure_running())?;

        debug!("{} created {}", method, subscription.path());
        self.shared
            .increase_counter(Counter::SubscriptionCreated, 1);
        Ok(subscription)
    }

    /// Frees any subscription created by this server.
    ///
    /// The subscription is forgotten, its remote object released and its
    /// channels closed. Freeing a subscription twice is harmless.
    pub fn free(&self, subscription: &dyn Subscription) {
        if self.shared.registry.remove_and_free(subscription.path()) {
            self.shared.increase_counter(Counter::SubscriptionFreed, 1);
        }
    }

    /// Creates a new, empty entry group.
    pub fn entry_group_new(&self) -> Result<Arc<EntryGroup>> {
        self.create("EntryGroupNew", Vec::new(), EntryGroup::new)
    }

    pub fn entry_group_free(&self, group: &EntryGroup) {
        self.free(group)
    }

    /// Starts browsing for domains of `btype`.
    pub fn domain_browser_new(
        &self,
        interface: i32,
        protocol: Protocol,
        domain: &str,
        btype: DomainBrowserType,
        flags: u32,
    ) -> Result<Arc<DomainBrowser>> {
        self.create(
            "DomainBrowserNew",
            vec![
                interface.into(),
                i32::from(protocol).into(),
                domain.into(),
                u32::from(btype).into(),
                flags.into(),
            ],
            DomainBrowser::new,
        )
    }

    pub fn domain_browser_free(&self, browser: &DomainBrowser) {
        self.free(browser)
    }

    /// Starts browsing for service types in `domain`.
    pub fn service_type_browser_new(
        &self,
        interface: i32,
        protocol: Protocol,
        domain: &str,
        flags: u32,
    ) -> Result<Arc<ServiceTypeBrowser>> {
        self.create(
            "ServiceTypeBrowserNew",
            vec![
                interface.into(),
                i32::from(protocol).into(),
                domain.into(),
                flags.into(),
            ],
            ServiceTypeBrowser::new,
        )
    }

    pub fn service_type_browser_free(&self, browser: &ServiceTypeBrowser) {
        self.free(browser)
    }

    /// Starts browsing for instances of `service_type`, e.g. `_http._tcp`,
    /// in `domain`. An empty `domain` browses the default domain.
    pub fn service_browser_new(
        &self,
        interface: i32,
        protocol: Protocol,
        service_type: &str,
        domain: &str,
        flags: u32,
    ) -> Result<Arc<ServiceBrowser>> {
        self.create(
            "ServiceBrowserNew",
            vec![
                interface.into(),
                i32::from(protocol).into(),
                service_type.into(),
                domain.into(),
                flags.into(),
            ],
            ServiceBrowser::new,
        )
    }

    pub fn service_browser_free(&self, browser: &ServiceBrowser) {
        self.free(browser)
    }

    /// Starts browsing for DNS records of `class` and `record_type` named `name`.
    pub fn record_browser_new(
        &self,
        interface: i32,
        protocol: Protocol,
        name: &str,
        class: u16,
        record_type: u16,
        flags: u32,
    ) -> Result<Arc<RecordBrowser>> {
        self.create(
            "RecordBrowserNew",
            vec![
                interface.into(),
                i32::from(protocol).into(),
                name.into(),
                class.into(),
                record_type.into(),
                flags.into(),
            ],
            RecordBrowser::new,
        )
    }

    pub fn record_browser_free(&self, browser: &RecordBrowser) {
        self.free(browser)
    }

    /// Starts resolving the service instance `name`.
    #[allow(clippy::too_many_arguments)]
    pub fn service_resolver_new(
        &self,
        interface: i32,
        protocol: Protocol,
        name: &str,
        service_type: &str,
        domain: &str,
        address_protocol: Protocol,
        flags: u32,
    ) -> Result<Arc<ServiceResolver>> {
        self.create(
            "ServiceResolverNew",
            vec![
                interface.into(),
                i32::from(protocol).into(),
                name.into(),
                service_type.into(),
                domain.into(),
                i32::from(address_protocol).into(),
                flags.into(),
            ],
            ServiceResolver::new,
        )
    }

    pub fn service_resolver_free(&self, resolver: &ServiceResolver) {
        self.free(resolver)
    }

    /// Starts resolving the host `name` to an address of `address_protocol`.
    pub fn host_name_resolver_new(
        &self,
        interface: i32,
        protocol: Protocol,
        name: &str,
        address_protocol: Protocol,
        flags: u32,
    ) -> Result<Arc<HostNameResolver>> {
        self.create(
            "HostNameResolverNew",
            vec![
                interface.into(),
                i32::from(protocol).into(),
                name.into(),
                i32::from(address_protocol).into(),
                flags.into(),
            ],
            HostNameResolver::new,
        )
    }

    pub fn host_name_resolver_free(&self, resolver: &HostNameResolver) {
        self.free(resolver)
    }

    /// Starts resolving `address` to a host name.
    pub fn address_resolver_new(
        &self,
        interface: i32,
        protocol: Protocol,
        address: &str,
        flags: u32,
    ) -> Result<Arc<AddressResolver>> {
        self.create(
            "AddressResolverNew",
            vec![
                interface.into(),
                i32::from(protocol).into(),
                address.into(),
                flags.into(),
            ],
            AddressResolver::new,
        )
    }

    pub fn address_resolver_free(&self, resolver: &AddressResolver) {
        self.free(resolver)
    }

    /// Resolves a host name in one round trip.
    pub fn resolve_host_name(
        &self,
        interface: i32,
        protocol: Protocol,
        name: &str,
        address_protocol: Protocol,
        flags: u32,
    ) -> Result<HostName> {
        self.call(
            "ResolveHostName",
            vec![
                interface.into(),
                i32::from(protocol).into(),
                name.into(),
                i32::from(address_protocol).into(),
                flags.into(),
            ],
        )
    }

    /// Resolves an address in one round trip.
    pub fn resolve_address(
        &self,
        interface: i32,
        protocol: Protocol,
        address: &str,
        flags: u32,
    ) -> Result<Address> {
        self.call(
            "ResolveAddress",
            vec![
                interface.into(),
                i32::from(protocol).into(),
                address.into(),
                flags.into(),
            ],
        )
    }

    /// Resolves a service instance in one round trip.
    #[allow(clippy::too_many_arguments)]
    pub fn resolve_service(
        &self,
        interface: i32,
        protocol: Protocol,
        name: &str,
        service_type: &str,
        domain: &str,
        address_protocol: Protocol,
        flags: u32,
    ) -> Result<Service> {
        self.call(
            "ResolveService",
            vec![
                interface.into(),
                i32::from(protocol).into(),
                name.into(),
                service_type.into(),
                domain.into(),
                i32::from(address_protocol).into(),
                flags.into(),
            ],
        )
    }

    pub fn get_version_string(&self) -> Result<String> {
        self.call("GetVersionString", Vec::new())
    }

    pub fn get_api_version(&self) -> Result<u32> {
        self.call("GetAPIVersion", Vec::new())
    }

    pub fn get_host_name(&self) -> Result<String> {
        self.call("GetHostName", Vec::new())
    }

    /// Changes the host name the daemon publishes.
    pub fn set_host_name(&self, name: &str) -> Result<()> {
        self.call("SetHostName", vec![name.into()])
    }

    pub fn get_host_name_fqdn(&self) -> Result<String> {
        self.call("GetHostNameFqdn", Vec::new())
    }

    pub fn get_domain_name(&self) -> Result<String> {
        self.call("GetDomainName", Vec::new())
    }

    /// Returns a variant of `name` to use after a host name collision.
    pub fn get_alternative_host_name(&self, name: &str) -> Result<String> {
        self.call("GetAlternativeHostName", vec![name.into()])
    }

    /// Returns a variant of `name` to use after a service name collision.
    pub fn get_alternative_service_name(&self, name: &str) -> Result<String> {
        self.call("GetAlternativeServiceName", vec![name.into()])
    }

    pub fn get_local_service_cookie(&self) -> Result<u32> {
        self.call("GetLocalServiceCookie", Vec::new())
    }

    pub fn get_network_interface_name_by_index(&self, index: i32) -> Result<String> {
        self.call("GetNetworkInterfaceNameByIndex", vec![index.into()])
    }

    pub fn get_network_interface_index_by_name(&self, name: &str) -> Result<i32> {
        self.call("GetNetworkInterfaceIndexByName", vec![name.into()])
    }

    pub fn is_nss_support_available(&self) -> Result<bool> {
        self.call("IsNSSSupportAvailable", Vec::new())
    }

    /// Returns the state of the daemon.
    pub fn get_state(&self) -> Result<ServerState> {
        let code: i32 = self.call("GetState", Vec::new())?;
        ServerState::try_from(code)
    }

    /// Sets the bound of the delivery channels of subscriptions created
    /// from now on. The default is [`EVENT_CAPACITY_DEFAULT`].
    pub fn set_event_capacity(&self, capacity: usize) -> Result<()> {
        if capacity == 0 {
            return Err(e_fmt!("event capacity must be at least 1"));
        }
        self.event_capacity.store(capacity, Ordering::Relaxed);
        Ok(())
    }

    /// Starts to monitor events from the dispatch thread.
    ///
    /// Returns a channel [`Receiver`] of [`ServerEvent`]. A monitor that
    /// falls behind misses events.
    pub fn monitor(&self) -> Result<Receiver<ServerEvent>> {
        self.ensure_running()?;
        let (resp_s, resp_r) = bounded(100);
        self.shared.add_monitor(resp_s);
        Ok(resp_r)
    }

    /// Returns a snapshot of the signal and subscription counters.
    pub fn get_metrics(&self) -> Metrics {
        self.shared.metrics()
    }

    /// Returns the number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.shared.registry.len()
    }

    pub fn status(&self) -> ServerStatus {
        if self.shutdown.is_disconnected() {
            ServerStatus::Closed
        } else if self.shared.is_feed_lost() {
            ServerStatus::Disconnected
        } else {
            ServerStatus::Running
        }
    }

    /// Closes the server.
    ///
    /// Stops the dispatch thread, frees every subscription still alive, then
    /// closes the bus. Deliveries blocked on unconsumed channels are
    /// dropped, so this returns without waiting for consumers. Calling it
    /// again has no effect.
    pub fn close(&self) {
        let trigger = lock(&self.shutdown_trigger).take();
        if trigger.is_none() {
            return;
        }
        drop(trigger);

        if let Some(handle) = lock(&self.dispatcher).take() {
            if handle.join().is_err() {
                error!("dispatch thread panicked");
            }
        }

        let freed = self.shared.registry.free_all();
        self.shared
            .increase_counter(Counter::SubscriptionFreed, freed as i64);
        debug!("server closed, freed {} subscription(s)", freed);

        self.bus.close();
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.close();
    }
}
