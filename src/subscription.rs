//! The contract shared by every subscription, and the plumbing that
//! delivers decoded events to consumers.

#[cfg(feature = "logging")]
use crate::log::{debug, trace};
use crate::{
    body::FromBody,
    bus::{qualified, Bus, ObjectPath, Value},
    Receiver, Result,
};
use flume::{bounded, Selector, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub(crate) mod sealed {
    pub trait Sealed {}
}

/// A local proxy bound to one remote object of the daemon.
///
/// Every browser, resolver and entry group is a subscription. The server's
/// dispatch thread forwards the signals emitted by the remote object to it,
/// decoded, until it is freed through the [`Server`](crate::Server).
///
/// Events only come from the daemon. Code outside this crate cannot feed a
/// subscription:
///
/// ```compile_fail
/// use avahi_bus::{Subscription, Value};
///
/// fn inject(subscription: &dyn Subscription) {
///     let body = vec![Value::Int32(2)];
///     let _ = subscription.dispatch_signal("org.freedesktop.Avahi.ServiceBrowser.ItemNew", &body);
/// }
/// ```
pub trait Subscription: Send + Sync + sealed::Sealed {
    /// Path of the remote object. Set at construction, never changes.
    fn path(&self) -> &ObjectPath;
}

/// The dispatch side of a subscription.
pub(crate) trait Endpoint: Subscription {
    /// Decodes a signal and forwards it to the consumer.
    ///
    /// `name` is the interface-qualified member of the signal. Members this
    /// subscription does not handle are ignored. Blocks until the consumer
    /// takes the event, or drops the event if the subscription is being
    /// freed or the server is closing.
    fn dispatch_signal(&self, name: &str, body: &[Value]) -> Result<()>;

    /// Releases the remote object and closes the delivery channels.
    ///
    /// Only the first call has any effect. Errors from the remote side are
    /// not reported since the subscription goes away regardless.
    fn free(&self);
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Signals pending deliveries of one subscription to give up.
///
/// Nothing is ever sent on the inner channels: a teardown is requested by
/// dropping the trigger, which disconnects `requested`. The server's
/// shutdown gate works the same way.
pub(crate) struct Teardown {
    trigger: Mutex<Option<Sender<()>>>,
    requested: Receiver<()>,
    shutdown: Receiver<()>,
}

impl Teardown {
    pub(crate) fn new(shutdown: Receiver<()>) -> Self {
        let (trigger, requested) = bounded(1);
        Self {
            trigger: Mutex::new(Some(trigger)),
            requested,
            shutdown,
        }
    }

    /// Requests the teardown. Returns `true` only for the first request.
    pub(crate) fn request(&self) -> bool {
        lock(&self.trigger).take().is_some()
    }

    pub(crate) fn is_requested(&self) -> bool {
        self.requested.is_disconnected() || self.shutdown.is_disconnected()
    }
}

/// Outcome of one delivery attempt.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Delivery {
    Delivered,
    /// Teardown won the race, or the channel is already closed.
    Dropped,
}

/// One outbound delivery channel of a subscription.
///
/// The sender is owned here and dropped exactly once by [`Outlet::close`];
/// a delivery in flight holds a clone until its race is decided.
pub(crate) struct Outlet<T> {
    sender: Mutex<Option<Sender<T>>>,
    receiver: Receiver<T>,
}

impl<T> Outlet<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender: Mutex::new(Some(sender)),
            receiver,
        }
    }

    pub(crate) fn receiver(&self) -> Receiver<T> {
        self.receiver.clone()
    }

    /// Pushes `event` to the consumer, racing against `teardown`.
    ///
    /// The teardown is checked first, so it wins when both are ready.
    pub(crate) fn deliver(&self, event: T, teardown: &Teardown) -> Delivery {
        if teardown.is_requested() {
            return Delivery::Dropped;
        }

        // A send racing `close` may still land; the event then precedes the
        // end of the stream.
        let sender = match lock(&self.sender).clone() {
            Some(sender) => sender,
            None => return Delivery::Dropped,
        };

        Selector::new()
            .recv(&teardown.requested, |_| Delivery::Dropped)
            .recv(&teardown.shutdown, |_| Delivery::Dropped)
            .send(&sender, event, |res| match res {
                Ok(()) => Delivery::Delivered,
                Err(_) => Delivery::Dropped,
            })
            .wait()
    }

    /// Closes the channel, so consumers observe the end of the stream once
    /// they drained it.
    pub(crate) fn close(&self) {
        lock(&self.sender).take();
    }
}

/// A handle to one remote object.
pub(crate) struct RemoteObject {
    bus: Arc<dyn Bus>,
    path: ObjectPath,
    interface: &'static str,
}

impl RemoteObject {
    pub(crate) fn new(bus: Arc<dyn Bus>, path: ObjectPath, interface: &'static str) -> Self {
        Self {
            bus,
            path,
            interface,
        }
    }

    pub(crate) fn path(&self) -> &ObjectPath {
        &self.path
    }

    /// Returns `true` if `name` is `member` of this object's interface.
    pub(crate) fn is_member(&self, name: &str, member: &str) -> bool {
        name.strip_prefix(self.interface)
            .and_then(|rest| rest.strip_prefix('.'))
            == Some(member)
    }

    pub(crate) fn call<R: FromBody>(&self, member: &str, args: Vec<Value>) -> Result<R> {
        let reply = self
            .bus
            .call(&self.path, &qualified(self.interface, member), args)?;
        R::from_body(&reply)
    }

    /// Calls `Free` on the remote object, ignoring any failure.
    pub(crate) fn release(&self) {
        match self
            .bus
            .call(&self.path, &qualified(self.interface, "Free"), Vec::new())
        {
            Ok(_) => trace!("freed remote object {}", &self.path),
            Err(e) => debug!("failed to free remote object {}: {}", &self.path, e),
        }
    }
}
