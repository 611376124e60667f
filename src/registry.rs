//! Live subscriptions indexed by object path.
//!
//! This is an internal implementation, not visible to the public API.

#[cfg(feature = "logging")]
use crate::log::{debug, error};
use crate::{
    bus::ObjectPath,
    error::e_fmt,
    subscription::{lock, Endpoint},
    Result,
};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

/// Maps every object path to its one live subscription.
///
/// All operations are mutually exclusive. A path leaves the registry
/// exactly once, and the subscription is freed by whoever removed it.
pub(crate) struct Registry {
    subscriptions: Mutex<HashMap<ObjectPath, Arc<dyn Endpoint>>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self {
            subscriptions: Mutex::new(HashMap::new()),
        }
    }

    /// Registers `subscription` if `admit` allows it.
    ///
    /// `admit` runs under the registry, so it orders against
    /// [`free_all`](Registry::free_all): a subscription is either admitted
    /// before it and freed by it, or refused. A refused subscription is
    /// freed here since nobody else knows its remote object.
    pub(crate) fn register<F>(&self, subscription: Arc<dyn Endpoint>, admit: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        let mut subscriptions = lock(&self.subscriptions);
        if let Err(e) = admit() {
            drop(subscriptions);
            debug!("refused subscription {}: {}", subscription.path(), &e);
            subscription.free();
            return Err(e);
        }

        let path = subscription.path().clone();
        if subscriptions.contains_key(&path) {
            // The remote object belongs to the registered subscription, so
            // the new proxy is dropped without freeing it.
            error!("object path {} is already registered", &path);
            return Err(e_fmt!("object path {} is already registered", path));
        }

        subscriptions.insert(path, subscription);
        Ok(())
    }

    pub(crate) fn lookup(&self, path: &ObjectPath) -> Option<Arc<dyn Endpoint>> {
        lock(&self.subscriptions).get(path).cloned()
    }

    /// Removes the subscription at `path` and frees it.
    ///
    /// Returns `false` if `path` was not registered, e.g. already freed.
    pub(crate) fn remove_and_free(&self, path: &ObjectPath) -> bool {
        let removed = lock(&self.subscriptions).remove(path);
        match removed {
            Some(subscription) => {
                debug!("freeing subscription {}", path);
                subscription.free();
                true
            }
            None => {
                debug!("subscription {} is not registered", path);
                false
            }
        }
    }

    /// Removes and frees every subscription. Returns how many were freed.
    pub(crate) fn free_all(&self) -> usize {
        let drained: Vec<_> = lock(&self.subscriptions).drain().collect();
        for (path, subscription) in drained.iter() {
            debug!("freeing subscription {}", path);
            subscription.free();
        }
        drained.len()
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.subscriptions).len()
    }
}
