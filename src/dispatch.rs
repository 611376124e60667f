//! The dispatch thread: demultiplexes the bus signal feed to subscriptions.

#[cfg(feature = "logging")]
use crate::log::{debug, error, trace};
use crate::{
    bus::{ObjectPath, Signal},
    error::Error,
    registry::Registry,
    subscription::lock,
    Receiver,
};
use flume::{bounded, RecvError, Selector, Sender, TrySendError};
use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

/// Different counters included in the metrics.
#[derive(Hash, Eq, PartialEq, Clone, Copy)]
pub(crate) enum Counter {
    SignalReceived,
    SignalDispatched,
    SignalUnmatched,
    DecodeError,
    SubscriptionCreated,
    SubscriptionFreed,
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::SignalReceived => write!(f, "signal-received"),
            Self::SignalDispatched => write!(f, "signal-dispatched"),
            Self::SignalUnmatched => write!(f, "signal-unmatched"),
            Self::DecodeError => write!(f, "decode-error"),
            Self::SubscriptionCreated => write!(f, "subscription-created"),
            Self::SubscriptionFreed => write!(f, "subscription-freed"),
        }
    }
}

/// The metrics is a HashMap of (name_key, i64_value).
/// The main purpose is to help monitoring the signal traffic.
pub type Metrics = HashMap<String, i64>;

/// Notable events from the dispatch thread, besides the subscription events.
/// These events are expected to happen infrequently.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum ServerEvent {
    /// A signal for a live subscription could not be decoded and was
    /// discarded.
    DecodeError {
        path: ObjectPath,
        name: String,
        error: Error,
    },

    /// The bus signal feed ended. All subscriptions have been freed.
    FeedClosed,
}

/// Creations in flight, and the signals held back for them.
#[derive(Default)]
struct Pending {
    creating: usize,

    /// Signals that may belong to a subscription not registered yet, in
    /// feed order.
    parked: Vec<Signal>,
}

/// State shared between the server handle and its dispatch thread.
pub(crate) struct Shared {
    pub(crate) registry: Registry,
    pending: Mutex<Pending>,

    /// Wakes the dispatch thread to replay parked signals.
    replay_s: Sender<()>,
    replay_r: Receiver<()>,

    feed_lost: AtomicBool,
    counters: Mutex<HashMap<Counter, i64>>,
    monitors: Mutex<Vec<Sender<ServerEvent>>>,
}

impl Shared {
    pub(crate) fn new() -> Self {
        let (replay_s, replay_r) = bounded(1);
        Self {
            registry: Registry::new(),
            pending: Mutex::new(Pending::default()),
            replay_s,
            replay_r,
            feed_lost: AtomicBool::new(false),
            counters: Mutex::new(HashMap::new()),
            monitors: Mutex::new(Vec::new()),
        }
    }

    /// Marks a subscription creation in flight until the returned guard is
    /// dropped. The guard must outlive the registration.
    pub(crate) fn begin_creation(&self) -> Creation<'_> {
        lock(&self.pending).creating += 1;
        Creation { shared: self }
    }

    pub(crate) fn is_feed_lost(&self) -> bool {
        self.feed_lost.load(Ordering::SeqCst)
    }

    /// The feed is gone: nothing will reach the subscriptions anymore.
    fn lose_feed(&self) {
        // Set before `free_all`, so no registration slips in after it.
        self.feed_lost.store(true, Ordering::SeqCst);
        lock(&self.pending).parked.clear();

        let freed = self.registry.free_all();
        self.increase_counter(Counter::SubscriptionFreed, freed as i64);
        self.notify_monitors(ServerEvent::FeedClosed);
    }

    pub(crate) fn increase_counter(&self, counter: Counter, count: i64) {
        if count == 0 {
            return;
        }
        *lock(&self.counters).entry(counter).or_insert(0) += count;
    }

    pub(crate) fn metrics(&self) -> Metrics {
        lock(&self.counters)
            .iter()
            .map(|(counter, count)| (counter.to_string(), *count))
            .collect()
    }

    pub(crate) fn add_monitor(&self, sender: Sender<ServerEvent>) {
        lock(&self.monitors).push(sender);
    }

    fn notify_monitors(&self, event: ServerEvent) {
        lock(&self.monitors).retain(|sender| {
            if let Err(e) = sender.try_send(event.clone()) {
                debug!("notify_monitors: try_send: {}", &e);
                if matches!(e, TrySendError::Disconnected(_)) {
                    return false; // This monitor is dropped.
                }
            }
            true
        });
    }
}

/// A subscription creation in flight. See [`Shared::begin_creation`].
pub(crate) struct Creation<'a> {
    shared: &'a Shared,
}

impl Drop for Creation<'_> {
    fn drop(&mut self) {
        let mut pending = lock(&self.shared.pending);
        pending.creating -= 1;
        let replay = !pending.parked.is_empty();
        drop(pending);

        if replay {
            // A full channel means a replay is already due.
            let _ = self.shared.replay_s.try_send(());
        }
    }
}

enum Next {
    Quit,
    Replay,
    Signal(Result<Signal, RecvError>),
}

/// The run loop of the dispatch thread.
///
/// Takes signals from `feed` one at a time until `quit` disconnects or the
/// feed ends. Signals for one path are forwarded in feed order.
pub(crate) fn dispatch_thread(shared: Arc<Shared>, feed: Receiver<Signal>, quit: Receiver<()>) {
    loop {
        let next = Selector::new()
            .recv(&quit, |_| Next::Quit)
            .recv(&shared.replay_r, |_| Next::Replay)
            .recv(&feed, Next::Signal)
            .wait();

        match next {
            Next::Quit => {
                debug!("dispatch thread: shutdown requested");
                return;
            }
            Next::Replay => replay_parked(&shared),
            Next::Signal(Ok(signal)) => dispatch_one(&shared, signal),
            Next::Signal(Err(_)) => {
                if quit.is_disconnected() {
                    // The server closed the bus while stopping us.
                    return;
                }
                error!("dispatch thread: signal feed closed");
                shared.lose_feed();
                return;
            }
        }
    }
}

/// Forwards one signal from the feed.
fn dispatch_one(shared: &Shared, signal: Signal) {
    shared.increase_counter(Counter::SignalReceived, 1);
    route(shared, signal);
}

/// Routes the parked signals again, in the order they were parked.
fn replay_parked(shared: &Shared) {
    let parked = std::mem::take(&mut lock(&shared.pending).parked);
    trace!("replaying {} parked signal(s)", parked.len());
    for signal in parked {
        route(shared, signal);
    }
}

/// Forwards a signal to the subscription registered at its path.
///
/// The registry is only held for the lookup. A subscription freed while its
/// signal is being delivered drops the event instead of blocking. A signal
/// for an unknown path is parked while a creation is in flight, since the
/// path may be the one just created.
fn route(shared: &Shared, signal: Signal) {
    let subscription = {
        let mut pending = lock(&shared.pending);
        let waiting = pending.parked.iter().any(|s| s.path == signal.path);
        match shared.registry.lookup(&signal.path) {
            Some(s) if !waiting => s,
            None if !waiting && pending.creating == 0 => {
                trace!("no subscription for {} ({})", &signal.path, &signal.name);
                shared.increase_counter(Counter::SignalUnmatched, 1);
                return;
            }
            _ => {
                // Behind an earlier parked signal of the same path, or the
                // path may not be registered yet.
                trace!("parked {} for {}", &signal.name, &signal.path);
                pending.parked.push(signal);
                return;
            }
        }
    };

    match subscription.dispatch_signal(&signal.name, &signal.body) {
        Ok(()) => shared.increase_counter(Counter::SignalDispatched, 1),
        Err(e) => {
            debug!(
                "failed to decode {} for {}: {}",
                &signal.name, &signal.path, &e
            );
            shared.increase_counter(Counter::DecodeError, 1);
            shared.notify_monitors(ServerEvent::DecodeError {
                path: signal.path,
                name: signal.name,
                error: e,
            });
        }
    }
}
