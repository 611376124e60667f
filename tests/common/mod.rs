//! An in-memory bus that plays the part of the Avahi daemon.

#![allow(dead_code)]

use avahi_bus::{Bus, Error, ObjectPath, Receiver, Result, Signal, Value};
use flume::{bounded, unbounded, Sender};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

/// How long a reply may wait behind signals the feed cannot take.
const REPLY_TIMEOUT: Duration = Duration::from_secs(3);

/// One call received by the fake daemon.
#[derive(Clone, Debug)]
pub struct Call {
    pub path: ObjectPath,
    pub member: String,
    pub args: Vec<Value>,
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    next_id: u32,
    /// Errors returned by the next call of a member.
    failures: HashMap<String, Error>,
    /// Fixed replies by member.
    replies: HashMap<String, Vec<Value>>,
    /// Signals pushed into the feed before the reply of a member.
    before_reply: HashMap<String, Vec<Signal>>,
    /// Signal emitted on the new object before the reply of a `*New` member.
    announce: HashMap<String, (String, Vec<Value>)>,
    /// Entry groups with at least one entry.
    non_empty_groups: HashSet<ObjectPath>,
    match_rules: Vec<String>,
    closed: bool,
}

pub struct MockBus {
    client: u32,
    state: Mutex<State>,
    feed_sender: Mutex<Option<Sender<Signal>>>,
    feed: Mutex<Option<Receiver<Signal>>>,
}

impl MockBus {
    pub fn new() -> Self {
        Self::with_feed(unbounded())
    }

    /// A bus whose feed holds at most `capacity` signals, like a transport
    /// that stops reading the socket while the feed is full.
    pub fn with_feed_capacity(capacity: usize) -> Self {
        Self::with_feed(bounded(capacity))
    }

    fn with_feed((feed_sender, feed): (Sender<Signal>, Receiver<Signal>)) -> Self {
        Self {
            client: fastrand::u32(1..10_000),
            state: Mutex::new(State::default()),
            feed_sender: Mutex::new(Some(feed_sender)),
            feed: Mutex::new(Some(feed)),
        }
    }

    /// Pushes a signal into the feed, as if the daemon emitted it.
    pub fn emit(&self, path: &ObjectPath, name: &str, body: Vec<Value>) {
        if let Some(sender) = self.feed_sender.lock().unwrap().as_ref() {
            sender
                .send(Signal::new(path.clone(), name, body))
                .expect("feed receiver alive");
        }
    }

    /// Ends the signal feed, as if the connection dropped.
    pub fn drop_feed(&self) {
        self.feed_sender.lock().unwrap().take();
    }

    pub fn fail_next(&self, member: &str, error: Error) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(qualify_server(member), error);
    }

    pub fn set_reply(&self, member: &str, reply: Vec<Value>) {
        self.state
            .lock()
            .unwrap()
            .replies
            .insert(qualify_server(member), reply);
    }

    /// Queues `signals` in the feed ahead of the next reply to `member`.
    pub fn queue_before_reply(&self, member: &str, signals: Vec<Signal>) {
        self.state
            .lock()
            .unwrap()
            .before_reply
            .insert(qualify_server(member), signals);
    }

    /// Emits a signal on the object created by the next `member` call,
    /// before the reply carrying its path.
    pub fn announce_on_reply(&self, member: &str, name: &str, body: Vec<Value>) {
        self.state
            .lock()
            .unwrap()
            .announce
            .insert(qualify_server(member), (name.to_string(), body));
    }

    /// Pushes a signal ahead of a reply, failing like a transport whose
    /// reply never made it through.
    fn push_before_reply(&self, signal: Signal) -> Result<()> {
        let sender = self.feed_sender.lock().unwrap().clone();
        match sender {
            Some(sender) => sender
                .send_timeout(signal, REPLY_TIMEOUT)
                .map_err(|_| Error::Transport("reply timed out".to_string())),
            None => Ok(()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Paths on which `Free` was called, in call order.
    pub fn freed(&self) -> Vec<ObjectPath> {
        self.calls()
            .into_iter()
            .filter(|c| c.member.ends_with(".Free"))
            .map(|c| c.path)
            .collect()
    }

    pub fn match_rules(&self) -> Vec<String> {
        self.state.lock().unwrap().match_rules.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    fn new_object(&self, state: &mut State, kind: &str) -> Vec<Value> {
        state.next_id += 1;
        let path = format!("/Client{}/{}{}", self.client, kind, state.next_id);
        vec![Value::Path(ObjectPath::new(path))]
    }

    fn entry_group_call(&self, state: &mut State, path: &ObjectPath, member: &str) -> Vec<Value> {
        match member {
            "IsEmpty" => vec![Value::Bool(!state.non_empty_groups.contains(path))],
            "GetState" => vec![Value::Int32(0)],
            "AddService" | "AddServiceSubtype" | "AddAddress" | "AddRecord" => {
                state.non_empty_groups.insert(path.clone());
                Vec::new()
            }
            "Reset" => {
                state.non_empty_groups.remove(path);
                self.emit(path, STATE_CHANGED, vec![Value::Int32(0), Value::from("")]);
                Vec::new()
            }
            "Commit" => {
                self.emit(path, STATE_CHANGED, vec![Value::Int32(1), Value::from("")]);
                self.emit(path, STATE_CHANGED, vec![Value::Int32(2), Value::from("")]);
                Vec::new()
            }
            _ => Vec::new(),
        }
    }
}

pub const STATE_CHANGED: &str = "org.freedesktop.Avahi.EntryGroup.StateChanged";

/// Short names are taken as members of the server interface.
fn qualify_server(member: &str) -> String {
    if member.contains('.') {
        member.to_string()
    } else {
        format!("org.freedesktop.Avahi.Server.{}", member)
    }
}

impl Bus for MockBus {
    fn call(&self, path: &ObjectPath, member: &str, args: Vec<Value>) -> Result<Vec<Value>> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(Error::Transport("connection closed".to_string()));
        }
        state.calls.push(Call {
            path: path.clone(),
            member: member.to_string(),
            args,
        });
        if let Some(e) = state.failures.remove(member) {
            return Err(e);
        }
        if let Some(signals) = state.before_reply.remove(member) {
            for signal in signals {
                self.push_before_reply(signal)?;
            }
        }
        if let Some(reply) = state.replies.get(member) {
            return Ok(reply.clone());
        }

        if let Some(method) = member.strip_prefix("org.freedesktop.Avahi.Server.") {
            if let Some(kind) = method.strip_suffix("New") {
                let reply = self.new_object(&mut state, kind);
                if let Some((name, body)) = state.announce.remove(member) {
                    if let Some(Value::Path(path)) = reply.first() {
                        self.push_before_reply(Signal::new(path.clone(), name, body))?;
                    }
                }
                return Ok(reply);
            }
            return Ok(Vec::new());
        }
        if let Some(method) = member.strip_prefix("org.freedesktop.Avahi.EntryGroup.") {
            return Ok(self.entry_group_call(&mut state, path, method));
        }
        Ok(Vec::new())
    }

    fn add_match(&self, rule: &str) -> Result<()> {
        self.state.lock().unwrap().match_rules.push(rule.to_string());
        Ok(())
    }

    fn signals(&self) -> Result<Receiver<Signal>> {
        self.feed
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| Error::Transport("signal feed already taken".to_string()))
    }

    fn close(&self) {
        self.state.lock().unwrap().closed = true;
        self.drop_feed();
    }
}

/// Body of a service browser item.
pub fn service_item(iface: i32, name: &str, ty: &str, domain: &str) -> Vec<Value> {
    vec![
        Value::Int32(iface),
        Value::Int32(0),
        Value::from(name),
        Value::from(ty),
        Value::from(domain),
        Value::UInt32(0),
    ]
}

/// Body of a host name resolver `Found` signal.
pub fn host_name_found(name: &str, address: &str) -> Vec<Value> {
    vec![
        Value::Int32(2),
        Value::Int32(0),
        Value::from(name),
        Value::Int32(0),
        Value::from(address),
        Value::UInt32(0),
    ]
}

/// Polls `cond` until it holds or `timeout` passes.
pub fn wait_for(timeout: std::time::Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    cond()
}
