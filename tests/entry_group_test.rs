mod common;

use avahi_bus::{EntryGroupStateKind, Error, Protocol, Server, Subscription, Value, IF_UNSPEC};
use common::{wait_for, MockBus, STATE_CHANGED};
use std::sync::Arc;
use std::time::Duration;
use test_log::test;

const TIMEOUT: Duration = Duration::from_secs(2);

fn new_server() -> (Arc<MockBus>, Server) {
    let bus = Arc::new(MockBus::new());
    let server = Server::new(bus.clone()).expect("Failed to create server");
    (bus, server)
}

/// Publish an HTTP service and follow the group until it is established.
#[test]
fn publish_service() {
    let (bus, server) = new_server();
    let group = server.entry_group_new().expect("Failed to create group");
    let states = group.state_changed();

    assert!(group.is_empty().unwrap());
    group
        .add_service(
            IF_UNSPEC,
            Protocol::Unspec,
            0,
            "web",
            "_http._tcp",
            "",
            "",
            8080,
            &[b"path=/".to_vec()],
        )
        .unwrap();
    group
        .add_service_subtype(
            IF_UNSPEC,
            Protocol::Unspec,
            0,
            "web",
            "_http._tcp",
            "",
            "_printer._sub._http._tcp",
        )
        .unwrap();
    assert!(!group.is_empty().unwrap());
    group.commit().unwrap();

    let registering = states.recv_timeout(TIMEOUT).unwrap();
    assert_eq!(registering.state, EntryGroupStateKind::Registering);
    assert_eq!(registering.error, "");
    assert_eq!(
        states.recv_timeout(TIMEOUT).unwrap().state,
        EntryGroupStateKind::Established
    );

    let add = bus
        .calls()
        .into_iter()
        .find(|c| c.member == "org.freedesktop.Avahi.EntryGroup.AddService")
        .unwrap();
    assert_eq!(&add.path, group.path());
    assert_eq!(add.args[7], Value::UInt16(8080));
    assert_eq!(add.args[8], Value::ByteArrays(vec![b"path=/".to_vec()]));

    server.close();
}

/// Reset withdraws the entries and returns the group to uncommitted.
#[test]
fn reset_group() {
    let (_bus, server) = new_server();
    let group = server.entry_group_new().unwrap();
    let states = group.state_changed();

    group
        .add_address(IF_UNSPEC, Protocol::Inet, 0, "nas.local", "192.168.1.5")
        .unwrap();
    group.commit().unwrap();
    group.reset().unwrap();

    let kinds: Vec<_> = (0..3)
        .map(|_| states.recv_timeout(TIMEOUT).unwrap().state)
        .collect();
    assert_eq!(
        kinds,
        vec![
            EntryGroupStateKind::Registering,
            EntryGroupStateKind::Established,
            EntryGroupStateKind::Uncommitted,
        ]
    );
    assert!(group.is_empty().unwrap());
    assert_eq!(group.get_state().unwrap(), EntryGroupStateKind::Uncommitted);

    server.close();
}

/// A collision reported by the daemon reaches the consumer with its error.
#[test]
fn collision_reported() {
    let (bus, server) = new_server();
    let group = server.entry_group_new().unwrap();

    bus.emit(
        group.path(),
        STATE_CHANGED,
        vec![Value::Int32(3), Value::from("Local name collision")],
    );
    let state = group.state_changed().recv_timeout(TIMEOUT).unwrap();
    assert_eq!(state.state, EntryGroupStateKind::Collision);
    assert_eq!(state.error, "Local name collision");

    server.close();
}

/// Errors of group calls are returned to the caller unchanged.
#[test]
fn call_errors_returned() {
    let (bus, server) = new_server();
    let group = server.entry_group_new().unwrap();

    let error = Error::Protocol {
        name: "org.freedesktop.Avahi.CollisionError".to_string(),
        message: "Local name collision".to_string(),
    };
    bus.fail_next("org.freedesktop.Avahi.EntryGroup.AddRecord", error.clone());
    let result = group.add_record(
        IF_UNSPEC,
        Protocol::Unspec,
        0,
        "nas.local",
        1,
        16,
        120,
        b"\x05hello",
    );
    assert_eq!(result, Err(error));

    bus.set_reply(
        "org.freedesktop.Avahi.EntryGroup.GetState",
        vec![Value::Int32(9)],
    );
    assert!(matches!(group.get_state(), Err(Error::Decode(_))));

    server.close();
}

/// Freeing the group releases the remote object and ends its channel.
#[test]
fn free_group() {
    let (bus, server) = new_server();
    let group = server.entry_group_new().unwrap();
    let states = group.state_changed();

    server.entry_group_free(&group);
    assert!(states.recv_timeout(TIMEOUT).is_err());
    assert_eq!(bus.freed(), vec![group.path().clone()]);
    assert_eq!(
        bus.calls().last().unwrap().member,
        "org.freedesktop.Avahi.EntryGroup.Free"
    );

    // Later signals for the path are dropped.
    bus.emit(
        group.path(),
        STATE_CHANGED,
        vec![Value::Int32(1), Value::from("")],
    );
    assert!(wait_for(TIMEOUT, || server
        .get_metrics()
        .get("signal-unmatched")
        .copied()
        == Some(1)));

    server.close();
    assert_eq!(bus.freed().len(), 1);
}
