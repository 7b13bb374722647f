//! # Codec Integration Tests
//!
//! Exercises the public API the way peers use it:
//! - Every event type survives a trip through broker bytes
//! - Every event type refuses envelopes named for another type
//! - RPC responses echo the request's correlation id

use codec::{
    Envelope, Event, HelloEvent, InboundEvent, Presence, RpcRequestEvent, RpcResponseEvent, ServiceDescriptor,
    ServiceEvent, ServicesPublishedEvent, TransportKind, WelcomeEvent,
};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn services() -> Vec<ServiceDescriptor> {
    vec![
        ServiceDescriptor::advertise("users", "peer-a", "accounts", Some("host-a".into())),
        ServiceDescriptor::advertise("orders", "peer-a", "accounts", Some("host-a".into())),
    ]
}

fn every_envelope() -> Vec<Envelope> {
    let presence = Presence::new("host-a", TransportKind::Rpc)
        .with_queue("ns.accounts.1")
        .with_roles(true, true);
    let request = RpcRequestEvent::create(None, "find", "users", None, None, Map::new());
    vec![
        HelloEvent::create("1", "peer-a", presence.clone()).to_envelope(),
        WelcomeEvent::create("1", "peer-a", presence, services()).to_envelope(),
        ServicesPublishedEvent::create("1", "peer-a", Some("host-a".into()), services()).to_envelope(),
        RpcResponseEvent::reply_to(&request, None, json!([])).to_envelope(),
        request.to_envelope(),
        ServiceEvent::create("1", "peer-a", None, "accounts", "users", "created", json!({"id": 1})).to_envelope(),
    ]
}

fn through_bytes(envelope: &Envelope) -> Envelope {
    Envelope::from_slice(&envelope.to_vec().unwrap()).unwrap()
}

#[test]
fn test_every_event_rejects_foreign_names() {
    for envelope in every_envelope() {
        let checks = [
            (HelloEvent::NAME, HelloEvent::reconstruct(&envelope).err()),
            (WelcomeEvent::NAME, WelcomeEvent::reconstruct(&envelope).err()),
            (ServicesPublishedEvent::NAME, ServicesPublishedEvent::reconstruct(&envelope).err()),
            (RpcRequestEvent::NAME, RpcRequestEvent::reconstruct(&envelope).err()),
            (RpcResponseEvent::NAME, RpcResponseEvent::reconstruct(&envelope).err()),
            (ServiceEvent::NAME, ServiceEvent::reconstruct(&envelope).err()),
        ];
        for (name, err) in checks {
            if name == envelope.name {
                assert!(err.is_none(), "{} should accept its own envelope", name);
            } else {
                let err = err.unwrap_or_else(|| panic!("{} accepted a {}", name, envelope.name));
                assert!(err.is_name_mismatch());
            }
        }
    }
}

#[test]
fn test_inbound_decode_selects_type() {
    let names: Vec<String> = every_envelope()
        .into_iter()
        .map(|e| InboundEvent::decode(through_bytes(&e)).unwrap().name().to_string())
        .collect();
    assert_eq!(
        names,
        vec![
            "HelloEvent",
            "WelcomeEvent",
            "ServicesPublishedEvent",
            "RPCResponseEvent",
            "RPCRequestEvent",
            "ServiceEvent"
        ]
    );
}

#[test]
fn test_welcome_round_trip() {
    let presence = Presence::new("host-b", TransportKind::Http).with_roles(false, true);
    let welcome = WelcomeEvent::create("7", "peer-b", presence, services());
    let back = WelcomeEvent::reconstruct(&through_bytes(&welcome.to_envelope())).unwrap();
    assert_eq!(back, welcome);
    assert_eq!(back.services.len(), 2);
}

#[test]
fn test_services_published_round_trip() {
    let event = ServicesPublishedEvent::create("9", "peer-c", None, services());
    let back = ServicesPublishedEvent::reconstruct(&through_bytes(&event.to_envelope())).unwrap();
    assert_eq!(back, event);
    assert_eq!(back.peer_key(), "peer-c");
}

#[test]
fn test_rpc_response_keeps_request_uuid_through_the_wire() {
    let mut params = Map::new();
    params.insert("provider".into(), json!("remote"));
    let request = RpcRequestEvent::create(None, "get", "users", Some("0".into()), None, params);
    let request = RpcRequestEvent::reconstruct(&through_bytes(&request.to_envelope())).unwrap();

    let response = RpcResponseEvent::reply_to(&request, Some("replier".into()), json!({"id": "0", "name": "One"}));
    let response = RpcResponseEvent::reconstruct(&through_bytes(&response.to_envelope())).unwrap();

    assert_eq!(response.uuid, request.uuid);
    assert_eq!(response.call.params["provider"], "remote");
    assert_eq!(response.result(), json!({"id": "0", "name": "One"}));
}

fn json_leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        "[a-z0-9 ]{0,12}".prop_map(Value::String),
    ]
}

fn json_object() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map("[a-z]{1,8}", json_leaf(), 0..6).prop_map(|m| m.into_iter().collect())
}

proptest! {
    #[test]
    fn prop_rpc_request_round_trips(
        method in prop::sample::select(vec!["find", "get", "create", "update", "patch", "remove"]),
        path in "[a-z]{1,10}(/[a-z]{1,10})?",
        id in prop::option::of("[a-zA-Z0-9-]{1,16}"),
        data in prop::option::of(json_object()),
        params in json_object(),
        key in prop::option::of("[a-z]{1,8}"),
    ) {
        let request = RpcRequestEvent::create(key, method, path, id, data.map(Value::Object), params);
        let back = RpcRequestEvent::reconstruct(&through_bytes(&request.to_envelope())).unwrap();
        prop_assert_eq!(back, request);
    }

    #[test]
    fn prop_hello_round_trips(
        id in "[a-z0-9-]{1,36}",
        key in "[a-z0-9.-]{1,20}",
        host in "[a-z0-9.-]{1,20}",
        http in any::<bool>(),
        queue in prop::option::of("[a-z.]{1,20}"),
        roles in prop::option::of((any::<bool>(), any::<bool>())),
    ) {
        let kind = if http { TransportKind::Http } else { TransportKind::Rpc };
        let mut presence = Presence::new(host, kind);
        presence.queue = queue;
        if let Some((registrar, publisher)) = roles {
            presence = presence.with_roles(registrar, publisher);
        }
        let hello = HelloEvent::create(id, key, presence);
        let back = HelloEvent::reconstruct(&through_bytes(&hello.to_envelope())).unwrap();
        prop_assert_eq!(back, hello);
    }
}
