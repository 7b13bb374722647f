//! Two peers sharing a named in-memory broker through `memory://` urls

use bytes::Bytes;
use futures::StreamExt;
use network::{connect, ConnectOptions, MessageProperties, PeerTopology, TransportError};

#[test_log::test(tokio::test)]
async fn test_presence_and_direct_reply_between_peers() {
    let url = "memory://network-integration";
    let alice = connect(url, ConnectOptions { connection_name: Some("alice-1".into()) })
        .await
        .unwrap();
    let bob = connect(url, ConnectOptions::default()).await.unwrap();

    let alice_topology = PeerTopology::new(Some("ns"), "services", "users", "1");
    let bob_topology = PeerTopology::new(Some("ns"), "services", "orders", "2");
    alice_topology.declare(alice.as_ref()).await.unwrap();
    bob_topology.declare(bob.as_ref()).await.unwrap();

    let mut alice_queue = alice.consume(alice_topology.queue(), "alice").await.unwrap();
    let mut bob_queue = bob.consume(bob_topology.queue(), "bob").await.unwrap();

    // Presence broadcast reaches both peers, including the sender
    alice
        .publish(
            alice_topology.exchange(),
            &alice_topology.presence_key(),
            Bytes::from_static(b"hello"),
            MessageProperties::json(),
        )
        .await
        .unwrap();
    assert_eq!(bob_queue.next().await.unwrap().unwrap().payload, Bytes::from_static(b"hello"));
    assert_eq!(alice_queue.next().await.unwrap().unwrap().payload, Bytes::from_static(b"hello"));

    // RPC addressed to the orders service, answered on alice's private queue
    let request = MessageProperties::json()
        .with_correlation_id("c-1")
        .with_reply_to(alice_topology.queue());
    alice
        .publish(
            alice_topology.exchange(),
            &alice_topology.rpc_key("orders"),
            Bytes::from_static(b"request"),
            request,
        )
        .await
        .unwrap();

    let delivery = bob_queue.next().await.unwrap().unwrap();
    assert_eq!(delivery.routing_key, "ns.orders");
    let reply_to = delivery.properties.reply_to.clone().unwrap();
    delivery.ack().await.unwrap();

    bob.send_to_queue(
        &reply_to,
        Bytes::from_static(b"response"),
        MessageProperties::json().with_correlation_id("c-1"),
    )
    .await
    .unwrap();

    let reply = alice_queue.next().await.unwrap().unwrap();
    assert_eq!(reply.payload, Bytes::from_static(b"response"));
    assert_eq!(reply.properties.correlation_id.as_deref(), Some("c-1"));

    alice.close().await.unwrap();
    bob.close().await.unwrap();
}

#[tokio::test]
async fn test_connect_rejects_unknown_schemes() {
    let err = connect("kafka://localhost:9092", ConnectOptions::default())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, TransportError::Configuration { .. }));

    let err = connect("localhost", ConnectOptions::default()).await.err().unwrap();
    assert!(matches!(err, TransportError::Configuration { .. }));
}

#[cfg(not(feature = "amqp"))]
#[tokio::test]
async fn test_amqp_needs_feature() {
    let err = connect("amqp://localhost:5672", ConnectOptions::default())
        .await
        .err()
        .unwrap();
    assert!(err.to_string().contains("amqp"));
}
