//! Discovery stream protocol tests against an in-process server.

use endpoint_discovery::eds::{DiscoveryRequest, Inbound, ENDPOINT_TYPE};
use endpoint_discovery::error::{DiscoveryError, RegistryError, StreamError};
use endpoint_discovery::model::Assignment;

mod common;

use common::{instance, Fixture, HELLO, HELLO_HTTP};

fn only_assignment(assignments: Vec<Assignment>) -> Assignment {
    assert_eq!(assignments.len(), 1);
    assignments.into_iter().next().unwrap()
}

#[tokio::test]
async fn test_subscribe_returns_current_endpoints() {
    let fixture = Fixture::new();
    let mut client = fixture.open_stream("10.0.0.9:40000");

    client.send(DiscoveryRequest::subscribe("sidecar", &[HELLO_HTTP])).await;
    let response = client.next_response().await;

    assert_eq!(response.type_url, ENDPOINT_TYPE);
    assert!(!response.version_info.is_empty());
    assert!(!response.nonce.is_empty());

    let assignment = only_assignment(response.assignments().unwrap());
    assert_eq!(assignment.cluster_name, HELLO_HTTP);
    assert_eq!(assignment.endpoint_count(), 1);
    let endpoint = assignment.endpoints[0].endpoints[0];
    assert_eq!(endpoint.address.to_string(), "10.1.1.0");
    assert_eq!(endpoint.port, 80);

    let record = fixture.server.cache().get(HELLO_HTTP).unwrap();
    assert_eq!(record.watcher_count(), 1);
    assert!(record.watcher("sidecar-1").is_some());
    assert!(record.first_non_empty().is_some());

    assert!(client.finish().await.is_ok());
}

#[tokio::test]
async fn test_ack_produces_no_response() {
    let fixture = Fixture::new();
    let mut client = fixture.open_stream("peer");

    let request = DiscoveryRequest::subscribe("sidecar", &[HELLO_HTTP]);
    client.send(request.clone()).await;
    let response = client.next_response().await;

    client.send(request.ack(&response)).await;
    client.expect_silence().await;

    // A rejection is logged, not answered.
    let mut nack = request.ack(&response);
    nack.error_detail = Some(endpoint_discovery::eds::ErrorDetail {
        code: 3,
        message: "bad endpoints".into(),
    });
    client.send(nack).await;
    client.expect_silence().await;

    client.finish().await.unwrap();
}

#[tokio::test]
async fn test_push_all_delivers_registry_changes() {
    let fixture = Fixture::new();
    let mut client = fixture.open_stream("peer");

    client.send(DiscoveryRequest::subscribe("sidecar", &[HELLO_HTTP])).await;
    let first = client.next_response().await;

    fixture
        .services
        .add_instance(instance(HELLO, "10.1.1.1", 80, "http", ""));
    let summary = fixture.server.push_all();
    assert_eq!(summary.clusters, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.woken, 1);

    let second = client.next_response().await;
    assert_ne!(first.nonce, second.nonce);
    let assignment = only_assignment(second.assignments().unwrap());
    assert_eq!(assignment.endpoint_count(), 2);

    client.finish().await.unwrap();
}

#[tokio::test]
async fn test_larger_request_resubscribes() {
    let fixture = Fixture::new();
    fixture
        .services
        .add_instance(instance("world.default.svc.cluster.local", "10.2.0.1", 9090, "grpc", "az2"));
    let world = "outbound|grpc||world.default.svc.cluster.local";
    let mut client = fixture.open_stream("peer");

    client.send(DiscoveryRequest::subscribe("sidecar", &[HELLO_HTTP])).await;
    client.next_response().await;

    client
        .send(DiscoveryRequest::subscribe("sidecar", &[HELLO_HTTP, world]))
        .await;
    let response = client.next_response().await;
    let names: Vec<_> = response
        .assignments()
        .unwrap()
        .into_iter()
        .map(|a| a.cluster_name)
        .collect();
    assert_eq!(names, vec![HELLO_HTTP.to_string(), world.to_string()]);

    let cache = fixture.server.cache();
    assert_eq!(cache.get(HELLO_HTTP).unwrap().watcher_count(), 1);
    assert_eq!(cache.get(world).unwrap().watcher_count(), 1);

    // Same-size request after that is an acknowledgement.
    client
        .send(DiscoveryRequest::subscribe("sidecar", &[HELLO_HTTP, world]))
        .await;
    client.expect_silence().await;

    client.finish().await.unwrap();
    assert!(cache.is_empty());
}

#[tokio::test]
async fn test_empty_request_waits_for_clusters() {
    let fixture = Fixture::new();
    let mut client = fixture.open_stream("peer");

    client.send(DiscoveryRequest::subscribe("sidecar", &[])).await;
    client.expect_silence().await;

    client.send(DiscoveryRequest::subscribe("sidecar", &[HELLO_HTTP])).await;
    let response = client.next_response().await;
    assert_eq!(response.resources.len(), 1);

    client.finish().await.unwrap();
}

#[tokio::test]
async fn test_stream_end_deregisters() {
    let fixture = Fixture::new();
    let mut client = fixture.open_stream("peer");
    client.send(DiscoveryRequest::subscribe("sidecar", &[HELLO_HTTP])).await;
    client.next_response().await;
    assert_eq!(fixture.server.cache().len(), 1);

    assert!(client.finish().await.is_ok());
    assert!(fixture.server.cache().get(HELLO_HTTP).is_none());
    assert_eq!(fixture.server.push_all().woken, 0);
}

#[tokio::test]
async fn test_cancel_is_clean_close() {
    let fixture = Fixture::new();
    let mut client = fixture.open_stream("peer");
    client.send(DiscoveryRequest::subscribe("sidecar", &[HELLO_HTTP])).await;
    client.next_response().await;

    client.inject(Err(StreamError::Cancelled)).await;
    assert!(client.join().await.is_ok());
    assert!(fixture.server.cache().is_empty());
}

#[tokio::test]
async fn test_transport_error_is_returned() {
    let fixture = Fixture::new();
    let mut client = fixture.open_stream("peer");
    client.send(DiscoveryRequest::subscribe("sidecar", &[HELLO_HTTP])).await;
    client.next_response().await;

    client
        .inject(Err(StreamError::Transport("connection reset".into())))
        .await;
    let err = client.join().await.unwrap_err();
    assert!(matches!(
        err,
        DiscoveryError::Stream(StreamError::Transport(ref m)) if m == "connection reset"
    ));
    assert!(fixture.server.cache().is_empty());
}

#[tokio::test]
async fn test_reconnect_with_same_node_id() {
    let fixture = Fixture::new();

    let mut first = fixture.open_stream("10.0.0.9:40000");
    first.send(DiscoveryRequest::subscribe("sidecar", &[HELLO_HTTP])).await;
    first.next_response().await;

    let mut second = fixture.open_stream("10.0.0.9:40001");
    second.send(DiscoveryRequest::subscribe("sidecar", &[HELLO_HTTP])).await;
    second.next_response().await;

    let record = fixture.server.cache().get(HELLO_HTTP).unwrap();
    assert_eq!(record.watcher_count(), 2);
    assert_eq!(record.watcher("sidecar-1").unwrap().peer_addr(), "10.0.0.9:40000");
    assert_eq!(record.watcher("sidecar-2").unwrap().peer_addr(), "10.0.0.9:40001");

    first.finish().await.unwrap();
    assert_eq!(record.watcher_count(), 1);

    // The survivor still receives pushes.
    fixture.server.push_all();
    second.next_response().await;
    second.finish().await.unwrap();
}

#[tokio::test]
async fn test_unresolvable_cluster_is_omitted() {
    let fixture = Fixture::new();
    fixture
        .services
        .set_failure(Some(RegistryError::Unavailable("down".into())));
    let mut client = fixture.open_stream("peer");

    client.send(DiscoveryRequest::subscribe("sidecar", &[HELLO_HTTP])).await;
    let response = client.next_response().await;
    assert!(response.resources.is_empty());

    // Recovery is picked up by the next global push.
    fixture.services.set_failure(None);
    let summary = fixture.server.push_all();
    assert_eq!(summary.failed, 0);
    let response = client.next_response().await;
    assert_eq!(response.resources.len(), 1);

    client.finish().await.unwrap();
}

#[tokio::test]
async fn test_malformed_cluster_gets_empty_assignment() {
    let fixture = Fixture::new();
    let mut client = fixture.open_stream("peer");

    client.send(DiscoveryRequest::subscribe("sidecar", &["outbound|http"])).await;
    let assignment = only_assignment(client.next_response().await.assignments().unwrap());
    assert_eq!(assignment.cluster_name, "outbound|http");
    assert!(assignment.is_empty());

    client.finish().await.unwrap();
}

#[tokio::test]
async fn test_unimplemented_methods() {
    let fixture = Fixture::new();

    let err = fixture
        .server
        .fetch_endpoints(DiscoveryRequest::subscribe("sidecar", &[HELLO_HTTP]))
        .await
        .unwrap_err();
    assert!(matches!(err, DiscoveryError::NotImplemented));

    let err = fixture
        .server
        .stream_load_stats(futures_util::stream::empty::<Inbound>())
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "unsupported streaming method");
}

#[tokio::test]
async fn test_duplicate_cluster_names_are_collapsed() {
    let fixture = Fixture::new();
    let mut client = fixture.open_stream("peer");

    client
        .send(DiscoveryRequest::subscribe("sidecar", &[HELLO_HTTP, HELLO_HTTP]))
        .await;
    let response = client.next_response().await;
    let assignment = only_assignment(response.assignments().unwrap());
    assert_eq!(assignment.cluster_name, HELLO_HTTP);

    let record = fixture.server.cache().get(HELLO_HTTP).unwrap();
    let watcher = record.watcher("sidecar-1").unwrap();
    assert_eq!(*watcher.clusters(), vec![HELLO_HTTP.to_string()]);

    // Repeating the duplicated request is an acknowledgement, not a larger set.
    client
        .send(DiscoveryRequest::subscribe("sidecar", &[HELLO_HTTP, HELLO_HTTP]))
        .await;
    client.expect_silence().await;

    client.finish().await.unwrap();
    assert!(fixture.server.cache().is_empty());
}
