//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use endpoint_discovery::config::ListenerConfig;
use endpoint_discovery::eds::{DiscoveryRequest, DiscoveryResponse, EndpointResolver, Inbound};
use endpoint_discovery::error::StreamError;
use endpoint_discovery::model::Labels;
use endpoint_discovery::registry::{MemoryConfigStore, MemoryServiceDiscovery, ServiceInstance};
use endpoint_discovery::{AdminServer, EndpointDiscoveryServer, HttpServer, Shutdown};

pub const HELLO: &str = "hello.default.svc.cluster.local";
pub const HELLO_HTTP: &str = "outbound|http||hello.default.svc.cluster.local";

pub fn instance(hostname: &str, address: &str, port: u16, port_name: &str, zone: &str) -> ServiceInstance {
    ServiceInstance {
        hostname: hostname.to_string(),
        address: address.to_string(),
        port,
        port_name: port_name.to_string(),
        zone: zone.to_string(),
        labels: Labels::default(),
    }
}

/// Discovery server over in-memory registries.
pub struct Fixture {
    pub server: Arc<EndpointDiscoveryServer>,
    pub services: Arc<MemoryServiceDiscovery>,
    pub subsets: Arc<MemoryConfigStore>,
}

impl Fixture {
    /// One `hello` instance at 10.1.1.0:80 serving port `http`.
    pub fn new() -> Self {
        let services = Arc::new(MemoryServiceDiscovery::from_instances([instance(
            HELLO, "10.1.1.0", 80, "http", "",
        )]));
        let subsets = Arc::new(MemoryConfigStore::new());
        let resolver = EndpointResolver::new(services.clone(), subsets.clone());
        let server = Arc::new(EndpointDiscoveryServer::new(resolver, true));
        Self {
            server,
            services,
            subsets,
        }
    }

    pub fn open_stream(&self, peer: &str) -> StreamClient {
        let (req_tx, req_rx) = mpsc::channel(8);
        let (resp_tx, resp_rx) = mpsc::channel(8);
        let server = self.server.clone();
        let peer = peer.to_string();
        let task = tokio::spawn(async move {
            server
                .stream_endpoints(peer, ReceiverStream::new(req_rx), resp_tx)
                .await
        });
        StreamClient {
            requests: Some(req_tx),
            responses: resp_rx,
            task,
        }
    }

    /// Start discovery and admin servers on ephemeral ports.
    pub async fn start_servers(&self) -> Servers {
        let shutdown = Shutdown::new();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let discovery = listener.local_addr().unwrap();
        let http = HttpServer::new(&ListenerConfig::default(), self.server.clone());
        let rx = shutdown.subscribe();
        tokio::spawn(async move {
            let _ = http.run(listener, rx).await;
        });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let admin = listener.local_addr().unwrap();
        let admin_server = AdminServer::new(self.server.clone());
        let rx = shutdown.subscribe();
        tokio::spawn(async move {
            let _ = admin_server.run(listener, rx).await;
        });

        Servers {
            discovery,
            admin,
            shutdown,
        }
    }
}

pub struct Servers {
    pub discovery: SocketAddr,
    pub admin: SocketAddr,
    pub shutdown: Shutdown,
}

/// Client side of an in-process discovery stream.
pub struct StreamClient {
    requests: Option<mpsc::Sender<Inbound>>,
    responses: mpsc::Receiver<DiscoveryResponse>,
    pub task: JoinHandle<endpoint_discovery::Result<()>>,
}

impl StreamClient {
    pub async fn send(&self, request: DiscoveryRequest) {
        self.inject(Ok(request)).await;
    }

    pub async fn inject(&self, item: Result<DiscoveryRequest, StreamError>) {
        self.requests
            .as_ref()
            .expect("stream already finished")
            .send(item)
            .await
            .expect("handler gone");
    }

    pub async fn next_response(&mut self) -> DiscoveryResponse {
        tokio::time::timeout(Duration::from_secs(2), self.responses.recv())
            .await
            .expect("timed out waiting for response")
            .expect("response channel closed")
    }

    /// Assert nothing is sent for a short while.
    pub async fn expect_silence(&mut self) {
        let res = tokio::time::timeout(Duration::from_millis(200), self.responses.recv()).await;
        assert!(res.is_err(), "unexpected response: {:?}", res);
    }

    /// Close the request side and wait for the handler to return.
    pub async fn finish(mut self) -> endpoint_discovery::Result<()> {
        self.requests.take();
        self.join().await
    }

    pub async fn join(self) -> endpoint_discovery::Result<()> {
        tokio::time::timeout(Duration::from_secs(2), self.task)
            .await
            .expect("handler did not stop")
            .expect("handler panicked")
    }
}
