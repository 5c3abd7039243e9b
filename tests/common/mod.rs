// Test helpers are intentionally partially used
#![allow(dead_code)]

use chrono::NaiveDate;
use reqwest::Client;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::time::sleep;
use zivpn_access::domain::{Credential, CredentialStore, FixedClock, Flow, MetricsPtr, Registry};
use zivpn_access::{
    create_json_store, create_noop_metrics, create_router_with, AccessService, AccessSettings,
    Collaborators, MemoryPacketFilter, RecordingVpnServer, StaticNetwork,
};

/// "Today" as seen by every server built here.
pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
}

// ============================================================================
// Test Setup
// ============================================================================

/// Router on an ephemeral port, wired to in-memory host adapters and a
/// registry file in its own temp directory.
pub struct TestServer {
    pub addr: std::net::SocketAddr,
    pub client: Client,
    pub network: Arc<StaticNetwork>,
    pub filter: Arc<MemoryPacketFilter>,
    pub vpn: Arc<RecordingVpnServer>,
    pub users_file: PathBuf,
    _dir: TempDir,
}

impl TestServer {
    // ---
    pub async fn new() -> Self {
        Self::with_metrics(create_noop_metrics().expect("noop metrics")).await
    }

    pub async fn with_metrics(metrics: MetricsPtr) -> Self {
        // --

        // Enable debug logging only when requested
        if std::env::var("TEST_DEBUG").is_ok() {
            std::env::set_var("RUST_LOG", "debug");
            std::env::set_var("NO_COLOR", "1");
        }
        tracing_subscriber::fmt().with_test_writer().try_init().ok();

        let dir = tempfile::tempdir().unwrap();
        let users_file = dir.path().join("users.json");
        let network = Arc::new(StaticNetwork::new());
        let filter = Arc::new(MemoryPacketFilter::new());
        let vpn = Arc::new(RecordingVpnServer::default());

        let access = Arc::new(AccessService::new(
            Collaborators {
                store: Arc::new(create_json_store(&users_file)),
                packet_filter: filter.clone(),
                conntrack: network.clone(),
                sockets: network.clone(),
                vpn: vpn.clone(),
                clock: Arc::new(FixedClock(today())),
                metrics: metrics.clone(),
            },
            AccessSettings::default(),
        ));

        let app = create_router_with(access, metrics);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // Spawn the server in the background
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start
        sleep(Duration::from_millis(100)).await;

        let client = Client::new();

        Self {
            addr,
            client,
            network,
            filter,
            vpn,
            users_file,
            _dir: dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        // ---
        format!("http://{}{}", self.addr, path)
    }

    /// Writes `credentials` straight to the registry file.
    pub async fn seed(&self, credentials: Vec<Credential>) {
        // ---
        create_json_store(&self.users_file)
            .save(&Registry::new(credentials))
            .await
            .expect("seed registry");
    }

    /// Makes conntrack report one UDP flow from `src` to `port`.
    pub fn traffic_from(&self, src: &str, port: u16) {
        // ---
        self.network.set_flows(vec![Flow {
            protocol: "udp".to_string(),
            src_ip: src.parse().unwrap(),
            src_port: 50123,
            dst_port: port,
            bytes: None,
        }]);
    }
}

/// A credential on a fixed port.
pub fn credential(name: &str, port: u16) -> Credential {
    // ---
    let mut c = Credential::new(name, format!("{name}-secret"));
    c.port = Some(port);
    c
}
