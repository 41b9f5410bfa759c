#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use dfs_mamont::data_node::{Advertise, DataNodeService};
use dfs_mamont::http_node::HttpDataNode;
use dfs_mamont::members::MemberDb;
use dfs_mamont::name_node::NameNode;
use dfs_mamont::server;

/// One data node served over loopback.
pub struct DataNodeFixture {
    pub tempdir: TempDir,
    pub service: Arc<DataNodeService>,
    pub url: String,
    task: JoinHandle<()>,
}

impl DataNodeFixture {
    /// Client speaking the wire protocol against this node.
    pub fn client(&self) -> HttpDataNode {
        HttpDataNode::new(&self.url, std::time::Duration::from_secs(5)).expect("build client")
    }

    /// Tears the HTTP front end down; storage and identity stay on disk.
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for DataNodeFixture {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawns a data node on an ephemeral loopback port, optionally joining a
/// name node during startup.
pub async fn spawn_data_node(namenode_url: Option<&str>) -> DataNodeFixture {
    let tempdir = TempDir::new().expect("create temp dir");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind data node");
    let port = listener.local_addr().expect("local addr").port();
    let advertise = Advertise { port: Some(port), host: None, public_url: None };
    let service = Arc::new(
        DataNodeService::open(tempdir.path().join("root"), advertise, namenode_url)
            .await
            .expect("open data node"),
    );
    let app = server::data_node_router(service.clone());
    let task = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .expect("serve data node");
    });
    let url = format!("http://127.0.0.1:{port}/");
    DataNodeFixture { tempdir, service, url, task }
}

/// The name node under test, with direct access to its member table.
pub struct NameNodeFixture {
    pub tempdir: TempDir,
    pub db: Arc<MemberDb>,
    pub node: Arc<NameNode<HttpDataNode>>,
    pub url: String,
    task: JoinHandle<()>,
}

impl Drop for NameNodeFixture {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Spawns a name node on an ephemeral loopback port. The heartbeat worker is
/// not started; tests drive `heartbeat::tick` themselves for determinism.
pub async fn spawn_name_node() -> NameNodeFixture {
    let tempdir = TempDir::new().expect("create temp dir");
    let db = Arc::new(MemberDb::open(tempdir.path().join("nodes")).expect("open member db"));
    let node = Arc::new(NameNode::<HttpDataNode>::new(db.clone()));
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind name node");
    let port = listener.local_addr().expect("local addr").port();
    let app = server::name_node_router(node.clone());
    let task = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .await
            .expect("serve name node");
    });
    let url = format!("http://127.0.0.1:{port}/");
    NameNodeFixture { tempdir, db, node, url, task }
}

/// Raw wire call: `POST` with the body, or `GET` when the body is empty.
pub async fn call(base: &str, endpoint: &str, body: Vec<u8>) -> (reqwest::StatusCode, Vec<u8>) {
    let client = reqwest::Client::new();
    let url = format!("{base}{endpoint}");
    let request = if body.is_empty() { client.get(url) } else { client.post(url).body(body) };
    let response = request.send().await.expect("http call");
    let status = response.status();
    let bytes = response.bytes().await.expect("read body").to_vec();
    (status, bytes)
}

/// Like [`call`], but asserts success and returns the body.
pub async fn call_ok(base: &str, endpoint: &str, body: Vec<u8>) -> Vec<u8> {
    let (status, bytes) = call(base, endpoint, body).await;
    assert!(
        status.is_success(),
        "{endpoint} failed with {status}: {}",
        String::from_utf8_lossy(&bytes)
    );
    bytes
}
