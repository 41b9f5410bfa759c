//! Server binary: picks the role, wires the HTTP front end and runs it.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dfs_mamont::config::{Cli, Config, NodeClass};
use dfs_mamont::data_node::{Advertise, DataNodeService};
use dfs_mamont::error::{Error, Result};
use dfs_mamont::heartbeat::Heartbeat;
use dfs_mamont::http_node::HttpDataNode;
use dfs_mamont::members::MemberDb;
use dfs_mamont::name_node::NameNode;
use dfs_mamont::server;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        error!(error = %err, "server failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::resolve(cli)?;
    let listener = TcpListener::bind((config.host.as_str(), config.port)).await?;
    info!(host = %config.host, port = config.port, "listening");
    match config.node_class {
        NodeClass::DataNode => run_data_node(config, listener).await,
        NodeClass::NameNode => run_name_node(config, listener).await,
    }
}

async fn run_data_node(config: Config, listener: TcpListener) -> Result<()> {
    let fs_root = config.fs_root.ok_or_else(|| {
        Error::Config("a data node requires a filesystem root (DFS_FS_ROOT)".to_owned())
    })?;
    let advertise = Advertise {
        port: Some(config.port),
        host: config.advertise_host,
        public_url: config.public_url,
    };
    let service =
        Arc::new(DataNodeService::open(fs_root, advertise, config.namenode_url.as_deref()).await?);
    info!(id = service.id(), "data node ready");
    let app = server::data_node_router(service).layer(TraceLayer::new_for_http());
    serve(listener, app).await
}

async fn run_name_node(config: Config, listener: TcpListener) -> Result<()> {
    let db_path = config.db_path.ok_or_else(|| {
        Error::Config("a name node requires a membership table path (DFS_DB_PATH)".to_owned())
    })?;
    let db = Arc::new(MemberDb::open(db_path)?);
    let node = Arc::new(NameNode::<HttpDataNode>::new(db.clone()));
    let heartbeat = Heartbeat::spawn::<HttpDataNode>(db, config.heartbeat);
    info!("name node ready");
    let app = server::name_node_router(node).layer(TraceLayer::new_for_http());
    let outcome = serve(listener, app).await;
    heartbeat.shutdown().await;
    outcome
}

async fn serve(listener: TcpListener, app: axum::Router) -> Result<()> {
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
