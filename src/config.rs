//! Defines server configuration --- [`Cli`] and [`Config`].
//!
//! Every command-line flag falls back to its `DFS_*` environment variable;
//! an optional TOML file supplies the same keys with the lowest precedence.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::heartbeat;

/// Default bind host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default bind (and advertised) port.
pub const DEFAULT_PORT: u16 = 8180;

/// Which role this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeClass {
    NameNode,
    DataNode,
}

/// Command line of the server binary.
#[derive(Debug, Parser)]
#[command(name = "dfs-mamont", about = "Replicated DFS name/data node server")]
pub struct Cli {
    /// Role to run.
    #[arg(long, value_enum, env = "DFS_NODE_CLASS")]
    pub node_class: Option<NodeClass>,

    /// Data-node storage root.
    #[arg(long, env = "DFS_FS_ROOT")]
    pub fs_root: Option<PathBuf>,

    /// Cluster to join at startup (data node).
    #[arg(long, env = "DFS_NAMENODE_URL")]
    pub namenode_url: Option<String>,

    /// Bind and advertised port.
    #[arg(long, env = "DFS_PORT")]
    pub port: Option<u16>,

    /// Advertised host override for the join handshake; without it the name
    /// node substitutes the TCP source address.
    #[arg(long, env = "DFS_ADVERTISE_HOST")]
    pub advertise_host: Option<String>,

    /// Client-visible URL override handed out for read redirects.
    #[arg(long, env = "DFS_PUBLIC_URL")]
    pub public_url: Option<String>,

    /// Name-node membership table path.
    #[arg(long, env = "DFS_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Heartbeat interval in seconds.
    #[arg(long, env = "DFS_HEARTBEAT")]
    pub heartbeat: Option<u64>,

    /// Bind host.
    #[arg(long, env = "DFS_HOST")]
    pub host: Option<String>,

    /// Optional TOML configuration file; command line and environment win.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// File-level configuration: any subset of the CLI keys.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub node_class: Option<NodeClass>,
    pub fs_root: Option<PathBuf>,
    pub namenode_url: Option<String>,
    pub port: Option<u16>,
    pub advertise_host: Option<String>,
    pub public_url: Option<String>,
    pub db_path: Option<PathBuf>,
    pub heartbeat: Option<u64>,
    pub host: Option<String>,
}

impl FileConfig {
    fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        toml::from_str(&contents)
            .map_err(|err| Error::Config(format!("{}: {err}", path.display())))
    }
}

/// Fully resolved runtime configuration.
#[derive(Debug)]
pub struct Config {
    pub node_class: NodeClass,
    pub host: String,
    pub port: u16,
    pub fs_root: Option<PathBuf>,
    pub namenode_url: Option<String>,
    pub advertise_host: Option<String>,
    pub public_url: Option<String>,
    pub db_path: Option<PathBuf>,
    pub heartbeat: Duration,
}

impl Config {
    /// Merges the command line (and environment, already folded in by clap)
    /// over the optional file layer.
    pub fn resolve(cli: Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        let node_class = cli.node_class.or(file.node_class).ok_or_else(|| {
            Error::Config("a node class is required (DFS_NODE_CLASS or --node-class)".to_owned())
        })?;
        Ok(Self {
            node_class,
            host: cli.host.or(file.host).unwrap_or_else(|| DEFAULT_HOST.to_owned()),
            port: cli.port.or(file.port).unwrap_or(DEFAULT_PORT),
            fs_root: cli.fs_root.or(file.fs_root),
            namenode_url: cli.namenode_url.or(file.namenode_url),
            advertise_host: cli.advertise_host.or(file.advertise_host),
            public_url: cli.public_url.or(file.public_url),
            db_path: cli.db_path.or(file.db_path),
            heartbeat: cli
                .heartbeat
                .or(file.heartbeat)
                .map(Duration::from_secs)
                .unwrap_or(heartbeat::DEFAULT_INTERVAL),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{Cli, Config, NodeClass, DEFAULT_HOST, DEFAULT_PORT};
    use clap::Parser;
    use std::time::Duration;

    #[test]
    fn test_resolve_applies_defaults() {
        let cli = Cli::parse_from(["dfs-mamont", "--node-class", "name-node"]);
        let config = Config::resolve(cli).unwrap();
        assert_eq!(config.node_class, NodeClass::NameNode);
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.heartbeat, Duration::from_secs(1));
    }

    #[test]
    fn test_resolve_requires_a_role() {
        let cli = Cli::parse_from(["dfs-mamont"]);
        assert!(Config::resolve(cli).is_err());
    }

    #[test]
    fn test_file_layer_loses_to_cli() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("dfs.toml");
        std::fs::write(&path, "node_class = \"data-node\"\nport = 9000\nhost = \"::\"\n")
            .unwrap();

        let cli = Cli::parse_from([
            "dfs-mamont",
            "--port",
            "9100",
            "--config",
            path.to_str().unwrap(),
        ]);
        let config = Config::resolve(cli).unwrap();
        assert_eq!(config.node_class, NodeClass::DataNode);
        assert_eq!(config.port, 9100);
        assert_eq!(config.host, "::");
    }
}
