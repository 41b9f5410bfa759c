//! Defines the data-node service --- [`DataNodeService`].
//!
//! The service wraps a [`NodeFs`] with a persistent identity and cluster
//! membership. Identity is a random 6-character token generated on first
//! start and kept, together with the joined name-node URL, in a sidecar
//! state file next to the filesystem root, so restarts preserve both.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};
use url::Url;

use crate::error::{Error, Result};
use crate::http_node::{DEFAULT_PEER_TIMEOUT, SNAPSHOT_TIMEOUT};
use crate::node::DataNode;
use crate::vfs::NodeFs;

const ID_SYMBOLS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const ID_LENGTH: usize = 6;

/// Generates a node identity: [`ID_LENGTH`] lowercase-alphanumeric
/// characters.
pub fn gen_id() -> String {
    let mut rng = rand::thread_rng();
    (0..ID_LENGTH).map(|_| ID_SYMBOLS[rng.gen_range(0..ID_SYMBOLS.len())] as char).collect()
}

/// How a data node advertises itself in the join handshake.
#[derive(Debug, Clone, Default)]
pub struct Advertise {
    /// Port the name node should call back on. Required to join.
    pub port: Option<u16>,
    /// Host override; when absent the name node substitutes the TCP source
    /// address of the join request.
    pub host: Option<String>,
    /// Client-visible URL override handed out for read redirects.
    pub public_url: Option<String>,
}

/// A single replica: host-backed filesystem plus cluster membership.
pub struct DataNodeService {
    fs: NodeFs,
    state_path: PathBuf,
    id: String,
    advertise: Advertise,
    namenode_url: Mutex<Option<String>>,
    client: Client,
}

impl DataNodeService {
    /// Loads or creates the node state beside `fs_root`, then joins
    /// `namenode_url` when configured and not already a member.
    pub async fn open(
        fs_root: impl Into<PathBuf>,
        advertise: Advertise,
        namenode_url: Option<&str>,
    ) -> Result<Self> {
        let fs = NodeFs::new(fs_root);
        fs::create_dir_all(fs.root()).await?;
        let state_path = sidecar_path(fs.root());
        let (id, joined) = match load_state(&state_path).await? {
            Some(state) => state,
            None => (gen_id(), None),
        };
        let client = Client::builder()
            .timeout(DEFAULT_PEER_TIMEOUT)
            .build()
            .map_err(|err| Error::Io(std::io::Error::other(err)))?;
        let service = Self {
            fs,
            state_path,
            id,
            advertise,
            namenode_url: Mutex::new(joined),
            client,
        };
        if let Some(url) = namenode_url {
            if service.namenode_url().await.as_deref() != Some(url) {
                service.join_namespace(url).await?;
            }
        }
        service.persist_state().await?;
        Ok(service)
    }

    /// The node's persistent identity.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The name node this node belongs to, if any.
    pub async fn namenode_url(&self) -> Option<String> {
        self.namenode_url.lock().await.clone()
    }

    /// Joins the cluster coordinated by `namenode_url`.
    ///
    /// The handshake body is `"[public_url ][host:]port id"`; when the host
    /// is omitted the name node substitutes the request's source address.
    pub async fn join_namespace(&self, namenode_url: &str) -> Result<()> {
        if self.namenode_url().await.is_some() {
            return Err(Error::AlreadyMember(self.id.clone()));
        }
        let base = Url::parse(namenode_url).map_err(|_| Error::InvalidUrl(namenode_url.to_owned()))?;
        if !base.has_host() {
            return Err(Error::InvalidUrl(namenode_url.to_owned()));
        }
        let port = self.advertise.port.ok_or_else(|| {
            Error::Config("an advertised port is required to join a cluster".to_owned())
        })?;
        let endpoint = match &self.advertise.host {
            Some(host) => format!("{host}:{port}"),
            None => port.to_string(),
        };
        let mut tokens = Vec::new();
        if let Some(public_url) = &self.advertise.public_url {
            tokens.push(public_url.clone());
        }
        tokens.push(endpoint);
        tokens.push(self.id.clone());
        let join_url =
            base.join("nodes/join").map_err(|_| Error::InvalidUrl(namenode_url.to_owned()))?;
        let response = self
            .client
            .post(join_url)
            .body(tokens.join(" ").into_bytes())
            .send()
            .await
            .map_err(|_| Error::PeerUnreachable(namenode_url.to_owned()))?;
        if !response.status().is_success() {
            return Err(Error::Remote(response.text().await.unwrap_or_default()));
        }
        *self.namenode_url.lock().await = Some(namenode_url.to_owned());
        self.persist_state().await?;
        info!(namenode = namenode_url, id = %self.id, "joined namespace");
        Ok(())
    }

    /// Leaves the cluster. Notifying the name node is best-effort: transport
    /// failures are logged and local membership is cleared regardless.
    pub async fn leave_namespace(&self) -> Result<()> {
        let Some(url) = self.namenode_url.lock().await.take() else {
            return Err(Error::NotAMember(self.id.clone()));
        };
        match Url::parse(&url).and_then(|base| base.join("nodes/leave")) {
            Ok(leave_url) => {
                let sent =
                    self.client.post(leave_url).body(self.id.clone().into_bytes()).send().await;
                match sent {
                    Ok(response) if response.status().is_success() => {}
                    _ => warn!(namenode = %url, "failed to notify name node, leaving anyway"),
                }
            }
            Err(_) => warn!(namenode = %url, "stored name node url is invalid, leaving anyway"),
        }
        self.persist_state().await?;
        info!(id = %self.id, "left namespace");
        Ok(())
    }

    async fn persist_state(&self) -> Result<()> {
        let mut state = self.id.clone();
        state.push('\n');
        if let Some(url) = self.namenode_url().await {
            state.push_str(&url);
        }
        fs::write(&self.state_path, state).await?;
        Ok(())
    }
}

#[async_trait]
impl DataNode for DataNodeService {
    async fn mkfs(&self) -> Result<()> {
        self.fs.mkfs().await
    }

    async fn df(&self) -> Result<(u64, u64, u64)> {
        self.fs.df().await
    }

    async fn cd(&self, path: &str) -> Result<()> {
        self.fs.cd(path).await
    }

    async fn ls(&self, path: Option<&str>) -> Result<Vec<String>> {
        self.fs.ls(path).await
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        self.fs.mkdir(path).await
    }

    async fn rmdir(&self, path: &str, force: bool) -> Result<()> {
        self.fs.rmdir(path, force).await
    }

    async fn touch(&self, path: &str) -> Result<()> {
        self.fs.touch(path).await
    }

    async fn cat(&self, path: &str) -> Result<Vec<u8>> {
        self.fs.cat(path).await
    }

    async fn tee(&self, path: &str, data: &[u8]) -> Result<()> {
        self.fs.tee(path, data).await
    }

    async fn rm(&self, path: &str) -> Result<()> {
        self.fs.rm(path).await
    }

    async fn stat(&self, path: &str) -> Result<(String, u64, u32)> {
        self.fs.stat(path).await
    }

    async fn cp(&self, src: &str, dst: &str) -> Result<()> {
        self.fs.cp(src, dst).await
    }

    async fn mv(&self, src: &str, dst: &str) -> Result<()> {
        self.fs.mv(src, dst).await
    }

    async fn sync(&self, donor_url: &str) -> Result<()> {
        let base = Url::parse(donor_url).map_err(|_| Error::InvalidUrl(donor_url.to_owned()))?;
        let snap_url = base.join("snap").map_err(|_| Error::InvalidUrl(donor_url.to_owned()))?;
        let response = self
            .client
            .get(snap_url)
            .timeout(SNAPSHOT_TIMEOUT)
            .send()
            .await
            .map_err(|_| Error::PeerUnreachable(donor_url.to_owned()))?;
        if !response.status().is_success() {
            return Err(Error::Remote(response.text().await.unwrap_or_default()));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|_| Error::PeerUnreachable(donor_url.to_owned()))?;
        self.fs.unpack(bytes.to_vec()).await
    }

    async fn snap(&self) -> Result<Vec<u8>> {
        self.fs.package().await
    }

    async fn ping_alive(&self) -> bool {
        true
    }
}

async fn load_state(path: &Path) -> Result<Option<(String, Option<String>)>> {
    match fs::read_to_string(path).await {
        Ok(contents) => {
            let mut lines = contents.lines();
            let id = lines.next().unwrap_or("").trim().to_owned();
            if id.is_empty() {
                return Err(Error::Decode(format!("corrupt state file {}", path.display())));
            }
            let namenode =
                lines.next().map(str::trim).filter(|l| !l.is_empty()).map(str::to_owned);
            Ok(Some((id, namenode)))
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn sidecar_path(fs_root: &Path) -> PathBuf {
    let mut raw = fs_root.as_os_str().to_owned();
    raw.push(".state");
    PathBuf::from(raw)
}

#[cfg(test)]
mod tests {
    use super::{gen_id, sidecar_path, ID_LENGTH};
    use std::path::Path;

    #[test]
    fn test_gen_id_shape() {
        for _ in 0..64 {
            let id = gen_id();
            assert_eq!(id.len(), ID_LENGTH);
            assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_sidecar_sits_next_to_root() {
        assert_eq!(sidecar_path(Path::new("/srv/dfs/root")), Path::new("/srv/dfs/root.state"));
    }
}
