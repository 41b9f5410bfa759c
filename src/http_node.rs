//! Defines the HTTP client for a remote data node --- [`HttpDataNode`].
//!
//! Each operation maps to one endpoint: `POST` with the encoded frame as the
//! body, or `GET` when the frame is empty. Every request carries a per-peer
//! timeout so one slow member cannot stall a fan-out indefinitely.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::codec;
use crate::error::{Error, Result};
use crate::node::{Connect, DataNode};

/// Per-request timeout applied to every peer call.
pub const DEFAULT_PEER_TIMEOUT: Duration = Duration::from_secs(5);

/// Snapshot downloads can dwarf a normal request body, so they get a longer
/// allowance.
pub const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(60);

/// A remote data node addressed by its internal URL.
pub struct HttpDataNode {
    base: Url,
    client: Client,
}

impl HttpDataNode {
    /// Builds a client for the data node at `url`.
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let base = Url::parse(url).map_err(|_| Error::InvalidUrl(url.to_owned()))?;
        if !base.has_host() {
            return Err(Error::InvalidUrl(url.to_owned()));
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| Error::Io(std::io::Error::other(err)))?;
        Ok(Self { base, client })
    }

    /// The address this client talks to.
    pub fn url(&self) -> &str {
        self.base.as_str()
    }

    async fn call(&self, endpoint: &str, body: Vec<u8>) -> Result<Vec<u8>> {
        self.call_with_timeout(endpoint, body, None).await
    }

    async fn call_with_timeout(
        &self,
        endpoint: &str,
        body: Vec<u8>,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>> {
        let url =
            self.base.join(endpoint).map_err(|_| Error::InvalidUrl(endpoint.to_owned()))?;
        let mut request = if body.is_empty() {
            self.client.get(url)
        } else {
            self.client.post(url).body(body)
        };
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|_| Error::PeerUnreachable(self.base.to_string()))?;
        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|_| Error::PeerUnreachable(self.base.to_string()))?;
        if !status.is_success() {
            return Err(Error::Remote(String::from_utf8_lossy(&bytes).into_owned()));
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl DataNode for HttpDataNode {
    async fn mkfs(&self) -> Result<()> {
        self.call("mkfs", Vec::new()).await.map(drop)
    }

    async fn df(&self) -> Result<(u64, u64, u64)> {
        codec::decode_df(&self.call("df", Vec::new()).await?)
    }

    async fn cd(&self, path: &str) -> Result<()> {
        self.call("cd", codec::encode_path(path)).await.map(drop)
    }

    async fn ls(&self, path: Option<&str>) -> Result<Vec<String>> {
        let body = path.map(codec::encode_path).unwrap_or_default();
        codec::decode_list(&self.call("ls", body).await?)
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        self.call("mkdir", codec::encode_path(path)).await.map(drop)
    }

    async fn rmdir(&self, path: &str, force: bool) -> Result<()> {
        self.call("rmdir", codec::encode_flagged_path(path, force)).await.map(drop)
    }

    async fn touch(&self, path: &str) -> Result<()> {
        self.call("touch", codec::encode_path(path)).await.map(drop)
    }

    async fn cat(&self, path: &str) -> Result<Vec<u8>> {
        self.call("cat", codec::encode_path(path)).await
    }

    async fn tee(&self, path: &str, data: &[u8]) -> Result<()> {
        self.call("tee", codec::encode_blob(path, data)).await.map(drop)
    }

    async fn rm(&self, path: &str) -> Result<()> {
        self.call("rm", codec::encode_path(path)).await.map(drop)
    }

    async fn stat(&self, path: &str) -> Result<(String, u64, u32)> {
        codec::decode_stat(&self.call("stat", codec::encode_path(path)).await?)
    }

    async fn cp(&self, src: &str, dst: &str) -> Result<()> {
        self.call("cp", codec::encode_pair(src, dst)).await.map(drop)
    }

    async fn mv(&self, src: &str, dst: &str) -> Result<()> {
        self.call("mv", codec::encode_pair(src, dst)).await.map(drop)
    }

    async fn sync(&self, donor_url: &str) -> Result<()> {
        self.call_with_timeout("sync", codec::encode_path(donor_url), Some(SNAPSHOT_TIMEOUT))
            .await
            .map(drop)
    }

    async fn snap(&self) -> Result<Vec<u8>> {
        self.call_with_timeout("snap", Vec::new(), Some(SNAPSHOT_TIMEOUT)).await
    }

    async fn ping_alive(&self) -> bool {
        self.call("ping_alive", Vec::new()).await.is_ok()
    }
}

impl Connect for HttpDataNode {
    fn connect(url: &str) -> Result<Self> {
        Self::new(url, DEFAULT_PEER_TIMEOUT)
    }
}
