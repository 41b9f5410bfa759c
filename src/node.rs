//! Defines the data-node capability interface --- [`DataNode`].
//!
//! Both the local service ([`crate::data_node::DataNodeService`]) and the
//! HTTP client ([`crate::http_node::HttpDataNode`]) implement this set; the
//! name node and the heartbeat engine are generic over it, so the member
//! implementation is chosen at construction time.

use async_trait::async_trait;

use crate::error::Result;

/// The operation set a cluster member exposes.
#[async_trait]
pub trait DataNode: Send + Sync {
    /// Wipes the node's storage and recreates an empty root.
    async fn mkfs(&self) -> Result<()>;

    /// Returns `(total, used, free)` bytes of the node's host volume.
    async fn df(&self) -> Result<(u64, u64, u64)>;

    /// Changes the node's working directory.
    async fn cd(&self, path: &str) -> Result<()>;

    /// Lists directory entries; `None` lists the working directory.
    async fn ls(&self, path: Option<&str>) -> Result<Vec<String>>;

    /// Creates a directory and missing parents.
    async fn mkdir(&self, path: &str) -> Result<()>;

    /// Removes a directory; non-empty directories require `force`.
    async fn rmdir(&self, path: &str, force: bool) -> Result<()>;

    /// Creates an empty file if absent.
    async fn touch(&self, path: &str) -> Result<()>;

    /// Returns the entire contents of a file.
    async fn cat(&self, path: &str) -> Result<Vec<u8>>;

    /// Truncates and writes a file.
    async fn tee(&self, path: &str, data: &[u8]) -> Result<()>;

    /// Unlinks a file.
    async fn rm(&self, path: &str) -> Result<()>;

    /// Returns `(logical_path, size, mode)`.
    async fn stat(&self, path: &str) -> Result<(String, u64, u32)>;

    /// Copies file bytes.
    async fn cp(&self, src: &str, dst: &str) -> Result<()>;

    /// Moves or renames.
    async fn mv(&self, src: &str, dst: &str) -> Result<()>;

    /// Pulls the donor's snapshot and extracts it into the node's root.
    async fn sync(&self, donor_url: &str) -> Result<()>;

    /// Emits the node's filesystem as a gzip tar snapshot.
    async fn snap(&self) -> Result<Vec<u8>>;

    /// Liveness probe. Transport failures are reported as `false`, never as
    /// an error.
    async fn ping_alive(&self) -> bool;
}

/// Constructor for [`DataNode`] implementations addressable by URL.
pub trait Connect: DataNode + Sized + Send + Sync + 'static {
    /// Builds a client for the member reachable at `url`.
    fn connect(url: &str) -> Result<Self>;
}
