//! Defines the error taxonomy shared by the VFS, the codec, the membership
//! store, and both dispatchers.

/// Result of DFS operations.
pub type Result<T> = std::result::Result<T, Error>;

/// DFS errors.
///
/// Every variant's message is what a client sees in the body of a `400`
/// response; [`Error::Io`] surfaces as a `500` instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The path given to an operation does not exist. Also raised when a
    /// logical path tries to climb above the filesystem root.
    #[error("{0} does not exist")]
    NotFound(String),
    /// A directory operation was given a non-directory.
    #[error("{0} is not a dir")]
    NotDir(String),
    /// A file operation was given a directory.
    #[error("{0} is a directory")]
    IsDir(String),
    /// The target of a creating operation already exists.
    #[error("{0} already exists")]
    AlreadyExists(String),
    /// `rmdir` without force on a non-empty directory.
    #[error("{0} is not empty")]
    NotEmpty(String),
    /// The root directory cannot be removed.
    #[error("cannot remove root dir")]
    RootRemoval,
    /// A URL without a network authority, or one that cannot be parsed.
    #[error("invalid url {0}")]
    InvalidUrl(String),
    /// A node id that is already present in the membership table, or a data
    /// node that already belongs to a cluster.
    #[error("{0} is already a member")]
    AlreadyMember(String),
    /// A node id missing from the membership table, or a data node that
    /// belongs to no cluster.
    #[error("{0} is not a member")]
    NotAMember(String),
    /// No ALIVE member is left to serve a read.
    #[error("no alive members in the cluster")]
    ClusterUnavailable,
    /// A request body that does not match the frame grammar.
    #[error("malformed request: {0}")]
    Decode(String),
    /// A peer could not be reached at the transport level.
    #[error("peer {0} is unreachable")]
    PeerUnreachable(String),
    /// An error reported by a peer, forwarded verbatim so the original kind
    /// message survives the hop through the name node.
    #[error("{0}")]
    Remote(String),
    /// Startup misconfiguration.
    #[error("{0}")]
    Config(String),
    /// Host filesystem failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
