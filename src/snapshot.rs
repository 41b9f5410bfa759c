//! Defines snapshot archive packaging.
//!
//! A snapshot is a gzip-compressed tar of a node's entire filesystem root,
//! with entries relative to that root. Snapshots bootstrap NEW members and
//! resync members returning from DEAD.

use std::io;
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

/// Packages the whole tree under `root` into a gzip tar archive.
pub fn package(root: &Path) -> io::Result<Vec<u8>> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(".", root)?;
    builder.into_inner()?.finish()
}

/// Extracts a gzip tar archive produced by [`package`] into `root`.
///
/// The caller is expected to have cleared `root` first (the heartbeat engine
/// always runs `mkfs` on the target before a sync); a failed extraction
/// leaves the member NEW/DEAD so the next tick retries.
pub fn unpack(bytes: &[u8], root: &Path) -> io::Result<()> {
    let mut archive = tar::Archive::new(GzDecoder::new(bytes));
    archive.unpack(root)
}
