//! Defines the per-node virtual filesystem --- [`NodeFs`].
//!
//! A data node owns a host directory (`fs_root`) and layers a logical
//! namespace over it. Logical paths are absolute (`/a/b`) or relative to the
//! node's working directory; every resolved host path is confined to
//! `fs_root`, and a path that tries to climb above `/` is refused.

use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::sync::Mutex;

use crate::error::{Error, Result};
use crate::snapshot;

/// Host-backed virtual filesystem with a working directory.
#[derive(Debug)]
pub struct NodeFs {
    fs_root: PathBuf,
    workdir: Mutex<String>,
}

impl NodeFs {
    /// Instantiates the filesystem over `fs_root` with the working directory
    /// at `/`. The root directory itself is not created here; `mkfs` does
    /// that, and a service may pre-create it at startup.
    pub fn new(fs_root: impl Into<PathBuf>) -> Self {
        Self { fs_root: fs_root.into(), workdir: Mutex::new("/".to_owned()) }
    }

    /// Borrows the host root path.
    pub fn root(&self) -> &Path {
        &self.fs_root
    }

    /// Returns the current logical working directory.
    pub async fn workdir(&self) -> String {
        self.workdir.lock().await.clone()
    }

    /// Removes any existing content, recreates an empty root and resets the
    /// working directory to `/`.
    pub async fn mkfs(&self) -> Result<()> {
        if fs::try_exists(&self.fs_root).await? {
            fs::remove_dir_all(&self.fs_root).await?;
        }
        fs::create_dir_all(&self.fs_root).await?;
        *self.workdir.lock().await = "/".to_owned();
        Ok(())
    }

    /// Returns `(total, used, free)` bytes of the host volume carrying the
    /// root.
    pub async fn df(&self) -> Result<(u64, u64, u64)> {
        disk_usage(&self.fs_root)
    }

    /// Changes the working directory.
    pub async fn cd(&self, path: &str) -> Result<()> {
        let host = self.resolve(path).await?;
        let meta = metadata_of(&host, path).await?;
        if !meta.is_dir() {
            return Err(Error::NotDir(path.to_owned()));
        }
        *self.workdir.lock().await = self.host_to_logical(&host);
        Ok(())
    }

    /// Lists directory entries of `path`, or of the working directory when
    /// `path` is absent. Order is unspecified.
    pub async fn ls(&self, path: Option<&str>) -> Result<Vec<String>> {
        let shown = path.unwrap_or(".");
        let host = self.resolve(path.unwrap_or("")).await?;
        let meta = metadata_of(&host, shown).await?;
        if !meta.is_dir() {
            return Err(Error::NotDir(shown.to_owned()));
        }
        let mut entries = fs::read_dir(&host).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    /// Creates a directory, including missing parents.
    pub async fn mkdir(&self, path: &str) -> Result<()> {
        let host = self.resolve(path).await?;
        if fs::try_exists(&host).await? {
            return Err(Error::AlreadyExists(path.to_owned()));
        }
        fs::create_dir_all(&host).await?;
        Ok(())
    }

    /// Removes a directory. A non-empty directory requires `force`; the root
    /// directory is never removable.
    pub async fn rmdir(&self, path: &str, force: bool) -> Result<()> {
        let host = self.resolve(path).await?;
        let meta = metadata_of(&host, path).await?;
        if !meta.is_dir() {
            return Err(Error::NotDir(path.to_owned()));
        }
        if host == self.fs_root {
            return Err(Error::RootRemoval);
        }
        let mut entries = fs::read_dir(&host).await?;
        let occupied = entries.next_entry().await?.is_some();
        drop(entries);
        if occupied && !force {
            return Err(Error::NotEmpty(path.to_owned()));
        }
        fs::remove_dir_all(&host).await?;
        Ok(())
    }

    /// Creates an empty file if `path` is absent; an existing file is left
    /// untouched.
    pub async fn touch(&self, path: &str) -> Result<()> {
        let host = self.resolve(path).await?;
        if fs::try_exists(&host).await? {
            return Ok(());
        }
        fs::File::create(&host).await.map_err(|err| not_found_or_io(err, path))?;
        Ok(())
    }

    /// Returns the entire contents of a file.
    pub async fn cat(&self, path: &str) -> Result<Vec<u8>> {
        let host = self.resolve(path).await?;
        let meta = metadata_of(&host, path).await?;
        if meta.is_dir() {
            return Err(Error::IsDir(path.to_owned()));
        }
        Ok(fs::read(&host).await?)
    }

    /// Truncates and writes `data` into `path`.
    pub async fn tee(&self, path: &str, data: &[u8]) -> Result<()> {
        let host = self.resolve(path).await?;
        if let Ok(meta) = fs::metadata(&host).await {
            if meta.is_dir() {
                return Err(Error::IsDir(path.to_owned()));
            }
        }
        fs::write(&host, data).await.map_err(|err| not_found_or_io(err, path))?;
        Ok(())
    }

    /// Unlinks a file.
    pub async fn rm(&self, path: &str) -> Result<()> {
        let host = self.resolve(path).await?;
        let meta = metadata_of(&host, path).await?;
        if meta.is_dir() {
            return Err(Error::IsDir(path.to_owned()));
        }
        fs::remove_file(&host).await?;
        Ok(())
    }

    /// Returns `(logical_path, size, mode)` for `path`.
    pub async fn stat(&self, path: &str) -> Result<(String, u64, u32)> {
        let host = self.resolve(path).await?;
        let meta = metadata_of(&host, path).await?;
        Ok((self.host_to_logical(&host), meta.len(), mode_bits(&meta)))
    }

    /// Copies file bytes from `src` to `dst`.
    pub async fn cp(&self, src: &str, dst: &str) -> Result<()> {
        let from = self.resolve(src).await?;
        let to = self.resolve(dst).await?;
        let meta = metadata_of(&from, src).await?;
        if meta.is_dir() {
            return Err(Error::IsDir(src.to_owned()));
        }
        fs::copy(&from, &to).await?;
        Ok(())
    }

    /// Moves or renames `src` to `dst`.
    pub async fn mv(&self, src: &str, dst: &str) -> Result<()> {
        let from = self.resolve(src).await?;
        let to = self.resolve(dst).await?;
        metadata_of(&from, src).await?;
        fs::rename(&from, &to).await?;
        Ok(())
    }

    /// Archives the whole tree as a gzip tar for snapshot transfer.
    pub async fn package(&self) -> Result<Vec<u8>> {
        let root = self.fs_root.clone();
        let bytes = tokio::task::spawn_blocking(move || snapshot::package(&root))
            .await
            .map_err(|err| Error::Io(io::Error::other(err)))??;
        Ok(bytes)
    }

    /// Extracts a donor snapshot into the (previously cleared) root.
    pub async fn unpack(&self, bytes: Vec<u8>) -> Result<()> {
        let root = self.fs_root.clone();
        tokio::task::spawn_blocking(move || snapshot::unpack(&bytes, &root))
            .await
            .map_err(|err| Error::Io(io::Error::other(err)))??;
        Ok(())
    }

    async fn resolve(&self, path: &str) -> Result<PathBuf> {
        let workdir = self.workdir().await;
        let logical = normalize(&workdir, path)?;
        let host = self.logical_to_host(&logical);
        // Confinement guard; normalize never emits `..`, so this only trips
        // if the invariant is broken elsewhere.
        if !host.starts_with(&self.fs_root) {
            return Err(Error::NotFound(path.to_owned()));
        }
        Ok(host)
    }

    fn logical_to_host(&self, logical: &str) -> PathBuf {
        let rel = logical.trim_start_matches('/');
        if rel.is_empty() {
            self.fs_root.clone()
        } else {
            self.fs_root.join(rel)
        }
    }

    fn host_to_logical(&self, host: &Path) -> String {
        match host.strip_prefix(&self.fs_root) {
            Ok(rel) if rel.as_os_str().is_empty() => "/".to_owned(),
            Ok(rel) => format!("/{}", rel.display()),
            // resolve() confines every host path to the root.
            Err(_) => "/".to_owned(),
        }
    }
}

/// Normalizes `path` against `workdir` into an absolute logical path.
///
/// `.` and empty components collapse; `..` pops one component and is refused
/// when there is nothing left to pop.
fn normalize(workdir: &str, path: &str) -> Result<String> {
    let joined = if path.starts_with('/') {
        path.to_owned()
    } else {
        format!("{}/{}", workdir.trim_end_matches('/'), path)
    };
    let mut parts: Vec<&str> = Vec::new();
    for component in joined.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(Error::NotFound(path.to_owned()));
                }
            }
            name => parts.push(name),
        }
    }
    Ok(format!("/{}", parts.join("/")))
}

async fn metadata_of(host: &Path, logical: &str) -> Result<std::fs::Metadata> {
    match fs::metadata(host).await {
        Ok(meta) => Ok(meta),
        Err(err) if err.kind() == ErrorKind::NotFound => Err(Error::NotFound(logical.to_owned())),
        Err(err) => Err(err.into()),
    }
}

fn not_found_or_io(err: io::Error, logical: &str) -> Error {
    if err.kind() == ErrorKind::NotFound {
        Error::NotFound(logical.to_owned())
    } else {
        Error::Io(err)
    }
}

#[cfg(unix)]
fn mode_bits(meta: &std::fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode()
}

#[cfg(not(unix))]
fn mode_bits(_meta: &std::fs::Metadata) -> u32 {
    0
}

#[cfg(unix)]
fn disk_usage(path: &Path) -> Result<(u64, u64, u64)> {
    use std::os::unix::ffi::OsStrExt;

    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|_| Error::Io(io::Error::new(ErrorKind::InvalidInput, "path contains NUL")))?;
    let mut stats = unsafe { std::mem::zeroed::<libc::statvfs>() };
    if unsafe { libc::statvfs(c_path.as_ptr(), &mut stats) } != 0 {
        return Err(io::Error::last_os_error().into());
    }
    let frsize = stats.f_frsize as u64;
    let total = stats.f_blocks as u64 * frsize;
    let free = stats.f_bavail as u64 * frsize;
    let used = total - stats.f_bfree as u64 * frsize;
    Ok((total, used, free))
}

#[cfg(not(unix))]
fn disk_usage(_path: &Path) -> Result<(u64, u64, u64)> {
    Err(Error::Io(io::Error::new(ErrorKind::Unsupported, "df is only supported on unix")))
}

#[cfg(test)]
mod tests {
    use super::normalize;
    use crate::error::Error;

    #[test]
    fn test_normalize_absolute_wins_over_workdir() {
        assert_eq!(normalize("/deep/dir", "/a/b").unwrap(), "/a/b");
    }

    #[test]
    fn test_normalize_relative_joins_workdir() {
        assert_eq!(normalize("/a", "b/c").unwrap(), "/a/b/c");
        assert_eq!(normalize("/", "b").unwrap(), "/b");
    }

    #[test]
    fn test_normalize_collapses_dot_and_empty() {
        assert_eq!(normalize("/a", "./b//c/.").unwrap(), "/a/b/c");
        assert_eq!(normalize("/a/b", "").unwrap(), "/a/b");
        assert_eq!(normalize("/a/b", ".").unwrap(), "/a/b");
    }

    #[test]
    fn test_normalize_parent_pops() {
        assert_eq!(normalize("/a/b", "..").unwrap(), "/a");
        assert_eq!(normalize("/", "a/../b").unwrap(), "/b");
    }

    #[test]
    fn test_normalize_refuses_root_escape() {
        assert!(matches!(normalize("/", ".."), Err(Error::NotFound(_))));
        assert!(matches!(normalize("/a", "../../.."), Err(Error::NotFound(_))));
        assert!(matches!(normalize("/", "/.."), Err(Error::NotFound(_))));
    }
}
