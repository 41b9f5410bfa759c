//! Defines the durable membership store --- [`MemberDb`].
//!
//! One record per data node, keyed by id, kept both in memory and in a
//! TAB-separated file with fixed field order `id, url, public_url, status`.
//! Every completed mutation flushes the whole table, so the map and the file
//! agree at all times and a restart reloads the same records.


use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use crate::error::{Error, Result};

/// Member lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Registered, awaiting initial sync.
    New,
    /// Serving reads and writes.
    Alive,
    /// Unreachable; resynced from a donor on return.
    Dead,
}

impl Status {
    /// The on-disk token for this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Status::New => "new",
            Status::Alive => "alive",
            Status::Dead => "dead",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "new" => Ok(Status::New),
            "alive" => Ok(Status::Alive),
            "dead" => Ok(Status::Dead),
            other => Err(Error::Decode(format!("unknown member status {other:?}"))),
        }
    }
}

/// One membership record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Unique 6-character node token.
    pub id: String,
    /// Internal URL the name node calls the node on.
    pub url: String,
    /// Client-visible URL handed out for read redirects; equals `url` unless
    /// the node advertised something else.
    pub public_url: String,
    pub status: Status,
}

/// Predicate set for [`MemberDb::filter`]; the default matches everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemberFilter {
    status: Option<Status>,
}

impl MemberFilter {
    /// Restricts matches to one status.
    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    fn matches(&self, member: &Member) -> bool {
        self.status.map_or(true, |status| member.status == status)
    }
}

/// Durable, concurrency-safe member table.
pub struct MemberDb {
    path: PathBuf,
    records: Mutex<Vec<Member>>,
}

impl MemberDb {
    /// Opens an existing table or creates an empty one with mode `0600`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(contents) => parse_table(&contents)?,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                create_restricted(&path)?;
                Vec::new()
            }
            Err(err) => return Err(err.into()),
        };
        Ok(Self { path, records: Mutex::new(records) })
    }

    /// Inserts a NEW member; duplicate ids are rejected.
    pub fn create(&self, id: &str, url: &str, public_url: Option<&str>) -> Result<Member> {
        let mut records = self.lock();
        if records.iter().any(|m| m.id == id) {
            return Err(Error::AlreadyMember(id.to_owned()));
        }
        let member = Member {
            id: id.to_owned(),
            url: url.to_owned(),
            public_url: public_url.unwrap_or(url).to_owned(),
            status: Status::New,
        };
        records.push(member.clone());
        self.flush(&records)?;
        Ok(member)
    }

    /// Looks a member up by id.
    pub fn get(&self, id: &str) -> Option<Member> {
        self.lock().iter().find(|m| m.id == id).cloned()
    }

    /// Replaces the record carrying the same id and flushes.
    pub fn update(&self, member: Member) -> Result<()> {
        let mut records = self.lock();
        let slot = records
            .iter_mut()
            .find(|m| m.id == member.id)
            .ok_or_else(|| Error::NotAMember(member.id.clone()))?;
        *slot = member;
        self.flush(&records)
    }

    /// Rewrites one member's status and flushes.
    pub fn set_status(&self, id: &str, status: Status) -> Result<()> {
        let mut records = self.lock();
        let slot = records
            .iter_mut()
            .find(|m| m.id == id)
            .ok_or_else(|| Error::NotAMember(id.to_owned()))?;
        slot.status = status;
        self.flush(&records)
    }

    /// Snapshot of matching records in insertion order; the empty filter
    /// returns everything.
    pub fn filter(&self, filter: &MemberFilter) -> Vec<Member> {
        self.lock().iter().filter(|m| filter.matches(m)).cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Member>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn flush(&self, records: &[Member]) -> Result<()> {
        let mut table = String::new();
        for m in records {
            table.push_str(&m.id);
            table.push('\t');
            table.push_str(&m.url);
            table.push('\t');
            table.push_str(&m.public_url);
            table.push('\t');
            table.push_str(m.status.as_str());
            table.push('\n');
        }
        std::fs::write(&self.path, table)?;
        Ok(())
    }
}

fn parse_table(contents: &str) -> Result<Vec<Member>> {
    let mut records = Vec::new();
    for line in contents.lines().filter(|l| !l.is_empty()) {
        let fields: Vec<&str> = line.split('\t').collect();
        let [id, url, public_url, status] = fields.as_slice() else {
            return Err(Error::Decode(format!("bad member row {line:?}")));
        };
        records.push(Member {
            id: (*id).to_owned(),
            url: (*url).to_owned(),
            public_url: (*public_url).to_owned(),
            status: status.parse()?,
        });
    }
    Ok(records)
}

#[cfg(unix)]
fn create_restricted(path: &Path) -> Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    std::fs::OpenOptions::new().write(true).create_new(true).mode(0o600).open(path)?;
    Ok(())
}

#[cfg(not(unix))]
fn create_restricted(path: &Path) -> Result<()> {
    std::fs::OpenOptions::new().write(true).create_new(true).open(path)?;
    Ok(())
}
