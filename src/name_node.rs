//! Defines the name-node dispatcher --- [`NameNode`].
//!
//! Mutations fan out to every ALIVE member in insertion order; an
//! unreachable member never aborts the fan-out, it is logged and left for
//! the heartbeat engine to repair through a snapshot resync. Reads are
//! redirected
//! to one randomly chosen ALIVE member's advertised URL. `df` and `status`
//! aggregate per-member rows into a matrix.

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::members::{Member, MemberDb, MemberFilter, Status};
use crate::node::Connect;

/// The cluster coordinator, generic over the member client implementation.
pub struct NameNode<C: Connect> {
    db: Arc<MemberDb>,
    _client: PhantomData<fn() -> C>,
}

impl<C: Connect> NameNode<C> {
    /// Builds the dispatcher over an open membership store.
    pub fn new(db: Arc<MemberDb>) -> Self {
        Self { db, _client: PhantomData }
    }

    /// Registers a data node; the heartbeat engine bootstraps it on its next
    /// tick.
    pub fn add_node(&self, public_url: Option<&str>, url: &str, id: &str) -> Result<()> {
        self.db.create(id, url, public_url)?;
        info!(id, url, "node joined the namespace");
        Ok(())
    }

    /// Best-effort leave: the member is marked DEAD, never deleted.
    pub fn exclude_node(&self, id: &str) -> Result<()> {
        self.db.set_status(id, Status::Dead)?;
        info!(id, "node left the namespace");
        Ok(())
    }

    /// Per-member status rows `[id, status]`.
    pub fn status(&self) -> Vec<Vec<String>> {
        self.db
            .filter(&MemberFilter::default())
            .into_iter()
            .map(|m| vec![m.id, m.status.to_string()])
            .collect()
    }

    /// Per-member disk usage rows `[id, total, used, free]`.
    pub async fn df(&self) -> Result<Vec<Vec<String>>> {
        let mut rows = Vec::new();
        for member in self.alive() {
            let Some(node) = self.client(&member) else { continue };
            match node.df().await {
                Ok((total, used, free)) => rows.push(vec![
                    member.id.clone(),
                    total.to_string(),
                    used.to_string(),
                    free.to_string(),
                ]),
                Err(err) => warn!(member = %member.id, error = %err, "df call failed"),
            }
        }
        Ok(rows)
    }

    pub async fn mkfs(&self) -> Result<()> {
        self.fan_out("mkfs", |node| async move { node.mkfs().await }).await
    }

    pub async fn cd(&self, path: &str) -> Result<()> {
        self.fan_out("cd", |node| async move { node.cd(path).await }).await
    }

    pub async fn mkdir(&self, path: &str) -> Result<()> {
        self.fan_out("mkdir", |node| async move { node.mkdir(path).await }).await
    }

    pub async fn rmdir(&self, path: &str, force: bool) -> Result<()> {
        self.fan_out("rmdir", |node| async move { node.rmdir(path, force).await }).await
    }

    pub async fn touch(&self, path: &str) -> Result<()> {
        self.fan_out("touch", |node| async move { node.touch(path).await }).await
    }

    pub async fn tee(&self, path: &str, data: &[u8]) -> Result<()> {
        self.fan_out("tee", |node| async move { node.tee(path, data).await }).await
    }

    pub async fn rm(&self, path: &str) -> Result<()> {
        self.fan_out("rm", |node| async move { node.rm(path).await }).await
    }

    pub async fn cp(&self, src: &str, dst: &str) -> Result<()> {
        self.fan_out("cp", |node| async move { node.cp(src, dst).await }).await
    }

    pub async fn mv(&self, src: &str, dst: &str) -> Result<()> {
        self.fan_out("mv", |node| async move { node.mv(src, dst).await }).await
    }

    /// Redirect target for `ls`.
    pub async fn ls(&self) -> Result<String> {
        self.redirect("ls").await
    }

    /// Redirect target for `cat`.
    pub async fn cat(&self) -> Result<String> {
        self.redirect("cat").await
    }

    /// Redirect target for `stat`.
    pub async fn stat(&self) -> Result<String> {
        self.redirect("stat").await
    }

    /// Picks one ALIVE member at random and returns the client-visible URL
    /// for `op` on it. An unreachable pick falls through to another member;
    /// exhausting the set is a cluster failure.
    async fn redirect(&self, op: &str) -> Result<String> {
        let mut candidates = self.alive();
        while !candidates.is_empty() {
            let at = rand::thread_rng().gen_range(0..candidates.len());
            let member = candidates.swap_remove(at);
            let Some(node) = self.client(&member) else { continue };
            if node.ping_alive().await {
                return Ok(join_op_url(&member.public_url, op));
            }
            debug!(member = %member.id, "redirect target unreachable, trying another");
        }
        Err(Error::ClusterUnavailable)
    }

    /// Invokes `call` on every ALIVE member. An unreachable member never
    /// aborts the fan-out (the heartbeat engine repairs the divergence on
    /// resync); a member that answered with an operation error surfaces to
    /// the caller once the whole fan-out has run.
    async fn fan_out<F, Fut>(&self, op: &'static str, call: F) -> Result<()>
    where
        F: Fn(C) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut failure = None;
        for member in self.alive() {
            let Some(node) = self.client(&member) else { continue };
            match call(node).await {
                Ok(()) => {}
                Err(Error::PeerUnreachable(peer)) => {
                    warn!(member = %member.id, operation = op, peer = %peer,
                        "member unreachable during fan-out; divergence is repaired on resync");
                }
                Err(err) => {
                    warn!(member = %member.id, operation = op, error = %err, "fan-out call failed");
                    failure.get_or_insert(err);
                }
            }
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn alive(&self) -> Vec<Member> {
        self.db.filter(&MemberFilter::default().status(Status::Alive))
    }

    fn client(&self, member: &Member) -> Option<C> {
        match C::connect(&member.url) {
            Ok(node) => Some(node),
            Err(err) => {
                warn!(member = %member.id, url = %member.url, error = %err,
                    "cannot build member client");
                None
            }
        }
    }
}

fn join_op_url(public_url: &str, op: &str) -> String {
    format!("{}/{}", public_url.trim_end_matches('/'), op)
}

#[cfg(test)]
mod tests {
    use super::join_op_url;

    #[test]
    fn test_join_op_url_normalizes_slashes() {
        assert_eq!(join_op_url("http://10.0.0.5:8180/", "ls"), "http://10.0.0.5:8180/ls");
        assert_eq!(join_op_url("http://10.0.0.5:8180", "cat"), "http://10.0.0.5:8180/cat");
    }
}
