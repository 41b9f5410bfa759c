//! Defines the membership heartbeat engine --- [`Heartbeat`].
//!
//! A single background worker owned by the name node scans the member table
//! every `interval`: NEW members are bootstrapped from a donor snapshot,
//! unresponsive members are marked DEAD, and members observed alive again
//! are wiped and resynced. Failures here never propagate to clients; they
//! only move member status.

use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::members::{Member, MemberDb, MemberFilter, Status};
use crate::node::Connect;

/// Default pause between membership scans.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Handle to the background membership worker.
pub struct Heartbeat {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Heartbeat {
    /// Spawns the worker over `db`, reaching members as `C` clients.
    pub fn spawn<C: Connect>(db: Arc<MemberDb>, interval: Duration) -> Self {
        let (stop, stopped) = watch::channel(false);
        let task = tokio::spawn(run::<C>(db, interval, stopped));
        Self { stop, task }
    }

    /// Signals the worker and waits for it to exit.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        if let Err(err) = self.task.await {
            warn!(error = %err, "heartbeat worker did not exit cleanly");
        }
    }
}

async fn run<C: Connect>(
    db: Arc<MemberDb>,
    interval: Duration,
    mut stopped: watch::Receiver<bool>,
) {
    loop {
        tick::<C>(&db).await;
        // The stop signal is polled between ticks; the sleep also races it
        // so teardown never waits out a full interval.
        if *stopped.borrow() {
            break;
        }
        tokio::select! {
            _ = stopped.changed() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}

/// One scan over the whole member table, in insertion order.
pub async fn tick<C: Connect>(db: &MemberDb) {
    for member in db.filter(&MemberFilter::default()) {
        let node = match C::connect(&member.url) {
            Ok(node) => node,
            Err(err) => {
                warn!(id = %member.id, url = %member.url, error = %err,
                    "cannot build member client");
                continue;
            }
        };
        match member.status {
            Status::New => initialize(db, &node, &member).await,
            status => {
                if node.ping_alive().await {
                    if status == Status::Dead {
                        info!(id = %member.id, "member came back, resyncing");
                        initialize(db, &node, &member).await;
                    }
                } else if status != Status::Dead {
                    info!(id = %member.id, "member stopped responding");
                    if let Err(err) = db.set_status(&member.id, Status::Dead) {
                        warn!(id = %member.id, error = %err, "cannot mark member dead");
                    }
                }
            }
        }
    }
}

/// Bootstraps or resyncs one member. A failure leaves the member in its
/// current status so the next tick retries.
async fn initialize<C: Connect>(db: &MemberDb, node: &C, member: &Member) {
    if let Err(err) = try_initialize(db, node, member).await {
        warn!(id = %member.id, error = %err, "member initialization failed");
    }
}

async fn try_initialize<C: Connect>(db: &MemberDb, node: &C, member: &Member) -> Result<()> {
    node.mkfs().await?;
    let donors = db.filter(&MemberFilter::default().status(Status::Alive));
    let donor = donors.choose(&mut rand::thread_rng()).cloned();
    match donor {
        Some(donor) => {
            node.sync(&donor.url).await?;
            let donor_node = C::connect(&donor.url)?;
            let (workdir, _, _) = donor_node.stat(".").await?;
            node.cd(&workdir).await?;
            info!(id = %member.id, donor = %donor.id, "member synced from donor");
        }
        None => {
            // Nothing to clone from: the freshly wiped member seeds the
            // cluster.
            debug!(id = %member.id, "no alive donor, member becomes the seed replica");
        }
    }
    db.set_status(&member.id, Status::Alive)?;
    Ok(())
}
