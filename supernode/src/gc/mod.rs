use std::{sync::Arc, time::Duration};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use crate::{
    cdn::CdnManager,
    config::Config,
    dfget_task::DfgetTaskRegistry,
    lock_pool::LockPool,
    peer::PeerRegistry,
    progress::ProgressEngine,
    task::TaskRegistry,
};

mod disk;
mod peer;
mod task;

// Passes slower than this are reported.
const SLOW_PASS: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Job {
    Tasks,
    Peers,
    Disk,
}

impl Job {

    fn name(self) -> &'static str {
        match self {
            Job::Tasks => "tasks",
            Job::Peers => "peers",
            Job::Disk => "disk",
        }
    }

}

// Collects expired tasks, peers gone offline and cache files once disk
// space runs low.
pub struct GcManager {

    config: Arc<Config>,

    // Shared with the task and peer registries.
    locks: LockPool,

    tasks: Arc<TaskRegistry>,

    peers: Arc<PeerRegistry>,

    dfget_tasks: Arc<DfgetTaskRegistry>,

    progress: Arc<ProgressEngine>,

    cdn: Arc<CdnManager>,

}

impl GcManager {

    pub fn new(
        config: Arc<Config>,
        locks: LockPool,
        tasks: Arc<TaskRegistry>,
        peers: Arc<PeerRegistry>,
        dfget_tasks: Arc<DfgetTaskRegistry>,
        progress: Arc<ProgressEngine>,
        cdn: Arc<CdnManager>,
    ) -> Self {
        Self { config, locks, tasks, peers, dfget_tasks, progress, cdn }
    }

    // Spawns one loop per job, each starting after the initial delay.
    pub fn spawn(self: &Arc<Self>, cancel: CancellationToken) -> Vec<tokio::task::JoinHandle<()>> {
        tracing::debug!("starting gc loops");
        [
            (Job::Tasks, self.config.gc_meta_interval),
            (Job::Peers, self.config.gc_meta_interval),
            (Job::Disk, self.config.gc_disk_interval),
        ]
        .into_iter()
        .map(|(job, period)| self.spawn_job(job, period, cancel.clone()))
        .collect()
    }

    fn spawn_job(self: &Arc<Self>, job: Job, period: Duration, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let gc = self.clone();
        let initial_delay = self.config.gc_initial_delay;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = time::sleep(initial_delay) => {},
            }
            let mut ticker = time::interval_at(Instant::now(), period.max(Duration::from_millis(1)));
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => gc.run(job).await,
                }
            }
            tracing::debug!("gc loop stopped");
        }.instrument(tracing::info_span!("gc", job = job.name())))
    }

    async fn run(&self, job: Job) {
        let start = Instant::now();
        let removed = match job {
            Job::Tasks => self.gc_tasks().await,
            Job::Peers => self.gc_peers().await,
            Job::Disk => self.gc_disk().await,
        };
        let elapsed = start.elapsed();
        if elapsed > SLOW_PASS {
            tracing::warn!("gc {}: {} removed in {:.3}s", job.name(), removed, elapsed.as_secs_f64());
        }
    }

}
