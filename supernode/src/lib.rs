use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub mod api;
pub mod cdn;
pub mod config;
pub mod dfget_task;
pub mod error;
pub mod filter;
pub mod gc;
pub mod lock_pool;
pub mod origin;
pub mod peer;
pub mod piece_error;
pub mod progress;
pub mod range;
pub mod scheduler;
pub mod store;
pub mod task;
mod util;
#[cfg(test)]
mod test_util;

// Re-exports
pub use config::Config;
pub use error::{Result, SupernodeError};

use cdn::CdnManager;
use dfget_task::DfgetTaskRegistry;
use gc::GcManager;
use lock_pool::LockPool;
use origin::OriginClient;
use peer::{PeerCreateRequest, PeerRegistry};
use piece_error::PieceErrorManager;
use progress::ProgressEngine;
use store::Store;
use task::TaskRegistry;

// Every component of a running supernode, wired together.
pub struct Supernode {

    pub config: Arc<Config>,

    pub peers: Arc<PeerRegistry>,

    pub dfget_tasks: Arc<DfgetTaskRegistry>,

    pub progress: Arc<ProgressEngine>,

    pub cdn: Arc<CdnManager>,

    pub tasks: Arc<TaskRegistry>,

    pub gc: Arc<GcManager>,

    pub piece_errors: Arc<PieceErrorManager>,

}

impl Supernode {

    // Builds the components and registers the supernode as a peer serving
    // its cache on the download port.
    pub fn new(mut config: Config) -> Result<Self> {
        config.set_cid_prefix(config.advertise_ip);
        let locks = LockPool::new();
        let peers = Arc::new(PeerRegistry::new(locks.clone()));
        let super_pid = peers.register(&PeerCreateRequest {
            ip: config.advertise_ip.to_string(),
            host_name: config.host_name.clone(),
            port: config.download_port,
            version: env!("CARGO_PKG_VERSION").to_string(),
        })?;
        tracing::info!("supernode registered as peer {}", super_pid);
        config.set_super_pid(super_pid);

        let config = Arc::new(config);
        let origin = OriginClient::new()?;
        let dfget_tasks = Arc::new(DfgetTaskRegistry::new());
        let progress = Arc::new(ProgressEngine::new(config.clone()));
        let cdn = Arc::new(CdnManager::new(
            config.clone(),
            Store::new(&config.download_path),
            progress.clone(),
            origin.clone(),
        ));
        let tasks = Arc::new(TaskRegistry::new(
            config.clone(),
            locks.clone(),
            peers.clone(),
            dfget_tasks.clone(),
            progress.clone(),
            cdn.clone(),
            origin,
        ));
        let gc = Arc::new(GcManager::new(
            config.clone(),
            locks,
            tasks.clone(),
            peers.clone(),
            dfget_tasks.clone(),
            progress.clone(),
            cdn.clone(),
        ));
        let piece_errors = Arc::new(PieceErrorManager::new(config.clone(), cdn.clone(), gc.clone()));

        Ok(Self {
            config,
            peers,
            dfget_tasks,
            progress,
            cdn,
            tasks,
            gc,
            piece_errors,
        })
    }

}

// Builds the supernode and starts its background loops.
pub fn start(config: Config) -> Result<Handle> {
    let node = Arc::new(Supernode::new(config)?);
    let cancel = CancellationToken::new();

    let mut loops = node.gc.spawn(cancel.clone());
    loops.push(node.progress.spawn_super_load_monitor(cancel.clone()));
    Ok(Handle { node, cancel, loops })
}

// Handle returned to the user to interact with the supernode.
pub struct Handle {

    node: Arc<Supernode>,

    cancel: CancellationToken,

    loops: Vec<tokio::task::JoinHandle<()>>,

}

impl Handle {

    pub fn node(&self) -> Arc<Supernode> {
        self.node.clone()
    }

    // Cancelled once shutdown starts.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        for handle in self.loops {
            handle.await?;
        }
        tracing::info!("supernode stopped");
        Ok(())
    }

}
