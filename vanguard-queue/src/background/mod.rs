//! Background loops that keep the store moving independently of requests:
//! the promotion scheduler and the lease reaper.

mod promoter;
mod reaper;

pub use promoter::Promoter;
pub use reaper::{LeaseReaper, LEASE_EXPIRED};

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{backend::QueueBackend, engine::QueueEngine};

/// Starts the promoter and the reaper for one engine
pub struct Maintenance;

impl Maintenance {
    /// Spawn both loops on the current runtime
    pub fn spawn<B>(engine: Arc<QueueEngine<B>>) -> MaintenanceHandle
    where
        B: QueueBackend + ?Sized + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let promoter = Promoter::new(engine.clone());
        let reaper = LeaseReaper::new(engine);
        let join_handles = vec![
            tokio::spawn(promoter.run(shutdown_rx.clone())),
            tokio::spawn(reaper.run(shutdown_rx)),
        ];

        info!("Started background maintenance");
        MaintenanceHandle {
            shutdown_tx,
            join_handles,
        }
    }
}

/// Handle for stopping the background loops
pub struct MaintenanceHandle {
    shutdown_tx: watch::Sender<bool>,
    join_handles: Vec<JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Signal both loops and wait for them to finish their current cycle
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.join_handles {
            if let Err(e) = handle.await {
                warn!("Background task join error: {}", e);
            }
        }
        info!("Background maintenance stopped");
    }
}

/// Resolves once shutdown is signalled or every sender is gone
pub(crate) async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
