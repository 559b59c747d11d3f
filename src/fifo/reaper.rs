//! Idle-fifo garbage collection.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{error, info};

use crate::store::records;

use super::FifoManager;

impl FifoManager {
    /// Periodically delete fifos that no operation has touched for longer
    /// than their `unused_destroy_timeout`. Runs until the shutdown channel
    /// fires.
    pub async fn run_reaper(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        info!(pull_rate = %crate::duration::format(self.pull_rate), "reaper started");
        loop {
            let tick = self.clock.sleep(self.pull_rate);
            tokio::select! {
                _ = tick => {}
                _ = shutdown.recv() => {
                    info!("reaper stopped");
                    return;
                }
            }
            if let Err(e) = self.reap_idle_fifos() {
                error!(error = %e, "reaper scan failed");
            }
        }
    }

    pub(crate) fn reap_idle_fifos(&self) -> Result<(), rusqlite::Error> {
        let now = self.clock.now();

        for fifo in self.store.all_fifos()? {
            let Some(deadline) = fifo.idle_deadline() else {
                continue;
            };
            if now <= deadline {
                continue;
            }

            let tickets = self.store.transaction(|tx| {
                let ids = records::ticket_ids(tx, fifo.uuid)?;
                records::delete_fifo(tx, fifo.uuid)?;
                Ok(ids)
            })?;
            // Release anyone parked on a cascaded ticket; they observe the
            // ticket as gone.
            for ticket in &tickets {
                self.waiters.fire(*ticket);
            }
            info!(fifo = %fifo.uuid, tickets = tickets.len(), "reaped idle fifo");
        }
        Ok(())
    }
}
