//! Syncing the wallet with the chain, one batch of blocks at a time.

use std::{cmp, sync::Arc};

use log::{error, info, warn};
use tokio::sync::watch;
use tracing::instrument;

use crate::{
    config::{BATCH_SIZE, MAX_REORG},
    scan::{scan_batch, sync_status::SyncStatus, ScanContext, ScanError, SyncError},
};

use super::{LightClient, SyncResult};

impl LightClient {
    /// The latest sync status. Never waits on the sync itself.
    pub fn do_sync_status(&self) -> SyncStatus {
        self.sync_status.borrow().clone()
    }

    pub fn subscribe_sync_status(&self) -> watch::Receiver<SyncStatus> {
        self.sync_status.subscribe()
    }

    pub async fn interrupt_sync_after_batch(&self, set_interrupt: bool) {
        *self.interrupt_sync.write().await = set_interrupt;
    }

    pub async fn get_sync_interrupt(&self) -> bool {
        *self.interrupt_sync.read().await
    }

    /// Starts a sync in the background and returns its id. If a sync is already running
    /// no new one is started and the running sync's id is returned.
    pub fn start_sync(self: &Arc<Self>) -> u64 {
        self.spawn_sync(false)
    }

    /// Like [`LightClient::start_sync`], but first drops everything learned from the
    /// chain so the wallet is scanned again from its birthday. While another sync runs
    /// the rescan is not started and the running sync's id is returned.
    pub fn start_rescan(self: &Arc<Self>) -> u64 {
        self.spawn_sync(true)
    }

    fn spawn_sync(self: &Arc<Self>, rescan: bool) -> u64 {
        let Ok(guard) = self.sync_lock.clone().try_lock_owned() else {
            let running = self.sync_status.borrow().sync_id;
            if rescan {
                warn!("Sync {running} is running, rescan not started");
            }
            return running;
        };
        let mut sync_id = 0;
        self.sync_status.send_modify(|status| {
            status.start_new(0);
            sync_id = status.sync_id;
        });

        let client = self.clone();
        tokio::spawn(async move {
            let _guard = guard;
            // Failures are reported through the sync status.
            let _ = client.sync_under_lock(rescan).await;
        });
        sync_id
    }

    /// Syncs to the chain tip, waiting for any running sync to finish first.
    pub async fn do_sync(&self) -> Result<SyncResult, SyncError> {
        let _guard = self.sync_lock.lock().await;
        self.sync_status.send_modify(|status| status.start_new(0));
        self.sync_under_lock(false).await
    }

    pub async fn do_rescan(&self) -> Result<SyncResult, SyncError> {
        let _guard = self.sync_lock.lock().await;
        self.sync_status.send_modify(|status| status.start_new(0));
        self.sync_under_lock(true).await
    }

    async fn sync_under_lock(&self, rescan: bool) -> Result<SyncResult, SyncError> {
        if rescan {
            info!("Rescanning from birthday {}", self.wallet.get_birthday());
            self.wallet.clear_all().await;
        }
        let result = self.sync_with_reorgs().await;

        let expired = self.wallet.remove_expired().await;
        if expired > 0 {
            info!("Dropped {expired} expired transactions");
            if let Err(e) = self.do_save().await {
                warn!("could not save wallet: {e}");
            }
        }

        match &result {
            Ok(_) => self.sync_status.send_modify(|status| status.finish()),
            Err(e) => {
                error!("Sync failed: {e}");
                let message = e.to_string();
                self.sync_status.send_modify(|status| status.fail(message));
            }
        }
        result
    }

    async fn sync_with_reorgs(&self) -> Result<SyncResult, SyncError> {
        let mut reorgs = 0;
        loop {
            match self.sync_batches().await {
                Err(SyncError::Scan(ScanError::PrevHashMismatch { height })) => {
                    reorgs += 1;
                    if reorgs > MAX_REORG {
                        return Err(SyncError::ReorgTooDeep(MAX_REORG));
                    }
                    let fork = height.saturating_sub(1);
                    warn!("Reorg detected at height {fork}, rolling back");
                    self.wallet.invalidate_from(fork).await;
                }
                result => return result,
            }
        }
    }

    #[instrument(skip(self))]
    async fn sync_batches(&self) -> Result<SyncResult, SyncError> {
        let latest = self.get_latest_block_height().await?;
        let last_synced = self.wallet.last_synced_height().await;
        if latest < last_synced {
            let e = SyncError::ServerBehind {
                server: latest,
                wallet: last_synced,
            };
            warn!("{}", e);
            return Err(e);
        }

        let start = last_synced + 1;
        let batch_count = if latest >= start {
            ((latest - start) / BATCH_SIZE + 1) as usize
        } else {
            0
        };
        let batches_done = self.sync_status.borrow().batch_num;
        self.sync_status
            .send_modify(|status| status.batch_total = batches_done + batch_count);

        let mut synced = 0;
        for (n, batch_start) in (start..=latest).step_by(BATCH_SIZE as usize).enumerate() {
            let batch_end = cmp::min(batch_start + BATCH_SIZE - 1, latest);
            self.sync_status.send_modify(|status| {
                status.new_sync_batch(batch_start, batch_end, batches_done + n + 1)
            });

            let context = ScanContext::from_wallet(&self.wallet).await;
            let batch =
                scan_batch(self.chain.as_ref(), &context, batch_start, batch_end, &self.sync_status)
                    .await?;
            let witnessed = batch.blocks.len() as u64;
            self.wallet.apply_batch(batch.records, batch.blocks).await;
            self.sync_status
                .send_modify(|status| status.witnesses_updated = witnessed);
            synced += batch_end + 1 - batch_start;

            self.do_save().await.map_err(SyncError::Save)?;

            if self.get_sync_interrupt().await && batch_end < latest {
                info!("Sync interrupted after batch {}", batches_done + n + 1);
                break;
            }
        }

        Ok(SyncResult {
            success: true,
            latest_block: self.wallet.last_synced_height().await,
            total_blocks_synced: synced,
        })
    }
}
