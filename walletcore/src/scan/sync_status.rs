use core::fmt;

/// Progress of the current or last sync run.
///
/// A run is made of batches of at most [`crate::config::BATCH_SIZE`] blocks; within a
/// batch the three counters track fetching, trial decryption and witness updates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncStatus {
    pub in_progress: bool,
    pub last_error: Option<String>,

    pub sync_id: u64,
    pub start_block: u64,
    pub end_block: u64,

    pub blocks_done: u64,
    pub trial_dec_done: u64,
    pub witnesses_updated: u64,

    pub blocks_total: u64,

    pub batch_num: usize,
    pub batch_total: usize,
}

impl SyncStatus {
    /// Starts a new run of `batch_total` batches under a fresh id.
    pub fn start_new(&mut self, batch_total: usize) {
        log::debug!("SyncStatus::start_new({batch_total}) called!");
        self.sync_id += 1;
        self.last_error = None;
        self.in_progress = true;
        self.blocks_done = 0;
        self.trial_dec_done = 0;
        self.witnesses_updated = 0;
        self.blocks_total = 0;
        self.batch_num = 0;
        self.batch_total = batch_total;
    }

    /// Setup a new sync status in prep for an upcoming batch, numbered from 1.
    pub fn new_sync_batch(&mut self, start_block: u64, end_block: u64, batch_num: usize) {
        log::debug!(
            "SyncStatus::new_sync_batch(start_block: {start_block}, end_block: {end_block}, batch_num: {batch_num}) called!"
        );
        self.in_progress = true;
        self.last_error = None;

        self.start_block = start_block;
        self.end_block = end_block;
        self.blocks_done = 0;
        self.trial_dec_done = 0;
        self.witnesses_updated = 0;
        self.blocks_total = end_block + 1 - start_block;
        self.batch_num = batch_num;
    }

    /// Finish up a sync
    pub fn finish(&mut self) {
        self.in_progress = false;
    }

    pub fn fail(&mut self, error: String) {
        self.in_progress = false;
        self.last_error = Some(error);
    }

    /// Mean progress of the current batch's three phases, from 0 to 1.
    pub fn batch_progress(&self) -> f64 {
        if self.blocks_total == 0 {
            return 0.0;
        }
        (self.blocks_done + self.trial_dec_done + self.witnesses_updated) as f64
            / (3 * self.blocks_total) as f64
    }

    pub fn to_json(&self, sync_interrupt: bool) -> json::JsonValue {
        if self.in_progress {
            json::object! {
                "sync_id" => self.sync_id,
                "in_progress" => self.in_progress,
                "last_error" => self.last_error.clone(),
                "start_block" => self.start_block,
                "end_block" => self.end_block,
                "synced_blocks" => self.blocks_done,
                "trial_decryptions_blocks" => self.trial_dec_done,
                "witnesses_updated" => self.witnesses_updated,
                "total_blocks" => self.blocks_total,
                "batch_num" => self.batch_num,
                "batch_total" => self.batch_total,
                "sync_interrupt" => sync_interrupt,
            }
        } else {
            json::object! {
                "sync_id" => self.sync_id,
                "in_progress" => self.in_progress,
                "last_error" => self.last_error.clone(),
                "sync_interrupt" => sync_interrupt,
            }
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.blocks_total > 0 && self.in_progress {
            write!(
                f,
                "**Batch** Current: {:4} Total: {:4}\n   \
                Blocks Loaded: {:4} TrialDecrypted: \
                {:4}, Witnesses Updated: {:4}, Total: {:4}, ",
                self.batch_num,
                self.batch_total,
                self.blocks_done,
                self.trial_dec_done,
                self.witnesses_updated,
                self.blocks_total
            )
        } else {
            write!(
                f,
                "id: {}, total_batch_blocks: {:4}, in_progress: {}, errors: {}",
                self.sync_id,
                self.blocks_total,
                self.in_progress,
                self.last_error.as_deref().unwrap_or("None")
            )
        }
    }
}
