use std::sync::mpsc;
use std::sync::{Arc, atomic::AtomicBool};

use crate::train::epoch_stats::EpochStats;

/// Configuration for a `train_loop` run.
///
/// # Fields
/// - `epochs`      : total number of full passes over the training data
/// - `batch_size`  : samples per mini-batch
/// - `seed`        : seeds the per-epoch shuffle and dropout masks; `None`
///                   draws from OS entropy
/// - `limit`       : train on at most this many samples (the first ones)
/// - `progress_tx` : optional channel sender; one `EpochStats` is sent per
///                   completed epoch.  If the receiver is dropped the loop
///                   terminates early.
/// - `stop_flag`   : optional atomic flag; when set to `true` from another
///                   thread the loop terminates after the current epoch.
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub seed: Option<u64>,
    pub limit: Option<usize>,
    pub progress_tx: Option<mpsc::Sender<EpochStats>>,
    pub stop_flag: Option<Arc<AtomicBool>>,
}

impl TrainConfig {
    pub const DEFAULT_EPOCHS: usize = 8;
    pub const DEFAULT_BATCH_SIZE: usize = 32;

    /// Creates a minimal `TrainConfig` with no progress channel and no stop flag.
    pub fn new(epochs: usize, batch_size: usize) -> Self {
        TrainConfig {
            epochs,
            batch_size,
            seed: None,
            limit: None,
            progress_tx: None,
            stop_flag: None,
        }
    }
}

impl Default for TrainConfig {
    fn default() -> Self {
        TrainConfig::new(Self::DEFAULT_EPOCHS, Self::DEFAULT_BATCH_SIZE)
    }
}
