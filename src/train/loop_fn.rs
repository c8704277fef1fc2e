use std::sync::atomic::Ordering;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::debug;

use crate::dataset::Dataset;
use crate::inference::argmax;
use crate::loss::cross_entropy::CrossEntropyLoss;
use crate::network::network::Network;
use crate::optim::Optimizer;
use crate::train::epoch_stats::EpochStats;
use crate::train::train_config::TrainConfig;

/// Samples per forward pass when evaluating; only bounds memory.
const EVAL_BATCH: usize = 256;

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Trains `network` for `config.epochs` epochs and returns the mean training
/// loss of the **last completed epoch** (0.0 if no epoch completed).
///
/// Each epoch shuffles the training samples, then for every mini-batch runs
/// a training-mode forward pass, sparse cross-entropy, backpropagation and
/// one optimizer step. When `val` is given the network is evaluated on it in
/// inference mode after every epoch.
///
/// # Early termination
/// The loop breaks early if:
/// - the `progress_tx` receiver has been dropped, **or**
/// - `config.stop_flag` is set to `true`.
///
/// # Panics
/// Panics if `train` is empty, `limit` is `Some(0)`, or `batch_size == 0`.
pub fn train_loop(
    network: &mut Network,
    train: &Dataset,
    val: Option<&Dataset>,
    optimizer: &mut dyn Optimizer,
    config: &TrainConfig,
) -> f64 {
    let n = config.limit.map_or(train.len(), |limit| limit.min(train.len()));
    assert!(n > 0, "training set must not be empty (limit included)");
    assert!(config.batch_size > 0, "batch_size must be at least 1");

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut indices: Vec<usize> = (0..n).collect();
    let mut last_train_loss = 0.0;

    for epoch in 1..=config.epochs {
        // Check stop flag at the top of each epoch.
        if stop_requested(config) {
            break;
        }

        let t_start = Instant::now();

        // ── One full pass over the training data ───────────────────────────
        indices.shuffle(&mut rng);
        let mut total_loss = 0.0;
        let mut correct = 0;
        for (step, chunk) in indices.chunks(config.batch_size).enumerate() {
            let (inputs, labels) = train.batch(chunk);

            network.zero_grad();
            let output = network.forward_train(&inputs, &mut rng);
            let (loss, grad) = CrossEntropyLoss::batch(&output, &labels);
            network.backward(&grad);
            optimizer.step(network.params_mut());

            total_loss += loss as f64 * chunk.len() as f64;
            correct += count_correct(&output.data, &labels);
            if step % 200 == 0 {
                debug!(epoch, step, loss, "batch");
            }
        }
        let train_loss = total_loss / n as f64;
        last_train_loss = train_loss;

        // ── Validation ────────────────────────────────────────────────────
        let (val_loss, val_accuracy) = match val {
            Some(val) if !val.is_empty() => {
                let (loss, accuracy) = evaluate(network, val);
                (Some(loss), Some(accuracy))
            }
            _ => (None, None),
        };

        // ── Emit progress ─────────────────────────────────────────────────
        let stats = EpochStats {
            epoch,
            total_epochs: config.epochs,
            train_loss,
            train_accuracy: correct as f64 / n as f64,
            val_loss,
            val_accuracy,
            elapsed_ms: t_start.elapsed().as_millis() as u64,
        };

        if let Some(ref tx) = config.progress_tx {
            // If the receiver has been dropped, stop training.
            if tx.send(stats).is_err() {
                break;
            }
        }

        // Check stop flag again after potentially expensive eval.
        if stop_requested(config) {
            break;
        }
    }

    last_train_loss
}

/// Mean cross-entropy loss and accuracy of `network` over `data`, computed
/// with inference-mode forward passes (running batch-norm statistics, no
/// dropout).
pub fn evaluate(network: &Network, data: &Dataset) -> (f64, f64) {
    if data.is_empty() {
        return (0.0, 0.0);
    }
    let indices: Vec<usize> = (0..data.len()).collect();
    let mut total_loss = 0.0;
    let mut correct = 0;
    for chunk in indices.chunks(EVAL_BATCH) {
        let (inputs, labels) = data.batch(chunk);
        let output = network.forward(&inputs);
        let (loss, _) = CrossEntropyLoss::batch(&output, &labels);
        total_loss += loss as f64 * chunk.len() as f64;
        correct += count_correct(&output.data, &labels);
    }
    (total_loss / data.len() as f64, correct as f64 / data.len() as f64)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn stop_requested(config: &TrainConfig) -> bool {
    config.stop_flag.as_ref().map_or(false, |flag| flag.load(Ordering::Relaxed))
}

/// Counts rows of a `(batch, classes)` probability buffer whose argmax
/// matches the label.
fn count_correct(probabilities: &[f32], labels: &[u8]) -> usize {
    if labels.is_empty() {
        return 0;
    }
    let classes = probabilities.len() / labels.len();
    probabilities.chunks(classes)
        .zip(labels)
        .filter(|(row, &label)| argmax(row) == label as usize)
        .count()
}
