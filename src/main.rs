//! ferrite-digits: train the digit classifier and run offline predictions.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use clap::builder::RangedU64ValueParser;
use clap::{Parser, Subcommand, ValueEnum};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ferrite_digits::network::ModelMetadata;
use ferrite_digits::train::evaluate;
use ferrite_digits::{
    load_mnist_dir, train_loop, Adam, InferenceService, Network, NetworkSpec, Optimizer, Sgd,
    TrainConfig,
};

const DEFAULT_MODEL_PATH: &str = "trained_models/mnist_cnn.json";

#[derive(Parser)]
#[command(name = "ferrite-digits")]
#[command(about = "Handwritten digit classifier: training and offline prediction")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train the digit CNN on MNIST IDX files and write the model artifact
    Train(TrainArgs),
    /// Classify image files with a trained model
    Predict(PredictArgs),
}

#[derive(Clone, Copy, ValueEnum)]
enum OptimizerKind {
    Adam,
    Sgd,
}

#[derive(clap::Args)]
struct TrainArgs {
    /// Directory holding train-images-idx3-ubyte, t10k-labels-idx1-ubyte, ...
    #[arg(long, default_value = "data/mnist")]
    data_dir: PathBuf,

    /// Where to write the trained model
    #[arg(long, default_value = DEFAULT_MODEL_PATH)]
    out: PathBuf,

    #[arg(long, default_value_t = TrainConfig::DEFAULT_EPOCHS)]
    epochs: usize,

    #[arg(long, default_value_t = TrainConfig::DEFAULT_BATCH_SIZE,
          value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    batch_size: usize,

    #[arg(long, default_value_t = 0.001)]
    learning_rate: f32,

    #[arg(long, value_enum, default_value_t = OptimizerKind::Adam)]
    optimizer: OptimizerKind,

    /// Seed for weight init, shuffling and dropout
    #[arg(long)]
    seed: Option<u64>,

    /// Train on at most this many samples
    #[arg(long, value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
    limit: Option<usize>,
}

#[derive(clap::Args)]
struct PredictArgs {
    /// Model artifact to load
    #[arg(long, env = "DIGITS_MODEL", default_value = DEFAULT_MODEL_PATH)]
    model: PathBuf,

    /// Directory scanned for test1.png, test2.png, ... when no files are given
    #[arg(long, default_value = "digits")]
    dir: PathBuf,

    /// Image files to classify
    files: Vec<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Train(args) => train(args),
        Command::Predict(args) => predict(args),
    }
}

fn train(args: TrainArgs) -> Result<()> {
    let (train_set, test_set) = load_mnist_dir(&args.data_dir)
        .with_context(|| format!("Failed to load MNIST from {}", args.data_dir.display()))?;

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let spec = NetworkSpec::digit_cnn();
    let mut network = Network::from_spec(&spec, &mut rng);
    info!(
        name = %spec.name,
        parameters = network.parameter_count(),
        train = args.limit.map_or(train_set.len(), |l| l.min(train_set.len())),
        validation = test_set.len(),
        "starting training"
    );

    let (tx, rx) = mpsc::channel();
    let config = TrainConfig {
        epochs: args.epochs,
        batch_size: args.batch_size,
        seed: args.seed,
        limit: args.limit,
        progress_tx: Some(tx),
        stop_flag: None,
    };
    let (optimizer_kind, learning_rate) = (args.optimizer, args.learning_rate);

    let handle = thread::spawn(move || {
        let mut optimizer: Box<dyn Optimizer> = match optimizer_kind {
            OptimizerKind::Adam => Box::new(Adam::new(learning_rate)),
            OptimizerKind::Sgd => Box::new(Sgd::new(learning_rate)),
        };
        train_loop(&mut network, &train_set, Some(&test_set), optimizer.as_mut(), &config);
        (network, test_set)
    });

    let mut completed = 0;
    for stats in rx {
        completed = stats.epoch;
        info!(
            epoch = stats.epoch,
            of = stats.total_epochs,
            loss = stats.train_loss,
            accuracy = stats.train_accuracy,
            val_loss = ?stats.val_loss,
            val_accuracy = ?stats.val_accuracy,
            elapsed_ms = stats.elapsed_ms,
            "epoch finished"
        );
    }
    let (mut network, test_set) = handle.join().map_err(|_| anyhow!("Training thread panicked"))?;

    let (test_loss, test_accuracy) = evaluate(&network, &test_set);
    info!(test_loss, test_accuracy, "final evaluation");

    network.metadata = Some(ModelMetadata {
        trained_epochs: Some(completed),
        val_accuracy: Some(test_accuracy),
        ..ModelMetadata::digits()
    });
    network.save_json(&args.out)
        .with_context(|| format!("Failed to save model to {}", args.out.display()))?;
    info!(path = %args.out.display(), "model saved");
    Ok(())
}

fn predict(args: PredictArgs) -> Result<()> {
    let service = InferenceService::load(&args.model);
    if !service.is_model_loaded() {
        bail!("{}", service.status().message);
    }

    let files = if args.files.is_empty() { numbered_images(&args.dir) } else { args.files };
    if files.is_empty() {
        warn!(dir = %args.dir.display(), "no images to classify");
    }

    for (file, outcome) in classify_files(&service, &files) {
        match outcome {
            Ok(digit) => println!("Prediction for {}: {}", file.display(), digit),
            Err(err) => warn!(file = %file.display(), "skipped: {:#}", err),
        }
    }
    Ok(())
}

/// `dir/test1.png`, `dir/test2.png`, ... up to the first index that does not
/// exist.
fn numbered_images(dir: &Path) -> Vec<PathBuf> {
    (1..)
        .map(|n| dir.join(format!("test{}.png", n)))
        .take_while(|path| path.is_file())
        .collect()
}

/// Classifies each file independently; a file that cannot be read or
/// decoded yields an error for that file only.
fn classify_files<'a>(service: &InferenceService, files: &'a [PathBuf]) -> Vec<(&'a Path, Result<usize>)> {
    files.iter()
        .map(|file| {
            let outcome = std::fs::read(file)
                .with_context(|| format!("Failed to read {}", file.display()))
                .and_then(|bytes| Ok(service.predict_image(&bytes)?.prediction));
            (file.as_path(), outcome)
        })
        .collect()
}
