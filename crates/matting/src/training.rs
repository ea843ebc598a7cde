//! Training the matting network with Burn's learner.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use burn::{
    backend::Autodiff,
    config::Config,
    data::dataloader::{DataLoader, DataLoaderBuilder},
    grad_clipping::GradientClippingConfig,
    optim::AdamConfig,
    prelude::*,
    record::CompactRecorder,
    tensor::backend::AutodiffBackend,
    train::{metric::LossMetric, LearnerBuilder},
};
use matting_metric::{MseMetric, SadMetric};
use matting_model::{MattingBatch, MattingNetConfig, ENCODER_STRIDE};
use matting_train::{DatasetSplit, MattingBatcher, MattingDataset, MattingDatasetConfig};
use matting_util::{load_param_map, save_model};

use crate::backend::{create_device, get_backend_name, SelectedBackend};

/// CLI arguments for the training subcommand.
#[derive(Debug)]
pub struct TrainingCliArgs {
    /// Path to the training configuration file.
    pub config_path: PathBuf,
    /// Epoch checkpoint to resume training from.
    pub resume_epoch: Option<usize>,
}

impl TrainingCliArgs {
    /// Creates a new set of training CLI arguments.
    pub fn new(config_path: impl Into<PathBuf>, resume_epoch: Option<usize>) -> Self {
        Self {
            config_path: config_path.into(),
            resume_epoch,
        }
    }
}

/// Training configuration, loaded from a JSON file via [`TrainingConfig::load`].
#[derive(Config, Debug)]
pub struct TrainingConfig {
    /// Network configuration.
    #[config(default = "MattingNetConfig::new()")]
    pub model: MattingNetConfig,

    /// Dataset configuration.
    pub dataset: MattingDatasetConfig,

    #[config(default = 1e-4)]
    pub learning_rate: f64,

    /// Number of training epochs.
    #[config(default = 20)]
    pub num_epochs: usize,

    #[config(default = 8)]
    pub batch_size: usize,

    #[config(default = 4)]
    pub num_workers: usize,

    /// Random seed for reproducibility.
    #[config(default = 7)]
    pub seed: u64,

    /// Gradients are clipped to `[-grad_clip, grad_clip]`.
    #[config(default = 5.0)]
    pub grad_clip: f32,

    /// Side of the square training samples, a multiple of 32.
    #[config(default = 320)]
    pub image_size: u32,

    /// Weights to seed the network with. Matching parameters are copied,
    /// the rest keep their initialization.
    pub init_from: Option<String>,

    /// Directory for checkpoints, logs and the final model.
    #[config(default = "String::from(\"./artifacts\")")]
    pub artifact_dir: String,
}

impl TrainingConfig {
    /// Loads a training configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config_str = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&config_str)?;
        Ok(config)
    }

    /// Saves this configuration to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let config_str = serde_json::to_string_pretty(self)?;
        fs::write(path, config_str)?;
        Ok(())
    }

    /// Checks the settings the learner cannot check itself.
    pub fn validate(&self) -> Result<()> {
        if self.image_size == 0 || self.image_size as usize % ENCODER_STRIDE != 0 {
            anyhow::bail!(
                "image_size must be a positive multiple of {ENCODER_STRIDE}, got {}",
                self.image_size
            );
        }
        if self.batch_size == 0 {
            anyhow::bail!("batch_size must be at least 1");
        }
        self.model.validate()?;
        Ok(())
    }

    /// Dataset configuration with samples resized to `image_size`.
    pub fn dataset_config(&self) -> MattingDatasetConfig {
        let augmentation = self
            .dataset
            .augmentation
            .clone()
            .with_output_size(self.image_size);
        self.dataset.clone().with_augmentation(augmentation)
    }
}

/// Runs the training loop on a specific device.
///
/// # Errors
///
/// Returns an error if model initialization, weight seeding, data loading, or
/// saving the final model fails.
pub fn run_training_on_device<B: AutodiffBackend>(
    device: B::Device,
    config: TrainingConfig,
    resume_epoch: Option<usize>,
) -> Result<()> {
    tracing::info!(?device, "Initializing matting training");
    config.validate()?;

    let artifact_dir = PathBuf::from(&config.artifact_dir);
    fs::create_dir_all(&artifact_dir)?;
    config.save(artifact_dir.join("config.json"))?;

    B::seed(config.seed);

    let mut model = config.model.init::<B>(&device)?;
    if let Some(init_from) = &config.init_from {
        let source = load_param_map::<B>(Path::new(init_from), &device)?;
        let (migrated, report) = model.migrate(&source);
        if !report.is_complete() {
            tracing::warn!(
                mismatched = ?report.mismatched,
                missing = ?report.missing,
                "Some parameters kept their initialization"
            );
        }
        model = migrated;
    }

    let optimizer = AdamConfig::new()
        .with_grad_clipping(Some(GradientClippingConfig::Value(config.grad_clip)))
        .init();

    let train_loader = create_dataloader::<B>(&config, DatasetSplit::Train)?;
    let valid_loader = create_dataloader::<B::InnerBackend>(&config, DatasetSplit::Valid)?;

    let mut learner_builder = LearnerBuilder::new(&artifact_dir)
        .metric_train_numeric(LossMetric::new())
        .metric_valid_numeric(LossMetric::new())
        .metric_train_numeric(SadMetric::<B>::new())
        .metric_valid_numeric(SadMetric::<B::InnerBackend>::new())
        .metric_valid_numeric(MseMetric::<B::InnerBackend>::new())
        .with_file_checkpointer(CompactRecorder::new())
        .devices(vec![device])
        .num_epochs(config.num_epochs)
        .summary();

    if let Some(epoch) = resume_epoch {
        tracing::info!(epoch, "Resuming from checkpoint");
        learner_builder = learner_builder.checkpoint(epoch);
    }

    let learner = learner_builder.build(model, optimizer, config.learning_rate);

    tracing::info!(epochs = config.num_epochs, "Starting training");
    let trained_model = learner.fit(train_loader, valid_loader);

    let weights = save_model(trained_model, &config.model, &artifact_dir.join("model"))?;
    tracing::info!(path = %weights.display(), "Training completed");
    Ok(())
}

fn create_dataloader<B: Backend>(
    config: &TrainingConfig,
    split: DatasetSplit,
) -> Result<Arc<dyn DataLoader<B, MattingBatch<B>>>> {
    let dataset = MattingDataset::from_config(&config.dataset_config(), split, config.seed)?;

    let dataloader = DataLoaderBuilder::new(MattingBatcher::<B>::new())
        .batch_size(config.batch_size)
        .shuffle(config.seed)
        .num_workers(config.num_workers)
        .build(dataset);

    Ok(dataloader)
}

/// Runs training from the command line.
///
/// # Errors
///
/// Returns an error if the configuration file is missing or invalid, or
/// training fails.
pub fn run_training(args: TrainingCliArgs) -> Result<()> {
    tracing::info!(config = %args.config_path.display(), "Loading training configuration");

    if !args.config_path.exists() {
        anyhow::bail!(
            "Configuration file not found: {}",
            args.config_path.display()
        );
    }

    let training_config = TrainingConfig::load(&args.config_path)?;

    tracing::info!(
        learning_rate = training_config.learning_rate,
        batch_size = training_config.batch_size,
        epochs = training_config.num_epochs,
        image_size = training_config.image_size,
        train = %training_config.dataset.train_root,
        valid = %training_config.dataset.valid_root,
        backend = get_backend_name(),
        "Configuration loaded",
    );

    run_training_on_device::<Autodiff<SelectedBackend>>(
        create_device(),
        training_config,
        args.resume_epoch,
    )
}
