//! Loading and saving network weights.
//!
//! Burn's own formats store the module tree as is. PyTorch and safetensors
//! checkpoints use the canonical layer names (`conv1_1.weight`, ...) and are
//! remapped onto the module paths while loading.

use std::path::{Path, PathBuf};

use burn::{
    config::Config,
    module::Module,
    record::{BinFileRecorder, FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
    tensor::backend::Backend,
};
use burn_import::{
    pytorch::{LoadArgs as PyTorchLoadArgs, PyTorchFileRecorder},
    safetensors::{LoadArgs as SafetensorsLoadArgs, SafetensorsFileRecorder},
};
use matting_model::{MattingError, MattingNet, MattingNetConfig, MattingNetRecord, ParamMap};
use thiserror::Error;

/// Key PyTorch training checkpoints nest the state dict under.
const STATE_DICT_KEY: &str = "model_state_dict";

/// Errors that can occur during model weight management operations.
#[derive(Debug, Error)]
pub enum WeightError {
    /// File system errors
    #[error("weight file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Unsupported file format
    #[error("unsupported weight file format: {format}")]
    UnsupportedFormat { format: String },

    /// Model construction errors
    #[error("failed to build the network: {0}")]
    InvalidConfiguration(#[from] MattingError),

    /// Network configuration file errors
    #[error("failed to read network configuration '{}': {reason}", path.display())]
    ConfigLoadError { path: PathBuf, reason: String },

    /// Model loading errors
    #[error("failed to load model weights: {reason}")]
    ModelLoadError { reason: String },

    /// Model saving errors
    #[error("failed to save model weights: {reason}")]
    ModelSaveError { reason: String },
}

/// Supported weight file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightFormat {
    /// PyTorch .pt or .pth files
    PyTorch,
    /// SafeTensors .safetensors files
    SafeTensors,
    /// Burn MessagePack .mpk files
    MessagePack,
    /// Burn Binary .bin files
    Binary,
}

impl WeightFormat {
    /// Detect format from file path
    pub fn from_path(path: &Path) -> Result<Self, WeightError> {
        match path.extension().and_then(|s| s.to_str()) {
            Some("pt" | "pth") => Ok(Self::PyTorch),
            Some("safetensors") => Ok(Self::SafeTensors),
            Some("mpk") => Ok(Self::MessagePack),
            Some("bin") => Ok(Self::Binary),
            other => Err(WeightError::UnsupportedFormat {
                format: other.unwrap_or("<none>").to_owned(),
            }),
        }
    }
}

/// Path of the network configuration stored next to a weight file.
pub fn companion_config_path(weights_path: &Path) -> PathBuf {
    weights_path.with_extension("json")
}

/// Network configuration stored next to `weights_path`, if there is one.
pub fn load_companion_config(weights_path: &Path) -> Result<Option<MattingNetConfig>, WeightError> {
    let path = companion_config_path(weights_path);
    if !path.exists() {
        return Ok(None);
    }

    MattingNetConfig::load(&path)
        .map(Some)
        .map_err(|e| WeightError::ConfigLoadError {
            path,
            reason: e.to_string(),
        })
}

/// Build a network from `config` and load the weights at `path` into it.
///
/// # Errors
/// Fails when the file is missing, its format is unknown, or its contents do
/// not fit the network described by `config`.
pub fn load_model<B: Backend>(
    config: &MattingNetConfig,
    path: &Path,
    device: &B::Device,
) -> Result<MattingNet<B>, WeightError> {
    if !path.exists() {
        return Err(WeightError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let format = WeightFormat::from_path(path)?;
    let model = config.init::<B>(device)?;

    tracing::info!(path = %path.display(), ?format, "Loading weights");

    match format {
        WeightFormat::MessagePack => model
            .load_file(path, &NamedMpkFileRecorder::<FullPrecisionSettings>::new(), device)
            .map_err(|e| WeightError::ModelLoadError {
                reason: format!("MessagePack model loading failed: {e}"),
            }),
        WeightFormat::Binary => model
            .load_file(path, &BinFileRecorder::<FullPrecisionSettings>::new(), device)
            .map_err(|e| WeightError::ModelLoadError {
                reason: format!("Binary model loading failed: {e}"),
            }),
        WeightFormat::PyTorch => load_pytorch_model(model, path, device),
        WeightFormat::SafeTensors => load_safetensors_model(model, path, device),
    }
}

/// Load weights using the configuration stored next to them, or the default
/// configuration when there is none.
pub fn load_model_auto<B: Backend>(
    path: &Path,
    device: &B::Device,
) -> Result<(MattingNet<B>, MattingNetConfig), WeightError> {
    let config = load_companion_config(path)?.unwrap_or_else(MattingNetConfig::new);
    let model = load_model(&config, path, device)?;
    Ok((model, config))
}

/// Parameters of a weight file under their canonical names, for seeding a
/// network through [`MattingNet::migrate`].
///
/// Without a companion configuration the refined layout is tried first, then
/// the coarse one.
pub fn load_param_map<B: Backend>(path: &Path, device: &B::Device) -> Result<ParamMap, WeightError> {
    if let Some(config) = load_companion_config(path)? {
        return Ok(load_model::<B>(&config, path, device)?.named_params());
    }

    match load_model::<B>(&MattingNetConfig::new(), path, device) {
        Ok(model) => Ok(model.named_params()),
        Err(WeightError::ModelLoadError { reason }) => {
            tracing::debug!(%reason, "Refined layout did not fit, trying the coarse layout");
            Ok(load_model::<B>(&MattingNetConfig::coarse(), path, device)?.named_params())
        }
        Err(e) => Err(e),
    }
}

/// Save weights as a full precision named MessagePack file together with the
/// network configuration.
///
/// The recorder appends the `.mpk` extension. Returns the path of the weight file.
pub fn save_model<B: Backend>(
    model: MattingNet<B>,
    config: &MattingNetConfig,
    path: &Path,
) -> Result<PathBuf, WeightError> {
    let weights_path = path.with_extension("mpk");

    model
        .save_file(path, &NamedMpkFileRecorder::<FullPrecisionSettings>::new())
        .map_err(|e| WeightError::ModelSaveError {
            reason: e.to_string(),
        })?;
    config
        .save(companion_config_path(&weights_path))
        .map_err(|e| WeightError::ModelSaveError {
            reason: e.to_string(),
        })?;

    tracing::info!(path = %weights_path.display(), "Saved weights");
    Ok(weights_path)
}

fn load_pytorch_model<B: Backend>(
    model: MattingNet<B>,
    path: &Path,
    device: &B::Device,
) -> Result<MattingNet<B>, WeightError> {
    let remaps = model.parameter_key_remaps();
    let recorder = PyTorchFileRecorder::<FullPrecisionSettings>::default();

    let load_args = |nested: bool| {
        let mut args = PyTorchLoadArgs::new(path.to_path_buf());
        if nested {
            args = args.with_top_level_key(STATE_DICT_KEY);
        }
        remaps
            .iter()
            .fold(args, |args, (pattern, replacement)| {
                args.with_key_remap(pattern, replacement)
            })
    };

    let record: MattingNetRecord<B> = match recorder.load(load_args(true), device) {
        Ok(record) => record,
        Err(nested_error) => {
            tracing::debug!(
                error = %nested_error,
                "No '{STATE_DICT_KEY}' entry, reading the file as a bare state dict"
            );
            recorder
                .load(load_args(false), device)
                .map_err(|e| WeightError::ModelLoadError {
                    reason: format!("PyTorch model loading failed: {e}"),
                })?
        }
    };

    Ok(model.load_record(record))
}

fn load_safetensors_model<B: Backend>(
    model: MattingNet<B>,
    path: &Path,
    device: &B::Device,
) -> Result<MattingNet<B>, WeightError> {
    let load_args = model.parameter_key_remaps().iter().fold(
        SafetensorsLoadArgs::new(path.to_path_buf()),
        |args, (pattern, replacement)| args.with_key_remap(pattern, replacement),
    );

    let recorder = SafetensorsFileRecorder::<FullPrecisionSettings>::default();
    let record: MattingNetRecord<B> =
        recorder
            .load(load_args, device)
            .map_err(|e| WeightError::ModelLoadError {
                reason: format!("Safetensors model loading failed: {e}"),
            })?;

    Ok(model.load_record(record))
}
