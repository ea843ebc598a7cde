use std::path::PathBuf;

use anyhow::Result;
use clap::{ArgAction, Parser, Subcommand};
use matting::{
    backend::{create_device, get_backend_name, SelectedBackend},
    evaluation::{run_evaluation, EvaluationConfig},
    inference::{run_inference, InferenceConfig, DEFAULT_INPUT_SIZE},
    logging::init_tracing,
};

#[derive(Parser)]
#[command(name = "matting")]
#[command(about = "Deep image matting: alpha mattes from an image and its trimap")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict alpha mattes
    Infer {
        /// Image file or directory
        #[arg(short, long)]
        image: PathBuf,

        /// Trimap file, or directory of trimaps named like the images
        #[arg(short, long)]
        trimap: PathBuf,

        /// Weight file (.mpk, .bin, .pth, .pt or .safetensors)
        #[arg(short, long)]
        weights: PathBuf,

        /// Network configuration, if not stored next to the weights
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Background to composite the result over
        #[arg(short, long)]
        background: Option<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = "output")]
        output: PathBuf,

        /// Network input size, a multiple of 32
        #[arg(short, long, default_value_t = DEFAULT_INPUT_SIZE)]
        size: usize,
    },

    /// Train the network
    #[cfg(feature = "train")]
    Train {
        /// Training configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Resume from the checkpoint of this epoch
        #[arg(short, long)]
        resume: Option<usize>,
    },

    /// Compute SAD and MSE against ground truth mattes
    Eval {
        /// Directory of images
        #[arg(long)]
        images: PathBuf,

        /// Directory of trimaps named like the images
        #[arg(long)]
        trimaps: PathBuf,

        /// Directory of ground truth alpha mattes named like the images
        #[arg(long)]
        alphas: PathBuf,

        /// Weight file
        #[arg(short, long)]
        weights: PathBuf,

        /// Network configuration, if not stored next to the weights
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory to write predictions to
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Network input size, a multiple of 32
        #[arg(short, long, default_value_t = DEFAULT_INPUT_SIZE)]
        size: usize,
    },

    /// Show backend information
    Info,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose)?;

    let device = create_device();
    tracing::debug!(backend = get_backend_name(), ?device, "Backend selected");

    match cli.command {
        Commands::Infer {
            image,
            trimap,
            weights,
            config,
            background,
            output,
            size,
        } => {
            let inference_config = InferenceConfig::new(image, trimap, weights, output)
                .with_config_path(config)
                .with_background_path(background)
                .with_size(size);
            run_inference::<SelectedBackend>(&inference_config, &device)
        }

        #[cfg(feature = "train")]
        Commands::Train { config, resume } => {
            use matting::training::{run_training, TrainingCliArgs};

            run_training(TrainingCliArgs::new(config, resume))
        }

        Commands::Eval {
            images,
            trimaps,
            alphas,
            weights,
            config,
            output,
            size,
        } => {
            let evaluation_config = EvaluationConfig::new(images, trimaps, alphas, weights)
                .with_config_path(config)
                .with_output_dir(output)
                .with_size(size);
            let summary = run_evaluation::<SelectedBackend>(&evaluation_config, &device)?;

            println!("Evaluated {} images", summary.count);
            println!("  SAD: {:.4}", summary.sad);
            println!("  MSE: {:.6}", summary.mse);
            Ok(())
        }

        Commands::Info => {
            println!("Matting information:");
            println!("  Backend: {}", get_backend_name());
            println!("  Device: {device:?}");
            Ok(())
        }
    }
}
