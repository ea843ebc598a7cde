//! Composite matting dataset.
//!
//! A split directory holds three folders:
//!
//! - `fg`: foreground images
//! - `alpha`: their alpha mattes, matched by file stem
//! - `bg`: backgrounds
//!
//! Every foreground is composited over `backgrounds_per_foreground`
//! backgrounds. Sample `i` uses foreground `i / k` and background
//! `i mod |bg|`, so the background index keeps advancing across foregrounds.
//! Samples are built on access, following Burn's convention where datasets
//! return raw data and batchers create the tensors.

use std::{
    fs,
    marker::PhantomData,
    path::{Path, PathBuf},
};

use burn::{
    config::Config,
    data::{dataloader::batcher::Batcher, dataset::Dataset},
    tensor::{backend::Backend, Int, Tensor, TensorData},
};
use matting_model::{trimap_from_classes, unknown_region, MattingBatch, TrimapClass};
use matting_util::{is_supported_image_format, ImageUtils};

use crate::{
    augmentation::{AugmentationConfig, CompositeSample, MattingAugmentor},
    composition::{composite, generate_trimap, BackgroundPlacement},
    error::{DatasetError, DatasetResult},
};

/// Dataset configuration.
#[derive(Config, Debug)]
pub struct MattingDatasetConfig {
    /// Training split directory.
    pub train_root: String,
    /// Validation split directory.
    pub valid_root: String,
    /// Backgrounds each foreground is composited over.
    #[config(default = 20)]
    pub backgrounds_per_foreground: usize,
    /// Training augmentation.
    #[config(default = "AugmentationConfig::new()")]
    pub augmentation: AugmentationConfig,
}

/// Dataset split. Decides background placement and whether samples are augmented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetSplit {
    Train,
    Valid,
}

impl DatasetSplit {
    pub const fn is_training(self) -> bool {
        matches!(self, Self::Train)
    }

    pub const fn placement(self) -> BackgroundPlacement {
        match self {
            Self::Train => BackgroundPlacement::Origin,
            Self::Valid => BackgroundPlacement::Center,
        }
    }
}

/// A single sample as raw data.
#[derive(Debug, Clone)]
pub struct MattingItem {
    /// Composite RGB in [0, 1], `[H, W, C]` row major.
    pub image: Vec<f32>,
    /// Trimap grey levels, `[H, W]`.
    pub trimap: Vec<u8>,
    /// Ground truth alpha in [0, 1], `[H, W]`.
    pub alpha: Vec<f32>,
    /// Image height in pixels
    pub height: usize,
    /// Image width in pixels
    pub width: usize,
}

impl MattingItem {
    pub fn from_sample(sample: CompositeSample) -> Self {
        let (width, height) = sample.dimensions();
        let to_unit = |value: u8| f32::from(value) / 255.0;

        Self {
            image: sample.image.into_raw().into_iter().map(to_unit).collect(),
            trimap: sample.trimap.into_raw(),
            alpha: sample.alpha.into_raw().into_iter().map(to_unit).collect(),
            height: height as usize,
            width: width as usize,
        }
    }
}

/// Converts [`MattingItem`]s into a [`MattingBatch`]: ImageNet normalized
/// images, one-hot trimaps, alphas and the unknown-region mask.
#[derive(Clone, Default)]
pub struct MattingBatcher<B: Backend> {
    _phantom: PhantomData<B>,
}

impl<B: Backend> MattingBatcher<B> {
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<B: Backend> Batcher<B, MattingItem, MattingBatch<B>> for MattingBatcher<B> {
    fn batch(&self, items: Vec<MattingItem>, device: &B::Device) -> MattingBatch<B> {
        let batch_size = items.len();
        let mut images = Vec::with_capacity(batch_size);
        let mut trimaps = Vec::with_capacity(batch_size);
        let mut alphas = Vec::with_capacity(batch_size);

        for item in items {
            let MattingItem {
                image,
                trimap,
                alpha,
                height,
                width,
            } = item;

            let image = Tensor::<B, 3>::from_data(
                TensorData::new(image, [height, width, 3]).convert::<B::FloatElem>(),
                device,
            )
            .permute([2, 0, 1])
            .unsqueeze::<4>();

            let classes: Vec<i64> = trimap
                .into_iter()
                .map(|value| TrimapClass::from_luma(value).index() as i64)
                .collect();
            let classes = Tensor::<B, 4, Int>::from_data(
                TensorData::new(classes, [1, 1, height, width]),
                device,
            );

            let alpha = Tensor::<B, 4>::from_data(
                TensorData::new(alpha, [1, 1, height, width]).convert::<B::FloatElem>(),
                device,
            );

            images.push(image);
            trimaps.push(trimap_from_classes(classes));
            alphas.push(alpha);
        }

        let images = ImageUtils::apply_imagenet_normalization(Tensor::cat(images, 0))
            .unwrap_or_else(|e| panic!("Failed to normalize batch images: {e}"));
        let trimaps = Tensor::cat(trimaps, 0);
        let unknown = unknown_region(trimaps.clone());

        MattingBatch::new(images, trimaps, Tensor::cat(alphas, 0), unknown)
    }
}

/// Dataset of synthetic composites.
pub struct MattingDataset {
    /// Foreground and alpha paths.
    foregrounds: Vec<(PathBuf, PathBuf)>,
    backgrounds: Vec<PathBuf>,
    backgrounds_per_foreground: usize,
    split: DatasetSplit,
    augmentor: MattingAugmentor,
}

impl MattingDataset {
    /// Index the split directory `root`.
    ///
    /// Foregrounds without a readable alpha matte of the same size, and
    /// unreadable backgrounds, are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Fails when a folder is missing or unreadable, when no foreground has an
    /// alpha matte, when there are no backgrounds, or when
    /// `backgrounds_per_foreground` is zero.
    pub fn new<P: AsRef<Path>>(
        root: P,
        split: DatasetSplit,
        backgrounds_per_foreground: usize,
        augmentor: MattingAugmentor,
    ) -> DatasetResult<Self> {
        if backgrounds_per_foreground == 0 {
            return Err(DatasetError::InvalidBackgroundsPerForeground {
                value: backgrounds_per_foreground,
            });
        }

        let root = root.as_ref();
        let foregrounds = Self::collect_foregrounds(&root.join("fg"), &root.join("alpha"))?;

        let background_root = root.join("bg");
        let mut backgrounds = list_images(&background_root)?;
        backgrounds.retain(|path| match image_dimensions(path) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping background");
                false
            }
        });
        if backgrounds.is_empty() {
            return Err(DatasetError::NoBackgrounds {
                path: background_root,
            });
        }

        tracing::info!(
            root = %root.display(),
            ?split,
            foregrounds = foregrounds.len(),
            backgrounds = backgrounds.len(),
            backgrounds_per_foreground,
            "Indexed composite dataset"
        );

        Ok(Self {
            foregrounds,
            backgrounds,
            backgrounds_per_foreground,
            split,
            augmentor,
        })
    }

    /// Index the split of `config` named by `split`.
    pub fn from_config(
        config: &MattingDatasetConfig,
        split: DatasetSplit,
        seed: u64,
    ) -> DatasetResult<Self> {
        let root = match split {
            DatasetSplit::Train => &config.train_root,
            DatasetSplit::Valid => &config.valid_root,
        };
        let augmentor = MattingAugmentor::new(config.augmentation.clone(), seed);

        Self::new(root, split, config.backgrounds_per_foreground, augmentor)
    }

    pub const fn split(&self) -> DatasetSplit {
        self.split
    }

    /// Foreground and background indices of sample `index`.
    pub fn pair(&self, index: usize) -> (usize, usize) {
        (
            index / self.backgrounds_per_foreground,
            index % self.backgrounds.len(),
        )
    }

    /// Build sample `index`: composite, trimap generation and augmentation.
    pub fn load_sample(&self, index: usize) -> DatasetResult<CompositeSample> {
        let (fg_index, bg_index) = self.pair(index);
        let (fg_path, alpha_path) = &self.foregrounds[fg_index];

        let foreground = open_image(fg_path)?.into_rgb8();
        let alpha = open_image(alpha_path)?.into_luma8();
        let background = open_image(&self.backgrounds[bg_index])?.into_rgb8();

        let image = composite(&foreground, &alpha, &background, self.split.placement())?;

        let mut rng = self.augmentor.rng(index);
        let trimap = generate_trimap(&alpha, &mut rng);

        Ok(self.augmentor.augment(
            CompositeSample::new(image, trimap, alpha),
            &mut rng,
            self.split.is_training(),
        ))
    }

    /// Pair every foreground with the alpha matte of the same stem.
    fn collect_foregrounds(
        foreground_root: &Path,
        alpha_root: &Path,
    ) -> DatasetResult<Vec<(PathBuf, PathBuf)>> {
        if !alpha_root.is_dir() {
            return Err(DatasetError::DirectoryNotFound {
                path: alpha_root.to_path_buf(),
            });
        }

        let alphas = list_images(alpha_root)?;
        let mut pairs = Vec::new();

        for foreground in list_images(foreground_root)? {
            let stem = file_stem(&foreground)?;
            let mut alpha = None;
            for candidate in &alphas {
                if file_stem(candidate)? == stem {
                    alpha = Some(candidate.clone());
                    break;
                }
            }

            let Some(alpha) = alpha else {
                tracing::warn!(path = %foreground.display(), "No alpha matte found for foreground");
                continue;
            };

            match check_pair(&foreground, &alpha) {
                Ok(()) => pairs.push((foreground, alpha)),
                Err(e) => {
                    tracing::warn!(path = %foreground.display(), error = %e, "Skipping foreground");
                }
            }
        }

        if pairs.is_empty() {
            return Err(DatasetError::NoValidPairs {
                path: foreground_root.to_path_buf(),
            });
        }

        Ok(pairs)
    }
}

impl Dataset<MattingItem> for MattingDataset {
    fn get(&self, index: usize) -> Option<MattingItem> {
        if index >= self.len() {
            return None;
        }

        match self.load_sample(index) {
            Ok(sample) => Some(MattingItem::from_sample(sample)),
            Err(e) => {
                tracing::warn!(index, error = %e, "Failed to load sample");
                None
            }
        }
    }

    fn len(&self) -> usize {
        self.foregrounds.len() * self.backgrounds_per_foreground
    }
}

/// Supported images in `dir`, sorted by path.
fn list_images(dir: &Path) -> DatasetResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(DatasetError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }

    let entries = fs::read_dir(dir).map_err(|source| DatasetError::DirectoryReadFailed {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut images = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|source| DatasetError::DirectoryReadFailed {
                path: dir.to_path_buf(),
                source,
            })?
            .path();
        if path.is_file() && is_supported_image_format(&path) {
            images.push(path);
        }
    }
    images.sort();

    Ok(images)
}

fn file_stem(path: &Path) -> DatasetResult<&str> {
    path.file_stem()
        .ok_or_else(|| DatasetError::NoFileStem {
            path: path.to_path_buf(),
        })?
        .to_str()
        .ok_or_else(|| DatasetError::InvalidUtf8Path {
            path: path.to_path_buf(),
        })
}

fn image_dimensions(path: &Path) -> DatasetResult<(u32, u32)> {
    image::image_dimensions(path).map_err(|source| DatasetError::ImageOpenFailed {
        path: path.to_path_buf(),
        source,
    })
}

/// A foreground and its alpha matte must both be readable and the same size.
fn check_pair(foreground: &Path, alpha: &Path) -> DatasetResult<()> {
    let foreground = image_dimensions(foreground)?;
    let alpha = image_dimensions(alpha)?;
    if foreground != alpha {
        return Err(DatasetError::SizeMismatch { foreground, alpha });
    }
    Ok(())
}

fn open_image(path: &Path) -> DatasetResult<image::DynamicImage> {
    image::open(path).map_err(|source| DatasetError::ImageOpenFailed {
        path: path.to_path_buf(),
        source,
    })
}
