//! Trimap encoding.
//!
//! A trimap reaches the network as per-class scores `[N, 3, H, W]`. The
//! network consumes a single channel: the argmax class remapped to the grey
//! levels {0, 128, 255} and rescaled to [0, 1]. Soft scores are therefore
//! quantized to their winning class.

use burn::prelude::*;

/// Number of trimap classes.
pub const TRIMAP_CLASSES: usize = 3;

/// Trimap class, ordered as the channels of a trimap tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrimapClass {
    Background = 0,
    Unknown = 1,
    Foreground = 2,
}

impl TrimapClass {
    /// Class of a greyscale trimap pixel: 0 is background, 255 is foreground,
    /// everything in between is unknown.
    pub const fn from_luma(value: u8) -> Self {
        match value {
            0 => Self::Background,
            255 => Self::Foreground,
            _ => Self::Unknown,
        }
    }

    /// Channel index of the class.
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Grey level the class is encoded as.
    pub const fn luma(self) -> u8 {
        match self {
            Self::Background => 0,
            Self::Unknown => 128,
            Self::Foreground => 255,
        }
    }
}

/// Reduces trimap scores to the network's trimap channel.
///
/// # Shapes
/// - trimap: `[batch, 3, height, width]`
/// - output: `[batch, 1, height, width]` with values in {0, 128/255, 1}
pub fn encode_trimap<B: Backend>(trimap: Tensor<B, 4>) -> Tensor<B, 4> {
    let classes = trimap.argmax(1);

    let unknown = classes
        .clone()
        .equal_elem(TrimapClass::Unknown.index() as i64)
        .float()
        .mul_scalar(f32::from(TrimapClass::Unknown.luma()) / 255.0);
    let foreground = classes
        .equal_elem(TrimapClass::Foreground.index() as i64)
        .float();

    unknown + foreground
}

/// One-hot trimap from a class index map.
///
/// # Shapes
/// - classes: `[batch, 1, height, width]` holding class indices
/// - output: `[batch, 3, height, width]`
pub fn trimap_from_classes<B: Backend>(classes: Tensor<B, 4, Int>) -> Tensor<B, 4> {
    let channels: Vec<_> = (0..TRIMAP_CLASSES)
        .map(|class| classes.clone().equal_elem(class as i64).float())
        .collect();

    Tensor::cat(channels, 1)
}

/// Mask of the unknown region of a trimap, `1.0` where the winning class is unknown.
///
/// # Shapes
/// - trimap: `[batch, 3, height, width]`
/// - output: `[batch, 1, height, width]`
pub fn unknown_region<B: Backend>(trimap: Tensor<B, 4>) -> Tensor<B, 4> {
    trimap
        .argmax(1)
        .equal_elem(TrimapClass::Unknown.index() as i64)
        .float()
}

#[cfg(test)]
mod tests {
    use burn::tensor::TensorData;

    use super::*;
    use crate::tests::TestBackend;

    fn classes(device: &<TestBackend as Backend>::Device) -> Tensor<TestBackend, 4, Int> {
        Tensor::from_data(TensorData::new(vec![0i64, 1, 2, 1], [1, 1, 2, 2]), device)
    }

    #[test]
    fn luma_values_map_to_three_classes() {
        assert_eq!(TrimapClass::from_luma(0), TrimapClass::Background);
        assert_eq!(TrimapClass::from_luma(1), TrimapClass::Unknown);
        assert_eq!(TrimapClass::from_luma(128), TrimapClass::Unknown);
        assert_eq!(TrimapClass::from_luma(254), TrimapClass::Unknown);
        assert_eq!(TrimapClass::from_luma(255), TrimapClass::Foreground);
    }

    #[test]
    fn one_hot_trimap_has_single_active_class_per_pixel() {
        let device = Default::default();
        let one_hot = trimap_from_classes(classes(&device));

        assert_eq!(one_hot.dims(), [1, 3, 2, 2]);
        let per_pixel = one_hot.clone().sum_dim(1).into_data().to_vec::<f32>().unwrap();
        assert_eq!(per_pixel, vec![1.0; 4]);

        let values = one_hot.into_data().to_vec::<f32>().unwrap();
        assert_eq!(
            values,
            vec![
                1.0, 0.0, 0.0, 0.0, // background
                0.0, 1.0, 0.0, 1.0, // unknown
                0.0, 0.0, 1.0, 0.0, // foreground
            ]
        );
    }

    #[test]
    fn encode_trimap_quantizes_classes_to_grey_levels() {
        let device = Default::default();
        let encoded = encode_trimap(trimap_from_classes(classes(&device)));

        assert_eq!(encoded.dims(), [1, 1, 2, 2]);
        let values = encoded.into_data().to_vec::<f32>().unwrap();
        let unknown = 128.0 / 255.0;
        assert_eq!(values, vec![0.0, unknown, 1.0, unknown]);
    }

    #[test]
    fn encode_trimap_quantizes_soft_scores_to_winning_class() {
        let device = Default::default();
        let soft = Tensor::<TestBackend, 4>::from_data(
            TensorData::new(
                vec![
                    0.6f32, 0.1, // background scores
                    0.3, 0.2, // unknown scores
                    0.1, 0.7, // foreground scores
                ],
                [1, 3, 1, 2],
            ),
            &device,
        );

        let values = encode_trimap(soft).into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![0.0, 1.0]);
    }

    #[test]
    fn unknown_region_marks_only_unknown_pixels() {
        let device = Default::default();
        let mask = unknown_region(trimap_from_classes(classes(&device)));

        let values = mask.into_data().to_vec::<f32>().unwrap();
        assert_eq!(values, vec![0.0, 1.0, 0.0, 1.0]);
    }
}
