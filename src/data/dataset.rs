//! Labeled image dataset container.

use crate::error::PipelineError;
use ndarray::{Array1, Array4, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed image dimensions shared by every sample in a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageShape {
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl ImageShape {
    /// Number of values per image once flattened.
    pub fn flat_len(&self) -> usize {
        self.height * self.width * self.channels
    }
}

impl fmt::Display for ImageShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.height, self.width, self.channels)
    }
}

/// An ordered sequence of (image, binary label) pairs with one fixed shape.
///
/// Images are stored as a single `(n, height, width, channels)` tensor with
/// pixel values already normalized by the data preparation step. The pipeline
/// only partitions and iterates a dataset, never mutates it.
#[derive(Debug, Clone)]
pub struct Dataset {
    images: Array4<f32>,
    labels: Vec<u8>,
    shape: ImageShape,
}

impl Dataset {
    /// Wrap an image tensor and its labels, validating the invariants:
    /// non-empty, one label per image, labels in {0, 1}.
    pub fn new(images: Array4<f32>, labels: Vec<u8>) -> Result<Self, PipelineError> {
        let (n, height, width, channels) = images.dim();
        if n == 0 {
            return Err(PipelineError::shape("dataset contains no images"));
        }
        if labels.len() != n {
            return Err(PipelineError::shape(format!(
                "{} images but {} labels",
                n,
                labels.len()
            )));
        }
        if let Some(pos) = labels.iter().position(|&l| l > 1) {
            return Err(PipelineError::shape(format!(
                "label at index {pos} is {}, expected 0 or 1",
                labels[pos]
            )));
        }
        Ok(Self {
            images,
            labels,
            shape: ImageShape {
                height,
                width,
                channels,
            },
        })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn shape(&self) -> ImageShape {
        self.shape
    }

    pub fn images(&self) -> &Array4<f32> {
        &self.images
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    /// Number of positive-class samples.
    pub fn positives(&self) -> usize {
        self.labels.iter().filter(|&&l| l == 1).count()
    }

    /// Labels as float targets for the loss function.
    pub fn targets(&self) -> Array1<f32> {
        Array1::from_iter(self.labels.iter().map(|&l| f32::from(l)))
    }

    /// Copy out the images and float targets at the given indices.
    pub fn subset(&self, indices: &[usize]) -> (Array4<f32>, Array1<f32>) {
        let images = self.images.select(Axis(0), indices);
        let targets = Array1::from_iter(indices.iter().map(|&i| f32::from(self.labels[i])));
        (images, targets)
    }

    /// Fail early when two splits disagree on image shape.
    pub fn ensure_same_shape(&self, other: &Dataset) -> Result<(), PipelineError> {
        if self.shape != other.shape {
            return Err(PipelineError::shape(format!(
                "image shape mismatch between splits: {} vs {}",
                self.shape, other.shape
            )));
        }
        Ok(())
    }
}
