mod description;
mod descriptors;
mod fast_hessian;
pub mod image;
pub mod integral;
mod orientation;

pub use crate::description::Description;
pub use crate::descriptors::{describe, DESCRIPTOR_LEN};
pub use crate::orientation::sliding_orientation;

pub use crate::image::{ColorImage, GrayFloatImage};
pub use crate::integral::IntegralImage;
use ::image::DynamicImage;
use cv_core::nalgebra::Point2;
use cv_core::ImagePoint;
use log::*;
use std::f32::consts::PI;
use std::path::Path;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Errors produced while extracting features.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("no features detected in the image")]
    NoFeaturesDetected,
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("unable to load image: {0}")]
    Image(#[from] ::image::ImageError),
}

/// A structurally invalid [`Config`], reported by [`ColorSurf::new`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("threshold must be finite and non-negative, got {0}")]
    InvalidThreshold(f32),
    #[error("initial sample rate must be at least 1")]
    ZeroSampleRate,
    #[error("initial filter size must be at least 3, got {0}")]
    InitialSizeTooSmall(usize),
    #[error("initial filter size must be at most 65536, got {0}")]
    InitialSizeTooLarge(usize),
    #[error("scale-space suppression needs at least 3 scales per octave, got {0}")]
    TooFewScales(usize),
    #[error("at most 64 scales per octave are supported, got {0}")]
    TooManyScales(usize),
    #[error("at least one octave is required")]
    ZeroOctaves,
    #[error("orientation window must be in (0, 2π], got {0}")]
    InvalidOrientationWindow(f32),
}

/// A point of interest in an image.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KeyPoint {
    /// Position in pixels. +x faces right and +y faces toward the bottom of
    /// the image, with the origin at the top left pixel.
    pub point: (f32, f32),
    /// The determinant of Hessian response.
    ///
    /// The sign is the sign of the Laplacian, so bright blobs on a dark
    /// background have a negative response. Its magnitude is the detector
    /// strength.
    pub response: f32,
    /// The (interpolated) box filter size in pixels.
    pub size: f32,
    /// The scale σ of the keypoint, proportional to `size`.
    pub scale: f32,
    /// The octave in which the keypoint was detected.
    pub octave: usize,
    /// The scale index within the octave.
    pub scale_index: usize,
}

impl ImagePoint for KeyPoint {
    fn image_point(&self) -> Point2<f64> {
        Point2::new(self.point.0 as f64, self.point.1 as f64)
    }
}

/// Largest accepted [`Config::initial_size`].
pub const MAX_INITIAL_SIZE: usize = 1 << 16;

/// Largest accepted [`Config::scales_per_octave`].
pub const MAX_SCALES_PER_OCTAVE: usize = 64;

/// Map a box filter size to the Gaussian σ it approximates.
///
/// The 9 x 9 filter approximates σ = 1.2.
pub fn scale_from_size(size: f32) -> f32 {
    1.2 * size / 9.0
}

/// The parameters of Color SURF.
///
/// Use [`ColorSurf::new`] to validate a configuration. The defaults detect
/// dense, upright features without normalizing the final descriptors.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(default))]
pub struct Config {
    /// Radius of the non-maximum region, in grid samples
    pub radius: usize,

    /// Minimum determinant of Hessian response of a keypoint
    pub threshold: f32,

    /// Maximum number of keypoints per scale, less than or equal to 0 returns all
    pub max_features_per_scale: i32,

    /// How often pixels are sampled in the first octave
    pub initial_sample_rate: usize,

    /// Width of the smallest filter in the first octave
    pub initial_size: usize,

    /// Number of filter sizes in a single octave
    pub scales_per_octave: usize,

    /// Number of octaves
    pub octaves: usize,

    /// Estimate a sliding window orientation instead of upright keypoints
    pub slided: bool,

    /// Aperture of the sliding orientation window in radians
    pub orientation_window: f32,

    /// Divide every final descriptor by its Euclidean norm
    pub normalize: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            radius: 1,
            threshold: 0.0,
            max_features_per_scale: -1,
            initial_sample_rate: 2,
            initial_size: 9,
            scales_per_octave: 4,
            octaves: 4,
            slided: false,
            orientation_window: PI / 3.0,
            normalize: false,
        }
    }
}

impl Config {
    fn validate(&self) -> Result<(), ConfigurationError> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(ConfigurationError::InvalidThreshold(self.threshold));
        }
        if self.initial_sample_rate == 0 {
            return Err(ConfigurationError::ZeroSampleRate);
        }
        if self.initial_size < 3 {
            return Err(ConfigurationError::InitialSizeTooSmall(self.initial_size));
        }
        if self.initial_size > MAX_INITIAL_SIZE {
            return Err(ConfigurationError::InitialSizeTooLarge(self.initial_size));
        }
        if self.scales_per_octave < 3 {
            return Err(ConfigurationError::TooFewScales(self.scales_per_octave));
        }
        if self.scales_per_octave > MAX_SCALES_PER_OCTAVE {
            return Err(ConfigurationError::TooManyScales(self.scales_per_octave));
        }
        if self.octaves == 0 {
            return Err(ConfigurationError::ZeroOctaves);
        }
        if !(self.orientation_window > 0.0 && self.orientation_window <= 2.0 * PI) {
            return Err(ConfigurationError::InvalidOrientationWindow(
                self.orientation_window,
            ));
        }
        Ok(())
    }

    /// The per-scale keypoint cap, `None` when unbounded.
    pub fn feature_cap(&self) -> Option<usize> {
        usize::try_from(self.max_features_per_scale)
            .ok()
            .filter(|&cap| cap > 0)
    }
}

/// Something that turns an image into keypoints and descriptors.
pub trait FeatureDetector {
    /// Detect keypoints in `image` and describe each one of them.
    fn extract(&self, image: &ColorImage) -> Result<Description, Error>;
}

/// The Color SURF feature extractor.
///
/// Keypoints are detected on the average of the color channels with a
/// Fast-Hessian detector. Every channel is then described separately with a
/// SURF descriptor and the channel descriptors are concatenated.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct ColorSurf {
    config: Config,
}

impl ColorSurf {
    /// Create an extractor, validating `config`.
    pub fn new(config: Config) -> Result<Self, ConfigurationError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// This convenience constructor is provided for the very common case
    /// that the detector threshold needs to be modified.
    pub fn with_threshold(threshold: f32) -> Result<Self, ConfigurationError> {
        Self::new(Config {
            threshold,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Extract features using the Color SURF feature extractor.
    ///
    /// This performs all operations end-to-end. The stages are also exposed
    /// individually ([`ColorSurf::detect_keypoints`],
    /// [`ColorSurf::compute_orientations`], [`ColorSurf::describe_channels`]),
    /// but this function documents how they fit together.
    ///
    /// # Errors
    /// [`Error::NoFeaturesDetected`] if no keypoint survives non-maximum
    /// suppression.
    pub fn extract(&self, image: &ColorImage) -> Result<Description, Error> {
        let gray = image.grayscale();
        let integral = IntegralImage::new(&gray);
        trace!("Detecting keypoints.");
        let keypoints = self.detect_keypoints(&integral);
        if keypoints.is_empty() {
            return Err(Error::NoFeaturesDetected);
        }
        trace!("Computing orientations.");
        let orientations = self.compute_orientations(&integral, &keypoints);
        trace!("Describing {} channels.", image.channel_count());
        let channel_descriptors =
            self.describe_channels(image, Some(&integral), &keypoints, &orientations);
        let description = Description::assemble(
            keypoints,
            orientations,
            channel_descriptors,
            self.config.normalize,
        );
        info!("Extracted {} features", description.len());
        Ok(description)
    }

    /// Extract features from an image of the image crate.
    pub fn extract_dynamic(&self, image: &DynamicImage) -> Result<Description, Error> {
        self.extract(&ColorImage::from_dynamic(image)?)
    }

    /// Extract features from an image on disk.
    ///
    /// # Examples
    /// ```no_run
    /// let surf = color_surf::ColorSurf::default();
    /// let description = surf.extract_path("image.png").unwrap();
    /// println!("{} descriptors", description.len());
    /// ```
    pub fn extract_path(&self, path: impl AsRef<Path>) -> Result<Description, Error> {
        self.extract_dynamic(&::image::open(path)?)
    }
}

impl FeatureDetector for ColorSurf {
    fn extract(&self, image: &ColorImage) -> Result<Description, Error> {
        ColorSurf::extract(self, image)
    }
}

#[cfg(test)]
mod tests {
    use super::{ColorSurf, Config, ConfigurationError};

    #[test]
    fn default_config_is_valid() {
        assert!(ColorSurf::new(Config::default()).is_ok());
        assert_eq!(Config::default().feature_cap(), None);
    }

    #[test]
    fn rejects_structurally_invalid_configs() {
        let invalid = [
            (
                Config {
                    octaves: 0,
                    ..Default::default()
                },
                ConfigurationError::ZeroOctaves,
            ),
            (
                Config {
                    initial_sample_rate: 0,
                    ..Default::default()
                },
                ConfigurationError::ZeroSampleRate,
            ),
            (
                Config {
                    threshold: -1.0,
                    ..Default::default()
                },
                ConfigurationError::InvalidThreshold(-1.0),
            ),
            (
                Config {
                    initial_size: 1,
                    ..Default::default()
                },
                ConfigurationError::InitialSizeTooSmall(1),
            ),
            (
                Config {
                    initial_size: usize::MAX - 2,
                    ..Default::default()
                },
                ConfigurationError::InitialSizeTooLarge(usize::MAX - 2),
            ),
            (
                Config {
                    scales_per_octave: 2,
                    ..Default::default()
                },
                ConfigurationError::TooFewScales(2),
            ),
            (
                Config {
                    scales_per_octave: usize::MAX,
                    ..Default::default()
                },
                ConfigurationError::TooManyScales(usize::MAX),
            ),
            (
                Config {
                    orientation_window: 0.0,
                    ..Default::default()
                },
                ConfigurationError::InvalidOrientationWindow(0.0),
            ),
        ];
        for (config, expected) in invalid {
            assert_eq!(ColorSurf::new(config), Err(expected));
        }
    }

    #[test]
    fn non_positive_caps_are_unbounded() {
        for (max, expected) in [(-3, None), (0, None), (1, Some(1)), (25, Some(25))] {
            let config = Config {
                max_features_per_scale: max,
                ..Default::default()
            };
            assert_eq!(config.feature_cap(), expected);
        }
    }
}
