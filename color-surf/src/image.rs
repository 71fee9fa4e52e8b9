use crate::Error;
use derive_more::{Deref, DerefMut};
use image::{DynamicImage, GenericImageView, ImageBuffer, Luma};
use log::*;
use ndarray::{Array2, ArrayView2};
use nshare::RefNdarray2;

type GrayImageBuffer = ImageBuffer<Luma<f32>, Vec<f32>>;

/// A single band of `f32` samples.
///
/// This is a thin wrapper around the image crate's buffer so that bands can be
/// viewed as [`ndarray`] arrays (row-major, `(height, width)`) without copying.
/// Every channel of a [`ColorImage`] and the grayscale band used for detection
/// are stored this way.
#[derive(Debug, Clone, Deref, DerefMut)]
pub struct GrayFloatImage(pub GrayImageBuffer);

impl GrayFloatImage {
    /// Wraps raw row-major samples, returning `None` if `samples` does not hold
    /// exactly `width * height` values.
    pub fn from_raw(width: usize, height: usize, samples: Vec<f32>) -> Option<Self> {
        if samples.len() != width * height {
            return None;
        }
        ImageBuffer::from_raw(width as u32, height as u32, samples).map(Self)
    }

    pub fn from_array2(arr: Array2<f32>) -> Self {
        let (height, width) = arr.dim();
        // `as_standard_layout` makes the raw vector row-major regardless of how
        // the array was produced.
        let samples = arr.as_standard_layout().iter().copied().collect();
        Self(
            ImageBuffer::from_raw(width as u32, height as u32, samples)
                .expect("array dimensions always match its element count"),
        )
    }

    pub fn ref_array2(&self) -> ArrayView2<f32> {
        self.0.ref_ndarray2()
    }

    pub fn width(&self) -> usize {
        self.0.width() as usize
    }

    pub fn height(&self) -> usize {
        self.0.height() as usize
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.get_pixel(x as u32, y as u32)[0]
    }

    pub fn put(&mut self, x: usize, y: usize, pixel_value: f32) {
        self.put_pixel(x as u32, y as u32, Luma([pixel_value]));
    }
}

/// An image with one (gray) or three (color) channels.
///
/// A `ColorImage` can only be built through its validating constructors, so any
/// instance has a non-zero size and channel planes of identical dimensions.
#[derive(Debug, Clone)]
pub struct ColorImage {
    channels: Vec<GrayFloatImage>,
}

impl ColorImage {
    /// Build an image from its channel planes, in channel order.
    ///
    /// # Errors
    /// [`Error::InvalidImage`] if there are no planes, a number of planes other
    /// than 1 or 3, a zero width or height, or planes of different sizes.
    pub fn from_channels(channels: Vec<GrayFloatImage>) -> Result<Self, Error> {
        let first = channels
            .first()
            .ok_or_else(|| Error::InvalidImage("the image has no channels".into()))?;
        if channels.len() != 1 && channels.len() != 3 {
            return Err(Error::InvalidImage(format!(
                "expected 1 or 3 channels, got {}",
                channels.len()
            )));
        }
        let (width, height) = (first.width(), first.height());
        if width == 0 || height == 0 {
            return Err(Error::InvalidImage(format!(
                "the image is empty ({} x {})",
                width, height
            )));
        }
        if let Some(channel) = channels
            .iter()
            .find(|channel| channel.width() != width || channel.height() != height)
        {
            return Err(Error::InvalidImage(format!(
                "channel of size {} x {} does not match {} x {}",
                channel.width(),
                channel.height(),
                width,
                height
            )));
        }
        Ok(Self { channels })
    }

    /// Build a single channel image.
    pub fn from_gray(image: GrayFloatImage) -> Result<Self, Error> {
        Self::from_channels(vec![image])
    }

    /// Create a unit float image from the image crate's `DynamicImage` type.
    ///
    /// Images with color become three channels (red, green, blue), all others a
    /// single luma channel. Alpha is dropped. Samples are scaled to `[0, 1]`.
    pub fn from_dynamic(input_image: &DynamicImage) -> Result<Self, Error> {
        let (width, height) = input_image.dimensions();
        let channels = if input_image.color().has_color() {
            info!("Loaded a {} x {} color image", width, height);
            let rgb = input_image.to_rgb32f();
            (0..3)
                .map(|c| {
                    GrayFloatImage(ImageBuffer::from_fn(width, height, |x, y| {
                        Luma([rgb[(x, y)][c]])
                    }))
                })
                .collect()
        } else {
            info!("Loaded a {} x {} gray image", width, height);
            vec![GrayFloatImage(input_image.to_luma32f())]
        };
        Self::from_channels(channels)
    }

    pub fn width(&self) -> usize {
        self.channels[0].width()
    }

    pub fn height(&self) -> usize {
        self.channels[0].height()
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn channels(&self) -> &[GrayFloatImage] {
        &self.channels
    }

    /// Average all channels into one intensity band.
    ///
    /// A single channel image returns a copy of its only channel. Samples are
    /// summed in ascending order in `f64`, so the band does not depend on the
    /// order of the channels.
    pub fn grayscale(&self) -> GrayFloatImage {
        if let [gray] = self.channels.as_slice() {
            return gray.clone();
        }
        let planes: Vec<ArrayView2<f32>> = self
            .channels
            .iter()
            .map(|channel| channel.ref_array2())
            .collect();
        let count = planes.len() as f64;
        let mut samples = Vec::with_capacity(planes.len());
        let mean = Array2::from_shape_fn((self.height(), self.width()), |index| {
            samples.clear();
            samples.extend(planes.iter().map(|plane| plane[index]));
            samples.sort_by(f32::total_cmp);
            let sum: f64 = samples.iter().map(|&v| f64::from(v)).sum();
            (sum / count) as f32
        });
        GrayFloatImage::from_array2(mean)
    }
}
