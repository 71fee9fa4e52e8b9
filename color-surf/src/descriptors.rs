use crate::image::{ColorImage, GrayFloatImage};
use crate::integral::IntegralImage;
use crate::{ColorSurf, KeyPoint};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Length of the descriptor of one channel.
pub const DESCRIPTOR_LEN: usize = 64;

/// Sub-regions per side of the descriptor window.
const REGIONS: usize = 4;

/// Samples per side of a sub-region. Neighboring sub-regions overlap by 4 samples.
const REGION_SAMPLES: i32 = 9;

/// Spread of the Gaussian weighting samples around a sub-region center, in samples.
const SAMPLE_SIGMA: f32 = 2.5;

/// Spread of the Gaussian weighting sub-regions around the window center, in sub-regions.
const REGION_SIGMA: f32 = 1.5;

fn gaussian(dx: f32, dy: f32, sigma: f32) -> f32 {
    (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp()
}

/// Sample offsets of a sub-region along one axis and the sub-region center,
/// in units of the keypoint scale.
fn region_offsets(region: usize) -> (impl Iterator<Item = f32>, f32) {
    let first = -12 + 5 * region as i32;
    let offsets = (first..first + REGION_SAMPLES).map(|k| k as f32 + 0.5);
    (offsets, -7.5 + 5.0 * region as f32)
}

/// Compute the 64 dimensional SURF descriptor of a keypoint on one band.
///
/// The square window of side `24σ` around the keypoint is rotated by `angle`
/// and split into 4 x 4 overlapping sub-regions. Every sub-region contributes
/// the sums of the rotated Haar responses `du`, `dv` and of their absolute
/// values, weighted by two Gaussians. The result has unit length, unless
/// every response was zero, in which case it stays zero.
pub fn describe(integral: &IntegralImage, keypoint: &KeyPoint, angle: f32) -> Vec<f32> {
    let sigma = keypoint.scale;
    let (xf, yf) = keypoint.point;
    let (si, co) = angle.sin_cos();
    let haar_size = (2 * sigma.round() as usize).max(1);
    let mut descriptor = Vec::with_capacity(DESCRIPTOR_LEN);
    // Rows of sub-regions follow v, the rotated y axis.
    for row in 0..REGIONS {
        let (v_offsets, cv) = region_offsets(row);
        let v_offsets: Vec<f32> = v_offsets.collect();
        for col in 0..REGIONS {
            let (u_offsets, cu) = region_offsets(col);
            let mut sums = [0f32; 4];
            for u in u_offsets {
                for &v in &v_offsets {
                    let x = (xf + (u * co - v * si) * sigma).round() as isize;
                    let y = (yf + (u * si + v * co) * sigma).round() as isize;
                    let rx = integral.haar_x(x, y, haar_size) as f32;
                    let ry = integral.haar_y(x, y, haar_size) as f32;
                    let weight = gaussian(u - cu, v - cv, SAMPLE_SIGMA);
                    let du = weight * (rx * co + ry * si);
                    let dv = weight * (-rx * si + ry * co);
                    sums[0] += du;
                    sums[1] += dv;
                    sums[2] += du.abs();
                    sums[3] += dv.abs();
                }
            }
            let weight = gaussian(
                col as f32 - 1.5,
                row as f32 - 1.5,
                REGION_SIGMA,
            );
            descriptor.extend(sums.iter().map(|sum| sum * weight));
        }
    }
    normalize(&mut descriptor);
    descriptor
}

/// Scale `vector` to unit Euclidean length. Zero vectors are left untouched.
pub(crate) fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
}

fn describe_all(integral: &IntegralImage, keypoints: &[KeyPoint], orientations: &[f32]) -> Vec<Vec<f32>> {
    #[cfg(not(feature = "rayon"))]
    {
        keypoints
            .iter()
            .zip(orientations)
            .map(|(keypoint, &angle)| describe(integral, keypoint, angle))
            .collect()
    }
    #[cfg(feature = "rayon")]
    {
        keypoints
            .par_iter()
            .zip(orientations)
            .map(|(keypoint, &angle)| describe(integral, keypoint, angle))
            .collect()
    }
}

impl ColorSurf {
    /// Describe every keypoint on every channel of `image`.
    ///
    /// The result is indexed by channel, then by keypoint. `gray_integral` is
    /// the integral image of the detection band; a single channel image is
    /// described on it directly instead of building the same table again.
    pub fn describe_channels(
        &self,
        image: &ColorImage,
        gray_integral: Option<&IntegralImage>,
        keypoints: &[KeyPoint],
        orientations: &[f32],
    ) -> Vec<Vec<Vec<f32>>> {
        debug_assert_eq!(keypoints.len(), orientations.len());
        if let (Some(integral), 1) = (gray_integral, image.channel_count()) {
            return vec![describe_all(integral, keypoints, orientations)];
        }
        let describe_channel =
            |channel: &GrayFloatImage| describe_all(&IntegralImage::new(channel), keypoints, orientations);
        #[cfg(not(feature = "rayon"))]
        {
            image.channels().iter().map(describe_channel).collect()
        }
        #[cfg(feature = "rayon")]
        {
            image.channels().par_iter().map(describe_channel).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{describe, DESCRIPTOR_LEN};
    use crate::image::{ColorImage, GrayFloatImage};
    use crate::integral::IntegralImage;
    use crate::{ColorSurf, KeyPoint};
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg64;

    fn keypoint(x: f32, y: f32, scale: f32) -> KeyPoint {
        KeyPoint {
            point: (x, y),
            response: -1.0,
            size: scale * 9.0 / 1.2,
            scale,
            octave: 0,
            scale_index: 1,
        }
    }

    fn random_band(seed: u8, size: usize) -> GrayFloatImage {
        let mut rng = Pcg64::from_seed([seed; 32]);
        let samples = (0..size * size).map(|_| rng.gen::<f32>()).collect();
        GrayFloatImage::from_raw(size, size, samples).unwrap()
    }

    fn norm(vector: &[f32]) -> f32 {
        vector.iter().map(|v| v * v).sum::<f32>().sqrt()
    }

    #[test]
    fn textured_patch_has_unit_descriptor() {
        let integral = IntegralImage::new(&random_band(9, 80));
        for angle in [0.0, 0.4, -2.0] {
            let descriptor = describe(&integral, &keypoint(40.0, 40.0, 1.6), angle);
            assert_eq!(descriptor.len(), DESCRIPTOR_LEN);
            assert!((norm(&descriptor) - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn flat_patch_has_zero_descriptor() {
        let integral = IntegralImage::new(&GrayFloatImage::from_raw(80, 80, vec![0.6; 6400]).unwrap());
        let descriptor = describe(&integral, &keypoint(40.0, 40.0, 1.6), 0.3);
        assert_eq!(descriptor, vec![0.0; DESCRIPTOR_LEN]);
    }

    #[test]
    fn rotated_window_aligns_with_gradient() {
        let angle = 0.7f32;
        let size = 120;
        let samples = (0..size * size)
            .map(|i| (i % size) as f32 * angle.cos() + (i / size) as f32 * angle.sin())
            .collect();
        let integral = IntegralImage::new(&GrayFloatImage::from_raw(size, size, samples).unwrap());
        let descriptor = describe(&integral, &keypoint(60.0, 60.0, 2.0), angle);
        for region in descriptor.chunks(4) {
            // The whole gradient lies along u.
            assert!(region[0] > 0.0);
            assert!((region[0] - region[2]).abs() < 1e-4);
            assert!(region[1].abs() < 1e-3 * region[0]);
            assert!(region[3].abs() < 1e-3 * region[0]);
        }
    }

    #[test]
    fn one_descriptor_per_channel_and_keypoint() {
        let image =
            ColorImage::from_channels(vec![random_band(1, 64), random_band(2, 64), random_band(3, 64)])
                .unwrap();
        let keypoints = [keypoint(32.0, 32.0, 1.2), keypoint(20.0, 40.0, 1.0)];
        let descriptors =
            ColorSurf::default().describe_channels(&image, None, &keypoints, &[0.0, 1.0]);
        assert_eq!(descriptors.len(), 3);
        for (channel, per_keypoint) in image.channels().iter().zip(&descriptors) {
            assert_eq!(per_keypoint.len(), 2);
            let integral = IntegralImage::new(channel);
            assert_eq!(per_keypoint[0], describe(&integral, &keypoints[0], 0.0));
            assert_eq!(per_keypoint[1], describe(&integral, &keypoints[1], 1.0));
        }
    }
}
