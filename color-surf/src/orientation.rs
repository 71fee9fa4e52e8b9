use crate::integral::IntegralImage;
use crate::{ColorSurf, KeyPoint};
use std::f32::consts::PI;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Sample offsets, in units of the keypoint scale, lie in a disc of this radius.
const SAMPLE_RADIUS: i32 = 6;

/// Increment between two positions of the sliding window, in radians.
const WINDOW_STEP: f32 = 0.15;

/// Weights of a Gaussian with σ = 2.5, indexed by the absolute sample offsets.
#[allow(clippy::excessive_precision)]
static GAUSS25: [[f32; 7usize]; 7usize] = [
    [
        0.0254_6481f32,
        0.0235_0698f32,
        0.0184_9125f32,
        0.0123_9505f32,
        0.0070_8017f32,
        0.0034_4629f32,
        0.0014_2946f32,
    ],
    [
        0.0235_0698f32,
        0.0216_9968f32,
        0.0170_6957f32,
        0.0114_4208f32,
        0.0065_3582f32,
        0.0031_8132f32,
        0.0013_1956f32,
    ],
    [
        0.0184_9125f32,
        0.0170_6957f32,
        0.0134_2740f32,
        0.0090_0066f32,
        0.0051_4126f32,
        0.0025_0252f32,
        0.0010_3800f32,
    ],
    [
        0.0123_9505f32,
        0.0114_4208f32,
        0.0090_0066f32,
        0.0060_3332f32,
        0.0034_4629f32,
        0.0016_7749f32,
        0.0006_9579f32,
    ],
    [
        0.0070_8017f32,
        0.0065_3582f32,
        0.0051_4126f32,
        0.0034_4629f32,
        0.0019_6855f32,
        0.0009_5820f32,
        0.0003_9744f32,
    ],
    [
        0.0034_4629f32,
        0.0031_8132f32,
        0.0025_0252f32,
        0.0016_7749f32,
        0.0009_5820f32,
        0.0004_6640f32,
        0.0001_9346f32,
    ],
    [
        0.0014_2946f32,
        0.0013_1956f32,
        0.0010_3800f32,
        0.0006_9579f32,
        0.0003_9744f32,
        0.0001_9346f32,
        0.0000_8024f32,
    ],
];

/// A Gaussian weighted Haar response around a keypoint.
struct Sample {
    dx: f32,
    dy: f32,
    /// Direction of `(dx, dy)` in `[0, 2π)`.
    angle: f32,
}

fn haar_samples(integral: &IntegralImage, keypoint: &KeyPoint) -> Vec<Sample> {
    let sigma = keypoint.scale;
    let (xf, yf) = keypoint.point;
    let haar_size = ((4.0 * sigma).round() as usize).max(2);
    let mut samples = Vec::with_capacity(109);
    for i in -SAMPLE_RADIUS..=SAMPLE_RADIUS {
        for j in -SAMPLE_RADIUS..=SAMPLE_RADIUS {
            if i * i + j * j >= SAMPLE_RADIUS * SAMPLE_RADIUS {
                continue;
            }
            let x = (xf + i as f32 * sigma).round() as isize;
            let y = (yf + j as f32 * sigma).round() as isize;
            let weight = GAUSS25[i.unsigned_abs() as usize][j.unsigned_abs() as usize];
            let dx = weight * integral.haar_x(x, y, haar_size) as f32;
            let dy = weight * integral.haar_y(x, y, haar_size) as f32;
            let angle = dy.atan2(dx);
            samples.push(Sample {
                dx,
                dy,
                angle: if angle < 0.0 { angle + 2.0 * PI } else { angle },
            });
        }
    }
    samples
}

/// Estimate the dominant gradient direction around a keypoint.
///
/// Haar responses are sampled on a disc of radius `6σ` and a window of
/// `window` radians is slid around the circle in steps of 0.15 rad. The
/// direction of the largest summed response over any window position is the
/// orientation, in radians. A keypoint without any gradient has orientation 0.
pub fn sliding_orientation(integral: &IntegralImage, keypoint: &KeyPoint, window: f32) -> f32 {
    let samples = haar_samples(integral, keypoint);
    let mut best = (0f32, 0f32);
    let mut best_magnitude = 0f32;
    let mut start = 0f32;
    while start < 2.0 * PI {
        let (sum_x, sum_y) = samples
            .iter()
            .filter(|sample| {
                let mut delta = sample.angle - start;
                if delta < 0.0 {
                    delta += 2.0 * PI;
                }
                delta < window
            })
            .fold((0f32, 0f32), |(x, y), sample| (x + sample.dx, y + sample.dy));
        let magnitude = sum_x * sum_x + sum_y * sum_y;
        if magnitude > best_magnitude {
            best_magnitude = magnitude;
            best = (sum_x, sum_y);
        }
        start += WINDOW_STEP;
    }
    if best_magnitude > 0.0 {
        best.1.atan2(best.0)
    } else {
        0.0
    }
}

impl ColorSurf {
    /// One orientation per keypoint, all zero unless `slided` is set.
    pub fn compute_orientations(&self, integral: &IntegralImage, keypoints: &[KeyPoint]) -> Vec<f32> {
        if !self.config.slided {
            return vec![0.0; keypoints.len()];
        }
        let window = self.config.orientation_window;
        #[cfg(not(feature = "rayon"))]
        {
            keypoints
                .iter()
                .map(|keypoint| sliding_orientation(integral, keypoint, window))
                .collect()
        }
        #[cfg(feature = "rayon")]
        {
            keypoints
                .par_iter()
                .map(|keypoint| sliding_orientation(integral, keypoint, window))
                .collect()
        }
    }
}
