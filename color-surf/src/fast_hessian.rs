use crate::integral::IntegralImage;
use crate::{scale_from_size, ColorSurf, KeyPoint};
use float_ord::FloatOrd;
use log::*;
use ndarray::Array2;
use std::cmp::Reverse;
use std::ops::RangeInclusive;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Difference between consecutive filter sizes in the first octave.
const FIRST_SIZE_STEP: usize = 6;

/// Relative weight of `Dxy` in the determinant, compensating for the box
/// filter approximation of the Gaussian derivatives.
const DXY_WEIGHT: f64 = 0.9;

fn div_ceil(numerator: usize, denominator: usize) -> usize {
    numerator / denominator + usize::from(numerator % denominator != 0)
}

/// The filter sizes of one octave and the grid on which they are evaluated.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Octave {
    pub index: usize,
    /// Distance in pixels between two grid samples.
    pub sample_step: usize,
    /// Difference between consecutive filter sizes.
    pub size_step: usize,
    pub sizes: Vec<usize>,
    grid_width: usize,
    grid_height: usize,
    /// Grid columns where the largest filter fits in the image.
    cols: (usize, usize),
    /// Grid rows where the largest filter fits in the image.
    rows: (usize, usize),
}

impl Octave {
    fn new(
        index: usize,
        sample_step: usize,
        size_step: usize,
        sizes: Vec<usize>,
        width: usize,
        height: usize,
    ) -> Self {
        let margin = sizes.last().copied().unwrap_or(0) / 2;
        let valid = |extent: usize| {
            (
                div_ceil(margin, sample_step),
                extent.saturating_sub(margin + 1) / sample_step,
            )
        };
        Self {
            index,
            sample_step,
            size_step,
            sizes,
            grid_width: div_ceil(width, sample_step),
            grid_height: div_ceil(height, sample_step),
            cols: valid(width),
            rows: valid(height),
        }
    }

    fn cols(&self) -> RangeInclusive<usize> {
        self.cols.0..=self.cols.1
    }

    fn rows(&self) -> RangeInclusive<usize> {
        self.rows.0..=self.rows.1
    }
}

/// Determinant of Hessian and Laplacian responses of one filter size, sampled
/// on the grid of its octave. Cells outside of the valid region are zero.
struct ResponseLayer {
    det: Array2<f32>,
    trace: Array2<f32>,
}

impl ResponseLayer {
    fn compute(integral: &IntegralImage, octave: &Octave, size: usize) -> Self {
        let mut det = Array2::zeros((octave.grid_height, octave.grid_width));
        let mut trace = Array2::zeros((octave.grid_height, octave.grid_width));
        for gy in octave.rows() {
            for gx in octave.cols() {
                let x = (gx * octave.sample_step) as isize;
                let y = (gy * octave.sample_step) as isize;
                let (d, t) = hessian(integral, x, y, size);
                det[[gy, gx]] = d as f32;
                trace[[gy, gx]] = t as f32;
            }
        }
        Self { det, trace }
    }

    /// The determinant at a signed grid position, zero off the grid.
    fn det_at(&self, gx: isize, gy: isize) -> f32 {
        if gx < 0 || gy < 0 {
            return 0.0;
        }
        self.det
            .get([gy as usize, gx as usize])
            .copied()
            .unwrap_or(0.0)
    }
}

/// Approximate the Hessian at `(x, y)` with box filters of width `size`.
///
/// Returns the determinant `Dxx·Dyy − (0.9·Dxy)²` and the trace `Dxx + Dyy`, both
/// normalized by the filter area.
pub(crate) fn hessian(integral: &IntegralImage, x: isize, y: isize, size: usize) -> (f64, f64) {
    let lobe = (size / 3) as isize;
    let half_lobe = lobe / 2;
    let radius = size as isize / 2;
    let band = lobe - 1;
    // The outer box covers all three lobes, so subtracting the center lobe
    // three times leaves +1 / -2 / +1 weights.
    let dxx = integral.block_sum(x - radius, y - band, x + radius + 1, y + band + 1)
        - 3.0 * integral.block_sum(x - half_lobe, y - band, x + half_lobe + 1, y + band + 1);
    let dyy = integral.block_sum(x - band, y - radius, x + band + 1, y + radius + 1)
        - 3.0 * integral.block_sum(x - band, y - half_lobe, x + band + 1, y + half_lobe + 1);
    let dxy = integral.block_sum(x - lobe, y - lobe, x, y)
        + integral.block_sum(x + 1, y + 1, x + lobe + 1, y + lobe + 1)
        - integral.block_sum(x + 1, y - lobe, x + lobe + 1, y)
        - integral.block_sum(x - lobe, y + 1, x, y + lobe + 1);
    let norm = ((size * size) as f64).recip();
    let (dxx, dyy, dxy) = (dxx * norm, dyy * norm, dxy * norm);
    (dxx * dyy - (DXY_WEIGHT * dxy).powi(2), dxx + dyy)
}

/// Offset of the vertex of the parabola through three equally spaced samples.
///
/// Only offsets within one sample of the middle are trusted.
fn interpolate_peak(lower: f32, middle: f32, upper: f32) -> f32 {
    let denominator = lower - 2.0 * middle + upper;
    let offset = 0.5 * (lower - upper) / denominator;
    if offset.is_finite() && offset.abs() < 1.0 {
        offset
    } else {
        0.0
    }
}

/// Whether `value` is strictly greater than every cell of the three layers in
/// the `(2·radius + 1)²` window around `(gx, gy)`, except the middle layer's center.
fn is_strict_maximum(
    layers: &[ResponseLayer],
    gx: isize,
    gy: isize,
    radius: isize,
    value: f32,
) -> bool {
    let middle = layers.len() / 2;
    layers.iter().enumerate().all(|(l, layer)| {
        (-radius..=radius).all(|dy| {
            (-radius..=radius).all(|dx| {
                (l == middle && dx == 0 && dy == 0) || layer.det_at(gx + dx, gy + dy) < value
            })
        })
    })
}

impl ColorSurf {
    /// The octaves searched on an image of the given size.
    ///
    /// Filter sizes grow linearly within an octave and the growth doubles from
    /// one octave to the next, as does the sampling step. The search stops at
    /// the first octave whose largest filter does not fit in the image.
    pub(crate) fn octaves(&self, width: usize, height: usize) -> Vec<Octave> {
        let config = &self.config;
        let mut sample_step = config.initial_sample_rate;
        let mut size_step = FIRST_SIZE_STEP;
        let mut first_size = config.initial_size;
        let mut octaves = vec![];
        for index in 0..config.octaves {
            let largest = (config.scales_per_octave - 1)
                .checked_mul(size_step)
                .and_then(|span| span.checked_add(first_size));
            let largest = match largest {
                Some(largest) if largest <= width && largest <= height => largest,
                _ => {
                    debug!(
                        "Filters of octave {} starting at size {} exceed the {}x{} image.",
                        index, first_size, width, height
                    );
                    break;
                }
            };
            let sizes: Vec<usize> = (0..config.scales_per_octave)
                .map(|i| first_size + i * size_step)
                .collect();
            debug_assert_eq!(sizes.last(), Some(&largest));
            octaves.push(Octave::new(
                index,
                sample_step,
                size_step,
                sizes,
                width,
                height,
            ));
            // Anything that overflows would not fit in the image either.
            match (
                sample_step.checked_mul(2),
                first_size.checked_add(size_step),
                size_step.checked_mul(2),
            ) {
                (Some(next_sample), Some(next_first), Some(next_step)) => {
                    sample_step = next_sample;
                    first_size = next_first;
                    size_step = next_step;
                }
                _ => break,
            }
        }
        octaves
    }

    /// Detect Fast-Hessian keypoints on the integral image of a gray band.
    ///
    /// Keypoints are ordered by octave, then by scale and then by decreasing
    /// response magnitude.
    pub fn detect_keypoints(&self, integral: &IntegralImage) -> Vec<KeyPoint> {
        let mut keypoints = vec![];
        for octave in self.octaves(integral.width(), integral.height()) {
            #[cfg(not(feature = "rayon"))]
            let layers: Vec<ResponseLayer> = octave
                .sizes
                .iter()
                .map(|&size| ResponseLayer::compute(integral, &octave, size))
                .collect();
            #[cfg(feature = "rayon")]
            let layers: Vec<ResponseLayer> = octave
                .sizes
                .par_iter()
                .map(|&size| ResponseLayer::compute(integral, &octave, size))
                .collect();
            trace!(
                "Computed responses for octave {} with filter sizes {:?}.",
                octave.index,
                octave.sizes
            );
            for scale_index in 1..layers.len() - 1 {
                let mut found = self.find_maxima(&octave, &layers, scale_index);
                found.sort_by_key(|keypoint| Reverse(FloatOrd(keypoint.response.abs())));
                if let Some(cap) = self.config.feature_cap() {
                    found.truncate(cap);
                }
                debug!(
                    "{} keypoints in octave {} at filter size {}.",
                    found.len(),
                    octave.index,
                    octave.sizes[scale_index]
                );
                keypoints.extend(found);
            }
        }
        debug!("Detected {} keypoints.", keypoints.len());
        keypoints
    }

    /// Non-maximum suppression in space and scale around one scale of an octave.
    fn find_maxima(
        &self,
        octave: &Octave,
        layers: &[ResponseLayer],
        scale_index: usize,
    ) -> Vec<KeyPoint> {
        let neighborhood = &layers[scale_index - 1..=scale_index + 1];
        let radius = self.config.radius as isize;
        let mut keypoints = vec![];
        for gy in octave.rows() {
            for gx in octave.cols() {
                let value = layers[scale_index].det[[gy, gx]];
                // NaN never passes.
                if !(value > self.config.threshold) {
                    continue;
                }
                if is_strict_maximum(neighborhood, gx as isize, gy as isize, radius, value) {
                    keypoints.push(refine(octave, layers, scale_index, gx, gy));
                }
            }
        }
        keypoints
    }
}

/// Interpolate the position and size of a maximum from its direct neighbors.
fn refine(
    octave: &Octave,
    layers: &[ResponseLayer],
    scale_index: usize,
    gx: usize,
    gy: usize,
) -> KeyPoint {
    let layer = &layers[scale_index];
    let value = layer.det[[gy, gx]];
    let (sx, sy) = (gx as isize, gy as isize);
    let dx = interpolate_peak(layer.det_at(sx - 1, sy), value, layer.det_at(sx + 1, sy));
    let dy = interpolate_peak(layer.det_at(sx, sy - 1), value, layer.det_at(sx, sy + 1));
    let ds = interpolate_peak(
        layers[scale_index - 1].det[[gy, gx]],
        value,
        layers[scale_index + 1].det[[gy, gx]],
    );
    let step = octave.sample_step as f32;
    let size = octave.sizes[scale_index] as f32 + ds * octave.size_step as f32;
    let sign = if layer.trace[[gy, gx]] < 0.0 { -1.0 } else { 1.0 };
    KeyPoint {
        point: ((gx as f32 + dx) * step, (gy as f32 + dy) * step),
        response: sign * value,
        size,
        scale: scale_from_size(size),
        octave: octave.index,
        scale_index,
    }
}

#[cfg(test)]
mod tests {
    use super::{hessian, interpolate_peak};
    use crate::image::GrayFloatImage;
    use crate::integral::IntegralImage;
    use crate::{ColorSurf, Config, KeyPoint};
    use rand::{Rng, SeedableRng};
    use rand_pcg::Pcg64;
    use std::collections::BTreeMap;

    fn random_integral(seed: u8, width: usize, height: usize) -> IntegralImage {
        let mut rng = Pcg64::from_seed([seed; 32]);
        let samples = (0..width * height).map(|_| rng.gen::<f32>()).collect();
        IntegralImage::new(&GrayFloatImage::from_raw(width, height, samples).unwrap())
    }

    fn by_scale(keypoints: &[KeyPoint]) -> BTreeMap<(usize, usize), Vec<KeyPoint>> {
        let mut scales: BTreeMap<_, Vec<_>> = BTreeMap::new();
        for &keypoint in keypoints {
            scales
                .entry((keypoint.octave, keypoint.scale_index))
                .or_default()
                .push(keypoint);
        }
        scales
    }

    #[test]
    fn filter_sizes_grow_per_octave() {
        let surf = ColorSurf::default();
        let octaves = surf.octaves(1000, 1000);
        let sizes: Vec<Vec<usize>> = octaves.iter().map(|o| o.sizes.clone()).collect();
        assert_eq!(
            sizes,
            vec![
                vec![9, 15, 21, 27],
                vec![15, 27, 39, 51],
                vec![27, 51, 75, 99],
                vec![51, 99, 147, 195],
            ]
        );
        let steps: Vec<usize> = octaves.iter().map(|o| o.sample_step).collect();
        assert_eq!(steps, vec![2, 4, 8, 16]);
    }

    #[test]
    fn schedule_stops_before_overflowing() {
        // Bypasses validation to reach the arithmetic limits.
        let unchecked = |config: Config| ColorSurf { config };
        let huge_filters = unchecked(Config {
            initial_size: usize::MAX - 2,
            ..Default::default()
        });
        assert!(huge_filters.octaves(1000, 1000).is_empty());
        let huge_steps = unchecked(Config {
            initial_sample_rate: usize::MAX / 2 + 1,
            octaves: 100,
            ..Default::default()
        });
        assert_eq!(huge_steps.octaves(1000, 1000).len(), 1);
        let endless = unchecked(Config {
            octaves: usize::MAX,
            ..Default::default()
        })
        .octaves(usize::MAX, usize::MAX);
        assert!(endless.len() > 32);
        for pair in endless.windows(2) {
            assert!(pair[1].sizes[0] > pair[0].sizes[0]);
        }
    }

    #[test]
    fn octaves_stop_when_filters_outgrow_the_image() {
        let surf = ColorSurf::default();
        assert_eq!(surf.octaves(60, 200).len(), 2);
        assert!(surf.octaves(20, 20).is_empty());
    }

    #[test]
    fn flat_band_has_no_response() {
        let integral = IntegralImage::new(&GrayFloatImage::from_raw(40, 40, vec![0.5; 1600]).unwrap());
        let (det, trace) = hessian(&integral, 20, 20, 15);
        assert!(det.abs() < 1e-12);
        assert!(trace.abs() < 1e-12);
        assert!(ColorSurf::default().detect_keypoints(&integral).is_empty());
    }

    #[test]
    fn peak_interpolation() {
        assert_eq!(interpolate_peak(1.0, 2.0, 1.0), 0.0);
        assert!((interpolate_peak(1.0, 2.0, 1.5) - 1.0 / 6.0).abs() < 1e-6);
        assert!(interpolate_peak(1.5, 2.0, 1.0) < 0.0);
        assert_eq!(interpolate_peak(1.0, 1.0, 1.0), 0.0);
    }

    #[test]
    fn maxima_respect_threshold_and_spacing() {
        let integral = random_integral(11, 96, 80);
        for radius in [1, 2, 3] {
            let config = Config {
                radius,
                threshold: 0.002,
                ..Default::default()
            };
            let keypoints = ColorSurf::new(config).unwrap().detect_keypoints(&integral);
            assert!(!keypoints.is_empty());
            for keypoint in &keypoints {
                assert!(keypoint.response.abs() >= config.threshold);
            }
            for same_scale in by_scale(&keypoints).values() {
                for (i, a) in same_scale.iter().enumerate() {
                    for b in &same_scale[i + 1..] {
                        let distance = (a.point.0 - b.point.0)
                            .abs()
                            .max((a.point.1 - b.point.1).abs());
                        assert!(distance > radius as f32, "{:?} and {:?}", a, b);
                    }
                }
            }
        }
    }

    #[test]
    fn cap_keeps_the_strongest_per_scale() {
        let integral = random_integral(5, 120, 120);
        let all = ColorSurf::default().detect_keypoints(&integral);
        let capped = ColorSurf::new(Config {
            max_features_per_scale: 3,
            ..Default::default()
        })
        .unwrap()
        .detect_keypoints(&integral);
        let all = by_scale(&all);
        let capped = by_scale(&capped);
        assert_eq!(all.keys().collect::<Vec<_>>(), capped.keys().collect::<Vec<_>>());
        for (scale, kept) in &capped {
            let candidates = &all[scale];
            assert_eq!(kept.len(), candidates.len().min(3));
            // Both lists are sorted by decreasing magnitude.
            assert_eq!(kept.as_slice(), &candidates[..kept.len()]);
        }
    }
}
