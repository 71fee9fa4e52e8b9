use crate::image::GrayFloatImage;
use ndarray::Array2;

/// A summed-area table of one band.
///
/// The table is one row and one column larger than the band: cell `(x + 1, y + 1)`
/// holds the sum of every sample in `[0, x] × [0, y]`, and the first row and
/// column are zero. Sums are accumulated in `f64` so that box filter differences
/// stay accurate on large images.
#[derive(Debug, Clone)]
pub struct IntegralImage {
    table: Array2<f64>,
}

impl IntegralImage {
    pub fn new(image: &GrayFloatImage) -> Self {
        let mut table = Array2::zeros((image.height() + 1, image.width() + 1));
        for (y, row) in image.ref_array2().outer_iter().enumerate() {
            let mut row_sum = 0f64;
            for (x, &sample) in row.iter().enumerate() {
                row_sum += f64::from(sample);
                table[[y + 1, x + 1]] = table[[y, x + 1]] + row_sum;
            }
        }
        Self { table }
    }

    /// Width of the source band.
    pub fn width(&self) -> usize {
        self.table.dim().1 - 1
    }

    /// Height of the source band.
    pub fn height(&self) -> usize {
        self.table.dim().0 - 1
    }

    /// Sum of the samples in the half-open rectangle `[x0, x1) × [y0, y1)`.
    ///
    /// The rectangle is clipped to the band first, so rectangles that touch or
    /// cross the border are fine, and empty rectangles sum to zero.
    pub fn block_sum(&self, x0: isize, y0: isize, x1: isize, y1: isize) -> f64 {
        let clip_x = |x: isize| x.clamp(0, self.width() as isize) as usize;
        let clip_y = |y: isize| y.clamp(0, self.height() as isize) as usize;
        let (x0, x1) = (clip_x(x0), clip_x(x1));
        let (y0, y1) = (clip_y(y0), clip_y(y1));
        if x1 <= x0 || y1 <= y0 {
            return 0.0;
        }
        self.table[[y1, x1]] - self.table[[y0, x1]] - self.table[[y1, x0]]
            + self.table[[y0, x0]]
    }

    /// Whether the square of half-width `radius` around `(x, y)` lies inside the band.
    fn contains_square(&self, x: isize, y: isize, radius: isize) -> bool {
        x - radius >= 0
            && y - radius >= 0
            && x + radius <= self.width() as isize
            && y + radius <= self.height() as isize
    }

    /// Horizontal Haar wavelet response: the right half minus the left half of
    /// a `size` wide square centered at `(x, y)`.
    ///
    /// Squares that leave the band respond with zero.
    pub fn haar_x(&self, x: isize, y: isize, size: usize) -> f64 {
        let r = (size as isize / 2).max(1);
        if !self.contains_square(x, y, r) {
            return 0.0;
        }
        self.block_sum(x, y - r, x + r, y + r) - self.block_sum(x - r, y - r, x, y + r)
    }

    /// Vertical Haar wavelet response: the bottom half minus the top half of
    /// a `size` wide square centered at `(x, y)`.
    ///
    /// Squares that leave the band respond with zero.
    pub fn haar_y(&self, x: isize, y: isize, size: usize) -> f64 {
        let r = (size as isize / 2).max(1);
        if !self.contains_square(x, y, r) {
            return 0.0;
        }
        self.block_sum(x - r, y, x + r, y + r) - self.block_sum(x - r, y - r, x + r, y)
    }
}
